use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{ChatRequest, Completion, LlmClient};
use crate::config::LlmConfig;

/// Client for any OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Self {
        if config.api_key().is_none() {
            log::warn!("⚠️ {} is not set, requests go out unauthenticated", config.api_key_env);
        }
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key(),
            temperature: config.temperature,
        }
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": self.temperature,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = json!("auto");
        }
        if request.json {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        log::debug!("Sending {} messages to {}", request.messages.len(), self.model);

        let mut builder = self.http.post(url).json(&self.body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.context("chat completion request failed")?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status != StatusCode::OK {
            bail!("chat completion http={} body={}", status.as_u16(), text);
        }

        let value: Value =
            serde_json::from_str(&text).context("chat completion response is not JSON")?;
        parse_completion(&value)
    }
}

fn parse_completion(value: &Value) -> Result<Completion> {
    let message = value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("chat completion has no message"))?;

    if let Some(call) = message
        .get("tool_calls")
        .and_then(|calls| calls.get(0))
        .and_then(|call| call.get("function"))
    {
        let name = call
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("tool call without a name"))?
            .to_string();
        let arguments = match call.get("arguments") {
            Some(Value::String(raw)) => serde_json::from_str(raw)
                .with_context(|| format!("bad arguments for tool {}", name))?,
            Some(other) => other.clone(),
            None => Value::Null,
        };
        return Ok(Completion::ToolCall { name, arguments });
    }

    message
        .get("content")
        .and_then(Value::as_str)
        .map(|content| Completion::Text(content.to_string()))
        .ok_or_else(|| anyhow!("chat completion has neither content nor tool call"))
}
