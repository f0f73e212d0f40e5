pub mod openai;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pub use openai::OpenAiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of a chat-completion transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub role: Role,
    pub content: String,
}

impl AiMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A function the model may call instead of answering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolSpec {
    pub const END_CONVERSATION: &'static str = "endConversation";

    pub fn end_conversation() -> Self {
        Self {
            name: Self::END_CONVERSATION.to_string(),
            description: "Use this function to decline or finish the conversation by giving a reason."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "reason": { "type": "string" } },
                "required": ["reason"],
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<AiMessage>,
    pub tools: Vec<ToolSpec>,
    /// Ask for a JSON object response
    pub json: bool,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            messages: vec![AiMessage::system(system)],
            ..Self::default()
        }
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = AiMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn expect_json(mut self) -> Self {
        self.json = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    ToolCall { name: String, arguments: Value },
}

impl Completion {
    /// The text answer; a tool call here is an error
    pub fn into_text(self) -> Result<String> {
        match self {
            Completion::Text(text) => Ok(text),
            Completion::ToolCall { name, .. } => Err(anyhow!("unexpected tool call {:?}", name)),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<Completion>;
}

pub type SharedLlm = Arc<dyn LlmClient>;

enum CallState<T> {
    Inline(BoxFuture<'static, Result<T>>),
    Spawned(tokio::task::JoinHandle<Result<T>>),
    Done,
}

/// An oracle request owned by whoever is waiting on it.
///
/// Inside a tokio runtime the future is spawned so it makes progress between
/// ticks; otherwise it is polled inline on `poll_ready`. Dropping the call
/// discards the result but does not abort a spawned request.
pub struct OracleCall<T> {
    state: CallState<T>,
}

impl<T: Send + 'static> OracleCall<T> {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let state = match tokio::runtime::Handle::try_current() {
            Ok(handle) => CallState::Spawned(handle.spawn(future)),
            Err(_) => CallState::Inline(Box::pin(future)),
        };
        Self { state }
    }

    /// Check for a result without blocking. Returns it at most once.
    pub fn poll_ready(&mut self) -> Option<Result<T>> {
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        let polled = match &mut self.state {
            CallState::Inline(future) => future.as_mut().poll(&mut cx),
            CallState::Spawned(handle) => match Pin::new(handle).poll(&mut cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(err)) => Poll::Ready(Err(anyhow!("oracle task failed: {}", err))),
                Poll::Pending => Poll::Pending,
            },
            CallState::Done => return None,
        };
        match polled {
            Poll::Ready(result) => {
                self.state = CallState::Done;
                Some(result)
            }
            Poll::Pending => None,
        }
    }
}

impl<T> std::fmt::Debug for OracleCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            CallState::Inline(_) => "inline",
            CallState::Spawned(_) => "spawned",
            CallState::Done => "done",
        };
        f.debug_struct("OracleCall").field("state", &state).finish()
    }
}
