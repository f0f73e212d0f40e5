use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;

/// Pull the JSON object out of a model answer.
///
/// Handles fenced ```json blocks and prose before or after the object.
pub fn extract_json(response: &str) -> Result<&str> {
    let trimmed = response.trim();
    let body = match trimmed.find("```") {
        Some(fence) => {
            let after = &trimmed[fence + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        None => trimmed,
    };

    let start = body
        .find('{')
        .ok_or_else(|| anyhow!("no JSON object in response: {}", preview(response)))?;
    let end = body
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("unterminated JSON object in response: {}", preview(response)))?;
    Ok(&body[start..=end])
}

pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T> {
    let json = extract_json(response)?;
    serde_json::from_str(json).with_context(|| format!("Failed to parse model JSON: {}", preview(json)))
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
