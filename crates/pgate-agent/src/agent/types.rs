//! Wire types for the Messages API and the turn engine's results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One prior turn of conversation, as the dispatcher hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Response content blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

/// Token accounting for one API call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A Messages API request.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A Messages API response, reduced to what the engine consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// Abstraction over the model endpoint; production uses [`AnthropicClient`],
/// tests substitute a scripted transport.
///
/// [`AnthropicClient`]: crate::agent::client::AnthropicClient
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn messages(&self, request: &MessagesRequest) -> Result<MessagesResponse, String>;
}

/// Outcome of one operator line run through the engine.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Final reply text; `None` when the turn failed.
    pub text: Option<String>,
    /// Tokens consumed across every API call of the turn.
    pub tokens_used: u64,
    /// Terminal error, surfaced to the operator as a retry hint.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_text_and_tool_use() {
        let raw = serde_json::json!({
            "content": [
                { "type": "text", "text": "Let me check." },
                { "type": "tool_use", "id": "tu_1", "name": "qrz_lookup",
                  "input": { "callsign": "W1AW" } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 10, "output_tokens": 20 }
        });
        let resp: MessagesResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.text(), "Let me check.");
        let uses = resp.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "qrz_lookup");
        assert_eq!(resp.usage.total(), 30);
    }

    #[test]
    fn request_omits_empty_tools_and_system() {
        let req = MessagesRequest {
            model: "m".into(),
            max_tokens: 100,
            temperature: 0.7,
            system: None,
            messages: vec![],
            tools: vec![],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn multiple_text_blocks_concatenate() {
        let resp = MessagesResponse {
            content: vec![
                ContentBlock::Text { text: "a".into() },
                ContentBlock::Text { text: "b".into() },
            ],
            stop_reason: Some("end_turn".into()),
            usage: Usage::default(),
        };
        assert_eq!(resp.text(), "ab");
    }
}
