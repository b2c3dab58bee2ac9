//! Tool registry: JSON-schema definitions plus async handlers.
//!
//! Tools are stateless JSON-in/JSON-out effects. Handler failures never
//! propagate; they are folded into an `{"error": ...}` payload so the model
//! can compose a user-facing explanation.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::agent::types::ToolDefinition;

/// Async handler: JSON input to JSON-string output.
pub type ToolHandler =
    Box<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// The set of tools offered to the model for a turn.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) {
        log::info!("[tools] registered {}", definition.name);
        self.tools.insert(definition.name.clone(), RegisteredTool { definition, handler });
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Invoke a tool. Always produces a JSON string; unknown tools and
    /// handler errors come back as error payloads.
    pub async fn invoke(&self, name: &str, input: serde_json::Value) -> String {
        let Some(tool) = self.tools.get(name) else {
            return serde_json::json!({ "error": format!("Tool '{}' not found", name) }).to_string();
        };

        match (tool.handler)(input).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("[tools] {} failed: {}", name, e);
                serde_json::json!({ "error": e }).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> (ToolDefinition, ToolHandler) {
        (
            ToolDefinition {
                name: "echo".into(),
                description: "Echo the input".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            },
            Box::new(|input| {
                Box::pin(async move {
                    let text = input["text"].as_str().unwrap_or("").to_string();
                    Ok(serde_json::json!({ "echo": text }).to_string())
                })
            }),
        )
    }

    #[tokio::test]
    async fn invoke_registered_tool() {
        let mut registry = ToolRegistry::new();
        let (def, handler) = echo_tool();
        registry.register(def, handler);

        let out = registry.invoke("echo", serde_json::json!({ "text": "hi" })).await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["echo"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_payload() {
        let registry = ToolRegistry::new();
        let out = registry.invoke("nope", serde_json::json!({})).await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn handler_error_is_captured() {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolDefinition {
                name: "boom".into(),
                description: "Always fails".into(),
                input_schema: serde_json::json!({ "type": "object" }),
            },
            Box::new(|_| Box::pin(async { Err("it broke".to_string()) })),
        );

        let out = registry.invoke("boom", serde_json::json!({})).await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["error"], "it broke");
    }

    #[test]
    fn definitions_listed() {
        let mut registry = ToolRegistry::new();
        let (def, handler) = echo_tool();
        registry.register(def, handler);
        assert_eq!(registry.count(), 1);
        assert!(registry.has_tool("echo"));
        assert_eq!(registry.definitions()[0].name, "echo");
    }
}
