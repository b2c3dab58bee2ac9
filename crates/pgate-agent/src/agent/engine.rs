//! The agentic turn loop.
//!
//! One operator line becomes one engine run: call the model, execute any
//! requested tools, feed the results back, and repeat until the model stops
//! asking for tools or the iteration budget runs out.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::agent::registry::ToolRegistry;
use crate::agent::types::{
    ChatTurn, ContentBlock, LlmTransport, MessagesRequest, TurnOutcome, Usage,
};

/// Model parameters for every run.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_prompt: String,
    pub max_tool_iterations: u32,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            system_prompt: String::new(),
            max_tool_iterations: 5,
        }
    }
}

/// Drives conversations against an [`LlmTransport`] with tool support.
pub struct TurnEngine {
    transport: Arc<dyn LlmTransport>,
    tools: ToolRegistry,
    settings: TurnSettings,
}

impl TurnEngine {
    pub fn new(transport: Arc<dyn LlmTransport>, tools: ToolRegistry, settings: TurnSettings) -> Self {
        Self { transport, tools, settings }
    }

    pub fn tool_count(&self) -> usize {
        self.tools.count()
    }

    /// Run one turn: prior history plus the new user line.
    pub async fn run(&self, history: &[ChatTurn], user_message: &str) -> TurnOutcome {
        let started = Instant::now();
        let mut total = Usage::default();

        let mut messages: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| serde_json::json!({ "role": turn.role, "content": turn.content }))
            .collect();
        messages.push(serde_json::json!({ "role": "user", "content": user_message }));

        let tool_defs = self.tools.definitions();
        let mut last_text = String::new();

        for iteration in 0..=self.settings.max_tool_iterations {
            let request = MessagesRequest {
                model: self.settings.model.clone(),
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
                system: if self.settings.system_prompt.is_empty() {
                    None
                } else {
                    Some(self.settings.system_prompt.clone())
                },
                messages: messages.clone(),
                tools: tool_defs.clone(),
            };

            let response = match self.transport.messages(&request).await {
                Ok(r) => r,
                Err(e) => {
                    return TurnOutcome {
                        text: None,
                        tokens_used: total.total(),
                        error: Some(e),
                    };
                }
            };

            total.input_tokens += response.usage.input_tokens;
            total.output_tokens += response.usage.output_tokens;
            last_text = response.text();

            if response.stop_reason.as_deref() != Some("tool_use") {
                info!(
                    "[llm] turn complete ({} ms, {} tokens, {} tool rounds)",
                    started.elapsed().as_millis(),
                    total.total(),
                    iteration
                );
                return TurnOutcome {
                    text: Some(last_text),
                    tokens_used: total.total(),
                    error: None,
                };
            }

            // Execute every requested tool and feed the results back.
            let mut tool_results = Vec::new();
            for (id, name, input) in response.tool_uses() {
                info!("[llm] executing tool {} ({})", name, id);
                let output = self.tools.invoke(name, input.clone()).await;
                debug!("[llm] tool {} returned {} bytes", name, output.len());
                tool_results.push(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": output,
                }));
            }

            messages.push(serde_json::json!({
                "role": "assistant",
                "content": content_blocks_json(&response.content),
            }));
            messages.push(serde_json::json!({ "role": "user", "content": tool_results }));
        }

        // Iteration budget exhausted; whatever text the model produced last
        // is the best answer available.
        info!("[llm] tool iteration budget exhausted ({} tokens)", total.total());
        TurnOutcome { text: Some(last_text), tokens_used: total.total(), error: None }
    }
}

fn content_blocks_json(blocks: &[ContentBlock]) -> serde_json::Value {
    serde_json::to_value(blocks).unwrap_or_else(|_| serde_json::json!([]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::registry::ToolHandler;
    use crate::agent::types::{MessagesResponse, ToolDefinition};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted transport: pops pre-baked responses and records requests.
    struct ScriptedTransport {
        responses: Mutex<Vec<Result<MessagesResponse, String>>>,
        requests: Mutex<Vec<MessagesRequest>>,
    }

    impl ScriptedTransport {
        fn new(mut responses: Vec<Result<MessagesResponse, String>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmTransport for ScriptedTransport {
        async fn messages(&self, request: &MessagesRequest) -> Result<MessagesResponse, String> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err("script exhausted".to_string()))
        }
    }

    fn text_response(text: &str, in_tok: u64, out_tok: u64) -> MessagesResponse {
        MessagesResponse {
            content: vec![ContentBlock::Text { text: text.to_string() }],
            stop_reason: Some("end_turn".to_string()),
            usage: Usage { input_tokens: in_tok, output_tokens: out_tok },
        }
    }

    fn tool_use_response(name: &str, input: serde_json::Value) -> MessagesResponse {
        MessagesResponse {
            content: vec![ContentBlock::ToolUse {
                id: "tu_1".to_string(),
                name: name.to_string(),
                input,
            }],
            stop_reason: Some("tool_use".to_string()),
            usage: Usage { input_tokens: 10, output_tokens: 5 },
        }
    }

    fn lookup_tool(result: &'static str) -> (ToolDefinition, ToolHandler) {
        (
            ToolDefinition {
                name: "qrz_lookup".into(),
                description: "Look up a callsign".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "callsign": { "type": "string" } },
                    "required": ["callsign"]
                }),
            },
            Box::new(move |_| Box::pin(async move { Ok(result.to_string()) })),
        )
    }

    #[tokio::test]
    async fn plain_text_turn() {
        let transport = ScriptedTransport::new(vec![Ok(text_response("73!", 12, 8))]);
        let engine = TurnEngine::new(transport.clone(), ToolRegistry::new(), TurnSettings::default());

        let outcome = engine.run(&[], "hello").await;
        assert_eq!(outcome.text.as_deref(), Some("73!"));
        assert_eq!(outcome.tokens_used, 20);
        assert!(outcome.error.is_none());

        // One request, carrying exactly the user line.
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn tool_loop_accumulates_usage() {
        let transport = ScriptedTransport::new(vec![
            Ok(tool_use_response("qrz_lookup", serde_json::json!({ "callsign": "W1AW" }))),
            Ok(text_response("W1AW is Hiram Maxim.", 30, 15)),
        ]);

        let mut tools = ToolRegistry::new();
        let (def, handler) = lookup_tool(r#"{"call":"W1AW","fullname":"Hiram Maxim"}"#);
        tools.register(def, handler);

        let engine = TurnEngine::new(transport.clone(), tools, TurnSettings::default());
        let outcome = engine.run(&[], "look up W1AW").await;

        assert!(outcome.text.unwrap().contains("Hiram Maxim"));
        // 10 + 5 from the tool round plus 30 + 15 from the final call.
        assert_eq!(outcome.tokens_used, 60);

        // The second request must carry assistant content + tool_result.
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let msgs = &requests[1].messages;
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1]["role"], "assistant");
        assert_eq!(msgs[2]["role"], "user");
        assert_eq!(msgs[2]["content"][0]["type"], "tool_result");
        assert_eq!(msgs[2]["content"][0]["tool_use_id"], "tu_1");
        assert!(msgs[2]["content"][0]["content"]
            .as_str()
            .unwrap()
            .contains("Hiram Maxim"));
    }

    #[tokio::test]
    async fn unknown_tool_result_feeds_error_back() {
        let transport = ScriptedTransport::new(vec![
            Ok(tool_use_response("missing_tool", serde_json::json!({}))),
            Ok(text_response("Sorry, that tool is unavailable.", 5, 5)),
        ]);
        let engine = TurnEngine::new(transport.clone(), ToolRegistry::new(), TurnSettings::default());

        let outcome = engine.run(&[], "do a thing").await;
        assert!(outcome.error.is_none());

        let requests = transport.requests.lock().unwrap();
        let result = requests[1].messages[2]["content"][0]["content"].as_str().unwrap();
        assert!(result.contains("error"));
    }

    #[tokio::test]
    async fn transport_error_surfaces() {
        let transport = ScriptedTransport::new(vec![Err("API error 500: overloaded".to_string())]);
        let engine = TurnEngine::new(transport, ToolRegistry::new(), TurnSettings::default());

        let outcome = engine.run(&[], "hi").await;
        assert!(outcome.text.is_none());
        assert_eq!(outcome.error.as_deref(), Some("API error 500: overloaded"));
    }

    #[tokio::test]
    async fn iteration_budget_bounds_tool_rounds() {
        // The model keeps asking for tools forever; engine must stop.
        let responses: Vec<Result<MessagesResponse, String>> = (0..10)
            .map(|_| Ok(tool_use_response("qrz_lookup", serde_json::json!({ "callsign": "X" }))))
            .collect();
        let transport = ScriptedTransport::new(responses);

        let mut tools = ToolRegistry::new();
        let (def, handler) = lookup_tool("{}");
        tools.register(def, handler);

        let settings = TurnSettings { max_tool_iterations: 3, ..Default::default() };
        let engine = TurnEngine::new(transport.clone(), tools, settings);
        let outcome = engine.run(&[], "loop forever").await;

        assert!(outcome.error.is_none());
        // max_tool_iterations tool rounds plus the final attempt.
        assert_eq!(transport.requests.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn history_precedes_user_line() {
        let transport = ScriptedTransport::new(vec![Ok(text_response("ok", 1, 1))]);
        let engine = TurnEngine::new(transport.clone(), ToolRegistry::new(), TurnSettings::default());

        let history =
            vec![ChatTurn::user("earlier question"), ChatTurn::assistant("earlier answer")];
        engine.run(&history, "new question").await;

        let requests = transport.requests.lock().unwrap();
        let msgs = &requests[0].messages;
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["content"], "earlier question");
        assert_eq!(msgs[1]["role"], "assistant");
        assert_eq!(msgs[2]["content"], "new question");
    }
}
