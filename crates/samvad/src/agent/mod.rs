//! Conversation control loop.
//!
//! A two-state machine: AGENT sends the transcript to the model; if the
//! response requests tool calls the loop moves to TOOLS, executes every
//! requested call, appends each result to the transcript, and returns to
//! AGENT. A response with no tool calls ends the loop. Malformed tool
//! arguments are surfaced back into the transcript as error results so the
//! model can recover; runaway cycling is cut off by a hard cap.

pub mod tools;

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatResponse, GenerationClient};
use tools::ToolRegistry;

/// One executed tool call, recorded for the session log.
#[derive(Debug, Clone)]
pub struct ToolInvocationRecord {
    pub tool_name: String,
    pub input: String,
    pub output: String,
}

/// Final output of one control-loop run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Final assistant text, trimmed.
    pub final_text: String,
    /// Output of the last tool call in this invocation, if any.
    pub last_tool_output: Option<String>,
    pub invocations: Vec<ToolInvocationRecord>,
}

/// Run the AGENT⇄TOOLS loop until the model produces a final answer or the
/// cycle cap is exceeded.
pub async fn run_tool_loop(
    generator: &dyn GenerationClient,
    registry: &ToolRegistry,
    messages: &mut Vec<ChatMessage>,
    max_cycles: usize,
) -> Result<LoopOutcome> {
    let schemas = registry.schemas();
    let mut invocations: Vec<ToolInvocationRecord> = Vec::new();
    let mut cycles = 0;

    loop {
        let response = generator.chat(messages, &schemas).await?;

        let tool_calls = match response {
            ChatResponse::Content(text) => {
                tracing::debug!(cycles, "control loop finished");
                return Ok(LoopOutcome {
                    final_text: text.trim().to_string(),
                    last_tool_output: invocations.last().map(|i| i.output.clone()),
                    invocations,
                });
            }
            ChatResponse::ToolCalls(calls) => calls,
        };

        cycles += 1;
        if cycles > max_cycles {
            tracing::warn!(max_cycles, "tool loop exceeded its cycle cap");
            return Err(Error::ToolLoopExceeded(max_cycles));
        }

        tracing::debug!(
            cycle = cycles,
            requested = ?tool_calls.iter().map(|tc| &tc.name).collect::<Vec<_>>(),
            "executing tool calls"
        );
        messages.push(ChatMessage::assistant_tool_calls(tool_calls.clone()));

        for call in &tool_calls {
            let arguments: JsonValue =
                serde_json::from_str(&call.arguments).unwrap_or(JsonValue::Null);

            let output = match registry.get(&call.name) {
                Some(tool) => match tool.execute(&arguments).await {
                    Ok(output) => output,
                    // Recoverable: feed the error back so the model can retry.
                    Err(Error::ToolArgument { tool, reason }) => {
                        tracing::debug!(%tool, %reason, "malformed tool call, surfacing to model");
                        format!("Error: malformed arguments for '{}': {}", tool, reason)
                    }
                    Err(other) => return Err(other),
                },
                None => format!("Error: unknown tool '{}'", call.name),
            };

            invocations.push(ToolInvocationRecord {
                tool_name: call.name.clone(),
                input: call.arguments.clone(),
                output: output.clone(),
            });
            messages.push(ChatMessage::tool_result(&call.id, &call.name, &output));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ToolCall, ToolSchema};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a scripted sequence of responses, one per chat() call.
    struct ScriptedGenerator {
        script: Vec<ChatResponse>,
        cursor: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<ChatResponse>) -> Self {
            Self {
                script,
                cursor: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedGenerator {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSchema],
        ) -> Result<ChatResponse> {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.script
                .get(i)
                .cloned()
                .ok_or_else(|| Error::Generation("script exhausted".to_string()))
        }
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test]
    async fn no_tool_calls_ends_immediately() {
        let generator =
            ScriptedGenerator::new(vec![ChatResponse::Content("  hello  ".to_string())]);
        let mut messages = vec![ChatMessage::user("hi")];
        let outcome = run_tool_loop(&generator, &ToolRegistry::new(), &mut messages, 5)
            .await
            .unwrap();
        assert_eq!(outcome.final_text, "hello");
        assert!(outcome.last_tool_output.is_none());
        assert!(outcome.invocations.is_empty());
    }

    #[tokio::test]
    async fn one_tool_round_trip_produces_result_and_final_text() {
        let generator = ScriptedGenerator::new(vec![
            ChatResponse::ToolCalls(vec![call("add", r#"{"a":2,"b":3}"#)]),
            ChatResponse::Content("2 + 3 = 5".to_string()),
        ]);
        let mut messages = vec![ChatMessage::user("what is 2 + 3?")];
        let outcome = run_tool_loop(&generator, &ToolRegistry::new(), &mut messages, 5)
            .await
            .unwrap();

        assert_eq!(outcome.final_text, "2 + 3 = 5");
        assert_eq!(outcome.last_tool_output.as_deref(), Some("5"));
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.invocations[0].tool_name, "add");

        // Transcript carries the assistant's request and the tool result.
        assert!(messages
            .iter()
            .any(|m| m.tool_calls.as_ref().is_some_and(|c| c[0].name == "add")));
        assert!(messages
            .iter()
            .any(|m| m.tool_call_id.is_some() && m.content.as_deref() == Some("5")));
    }

    #[tokio::test]
    async fn malformed_arguments_recover_into_the_transcript() {
        let generator = ScriptedGenerator::new(vec![
            ChatResponse::ToolCalls(vec![call("add", r#"{"a":"x","b":3}"#)]),
            ChatResponse::ToolCalls(vec![call("add", r#"{"a":2,"b":3}"#)]),
            ChatResponse::Content("5".to_string()),
        ]);
        let mut messages = vec![ChatMessage::user("add x and 3")];
        let outcome = run_tool_loop(&generator, &ToolRegistry::new(), &mut messages, 5)
            .await
            .unwrap();

        assert_eq!(outcome.final_text, "5");
        assert_eq!(outcome.invocations.len(), 2);
        assert!(outcome.invocations[0].output.starts_with("Error:"));
        assert_eq!(outcome.invocations[1].output, "5");
    }

    #[tokio::test]
    async fn runaway_tool_cycling_hits_the_cap() {
        let always_call: Vec<ChatResponse> = (0..20)
            .map(|_| ChatResponse::ToolCalls(vec![call("add", r#"{"a":1,"b":1}"#)]))
            .collect();
        let generator = ScriptedGenerator::new(always_call);
        let mut messages = vec![ChatMessage::user("loop forever")];
        let err = run_tool_loop(&generator, &ToolRegistry::new(), &mut messages, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolLoopExceeded(5)));
    }
}
