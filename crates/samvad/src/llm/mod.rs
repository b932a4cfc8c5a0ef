//! Generation-service contract and the Gemini HTTP implementation.
//!
//! The model is an opaque collaborator: given a transcript (and optionally a
//! set of declared tool schemas) it returns either final text or tool-call
//! requests. Every call carries a hard timeout; on expiry the interaction
//! fails without persisting a partial assistant turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use crate::error::{Error, Result};

/// A transcript message with a tagged role and optional tool-call metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Tool calls requested by the assistant (only present when role=Assistant)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to (only present when role=Tool)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool (only present when role=Tool)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the request with its tool-result message.
    pub id: String,
    pub name: String,
    /// JSON arguments string.
    pub arguments: String,
}

/// Schema describing a tool the model can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: JsonValue,
}

/// The result of one model round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatResponse {
    /// Final text content.
    Content(String),
    /// The model wants tools executed before answering.
    ToolCalls(Vec<ToolCall>),
}

/// Contract for the generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// One chat round-trip over the full transcript with declared tools.
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatResponse>;

    /// Single-prompt completion with no tools (used by the RAG extraction pass).
    async fn generate(&self, prompt: &str) -> Result<String> {
        match self.chat(&[ChatMessage::user(prompt)], &[]).await? {
            ChatResponse::Content(text) => Ok(text),
            ChatResponse::ToolCalls(_) => Err(Error::Generation(
                "model requested tools on a plain completion".to_string(),
            )),
        }
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint_base: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        model: String,
        endpoint_base: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            endpoint_base,
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint_base, self.model
        )
    }

    /// Map the tagged transcript onto Gemini's contents array. System text
    /// becomes `systemInstruction`; tool results become `functionResponse`
    /// parts; assistant tool requests become `functionCall` parts.
    fn format_contents(messages: &[ChatMessage]) -> (Vec<JsonValue>, Option<String>) {
        let mut contents = Vec::new();
        let mut system_instruction = None;

        for m in messages {
            match m.role {
                ChatRole::System => {
                    system_instruction = m.content.clone();
                }
                ChatRole::User => {
                    if let Some(ref content) = m.content {
                        contents.push(json!({
                            "role": "user",
                            "parts": [{ "text": content }]
                        }));
                    }
                }
                ChatRole::Assistant => {
                    if let Some(ref calls) = m.tool_calls {
                        let parts: Vec<JsonValue> = calls
                            .iter()
                            .map(|tc| {
                                let args: JsonValue =
                                    serde_json::from_str(&tc.arguments).unwrap_or(json!({}));
                                json!({
                                    "functionCall": {
                                        "name": tc.name,
                                        "args": args,
                                    }
                                })
                            })
                            .collect();
                        contents.push(json!({ "role": "model", "parts": parts }));
                    } else if let Some(ref content) = m.content {
                        contents.push(json!({
                            "role": "model",
                            "parts": [{ "text": content }]
                        }));
                    }
                }
                ChatRole::Tool => {
                    if let (Some(ref name), Some(ref content)) = (&m.name, &m.content) {
                        let result: JsonValue = serde_json::from_str(content)
                            .unwrap_or(json!({ "result": content }));
                        contents.push(json!({
                            "role": "user",
                            "parts": [{
                                "functionResponse": {
                                    "name": name,
                                    "response": result,
                                }
                            }]
                        }));
                    }
                }
            }
        }

        (contents, system_instruction)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatResponse> {
        let (contents, system_instruction) = Self::format_contents(messages);

        let mut request = json!({
            "contents": contents,
            "generationConfig": { "temperature": 0.0 }
        });

        if let Some(ref sys) = system_instruction {
            request["systemInstruction"] = json!({ "parts": [{ "text": sys }] });
        }

        if !tools.is_empty() {
            let functions: Vec<JsonValue> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            request["tools"] = json!([{ "functionDeclarations": functions }]);
        }

        // The timeout covers the whole exchange; a server that returns
        // headers and then stalls the body must not hang the interaction.
        let exchange = async {
            let response = self
                .client
                .post(self.endpoint())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::Generation(e.to_string()))?;

            let status = response.status();
            let body_text = response
                .text()
                .await
                .map_err(|e| Error::Generation(e.to_string()))?;
            Ok::<_, Error>((status, body_text))
        };

        let (status, body_text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::UpstreamTimeout(self.timeout))??;

        if !status.is_success() {
            return Err(Error::Generation(format!(
                "generation API error ({}): {}",
                status, body_text
            )));
        }

        let body: JsonValue = serde_json::from_str(&body_text).map_err(|e| {
            let preview: String = body_text.chars().take(200).collect();
            Error::Generation(format!("unparseable response ({}): {}", e, preview))
        })?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        if let Some(parts) = body["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str() {
                    text_parts.push(text.to_string());
                }
                if let Some(fc) = part.get("functionCall") {
                    if let Some(name) = fc["name"].as_str() {
                        let args =
                            serde_json::to_string(&fc["args"]).unwrap_or_else(|_| "{}".to_string());
                        tool_calls.push(ToolCall {
                            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                            name: name.to_string(),
                            arguments: args,
                        });
                    }
                }
            }
        }

        if !tool_calls.is_empty() {
            tracing::debug!(count = tool_calls.len(), "model requested tool calls");
            Ok(ChatResponse::ToolCalls(tool_calls))
        } else if text_parts.is_empty() {
            Err(Error::Generation("empty response from model".to_string()))
        } else {
            Ok(ChatResponse::Content(text_parts.join("")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_maps_to_system_instruction() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let (contents, system) = GeminiClient::format_contents(&messages);
        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn tool_round_trip_maps_to_function_parts() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "add".into(),
            arguments: r#"{"a":2,"b":3}"#.into(),
        };
        let messages = vec![
            ChatMessage::user("add 2 and 3"),
            ChatMessage::assistant_tool_calls(vec![call]),
            ChatMessage::tool_result("call_1", "add", "5"),
        ];
        let (contents, _) = GeminiClient::format_contents(&messages);
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "add");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"]["a"], 2);
        assert!(contents[2]["parts"][0]["functionResponse"].is_object());
    }

    #[tokio::test]
    async fn stalled_body_read_times_out() {
        use tokio::io::AsyncWriteExt;

        // Returns headers, sends a partial body, then stalls.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\npartial")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let client = GeminiClient::new(
            "key".to_string(),
            "model".to_string(),
            format!("http://{}", addr),
            Duration::from_millis(200),
        );
        let err = client.chat(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamTimeout(_)));
    }
}
