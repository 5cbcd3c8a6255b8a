//! Anthropic Messages API Backend
//!
//! System messages are lifted into the top-level `system` field, tool calls
//! become `tool_use` blocks, and consecutive tool results are folded into a
//! single user turn of `tool_result` blocks.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    ChatMessage, ChatRequest, ChatResponse, ErrorClassifier, ModelBackend, Role, TokenUsage,
    ToolCallRequest,
};
use crate::constants::network as net_constants;
use crate::types::{ErrorCategory, LlmError, Result, ScoutError};

pub struct AnthropicBackend {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(api_key: SecretString, api_base: &str, client: reqwest::Client) -> Self {
        Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn build_request(request: &ChatRequest) -> MessagesRequest {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut messages: Vec<WireMessage> = Vec::new();
        for msg in request.messages.iter().filter(|m| m.role != Role::System) {
            let (role, blocks) = to_blocks(msg);
            match messages.last_mut() {
                // Anthropic requires alternating turns; merge same-role neighbours
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => messages.push(WireMessage {
                    role,
                    content: blocks,
                }),
            }
        }

        MessagesRequest {
            model: request.model.clone(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        }
    }
}

fn to_blocks(msg: &ChatMessage) -> (&'static str, Vec<ContentBlock>) {
    match msg.role {
        Role::Tool => (
            "user",
            vec![ContentBlock::ToolResult {
                tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: msg.content.clone(),
            }],
        ),
        Role::Assistant => {
            let mut blocks = Vec::new();
            if !msg.content.is_empty() {
                blocks.push(ContentBlock::Text {
                    text: msg.content.clone(),
                });
            }
            for call in &msg.tool_calls {
                let input = match serde_json::from_str::<Value>(&call.arguments) {
                    Ok(object @ Value::Object(_)) => object,
                    Ok(other) => {
                        warn!(tool = %call.name, "Tool arguments are not an object, sending empty input: {}", other);
                        Value::Object(Default::default())
                    }
                    Err(e) => {
                        warn!(tool = %call.name, "Tool arguments are not JSON, sending empty input: {}", e);
                        Value::Object(Default::default())
                    }
                };
                blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input,
                });
            }
            ("assistant", blocks)
        }
        Role::User | Role::System => (
            "user",
            vec![ContentBlock::Text {
                text: msg.content.clone(),
            }],
        ),
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = Self::build_request(request);
        let url = format!("{}/messages", self.api_base);

        debug!(model = %request.model, "Sending Anthropic messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", net_constants::ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, &request.model))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(
                ErrorClassifier::classify_http_status(status, &text, &request.model).into(),
            );
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            ScoutError::Llm(LlmError::with_model(
                ErrorCategory::ParseError,
                format!("Failed to parse Anthropic response: {}", e),
                &request.model,
            ))
        })?;

        Ok(parsed.into_chat_response())
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Value>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: UsageInfo,
}

#[derive(Debug, Default, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesResponse {
    fn into_chat_response(self) -> ChatResponse {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        // Unknown block types (thinking, etc.) are skipped
        for block in self.content {
            match serde_json::from_value::<ContentBlock>(block) {
                Ok(ContentBlock::Text { text: t }) => text.push(t),
                Ok(ContentBlock::ToolUse { id, name, input }) => tool_calls.push(ToolCallRequest {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                Ok(ContentBlock::ToolResult { .. }) | Err(_) => {}
            }
        }

        ChatResponse {
            content: text.join("\n"),
            tool_calls,
            usage: TokenUsage::new(self.usage.input_tokens, self.usage.output_tokens),
            finish_reason: self.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ToolDefinition;
    use serde_json::json;

    #[test]
    fn test_request_lifts_system_and_folds_tool_results() {
        let request = ChatRequest {
            model: "claude-3-haiku-20240307".to_string(),
            messages: vec![
                ChatMessage::system("You are a triage specialist."),
                ChatMessage::user("Triage this."),
                ChatMessage::assistant(
                    "Looking.",
                    vec![
                        ToolCallRequest {
                            id: "tu_1".into(),
                            name: "a".into(),
                            arguments: "{\"x\": 1}".into(),
                        },
                        ToolCallRequest {
                            id: "tu_2".into(),
                            name: "b".into(),
                            arguments: "not json".into(),
                        },
                    ],
                ),
                ChatMessage::tool_result("tu_1", "one"),
                ChatMessage::tool_result("tu_2", "two"),
            ],
            temperature: 0.1,
            max_tokens: 512,
            tools: vec![ToolDefinition {
                name: "a".into(),
                description: "d".into(),
                parameters: json!({"type": "object"}),
            }],
        };

        let body = serde_json::to_value(AnthropicBackend::build_request(&request)).unwrap();

        assert_eq!(body["system"], "You are a triage specialist.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"]["x"], 1);
        assert_eq!(messages[1]["content"][2]["input"], json!({}));
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_non_object_tool_arguments_become_empty_input() {
        let calls = ["[1, 2]", "\"just text\"", "42", "null"]
            .iter()
            .enumerate()
            .map(|(i, args)| ToolCallRequest {
                id: format!("tu_{}", i),
                name: "submit_patch".into(),
                arguments: args.to_string(),
            })
            .collect();
        let (role, blocks) = to_blocks(&ChatMessage::assistant("", calls));

        assert_eq!(role, "assistant");
        assert_eq!(blocks.len(), 4);
        for block in blocks {
            let block = serde_json::to_value(block).unwrap();
            assert_eq!(block["type"], "tool_use");
            assert_eq!(block["input"], json!({}));
        }
    }

    #[test]
    fn test_parse_mixed_response() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "Reporting now."},
                {"type": "tool_use", "id": "tu_7", "name": "submit_triage", "input": {"priority": "high"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 200, "output_tokens": 40}
        });
        let parsed: MessagesResponse = serde_json::from_value(raw).unwrap();
        let response = parsed.into_chat_response();

        assert_eq!(response.content, "Reporting now.");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "tu_7");
        let args: Value = serde_json::from_str(&response.tool_calls[0].arguments).unwrap();
        assert_eq!(args["priority"], "high");
        assert_eq!(response.usage.total(), 240);
        assert_eq!(response.finish_reason, "tool_use");
    }
}
