//! OpenAI Chat Completions Backend
//!
//! Speaks the Chat Completions wire format with function tools. Also serves
//! Gemini models through Google's OpenAI-compatible endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    ChatMessage, ChatRequest, ChatResponse, ErrorClassifier, ModelBackend, Role, TokenUsage,
    ToolCallRequest, ToolDefinition,
};
use crate::types::{ErrorCategory, LlmError, Result, ScoutError};

/// Chat Completions backend with secure API key handling
pub struct OpenAiBackend {
    name: &'static str,
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    /// Routing prefix stripped before the model name goes on the wire
    model_prefix: Option<&'static str>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("name", &self.name)
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new(
        name: &'static str,
        api_key: SecretString,
        api_base: &str,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model_prefix: None,
            client,
        }
    }

    pub fn with_model_prefix(mut self, prefix: &'static str) -> Self {
        self.model_prefix = Some(prefix);
        self
    }

    fn wire_model<'a>(&self, model: &'a str) -> &'a str {
        self.model_prefix
            .and_then(|prefix| model.strip_prefix(prefix))
            .unwrap_or(model)
    }

    fn build_request(&self, request: &ChatRequest) -> CompletionRequest {
        let tools: Vec<WireTool> = request.tools.iter().map(WireTool::from).collect();
        let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());

        CompletionRequest {
            model: self.wire_model(&request.model).to_string(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens),
            tools,
            tool_choice,
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(backend = self.name, model = %request.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
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

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            ScoutError::Llm(LlmError::with_model(
                ErrorCategory::ParseError,
                format!("Failed to parse {} response: {}", self.name, e),
                &request.model,
            ))
        })?;

        parsed.into_chat_response(&request.model)
    }

    fn name(&self) -> &str {
        self.name
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        // Assistant turns that only carry tool calls send null content
        let content = if msg.role == Role::Assistant
            && msg.content.is_empty()
            && !msg.tool_calls.is_empty()
        {
            None
        } else {
            Some(msg.content.clone())
        };
        Self {
            role,
            content,
            tool_calls: msg.tool_calls.iter().map(WireToolCall::from).collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            call_type: function_type(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: WireFunction {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl CompletionResponse {
    fn into_chat_response(self, model: &str) -> Result<ChatResponse> {
        let usage = self
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let choice = self.choices.into_iter().next().ok_or_else(|| {
            ScoutError::Llm(LlmError::with_model(
                ErrorCategory::ParseError,
                "No choices in completion response",
                model,
            ))
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> OpenAiBackend {
        OpenAiBackend::new(
            "google",
            SecretString::from("k".to_string()),
            "https://example.test/v1/",
            reqwest::Client::new(),
        )
        .with_model_prefix("gemini/")
    }

    #[test]
    fn test_request_shape_with_tools() {
        let request = ChatRequest {
            model: "gemini/gemini-1.5-flash".to_string(),
            messages: vec![
                ChatMessage::system("sys"),
                ChatMessage::assistant(
                    "",
                    vec![ToolCallRequest {
                        id: "call_1".into(),
                        name: "read_source".into(),
                        arguments: "{}".into(),
                    }],
                ),
                ChatMessage::tool_result("call_1", "1: int main()"),
            ],
            temperature: 0.1,
            max_tokens: 256,
            tools: vec![ToolDefinition {
                name: "read_source".into(),
                description: "Read lines".into(),
                parameters: json!({"type": "object", "properties": {}, "required": []}),
            }],
        };
        let body = serde_json::to_value(backend().build_request(&request)).unwrap();

        assert_eq!(body["model"], "gemini-1.5-flash");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "read_source");
        assert!(body["messages"][1]["content"].is_null());
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["name"], "read_source");
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_request_without_tools_omits_choice() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.0,
            max_tokens: 16,
            tools: vec![],
        };
        let body = serde_json::to_value(backend().build_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "report_vulnerability", "arguments": "{\"line_number\": 4}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        });
        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        let response = parsed.into_chat_response("gpt-4o-mini").unwrap();

        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "report_vulnerability");
        assert_eq!(response.usage.total(), 150);
        assert_eq!(response.finish_reason, "tool_calls");
    }

    #[test]
    fn test_empty_choices_is_parse_error() {
        let parsed: CompletionResponse =
            serde_json::from_value(json!({"choices": [], "usage": null})).unwrap();
        let err = parsed.into_chat_response("gpt-4o").unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::ParseError));
    }
}
