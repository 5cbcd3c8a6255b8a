//! Model Backend Abstraction
//!
//! Defines the `ModelBackend` trait: one chat call that takes a transcript
//! plus tool definitions and returns text and/or requested tool calls with
//! token usage. Pricing, fallback and admission control live in the gateway.
//!
//! ## Modules
//!
//! - `openai`: Chat Completions wire format (OpenAI and Google's compatible endpoint)
//! - `anthropic`: Messages API wire format

mod anthropic;
mod openai;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ApiKeys, LlmConfig};
use crate::constants::network as net_constants;
use crate::types::{Result, ScoutError};

// =============================================================================
// Transcript
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a tool call, correlated by `tool_call_id`
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw argument payload exactly as the backend produced it
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Tool schema as handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the arguments
    pub parameters: Value,
}

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Empty means no tools; non-empty means tools are offered with automatic choice
    pub tools: Vec<ToolDefinition>,
}

/// Token usage for a single backend call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
    /// Backend-reported stop reason
    pub finish_reason: String,
}

// =============================================================================
// Backend Trait
// =============================================================================

/// The remote model: one transcript in, one response out.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

pub type SharedBackend = Arc<dyn ModelBackend>;

// =============================================================================
// Router
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OpenAi,
    Anthropic,
    Google,
}

impl BackendKind {
    /// `claude-*` → Anthropic, `gemini/*` → Google, everything else → OpenAI
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("claude") {
            BackendKind::Anthropic
        } else if model.starts_with("gemini/") || model.starts_with("gemini-") {
            BackendKind::Google
        } else {
            BackendKind::OpenAi
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "OPENAI_API_KEY",
            BackendKind::Anthropic => "ANTHROPIC_API_KEY",
            BackendKind::Google => "GOOGLE_API_KEY",
        }
    }
}

/// Routes each request to the backend that serves its model.
///
/// A backend whose API key is missing is absent; requests for its models fail
/// with an `AUTH` error so the gateway can move on to the next fallback.
pub struct ModelRouter {
    openai: Option<OpenAiBackend>,
    anthropic: Option<AnthropicBackend>,
    google: Option<OpenAiBackend>,
}

impl ModelRouter {
    pub fn new(config: &LlmConfig, keys: &ApiKeys) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ScoutError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        let openai = keys.openai.clone().map(|key| {
            OpenAiBackend::new("openai", key, &config.openai_api_base, client.clone())
        });
        let google = keys.google.clone().map(|key| {
            OpenAiBackend::new("google", key, &config.google_api_base, client.clone())
                .with_model_prefix("gemini/")
        });
        let anthropic = keys
            .anthropic
            .clone()
            .map(|key| AnthropicBackend::new(key, &config.anthropic_api_base, client.clone()));

        Ok(Self {
            openai,
            anthropic,
            google,
        })
    }

    fn missing_key(kind: BackendKind, model: &str) -> ScoutError {
        ScoutError::Llm(LlmError::with_model(
            ErrorCategory::Auth,
            format!("{} not set", kind.key_var()),
            model,
        ))
    }
}

#[async_trait]
impl ModelBackend for ModelRouter {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let kind = BackendKind::for_model(&request.model);
        match kind {
            BackendKind::OpenAi => match &self.openai {
                Some(backend) => backend.chat(request).await,
                None => Err(Self::missing_key(kind, &request.model)),
            },
            BackendKind::Google => match &self.google {
                Some(backend) => backend.chat(request).await,
                None => Err(Self::missing_key(kind, &request.model)),
            },
            BackendKind::Anthropic => match &self.anthropic {
                Some(backend) => backend.chat(request).await,
                None => Err(Self::missing_key(kind, &request.model)),
            },
        }
    }

    fn name(&self) -> &str {
        "router"
    }
}
