//! In-memory model backend for tests.
//!
//! `ScriptedBackend` replays canned responses in order, repeats one response
//! forever, always fails, or answers through a closure that inspects the
//! request.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ai::{
    ChatRequest, ChatResponse, ErrorCategory, GatewayConfig, LlmError, ModelBackend,
    ModelGateway, TokenUsage, ToolCallRequest,
};
use crate::types::Result;

type Responder = Box<dyn Fn(&ChatRequest) -> Result<ChatResponse> + Send + Sync>;

enum Mode {
    Script(Mutex<VecDeque<ChatResponse>>),
    Repeat(ChatResponse),
    Fail,
    Handler(Responder),
}

pub struct ScriptedBackend {
    mode: Mode,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    fn build(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Replay `responses` in order; once exhausted, answer "Done."
    pub fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Self::build(Mode::Script(Mutex::new(responses.into())))
    }

    pub fn repeating(response: ChatResponse) -> Arc<Self> {
        Self::build(Mode::Repeat(response))
    }

    /// Every call fails with a transient backend error
    pub fn failing() -> Arc<Self> {
        Self::build(Mode::Fail)
    }

    pub fn handler(
        f: impl Fn(&ChatRequest) -> Result<ChatResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(Mode::Handler(Box::new(f)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn raw_tool_call(name: &str, raw_arguments: &str) -> ChatResponse {
        ChatResponse {
            tool_calls: vec![ToolCallRequest {
                id: format!("call_{}", name),
                name: name.to_string(),
                arguments: raw_arguments.to_string(),
            }],
            usage: TokenUsage::new(100, 20),
            finish_reason: "tool_calls".to_string(),
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<(&str, Value)>) -> ChatResponse {
        ChatResponse {
            tool_calls: calls
                .into_iter()
                .enumerate()
                .map(|(i, (name, args))| ToolCallRequest {
                    id: format!("call_{}_{}", i, name),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
            usage: TokenUsage::new(100, 20),
            finish_reason: "tool_calls".to_string(),
            ..Default::default()
        }
    }
}

/// Plain-text response
pub fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        usage: TokenUsage::new(100, 20),
        finish_reason: "stop".to_string(),
        ..Default::default()
    }
}

/// Single tool-call response
pub fn tool_call(name: &str, args: Value) -> ChatResponse {
    ScriptedBackend::tool_calls(vec![(name, args)])
}

/// True when the request carries a tool-result turn, i.e. the model has
/// already called something in this conversation
pub fn has_tool_results(request: &ChatRequest) -> bool {
    request
        .messages
        .iter()
        .any(|m| m.role == crate::ai::Role::Tool)
}

/// Gateway over `backend` with no fallbacks
pub fn gateway_with(backend: Arc<ScriptedBackend>) -> Arc<ModelGateway> {
    Arc::new(ModelGateway::new(
        backend,
        GatewayConfig {
            default_model: "gpt-4o-mini".to_string(),
            fallback_models: Vec::new(),
            temperature: 0.1,
            max_tokens: 1024,
            max_concurrent_requests: 4,
            request_timeout: Duration::from_secs(5),
        },
    ))
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match &self.mode {
            Mode::Script(queue) => Ok(queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| text("Done."))),
            Mode::Repeat(response) => Ok(response.clone()),
            Mode::Fail => Err(LlmError::with_model(
                ErrorCategory::Transient,
                "scripted failure",
                &request.model,
            )
            .into()),
            Mode::Handler(f) => f(request),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Code-origin vulnerability with plausible SQL-injection fields
pub fn sample_vuln(id: &str, severity: crate::types::Severity) -> crate::agents::Vulnerability {
    crate::agents::Vulnerability {
        vuln_id: id.to_string(),
        vuln_type: "SQL Injection".to_string(),
        severity,
        description: "String-built query".to_string(),
        file_path: "app/db.py".to_string(),
        line_number: 12,
        code_snippet: "cur.execute(\"SELECT * FROM u WHERE id=\" + uid)".to_string(),
        cwe_id: Some("CWE-89".to_string()),
        confidence: 0.9,
        remediation: None,
        created_at: 0.0,
        origin: crate::agents::FindingOrigin::Code,
    }
}
