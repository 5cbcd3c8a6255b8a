//! Model Gateway
//!
//! The single entry point every agent uses to reach a model. It owns:
//!
//! - **Fallback**: the requested model first, then each configured fallback
//!   model exactly once, in order
//! - **Admission control**: a global semaphore bounding in-flight backend calls
//! - **Cost accounting**: per-call cost from the price table, accumulated into
//!   the process-wide metrics collector
//!
//! One gateway is installed per process; `gateway()` hands out the shared
//! instance.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::metrics;
use super::pricing::calculate_cost;
use super::provider::{
    ChatMessage, ChatRequest, ModelRouter, SharedBackend, TokenUsage, ToolCallRequest,
    ToolDefinition,
};
use super::timeout::with_timeout;
use crate::config::{ApiKeys, LlmConfig};
use crate::types::{Result, ScoutError};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub default_model: String,
    /// Tried in order after the requested model, each at most once
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
}

impl From<&LlmConfig> for GatewayConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            fallback_models: config.fallback_models.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

// =============================================================================
// Completion
// =============================================================================

/// A successful model call
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub finish_reason: String,
    pub latency: Duration,
    /// Model that actually answered (may be a fallback)
    pub model: String,
}

impl Completion {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GatewayStats {
    pub total_cost_usd: f64,
    pub total_requests: u64,
}

// =============================================================================
// Gateway
// =============================================================================

pub struct ModelGateway {
    backend: SharedBackend,
    config: GatewayConfig,
    limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("available_permits", &self.limiter.available_permits())
            .finish()
    }
}

impl ModelGateway {
    pub fn new(backend: SharedBackend, config: GatewayConfig) -> Self {
        let permits = config.max_concurrent_requests.max(1);
        Self {
            backend,
            config,
            limiter: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Gateway over the HTTP backends reachable with the given keys
    pub fn from_config(config: &LlmConfig, keys: &ApiKeys) -> Result<Self> {
        let router = ModelRouter::new(config, keys)?;
        Ok(Self::new(Arc::new(router), GatewayConfig::from(config)))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn attempt_order<'a>(&'a self, model: &'a str) -> Vec<&'a str> {
        let mut order: Vec<&str> = vec![model];
        for fallback in &self.config.fallback_models {
            if !order.contains(&fallback.as_str()) {
                order.push(fallback);
            }
        }
        order
    }

    /// Send a transcript to a model, falling back on failure.
    ///
    /// `model` and `temperature` default to the configured values. When every
    /// attempt fails, the primary model's error is returned.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        temperature: Option<f32>,
        tools: &[ToolDefinition],
    ) -> Result<Completion> {
        if messages.is_empty() {
            return Err(ScoutError::Validation(
                "completion requires at least one message".to_string(),
            ));
        }

        let primary = model.unwrap_or(&self.config.default_model);
        let temperature = temperature.unwrap_or(self.config.temperature);
        let mut primary_error: Option<ScoutError> = None;

        for candidate in self.attempt_order(primary) {
            let request = ChatRequest {
                model: candidate.to_string(),
                messages: messages.to_vec(),
                temperature,
                max_tokens: self.config.max_tokens,
                tools: tools.to_vec(),
            };

            match self.attempt(&request).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    metrics::global().record_failure();
                    warn!(model = candidate, error = %e, "Model call failed");
                    if primary_error.is_none() {
                        primary_error = Some(e);
                    }
                }
            }
        }

        Err(primary_error.unwrap_or_else(|| {
            ScoutError::LlmApi(format!("No model attempts were made for {}", primary))
        }))
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<Completion> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ScoutError::LlmApi("Gateway limiter closed".to_string()))?;

        let start = Instant::now();
        let response = with_timeout(
            self.config.request_timeout,
            self.backend.chat(request),
            &format!("{} completion", request.model),
        )
        .await?;
        let latency = start.elapsed();

        let cost_usd = calculate_cost(&request.model, &response.usage);
        metrics::global().record(&response.usage, cost_usd, latency);

        info!(
            model = %request.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            cost_usd,
            latency_ms = latency.as_millis() as u64,
            "Model call completed"
        );

        Ok(Completion {
            content: response.content,
            tool_calls: response.tool_calls,
            usage: response.usage,
            cost_usd,
            finish_reason: response.finish_reason,
            latency,
            model: request.model.clone(),
        })
    }

    /// Process-wide totals, shared by every gateway instance
    pub fn stats(&self) -> GatewayStats {
        stats()
    }
}

pub fn stats() -> GatewayStats {
    let collector = metrics::global();
    GatewayStats {
        total_cost_usd: collector.total_cost_usd(),
        total_requests: collector.total_requests(),
    }
}

// =============================================================================
// Shared Instance
// =============================================================================

static GATEWAY: RwLock<Option<Arc<ModelGateway>>> = RwLock::new(None);

/// Install the process-wide gateway, replacing any previous one
pub fn install_gateway(gateway: ModelGateway) -> Arc<ModelGateway> {
    let gateway = Arc::new(gateway);
    let mut slot = GATEWAY.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(Arc::clone(&gateway));
    gateway
}

/// The shared gateway, built from default config and environment keys on first use
pub fn gateway() -> Result<Arc<ModelGateway>> {
    {
        let slot = GATEWAY.read().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
    }

    let mut slot = GATEWAY.write().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = slot.as_ref() {
        return Ok(Arc::clone(existing));
    }
    let built = Arc::new(ModelGateway::from_config(
        &LlmConfig::default(),
        &ApiKeys::from_env(),
    )?);
    *slot = Some(Arc::clone(&built));
    Ok(built)
}

/// Drop the shared gateway so the next `gateway()` call rebuilds it
pub fn reset_gateway() {
    let mut slot = GATEWAY.write().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

// =============================================================================
// Tests
// =============================================================================
