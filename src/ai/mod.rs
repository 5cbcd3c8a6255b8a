//! AI Integration Layer
//!
//! Model backends, the fallback gateway, pricing and process-wide usage metrics.

pub mod gateway;
pub mod metrics;
pub mod pricing;
pub mod provider;
pub mod timeout;

pub use gateway::{
    Completion, GatewayConfig, GatewayStats, ModelGateway, gateway, install_gateway,
    reset_gateway,
};
pub use metrics::{MetricsCollector, MetricsSummary};
pub use pricing::{ModelPrice, calculate_cost, price_for};
pub use provider::{
    BackendKind, ChatMessage, ChatRequest, ChatResponse, ErrorCategory, ErrorClassifier,
    LlmError, ModelBackend, ModelRouter, Role, SharedBackend, TokenUsage, ToolCallRequest,
    ToolDefinition,
};
pub use timeout::with_timeout;
