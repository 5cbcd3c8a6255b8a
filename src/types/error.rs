//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Backend failures carry an [`ErrorCategory`] so the gateway can log and
//! route them; everything else funnels into [`ScoutError`].
//!
//! ## Recovery Map
//!
//! - **Backend failure**: fallback model list, fatal once exhausted
//! - **Tool failure**: recorded as an error result, never propagated
//! - **Per-item pipeline failure**: logged and skipped
//! - **Whole-pipeline failure**: report persisted with `failed` status

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Categories for backend errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited by the backend
    RateLimit,
    /// Context/token limit exceeded
    TokenLimit,
    /// Authentication failed or key missing
    Auth,
    /// Network/connectivity issues
    Network,
    /// Backend unavailable or model unknown
    Unavailable,
    /// Invalid request
    BadRequest,
    /// Backend response could not be parsed
    ParseError,
    /// Temporary server-side issue
    Transient,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Backend error with category and the model that produced it
#[derive(Debug, Clone)]
pub struct LlmError {
    pub category: ErrorCategory,
    pub message: String,
    /// Model (or backend) that produced the error
    pub model: Option<String>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(model) = &self.model {
            write!(f, "[{}:{}] {}", model, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            model: None,
        }
    }

    /// Create error with model context
    pub fn with_model(
        category: ErrorCategory,
        message: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            model: Some(model.into()),
        }
    }

    /// Add model context to existing error
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status returned by a model backend
    pub fn classify_http_status(status: u16, message: &str, model: &str) -> LlmError {
        let category = match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            400 | 422 => {
                let lower = message.to_lowercase();
                if lower.contains("context length") || lower.contains("maximum context") {
                    ErrorCategory::TokenLimit
                } else {
                    ErrorCategory::BadRequest
                }
            }
            404 => ErrorCategory::Unavailable,
            500 | 502 | 503 | 504 | 529 => ErrorCategory::Transient,
            _ => ErrorCategory::Unknown,
        };
        LlmError::with_model(category, message, model)
    }

    /// Classify a transport error from reqwest
    pub fn classify_transport(err: &reqwest::Error, model: &str) -> LlmError {
        let category = if err.is_timeout() || err.is_connect() {
            ErrorCategory::Network
        } else if err.is_decode() {
            ErrorCategory::ParseError
        } else {
            ErrorCategory::Unknown
        };
        LlmError::with_model(category, err.to_string(), model)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structured backend error with category
    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Config error: {0}")]
    Config(String),

    /// Raised by a tool callback; the agent loop turns it into a result string
    #[error("{0}")]
    Tool(String),

    #[error("Agent {agent} failed: {message}")]
    Agent { agent: String, message: String },

    #[error("Pipeline error in stage {stage}: {message}")]
    Pipeline { stage: String, message: String },

    #[error("Report error: {0}")]
    Report(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<LlmError> for ScoutError {
    fn from(err: LlmError) -> Self {
        ScoutError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool(message.into())
    }

    pub fn pipeline(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn llm_with_category(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::Llm(LlmError::new(category, message))
    }

    /// Backend category, when the error came from a model call
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Llm(e) => Some(e.category),
            Self::Timeout { .. } => Some(ErrorCategory::Network),
            _ => None,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| ScoutError::Validation(format!("{}: {}", context.into(), e)))
    }
}
