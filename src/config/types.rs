//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/vulnscout/) and project (.vulnscout/) level configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{agent, gateway, network, pipeline, reports};
use crate::types::{Result, ScoutError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Model gateway settings
    pub llm: LlmConfig,

    /// Agent loop settings
    pub agents: AgentsConfig,

    /// Pipeline scanning and stage limits
    pub pipeline: PipelineConfig,

    /// Report storage
    pub reports: ReportsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            agents: AgentsConfig::default(),
            pipeline: PipelineConfig::default(),
            reports: ReportsConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ScoutError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ScoutError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(ScoutError::Config(
                "LLM request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_concurrent_requests == 0 {
            return Err(ScoutError::Config(
                "LLM max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        if self.llm.default_model.trim().is_empty() {
            return Err(ScoutError::Config(
                "LLM default_model must not be empty".to_string(),
            ));
        }

        for (name, base) in [
            ("openai_api_base", &self.llm.openai_api_base),
            ("anthropic_api_base", &self.llm.anthropic_api_base),
            ("google_api_base", &self.llm.google_api_base),
        ] {
            validate_api_base(name, base)?;
        }

        if self.agents.max_iterations == 0 {
            return Err(ScoutError::Config(
                "Agent max_iterations must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Backend base URLs must be absolute http(s) URLs
fn validate_api_base(name: &str, base: &str) -> Result<()> {
    let url = url::Url::parse(base)
        .map_err(|e| ScoutError::Config(format!("Invalid llm.{} '{}': {}", name, base, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScoutError::Config(format!(
            "llm.{} must use http or https, got '{}'",
            name,
            url.scheme()
        )));
    }
    Ok(())
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model used when an agent does not name one
    pub default_model: String,

    /// Tried in order after the requested model fails
    pub fallback_models: Vec<String>,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Process-wide cap on in-flight backend calls
    pub max_concurrent_requests: usize,

    /// Per-attempt timeout in seconds
    pub request_timeout_secs: u64,

    pub openai_api_base: String,
    pub anthropic_api_base: String,
    pub google_api_base: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: gateway::DEFAULT_MODEL.to_string(),
            fallback_models: gateway::DEFAULT_FALLBACK_MODELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            temperature: gateway::DEFAULT_TEMPERATURE,
            max_tokens: gateway::DEFAULT_MAX_TOKENS,
            max_concurrent_requests: gateway::DEFAULT_MAX_CONCURRENT,
            request_timeout_secs: gateway::DEFAULT_REQUEST_TIMEOUT_SECS,
            openai_api_base: network::OPENAI_API_BASE.to_string(),
            anthropic_api_base: network::ANTHROPIC_API_BASE.to_string(),
            google_api_base: network::GOOGLE_API_BASE.to_string(),
        }
    }
}

// =============================================================================
// API Keys
// =============================================================================

/// Backend credentials, read from the environment only.
///
/// Never serialized; `Debug` shows presence, not values.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub anthropic: Option<SecretString>,
    pub google: Option<SecretString>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |k: &Option<SecretString>| if k.is_some() { "[REDACTED]" } else { "unset" };
        f.debug_struct("ApiKeys")
            .field("openai", &mark(&self.openai))
            .field("anthropic", &mark(&self.anthropic))
            .field("google", &mark(&self.google))
            .finish()
    }
}

impl ApiKeys {
    pub const OPENAI_VAR: &'static str = "OPENAI_API_KEY";
    pub const ANTHROPIC_VAR: &'static str = "ANTHROPIC_API_KEY";
    pub const GOOGLE_VAR: &'static str = "GOOGLE_API_KEY";

    pub fn from_env() -> Self {
        let read = |var: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        Self {
            openai: read(Self::OPENAI_VAR),
            anthropic: read(Self::ANTHROPIC_VAR),
            google: read(Self::GOOGLE_VAR),
        }
    }

    pub fn has_any_key(&self) -> bool {
        self.openai.is_some() || self.anthropic.is_some() || self.google.is_some()
    }

    /// Models reachable with the configured keys
    pub fn available_models(&self) -> Vec<&'static str> {
        let mut models = Vec::new();
        if self.openai.is_some() {
            models.extend(["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"]);
        }
        if self.anthropic.is_some() {
            models.extend(["claude-3-5-sonnet-20241022", "claude-3-haiku-20240307"]);
        }
        if self.google.is_some() {
            models.extend(["gemini/gemini-1.5-pro", "gemini/gemini-1.5-flash"]);
        }
        models
    }

    /// (variable name, configured) pairs for status output
    pub fn status(&self) -> [(&'static str, bool); 3] {
        [
            (Self::OPENAI_VAR, self.openai.is_some()),
            (Self::ANTHROPIC_VAR, self.anthropic.is_some()),
            (Self::GOOGLE_VAR, self.google.is_some()),
        ]
    }
}

// =============================================================================
// Agents Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Model round-trips allowed per run
    pub max_iterations: u32,

    /// Overrides `llm.default_model` for every agent when set
    pub model: Option<String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_iterations: agent::DEFAULT_MAX_ITERATIONS,
            model: None,
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// File extensions treated as source, without the leading dot
    pub source_extensions: Vec<String>,

    /// Directory names never descended into
    pub skipped_dirs: Vec<String>,

    /// High-priority findings handed to fuzz-input generation
    pub fuzz_limit: usize,

    /// Files whose trimmed content is shorter than this are skipped
    pub min_code_chars: usize,

    pub max_corpus_samples: usize,

    pub max_commit_files: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_extensions: pipeline::SOURCE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skipped_dirs: pipeline::SKIPPED_DIRS.iter().map(|s| s.to_string()).collect(),
            fuzz_limit: pipeline::FUZZ_LIMIT,
            min_code_chars: pipeline::MIN_CODE_CHARS,
            max_corpus_samples: pipeline::MAX_CORPUS_SAMPLES,
            max_commit_files: pipeline::MAX_COMMIT_FILES,
        }
    }
}

// =============================================================================
// Reports Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(reports::DEFAULT_DIR),
        }
    }
}
