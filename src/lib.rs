//! VulnScout - LLM-Driven Security Review
//!
//! Orchestrates a suite of tool-using LLM agents over source code, commits
//! and fuzzer corpora, and persists one report per analysis session.
//!
//! ## Core Features
//!
//! - **Model Gateway**: one entry point for every model call, with ordered
//!   fallback, a global concurrency limit, timeouts and cost accounting
//! - **Agent Loop**: a bounded call-model/run-tools loop shared by nine
//!   specialized agents
//! - **Pipeline**: detection, triage, and a high-priority deep dive producing
//!   patches, exploit POVs, debug plans and fuzz inputs
//! - **Progress**: best-effort event fan-out to passive observers
//!
//! ## Quick Start
//!
//! ```ignore
//! use vulnscout::{AnalysisTarget, Config, Orchestrator};
//!
//! let config = vulnscout::ConfigLoader::load()?;
//! let orchestrator = Orchestrator::from_config(&config)?;
//! let report = orchestrator
//!     .run_analysis(AnalysisTarget::infer("src/app.py", false), None)
//!     .await?;
//! println!("{} findings", report.vulnerabilities.len());
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: model backends, gateway, pricing, metrics
//! - [`agents`]: agent runtime, tools and the nine agents
//! - [`pipeline`]: orchestrator, report store, git helpers
//! - [`notifier`]: progress events and observers
//! - [`config`]: layered configuration

pub mod agents;
pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod notifier;
pub mod pipeline;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{ApiKeys, Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, Result, ResultExt, ScoutError};
pub use types::{Severity, SeverityCounts, SessionId};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    AnalysisKind, AnalysisTarget, Orchestrator, ReportStats, ReportStatus, ReportStore,
    ReportSummary, SessionReport,
};

pub use notifier::{EventKind, ProgressEvent, ProgressNotifier, ProgressObserver, notifier};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    ChatRequest, ChatResponse, GatewayStats, ModelBackend, ModelGateway, ModelRouter, gateway,
    with_timeout,
};

// =============================================================================
// Agent Re-exports
// =============================================================================

pub use agents::{AgentOptions, AgentSuite, SecurityAgent, Vulnerability};
