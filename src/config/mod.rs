//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/vulnscout/config.toml)
//! 3. Project config (.vulnscout/config.toml)
//! 4. Environment variables (VULNSCOUT_*)
//! 5. CLI arguments (highest priority)
//!
//! API keys are never part of [`Config`]; see [`ApiKeys`].

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
