pub mod error;
pub mod severity;
pub mod utils;

pub use error::{ErrorCategory, ErrorClassifier, LlmError, Result, ResultExt, ScoutError};
pub use severity::{Priority, Severity, SeverityCounts};
pub use utils::{
    ParseWithDefault, clamp_confidence, clamp_cvss, clamp_or, decode_hex_or_raw, finding_id,
    truncate_chars, unix_timestamp, unix_timestamp_f64,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::reports::STATS_FILE;

/// Type-safe wrapper for analysis session IDs
///
/// Doubles as the persisted report's file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<kind>_<unix_ts>_<short uuid>`, e.g. `session_1729000000_3f2a9c1b`
    pub fn generate(kind: &str) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}_{}", kind, unix_timestamp(), &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Session IDs become file names; reject anything that could escape the
    /// report dir or land on the aggregate stats file.
    pub fn validate(&self) -> Result<()> {
        let ok = !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !self.0.starts_with('.');
        if !ok {
            return Err(ScoutError::Validation(format!(
                "Invalid session id '{}': use letters, digits, '_', '-' or '.'",
                self.0
            )));
        }
        if format!("{}.json", self.0).eq_ignore_ascii_case(STATS_FILE) {
            return Err(ScoutError::Validation(format!(
                "Invalid session id '{}': reserved for report stats",
                self.0
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
