//! Execution Records
//!
//! One [`ExecutionRecord`] per `run`: status, iteration count, the complete
//! tool-call audit trail and cost/token totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One dispatched tool call. Never mutated after it is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Handler output on success
    pub result: Option<String>,
    /// "Unknown tool: X" or "Tool error: ..." on failure
    pub error: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
}

impl ToolCallRecord {
    /// Text placed into the transcript for this call
    pub fn transcript_text(&self) -> &str {
        self.result
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallRecord>,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub error: Option<String>,
}

impl Default for ExecutionRecord {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            status: ExecutionStatus::Idle,
            iterations: 0,
            tool_calls: Vec::new(),
            total_cost: 0.0,
            total_tokens: 0,
            error: None,
        }
    }
}

impl ExecutionRecord {
    pub fn running() -> Self {
        Self {
            status: ExecutionStatus::Running,
            ..Self::default()
        }
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn failed_tool_calls(&self) -> usize {
        self.tool_calls.iter().filter(|c| !c.success).count()
    }

    pub fn summary(&self) -> ExecutionSummary {
        let duration_ms = self
            .completed_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64);
        ExecutionSummary {
            status: self.status,
            iterations: self.iterations,
            tool_calls: self.tool_calls.len(),
            failed_tool_calls: self.failed_tool_calls(),
            total_cost: self.total_cost,
            total_tokens: self.total_tokens,
            duration_ms,
            error: self.error.clone(),
        }
    }
}

/// Counts-only view of an [`ExecutionRecord`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub status: ExecutionStatus,
    pub iterations: u32,
    pub tool_calls: usize,
    pub failed_tool_calls: usize,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

/// Static description of an agent for listings
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: &'static str,
    pub description: &'static str,
    pub model: String,
    pub temperature: f32,
    pub max_iterations: u32,
    pub tools: Vec<&'static str>,
    pub status: ExecutionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(success: bool) -> ToolCallRecord {
        ToolCallRecord {
            id: "c".into(),
            name: "t".into(),
            arguments: Value::Null,
            result: success.then(|| "ok".to_string()),
            error: (!success).then(|| "Unknown tool: t".to_string()),
            success,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut record = ExecutionRecord::default();
        assert_eq!(record.status, ExecutionStatus::Idle);

        record = ExecutionRecord::running();
        assert!(!record.status.is_terminal());
        record.tool_calls.push(call(true));
        record.tool_calls.push(call(false));
        record.complete();

        let summary = record.summary();
        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(summary.tool_calls, 2);
        assert_eq!(summary.failed_tool_calls, 1);
        assert!(summary.duration_ms.is_some());
    }

    #[test]
    fn test_failure_records_error() {
        let mut record = ExecutionRecord::running();
        record.fail("backend down");
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("backend down"));
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_transcript_text_prefers_result() {
        assert_eq!(call(true).transcript_text(), "ok");
        assert_eq!(call(false).transcript_text(), "Unknown tool: t");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
