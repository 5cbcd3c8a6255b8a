//! Session Reports
//!
//! One [`SessionReport`] per pipeline run. It is created when the run starts,
//! filled in stage by stage, and persisted once with a terminal status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agents::{
    CoverageReport, DebugSession, DiffVulnerability, ExploitPov, FlipInput, InputFormat,
    SecurityPatch, TriageResult, Vulnerability,
};
use crate::types::{SessionId, SeverityCounts, unix_timestamp_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Running,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    File,
    Project,
    Code,
    Diff,
    Corpus,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Project => "project",
            Self::Code => "code",
            Self::Diff => "diff",
            Self::Corpus => "corpus",
        }
    }

    /// Prefix of generated session ids
    pub fn session_prefix(&self) -> &'static str {
        match self {
            Self::File | Self::Project | Self::Code => "session",
            Self::Diff => "diff",
            Self::Corpus => "corpus",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Summaries
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_vulnerabilities: usize,
    pub by_severity: SeverityCounts,
    pub high_priority_count: usize,
    pub patches_generated: usize,
    pub povs_generated: usize,
    pub debug_sessions: usize,
    pub fuzzing_inputs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    #[serde(flatten)]
    pub by_severity: SeverityCounts,
    pub total_vulnerabilities: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub inputs_analyzed: usize,
    pub formats_decoded: usize,
    pub fields_found: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportSummary {
    Analysis(AnalysisSummary),
    Corpus(CorpusSummary),
    Diff(DiffSummary),
}

impl ReportSummary {
    pub fn total_vulnerabilities(&self) -> usize {
        match self {
            Self::Analysis(s) => s.total_vulnerabilities,
            Self::Diff(s) => s.total_vulnerabilities,
            Self::Corpus(_) => 0,
        }
    }
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub analysis_type: AnalysisKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub started_at: f64,
    pub status: ReportStatus,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff_findings: Vec<DiffVulnerability>,
    #[serde(default)]
    pub triage_results: Vec<TriageResult>,
    #[serde(default)]
    pub patches: Vec<SecurityPatch>,
    #[serde(default)]
    pub povs: Vec<ExploitPov>,
    #[serde(default)]
    pub debug_sessions: Vec<DebugSession>,
    #[serde(default)]
    pub flip_inputs: Vec<FlipInput>,
    #[serde(default)]
    pub coverage_analysis: Option<CoverageReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_formats: Vec<InputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_analyzed: Option<usize>,
    #[serde(default)]
    pub summary: Option<ReportSummary>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub completed_at: Option<f64>,
}

impl SessionReport {
    pub fn new(session_id: SessionId, analysis_type: AnalysisKind) -> Self {
        Self {
            session_id,
            analysis_type,
            target: None,
            project_path: None,
            commit_id: None,
            commit_message: None,
            started_at: unix_timestamp_f64(),
            status: ReportStatus::Running,
            vulnerabilities: Vec::new(),
            diff_findings: Vec::new(),
            triage_results: Vec::new(),
            patches: Vec::new(),
            povs: Vec::new(),
            debug_sessions: Vec::new(),
            flip_inputs: Vec::new(),
            coverage_analysis: None,
            input_formats: Vec::new(),
            files_analyzed: None,
            summary: None,
            cost: 0.0,
            errors: Vec::new(),
            completed_at: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn complete(&mut self, summary: ReportSummary) {
        self.summary = Some(summary);
        self.status = ReportStatus::Completed;
        self.completed_at = Some(unix_timestamp_f64());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.status = ReportStatus::Failed;
        self.completed_at = Some(unix_timestamp_f64());
    }

    pub fn is_completed(&self) -> bool {
        self.status == ReportStatus::Completed
    }

    /// Commit reports keep their findings in `diff_findings`; analysis runs
    /// fold diff findings into `vulnerabilities`.
    pub fn severity_counts(&self) -> SeverityCounts {
        self.vulnerabilities
            .iter()
            .map(|v| v.severity)
            .chain(self.diff_findings.iter().map(|d| d.severity))
            .collect()
    }

    /// Vulnerabilities whose triage verdict is critical or high
    pub fn high_priority_vulnerabilities(&self) -> Vec<Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(|v| {
                self.triage_results
                    .iter()
                    .any(|t| t.vulnerability_id == v.vuln_id && t.is_high_priority())
            })
            .cloned()
            .collect()
    }

    pub fn analysis_summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            total_vulnerabilities: self.vulnerabilities.len(),
            by_severity: self.severity_counts(),
            high_priority_count: self
                .triage_results
                .iter()
                .filter(|t| t.is_high_priority())
                .count(),
            patches_generated: self.patches.len(),
            povs_generated: self.povs.len(),
            debug_sessions: self.debug_sessions.len(),
            fuzzing_inputs: self.flip_inputs.len(),
        }
    }
}
