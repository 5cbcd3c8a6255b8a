//! Coverage Analyzer
//!
//! Reads line-coverage figures next to the source and reports the gaps
//! worth testing first, plus the functions that deserve priority tests.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use crate::ai::ModelGateway;
use crate::constants::agent::{
    COVERAGE_CONTEXT_CHARS, COVERAGE_PROMPT_CHARS, EXISTING_TESTS_CHARS, MAX_UNCOVERED_LINES,
};
use crate::types::{
    ParseWithDefault, Result, Severity, finding_id, truncate_chars, unix_timestamp_f64,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageData {
    pub file_path: String,
    pub total_lines: usize,
    pub covered_lines: usize,
    pub coverage_pct: f64,
    #[serde(default)]
    pub uncovered_lines: Vec<usize>,
}

impl CoverageData {
    /// No execution data yet: every line counts as uncovered
    pub fn unmeasured(file_path: impl Into<String>, total_lines: usize) -> Self {
        Self {
            file_path: file_path.into(),
            total_lines,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub gap_id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub function_name: Option<String>,
    pub gap_type: String,
    pub severity: Severity,
    pub reason: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub report_id: String,
    pub file_path: String,
    pub total_lines: usize,
    pub covered_lines: usize,
    pub coverage_pct: f64,
    pub gaps: Vec<CoverageGap>,
    pub priority_functions: Vec<String>,
    pub created_at: f64,
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct CoverageWorkspace {
    coverage: CoverageData,
    source_code: String,
    gaps: Vec<CoverageGap>,
    priority_functions: Vec<String>,
    reports: Vec<CoverageReport>,
    ids: IdSequence,
}

impl Default for CoverageWorkspace {
    fn default() -> Self {
        Self {
            coverage: CoverageData::default(),
            source_code: String::new(),
            gaps: Vec::new(),
            priority_functions: Vec::new(),
            reports: Vec::new(),
            ids: IdSequence::new("cov_report"),
        }
    }
}

impl CoverageWorkspace {
    fn stage(&mut self, coverage: CoverageData, source_code: &str) {
        self.coverage = coverage;
        self.source_code = source_code.to_string();
        self.gaps.clear();
        self.priority_functions.clear();
    }
}

fn get_coverage_context(ws: &mut CoverageWorkspace, _args: &ToolArgs) -> Result<ToolOutput> {
    Ok(ToolOutput::Json(json!({
        "coverage": serde_json::to_value(&ws.coverage)?,
        "source_code": truncate_chars(&ws.source_code, COVERAGE_CONTEXT_CHARS),
    })))
}

fn report_gap(ws: &mut CoverageWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let gap = CoverageGap {
        gap_id: finding_id("gap", ws.gaps.len() + 1),
        file_path: ws.coverage.file_path.clone(),
        start_line: args.usize_or("start_line", 0),
        end_line: args.usize_or("end_line", 0),
        function_name: args.opt_non_empty("function_name"),
        gap_type: args.str_or("gap_type", "unknown"),
        severity: Severity::parse_or_default(&args.str_or("severity", "medium")),
        reason: args.str_or("reason", ""),
        suggestion: args.str_or("suggestion", ""),
    };

    let message = format!(
        "Gap reported: {} at lines {}-{} ({})",
        gap.gap_type, gap.start_line, gap.end_line, gap.severity
    );
    ws.gaps.push(gap);
    Ok(message.into())
}

fn prioritize_function(ws: &mut CoverageWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let name = args.require_str("function_name")?;
    let reason = args.str_or("reason", "");
    if !ws.priority_functions.contains(&name) {
        ws.priority_functions.push(name.clone());
    }
    Ok(format!("Prioritized: {} - {}", name, reason).into())
}

fn submit_report(ws: &mut CoverageWorkspace, _args: &ToolArgs) -> Result<ToolOutput> {
    let report = CoverageReport {
        report_id: ws.ids.next_id(),
        file_path: ws.coverage.file_path.clone(),
        total_lines: ws.coverage.total_lines,
        covered_lines: ws.coverage.covered_lines,
        coverage_pct: ws.coverage.coverage_pct,
        gaps: ws.gaps.clone(),
        priority_functions: ws.priority_functions.clone(),
        created_at: unix_timestamp_f64(),
    };
    ws.reports.push(report);

    Ok(format!(
        "Report submitted: {} gaps, {} priority functions",
        ws.gaps.len(),
        ws.priority_functions.len()
    )
    .into())
}

fn registry() -> ToolRegistry<CoverageWorkspace> {
    ToolRegistry::new()
        .with_fn(
            ToolSpec::new("get_coverage_context", "Get coverage data and source code", vec![]),
            get_coverage_context,
        )
        .with_fn(
            ToolSpec::new(
                "report_gap",
                "Report a coverage gap",
                vec![
                    ParamSpec::integer("start_line", "Start line of uncovered code"),
                    ParamSpec::integer("end_line", "End line of uncovered code"),
                    ParamSpec::string("function_name", "Function containing the gap"),
                    ParamSpec::string("gap_type", "Type: error_handling, edge_case, security, logic, etc."),
                    ParamSpec::string("severity", "Severity: critical, high, medium, low"),
                    ParamSpec::string("reason", "Why this gap matters"),
                    ParamSpec::string("suggestion", "How to add coverage"),
                ],
            ),
            report_gap,
        )
        .with_fn(
            ToolSpec::new(
                "prioritize_function",
                "Mark a function as high priority for testing",
                vec![
                    ParamSpec::string("function_name", "Function name"),
                    ParamSpec::string("reason", "Why this function needs priority testing"),
                ],
            ),
            prioritize_function,
        )
        .with_fn(
            ToolSpec::new(
                "submit_report",
                "Submit the coverage analysis report",
                vec![ParamSpec::string("summary", "Summary of findings")],
            ),
            submit_report,
        )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are a code coverage expert analyzing test coverage gaps.
</ROLE>

<OBJECTIVES>
1. Analyze coverage data and source code
2. Identify critical coverage gaps
3. Prioritize which code paths need testing
4. Suggest how to improve coverage
</OBJECTIVES>

<FOCUS>
- Security-critical code (auth, crypto, input validation)
- Error handling paths
- Edge cases and boundary conditions
- Complex conditional logic
- Functions with low coverage
</FOCUS>

Provide actionable insights for improving test coverage."#;

pub struct CoverageAnalyzer {
    runtime: AgentRuntime<CoverageWorkspace>,
}

impl CoverageAnalyzer {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "coverage_analyzer",
        description: "Finds and prioritizes test coverage gaps",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.1,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                CoverageWorkspace::default(),
                options,
            ),
        }
    }

    pub async fn analyze_coverage(
        &mut self,
        coverage: CoverageData,
        source_code: &str,
    ) -> Result<Option<CoverageReport>> {
        let uncovered = if coverage.uncovered_lines.is_empty() {
            String::new()
        } else {
            let shown = &coverage.uncovered_lines
                [..coverage.uncovered_lines.len().min(MAX_UNCOVERED_LINES)];
            format!("Uncovered lines: {:?}", shown)
        };
        let prompt = format!(
            r#"Analyze this code coverage data:

File: {}
Total lines: {}
Covered lines: {}
Coverage: {:.1}%
{}

Source code:
```
{}
```

Instructions:
1. Use get_coverage_context to review the data
2. Use report_gap for each significant coverage gap
3. Use prioritize_function for critical functions
4. Use submit_report when done analyzing"#,
            coverage.file_path,
            coverage.total_lines,
            coverage.covered_lines,
            coverage.coverage_pct,
            uncovered,
            truncate_chars(source_code, COVERAGE_PROMPT_CHARS)
        );

        self.runtime.workspace_mut().stage(coverage, source_code);
        let before = self.runtime.workspace().reports.len();
        self.runtime.run(&prompt, None).await?;

        let reports = &self.runtime.workspace().reports;
        if reports.len() > before {
            Ok(reports.last().cloned())
        } else {
            Ok(None)
        }
    }

    /// Names of the functions the model marked for priority testing
    pub async fn suggest_tests(
        &mut self,
        source_code: &str,
        existing_tests: &str,
    ) -> Result<Vec<String>> {
        self.runtime
            .workspace_mut()
            .stage(CoverageData::unmeasured("unknown", 0), source_code);

        let (tests_label, tests_body) = if existing_tests.is_empty() {
            ("", "No existing tests provided")
        } else {
            ("Existing tests:", truncate_chars(existing_tests, EXISTING_TESTS_CHARS))
        };
        let prompt = format!(
            r#"Suggest tests to improve coverage for this code:

Source:
```
{}
```

{}
```
{}
```

Use prioritize_function for functions that need tests.
Then submit_report with your suggestions."#,
            truncate_chars(source_code, COVERAGE_PROMPT_CHARS),
            tests_label,
            tests_body
        );
        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().priority_functions.clone())
    }

    pub fn reports(&self) -> &[CoverageReport] {
        &self.runtime.workspace().reports
    }
}

impl SecurityAgent for CoverageAnalyzer {
    type Workspace = CoverageWorkspace;

    fn runtime(&self) -> &AgentRuntime<CoverageWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        let ws = self.runtime.workspace();
        json!({
            "reports": ws.reports,
            "total_gaps": ws.reports.iter().map(|r| r.gaps.len()).sum::<usize>(),
            "priority_functions": ws.priority_functions,
        })
    }
}
