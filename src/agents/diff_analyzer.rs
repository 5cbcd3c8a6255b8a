//! Diff Analyzer
//!
//! Reviews a change rather than a whole file: only vulnerabilities the diff
//! introduces or worsens are reported. Two entry points share one tool set:
//!
//! - [`DiffAnalyzer::analyze_diff`]: a single-file diff
//! - [`DiffAnalyzer::analyze_commit_with_context`]: a whole commit, with the
//!   post-change contents of the touched files and their changed line numbers
//!   available through `get_file_content`

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use super::vuln_analyzer::{FindingOrigin, Vulnerability};
use crate::ai::ModelGateway;
use crate::constants::agent::COMMIT_FILE_PREVIEW_CHARS;
use crate::types::{
    ParseWithDefault, Result, Severity, SeverityCounts, truncate_chars, unix_timestamp_f64,
};

const COMMIT_PATH: &str = "commit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    #[default]
    Modified,
    Removed,
}

impl ParseWithDefault for ChangeType {
    fn type_name() -> &'static str {
        "ChangeType"
    }

    fn default_value() -> Self {
        ChangeType::Modified
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(Self::Added),
            "modified" => Some(Self::Modified),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffVulnerability {
    pub vuln_id: String,
    pub file_path: String,
    pub line_number: usize,
    pub change_type: ChangeType,
    pub vuln_type: String,
    pub severity: Severity,
    pub description: String,
    pub old_code: Option<String>,
    pub new_code: Option<String>,
    pub recommendation: String,
    pub created_at: f64,
}

impl From<DiffVulnerability> for Vulnerability {
    fn from(d: DiffVulnerability) -> Self {
        Vulnerability {
            confidence: Vulnerability::confidence_for(d.severity),
            code_snippet: d.new_code.or(d.old_code).unwrap_or_default(),
            remediation: Some(d.recommendation).filter(|r| !r.trim().is_empty()),
            vuln_id: d.vuln_id,
            vuln_type: d.vuln_type,
            severity: d.severity,
            description: d.description,
            file_path: d.file_path,
            line_number: d.line_number,
            cwe_id: None,
            created_at: d.created_at,
            origin: FindingOrigin::Diff,
        }
    }
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct DiffWorkspace {
    diff: String,
    file_path: String,
    file_contents: BTreeMap<String, String>,
    changed_lines: BTreeMap<String, Vec<usize>>,
    findings: Vec<DiffVulnerability>,
    safe_reason: Option<String>,
    ids: IdSequence,
}

impl Default for DiffWorkspace {
    fn default() -> Self {
        Self {
            diff: String::new(),
            file_path: String::new(),
            file_contents: BTreeMap::new(),
            changed_lines: BTreeMap::new(),
            findings: Vec::new(),
            safe_reason: None,
            ids: IdSequence::new("diff_vuln"),
        }
    }
}

impl DiffWorkspace {
    fn reset(&mut self, diff: &str, file_path: &str) {
        self.diff = diff.to_string();
        self.file_path = file_path.to_string();
        self.file_contents.clear();
        self.changed_lines.clear();
        self.findings.clear();
        self.safe_reason = None;
    }
}

fn get_diff_content(ws: &mut DiffWorkspace, _args: &ToolArgs) -> Result<ToolOutput> {
    Ok(ws.diff.clone().into())
}

fn get_file_content(ws: &mut DiffWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let path = args.require_str("file_path")?;
    match ws.file_contents.get(&path) {
        Some(content) => Ok(content.clone().into()),
        None => {
            let available: Vec<&str> = ws.file_contents.keys().map(String::as_str).collect();
            Ok(format!("File not found: {}. Available: {}", path, available.join(", ")).into())
        }
    }
}

fn report_vulnerability(ws: &mut DiffWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let vuln = DiffVulnerability {
        vuln_id: ws.ids.next_id(),
        file_path: args
            .opt_non_empty("file_path")
            .unwrap_or_else(|| ws.file_path.clone()),
        line_number: args.usize_or("line_number", 0),
        change_type: ChangeType::parse_or_default(&args.str_or("change_type", "modified")),
        vuln_type: args.str_or("vuln_type", "Unknown"),
        severity: Severity::parse_or_default(&args.str_or("severity", "medium")),
        description: args.str_or("description", ""),
        old_code: args.opt_non_empty("old_code"),
        new_code: args.opt_non_empty("new_code"),
        recommendation: args.str_or("recommendation", ""),
        created_at: unix_timestamp_f64(),
    };

    let message = format!(
        "Reported: {} ({}) at line {}",
        vuln.vuln_type, vuln.severity, vuln.line_number
    );
    ws.findings.push(vuln);
    Ok(message.into())
}

fn mark_safe(ws: &mut DiffWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let reason = args.str_or("reason", "");
    let message = format!("Diff marked as safe: {}", reason);
    ws.safe_reason = Some(reason);
    Ok(message.into())
}

fn registry() -> ToolRegistry<DiffWorkspace> {
    ToolRegistry::new()
        .with_fn(
            ToolSpec::new(
                "get_diff_content",
                "Get the full diff content being analyzed",
                vec![],
            ),
            get_diff_content,
        )
        .with_fn(
            ToolSpec::new(
                "get_file_content",
                "Get the full post-change content of a file touched by the commit",
                vec![ParamSpec::string("file_path", "Path of the changed file")],
            ),
            get_file_content,
        )
        .with_fn(
            ToolSpec::new(
                "report_vulnerability",
                "Report a security vulnerability found in the diff",
                vec![
                    ParamSpec::string("file_path", "File containing the vulnerability"),
                    ParamSpec::integer("line_number", "Line number where vulnerability exists"),
                    ParamSpec::string("change_type", "Type: added, modified, removed"),
                    ParamSpec::string("vuln_type", "Vulnerability type (e.g., SQL Injection, XSS)"),
                    ParamSpec::string("severity", "Severity: critical, high, medium, low"),
                    ParamSpec::string("description", "Detailed description of the vulnerability"),
                    ParamSpec::string("old_code", "Original code (if modified/removed)"),
                    ParamSpec::string("new_code", "New code (if added/modified)"),
                    ParamSpec::string("recommendation", "How to fix the vulnerability"),
                ],
            ),
            report_vulnerability,
        )
        .with_fn(
            ToolSpec::new(
                "mark_safe",
                "Mark the diff as having no security issues",
                vec![ParamSpec::string("reason", "Why the diff is considered safe")],
            ),
            mark_safe,
        )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are a security expert analyzing code diffs for vulnerabilities.
</ROLE>

<OBJECTIVES>
1. Parse the diff to understand what changed
2. Identify security vulnerabilities INTRODUCED by the changes
3. Report each vulnerability with severity and remediation
</OBJECTIVES>

## Focus Areas
- Injection vulnerabilities (SQL, command, XSS)
- Authentication/authorization issues
- Sensitive data exposure
- Insecure configurations
- Cryptographic issues
- Buffer overflows (C/C++)

<FOCUS>
Only report vulnerabilities that are INTRODUCED or WORSENED by the diff, not
pre-existing issues. Use the provided tools to report your findings.
</FOCUS>"#;

pub struct DiffAnalyzer {
    runtime: AgentRuntime<DiffWorkspace>,
}

impl DiffAnalyzer {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "diff_analyzer",
        description: "Finds vulnerabilities introduced by code changes",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.1,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                DiffWorkspace::default(),
                options,
            ),
        }
    }

    pub async fn analyze_diff(&mut self, diff: &str, file_path: &str) -> Result<Vec<DiffVulnerability>> {
        self.runtime.workspace_mut().reset(diff, file_path);

        let prompt = format!(
            r#"Analyze this code diff for security vulnerabilities:

File: {}

```diff
{}
```

Instructions:
1. Use get_diff_content if you need to re-read the diff
2. For each vulnerability found, use report_vulnerability
3. If no vulnerabilities, use mark_safe with your reasoning
4. Focus only on security issues INTRODUCED by the changes"#,
            file_path, diff
        );
        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().findings.clone())
    }

    /// Analyze a whole commit with the post-change file contents and the
    /// per-file changed line numbers available to the model
    pub async fn analyze_commit_with_context(
        &mut self,
        diff: &str,
        commit_message: &str,
        file_contents: BTreeMap<String, String>,
        changed_lines: BTreeMap<String, Vec<usize>>,
    ) -> Result<Vec<DiffVulnerability>> {
        let prompt = Self::commit_prompt(diff, commit_message, &file_contents, &changed_lines);

        let ws = self.runtime.workspace_mut();
        ws.reset(diff, COMMIT_PATH);
        ws.file_contents = file_contents;
        ws.changed_lines = changed_lines;

        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().findings.clone())
    }

    fn commit_prompt(
        diff: &str,
        commit_message: &str,
        file_contents: &BTreeMap<String, String>,
        changed_lines: &BTreeMap<String, Vec<usize>>,
    ) -> String {
        let mut changed = String::new();
        for (path, lines) in changed_lines {
            let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            changed.push_str(&format!("- {}: lines {}\n", path, lines.join(", ")));
        }
        if changed.is_empty() {
            changed.push_str("(none parsed)\n");
        }

        let mut previews = String::new();
        for (path, content) in file_contents {
            let preview = truncate_chars(content, COMMIT_FILE_PREVIEW_CHARS);
            previews.push_str(&format!("### {}\n```\n{}\n```\n\n", path, preview));
        }

        format!(
            r#"Analyze this git commit for security vulnerabilities:

Commit message: {}

## Changed Lines
{}
## Changed Files
{}
## Diff
```diff
{}
```

Instructions:
1. Use get_diff_content if you need to re-read the diff
2. Use get_file_content to read the full post-change version of a file
3. For each vulnerability, call report_vulnerability with its file_path and the line number in the new version
4. If the commit introduces no vulnerabilities, use mark_safe with your reasoning
5. Focus only on security issues INTRODUCED by this commit"#,
            commit_message,
            changed,
            if previews.is_empty() { "(no file contents available)\n" } else { previews.as_str() },
            diff
        )
    }

    pub fn findings(&self) -> &[DiffVulnerability] {
        &self.runtime.workspace().findings
    }

    /// Reason given by the model when it declared the diff safe
    pub fn safe_reason(&self) -> Option<&str> {
        self.runtime.workspace().safe_reason.as_deref()
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        self.findings().iter().map(|v| v.severity).collect()
    }
}

impl SecurityAgent for DiffAnalyzer {
    type Workspace = DiffWorkspace;

    fn runtime(&self) -> &AgentRuntime<DiffWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        json!({
            "file_path": self.runtime.workspace().file_path,
            "vulnerabilities": self.findings(),
            "total_found": self.findings().len(),
            "by_severity": self.severity_counts(),
        })
    }
}
