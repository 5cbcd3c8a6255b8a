//! Vulnerability Analyzer
//!
//! Reads a source unit and reports each vulnerability through
//! `report_vulnerability`. The model may page through the source with
//! `read_source` and grep it with `find_pattern`; both only see the code the
//! caller supplied.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use crate::ai::ModelGateway;
use crate::constants::agent::{MAX_PATTERN_MATCHES, SOURCE_PREVIEW_LINES};
use crate::types::{ParseWithDefault, Result, ScoutError, Severity, unix_timestamp_f64};

/// Where a vulnerability was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingOrigin {
    #[default]
    Code,
    /// Introduced by an uncommitted or committed change
    Diff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub vuln_id: String,
    pub vuln_type: String,
    pub severity: Severity,
    pub description: String,
    pub file_path: String,
    pub line_number: usize,
    pub code_snippet: String,
    pub cwe_id: Option<String>,
    pub confidence: f64,
    pub remediation: Option<String>,
    pub created_at: f64,
    #[serde(default)]
    pub origin: FindingOrigin,
}

impl Vulnerability {
    /// Reported confidence is derived from severity, not taken from the model
    pub fn confidence_for(severity: Severity) -> f64 {
        if severity.is_high_priority() { 0.9 } else { 0.7 }
    }

    pub fn is_high_priority(&self) -> bool {
        self.severity.is_high_priority()
    }

    /// Identification lines shared by the downstream agents' prompts
    pub fn header_block(&self) -> String {
        format!(
            "Vulnerability ID: {}\nType: {}\nSeverity: {}\nDescription: {}\nFile: {}\nLine: {}\nCWE: {}",
            self.vuln_id,
            self.vuln_type,
            self.severity,
            if self.description.is_empty() {
                "No description"
            } else {
                self.description.as_str()
            },
            self.file_path,
            self.line_number,
            self.cwe_id.as_deref().unwrap_or("N/A")
        )
    }

    pub fn snippet_or_placeholder(&self) -> &str {
        if self.code_snippet.is_empty() {
            "No code available"
        } else {
            &self.code_snippet
        }
    }
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct VulnWorkspace {
    source: String,
    file_path: String,
    findings: Vec<Vulnerability>,
    ids: IdSequence,
}

impl Default for VulnWorkspace {
    fn default() -> Self {
        Self {
            source: String::new(),
            file_path: String::new(),
            findings: Vec::new(),
            ids: IdSequence::new("vuln"),
        }
    }
}

/// `N: line` for the 1-indexed inclusive range, clipped to the source
pub fn numbered_lines(source: &str, start_line: i64, end_line: i64) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let start = (start_line - 1).max(0) as usize;
    let end = end_line.clamp(0, lines.len() as i64) as usize;
    if start >= end {
        return String::new();
    }
    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", start + i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_source(ws: &mut VulnWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let start = args.require_i64("start_line")?;
    let end = args.require_i64("end_line")?;
    Ok(numbered_lines(&ws.source, start, end).into())
}

fn find_pattern(ws: &mut VulnWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let pattern = args.require_str("pattern")?;
    let regex = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => regex,
        Err(e) => return Ok(format!("Invalid regex pattern: {}", e).into()),
    };

    let matches: Vec<String> = ws
        .source
        .split('\n')
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .take(MAX_PATTERN_MATCHES)
        .map(|(i, line)| format!("Line {}: {}", i + 1, line.trim()))
        .collect();

    if matches.is_empty() {
        Ok("No matches found".into())
    } else {
        Ok(matches.join("\n").into())
    }
}

fn report_vulnerability(ws: &mut VulnWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let severity = Severity::parse_or_default(&args.str_or("severity", "medium"));
    let vuln = Vulnerability {
        vuln_id: ws.ids.next_id(),
        vuln_type: args.str_or("vuln_type", "Unknown"),
        severity,
        description: args.str_or("description", ""),
        file_path: ws.file_path.clone(),
        line_number: args.usize_or("line_number", 0),
        code_snippet: args.str_or("code_snippet", ""),
        cwe_id: args.opt_non_empty("cwe_id"),
        confidence: Vulnerability::confidence_for(severity),
        remediation: args.opt_non_empty("remediation"),
        created_at: unix_timestamp_f64(),
        origin: FindingOrigin::Code,
    };

    let message = format!(
        "Vulnerability {} reported: {} ({}) at line {}",
        vuln.vuln_id, vuln.vuln_type, vuln.severity, vuln.line_number
    );
    ws.findings.push(vuln);
    Ok(message.into())
}

fn registry() -> ToolRegistry<VulnWorkspace> {
    ToolRegistry::new()
        .with_fn(
            ToolSpec::new(
                "read_source",
                "Read specific lines from the source code being analyzed",
                vec![
                    ParamSpec::integer("start_line", "Starting line number (1-indexed)"),
                    ParamSpec::integer("end_line", "Ending line number (1-indexed)"),
                ],
            ),
            read_source,
        )
        .with_fn(
            ToolSpec::new(
                "find_pattern",
                "Search for a regex pattern in the source code",
                vec![ParamSpec::string("pattern", "Regex pattern to search for")],
            ),
            find_pattern,
        )
        .with_fn(
            ToolSpec::new(
                "report_vulnerability",
                "Report a discovered vulnerability",
                vec![
                    ParamSpec::string("vuln_type", "Type of vulnerability"),
                    ParamSpec::string("severity", "Severity: critical, high, medium, or low"),
                    ParamSpec::string("description", "Description of the vulnerability"),
                    ParamSpec::integer("line_number", "Line number of the vulnerability"),
                    ParamSpec::string("code_snippet", "The vulnerable code snippet"),
                    ParamSpec::string("cwe_id", "CWE ID (e.g., CWE-89)"),
                    ParamSpec::string("remediation", "How to fix the vulnerability"),
                ],
            ),
            report_vulnerability,
        )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are an expert security vulnerability analyzer. Your job is to carefully analyze
source code and identify security vulnerabilities.
</ROLE>

<TOOLS>
1. read_source - Read specific lines from the source code
2. find_pattern - Search for specific patterns in the code
3. report_vulnerability - Report a discovered vulnerability
</TOOLS>

For each vulnerability you find, you MUST call report_vulnerability with:
- vuln_type: The type of vulnerability (e.g., "SQL Injection", "Buffer Overflow", "XSS", "Command Injection")
- severity: One of "critical", "high", "medium", "low"
- description: A clear description of the vulnerability
- line_number: The line number where the vulnerability exists
- code_snippet: The vulnerable code snippet
- cwe_id: The CWE ID if known (e.g., "CWE-89" for SQL Injection)
- remediation: How to fix the vulnerability

## Coverage Checklist
- Injection vulnerabilities (SQL, Command, LDAP, XPath)
- Buffer overflows and memory corruption
- Authentication/Authorization issues
- Cryptographic weaknesses
- Input validation issues
- Race conditions
- Information disclosure
- Insecure configurations

<FOCUS>
Be thorough but precise. Only report real vulnerabilities with high confidence.
</FOCUS>"#;

pub struct VulnAnalyzer {
    runtime: AgentRuntime<VulnWorkspace>,
}

impl VulnAnalyzer {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "vuln_analyzer",
        description: "Detects vulnerabilities in source code",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.1,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                VulnWorkspace::default(),
                options,
            ),
        }
    }

    /// Analyze one source unit; returns the vulnerabilities reported during
    /// this call only
    pub async fn analyze_code(&mut self, code: &str, file_path: &str) -> Result<Vec<Vulnerability>> {
        let ws = self.runtime.workspace_mut();
        ws.source = code.to_string();
        ws.file_path = file_path.to_string();
        ws.findings.clear();

        let prompt = Self::build_prompt(code, file_path);
        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().findings.clone())
    }

    pub async fn analyze_file(&mut self, path: &Path) -> Result<Vec<Vulnerability>> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ScoutError::Validation(format!("File not found: {}", path.display()))
            }
            _ => ScoutError::Io(e),
        })?;
        let code = String::from_utf8_lossy(&bytes);
        self.analyze_code(&code, &path.display().to_string()).await
    }

    pub fn findings(&self) -> &[Vulnerability] {
        &self.runtime.workspace().findings
    }

    fn build_prompt(code: &str, file_path: &str) -> String {
        let lines: Vec<&str> = code.split('\n').collect();
        let mut preview = lines
            .iter()
            .take(SOURCE_PREVIEW_LINES)
            .enumerate()
            .map(|(i, line)| format!("{}: {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");
        if lines.len() > SOURCE_PREVIEW_LINES {
            preview.push_str(&format!(
                "\n... ({} more lines)",
                lines.len() - SOURCE_PREVIEW_LINES
            ));
        }

        format!(
            r#"Analyze the following source code for security vulnerabilities.

File: {}
Total lines: {}

Source code:
```
{}
```

Use the read_source tool if you need to see more lines.
Use find_pattern to search for specific vulnerability patterns.
Use report_vulnerability to report each vulnerability you find.

After analyzing, provide a summary of your findings."#,
            file_path,
            lines.len(),
            preview
        )
    }
}

impl SecurityAgent for VulnAnalyzer {
    type Workspace = VulnWorkspace;

    fn runtime(&self) -> &AgentRuntime<VulnWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        json!({
            "vulnerabilities": self.findings(),
            "total": self.findings().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{ScriptedBackend, gateway_with, text, tool_call};
    use crate::constants::pipeline::INLINE_CODE_PATH;
    use proptest::prelude::*;

    const C_SNIPPET: &str = r#"#include <stdio.h>
#include <string.h>

void greet(const char *input) {
    char buffer[16];
    strcpy(buffer, input);
    printf(input);
}

int main(int argc, char **argv) {
    if (argc < 2) {
        return 1;
    }
    greet(argv[1]);
    return 0;
}

/* helper notes */
/* end of file */
"#;

    fn analyzer(backend: Arc<ScriptedBackend>) -> VulnAnalyzer {
        VulnAnalyzer::new(gateway_with(backend), AgentOptions::default())
    }

    fn line_of(needle: &str) -> usize {
        C_SNIPPET
            .split('\n')
            .position(|l| l.contains(needle))
            .map(|i| i + 1)
            .unwrap()
    }

    #[tokio::test]
    async fn test_c_snippet_yields_overflow_and_format_string() {
        let strcpy_line = line_of("strcpy(buffer, input)");
        let printf_line = line_of("printf(input)");
        let backend = ScriptedBackend::new(vec![
            tool_call("find_pattern", json!({"pattern": "strcpy|printf"})),
            ScriptedBackend::tool_calls(vec![
                (
                    "report_vulnerability",
                    json!({
                        "vuln_type": "Buffer Overflow",
                        "severity": "CRITICAL",
                        "description": "Unbounded copy into a 16-byte stack buffer",
                        "line_number": strcpy_line,
                        "code_snippet": "strcpy(buffer, input);",
                        "cwe_id": "CWE-120",
                        "remediation": "Use strncpy with an explicit bound"
                    }),
                ),
                (
                    "report_vulnerability",
                    json!({
                        "vuln_type": "Format String",
                        "severity": "high",
                        "description": "User input used as format string",
                        "line_number": printf_line,
                        "code_snippet": "printf(input);",
                        "cwe_id": "CWE-134",
                        "remediation": ""
                    }),
                ),
            ]),
            text("Found two issues."),
        ]);
        let mut agent = analyzer(backend.clone());

        let vulns = agent.analyze_code(C_SNIPPET, INLINE_CODE_PATH).await.unwrap();

        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[0].vuln_type, "Buffer Overflow");
        assert_eq!(vulns[0].line_number, strcpy_line);
        assert_eq!(vulns[0].severity, Severity::Critical);
        assert_eq!(vulns[0].confidence, 0.9);
        assert_eq!(vulns[0].file_path, INLINE_CODE_PATH);
        assert_eq!(vulns[1].vuln_type, "Format String");
        assert_eq!(vulns[1].line_number, printf_line);
        assert!(vulns[1].remediation.is_none());
        assert_ne!(vulns[0].vuln_id, vulns[1].vuln_id);

        let grep = &agent.execution().tool_calls[0];
        let grep_text = grep.result.as_deref().unwrap();
        assert!(grep_text.contains(&format!("Line {}: strcpy(buffer, input);", strcpy_line)));
        assert!(grep_text.contains(&format!("Line {}: printf(input);", printf_line)));

        let prompt = &backend.requests()[0].messages[1].content;
        assert!(prompt.contains("Total lines: 20"));
        assert!(prompt.contains("6:     strcpy(buffer, input);"));
    }

    #[tokio::test]
    async fn test_invalid_severity_falls_back_to_medium() {
        let backend = ScriptedBackend::new(vec![
            tool_call(
                "report_vulnerability",
                json!({"vuln_type": "XSS", "severity": "apocalyptic", "line_number": 3}),
            ),
            text("done"),
        ]);
        let mut agent = analyzer(backend);
        let vulns = agent.analyze_code("a\nb\nc", "x.js").await.unwrap();

        assert_eq!(vulns[0].severity, Severity::Medium);
        assert_eq!(vulns[0].confidence, 0.7);
        let expected = format!(
            "Vulnerability {} reported: XSS (medium) at line 3",
            vulns[0].vuln_id
        );
        assert_eq!(
            agent.execution().tool_calls[0].result.as_deref(),
            Some(expected.as_str())
        );
    }

    #[tokio::test]
    async fn test_findings_reset_between_calls() {
        let backend = ScriptedBackend::new(vec![
            tool_call("report_vulnerability", json!({"vuln_type": "SQL Injection"})),
            text("one"),
            text("nothing here"),
        ]);
        let mut agent = analyzer(backend);

        assert_eq!(agent.analyze_code("q = input", "a.py").await.unwrap().len(), 1);
        assert!(agent.analyze_code("print(1)", "b.py").await.unwrap().is_empty());
        assert_eq!(agent.results()["total"], 0);
    }

    #[tokio::test]
    async fn test_analyze_missing_file() {
        let mut agent = analyzer(ScriptedBackend::new(vec![]));
        let err = agent
            .analyze_file(Path::new("/definitely/not/here.c"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));
        assert_eq!(agent.execution().status, crate::agents::ExecutionStatus::Idle);
    }

    #[test]
    fn test_read_source_ranges() {
        let src = "one\ntwo\nthree";
        assert_eq!(numbered_lines(src, 2, 3), "2: two\n3: three");
        assert_eq!(numbered_lines(src, 0, 1), "1: one");
        assert_eq!(numbered_lines(src, 3, 99), "3: three");
        assert_eq!(numbered_lines(src, 3, 2), "");
    }

    #[test]
    fn test_find_pattern_outcomes() {
        let mut ws = VulnWorkspace {
            source: "let a = 1;\nEVAL(x)\n".to_string(),
            ..Default::default()
        };
        let hit = find_pattern(&mut ws, &ToolArgs::from_value(json!({"pattern": "eval"}))).unwrap();
        assert_eq!(hit.into_text(), "Line 2: EVAL(x)");

        let miss = find_pattern(&mut ws, &ToolArgs::from_value(json!({"pattern": "exec"}))).unwrap();
        assert_eq!(miss.into_text(), "No matches found");

        let bad = find_pattern(&mut ws, &ToolArgs::from_value(json!({"pattern": "("}))).unwrap();
        assert!(bad.into_text().starts_with("Invalid regex pattern:"));
    }

    #[test]
    fn test_find_pattern_caps_matches() {
        let mut ws = VulnWorkspace {
            source: "x\n".repeat(50),
            ..Default::default()
        };
        let out = find_pattern(&mut ws, &ToolArgs::from_value(json!({"pattern": "x"})))
            .unwrap()
            .into_text();
        assert_eq!(out.lines().count(), MAX_PATTERN_MATCHES);
    }

    proptest! {
        #[test]
        fn prop_reported_severity_is_closed(raw in ".{0,12}") {
            let mut ws = VulnWorkspace::default();
            report_vulnerability(&mut ws, &ToolArgs::from_value(json!({"severity": raw}))).unwrap();
            let sev = ws.findings[0].severity;
            prop_assert!(Severity::ALL.contains(&sev));
            prop_assert!((0.0..=1.0).contains(&ws.findings[0].confidence));
        }
    }
}
