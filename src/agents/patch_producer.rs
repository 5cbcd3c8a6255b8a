//! Patch Producer
//!
//! Generates a fix for one vulnerability through `submit_patch`. A run that
//! ends without a submission yields a zero-confidence workaround placeholder
//! so the caller always gets a patch record per vulnerability.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use super::vuln_analyzer::Vulnerability;
use crate::ai::ModelGateway;
use crate::types::{ParseWithDefault, Result, clamp_confidence, unix_timestamp_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    #[default]
    Fix,
    Mitigation,
    Workaround,
}

impl PatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fix => "fix",
            Self::Mitigation => "mitigation",
            Self::Workaround => "workaround",
        }
    }
}

impl ParseWithDefault for PatchType {
    fn type_name() -> &'static str {
        "PatchType"
    }

    fn default_value() -> Self {
        PatchType::Fix
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "fix" => Some(Self::Fix),
            "mitigation" => Some(Self::Mitigation),
            "workaround" => Some(Self::Workaround),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPatch {
    pub patch_id: String,
    pub vulnerability_id: String,
    pub file_path: String,
    pub original_code: String,
    pub patched_code: String,
    pub patch_description: String,
    pub confidence: f64,
    pub patch_type: PatchType,
    pub test_cases: Vec<String>,
    pub notes: Option<String>,
    pub created_at: f64,
}

impl SecurityPatch {
    pub fn fallback(patch_id: String, vuln: &Vulnerability) -> Self {
        Self {
            patch_id,
            vulnerability_id: vuln.vuln_id.clone(),
            file_path: vuln.file_path.clone(),
            original_code: vuln.code_snippet.clone(),
            patched_code: "// Patch generation failed - manual review required".to_string(),
            patch_description: "Automatic patch generation failed".to_string(),
            confidence: 0.0,
            patch_type: PatchType::Workaround,
            test_cases: Vec::new(),
            notes: Some("Manual intervention required".to_string()),
            created_at: unix_timestamp_f64(),
        }
    }

    /// Whole-snippet unified diff: every original line removed, every
    /// patched line added, under a single hunk.
    pub fn to_diff(&self) -> String {
        let original: Vec<&str> = self.original_code.split('\n').collect();
        let patched: Vec<&str> = self.patched_code.split('\n').collect();

        let mut out = vec![
            format!("--- a/{}", self.file_path),
            format!("+++ b/{}", self.file_path),
            format!("@@ -1,{} +1,{} @@", original.len(), patched.len()),
        ];
        out.extend(original.iter().map(|l| format!("-{}", l)));
        out.extend(patched.iter().map(|l| format!("+{}", l)));
        out.join("\n")
    }
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct PatchWorkspace {
    current: Option<Vulnerability>,
    patches: Vec<SecurityPatch>,
    ids: IdSequence,
}

impl Default for PatchWorkspace {
    fn default() -> Self {
        Self {
            current: None,
            patches: Vec::new(),
            ids: IdSequence::new("patch"),
        }
    }
}

fn submit_patch(ws: &mut PatchWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let Some(vuln) = ws.current.as_ref() else {
        return Ok("Error: No vulnerability being patched".into());
    };
    let (vulnerability_id, file_path) = (vuln.vuln_id.clone(), vuln.file_path.clone());

    let patch = SecurityPatch {
        patch_id: ws.ids.next_id(),
        vulnerability_id,
        file_path,
        original_code: args.str_or("original_code", ""),
        patched_code: args.str_or("patched_code", ""),
        patch_description: args.str_or("patch_description", ""),
        confidence: clamp_confidence(args.f64_or("confidence", 0.5), 0.5),
        patch_type: PatchType::parse_or_default(&args.str_or("patch_type", "fix")),
        test_cases: args.string_list("test_cases"),
        notes: args.opt_non_empty("notes"),
        created_at: unix_timestamp_f64(),
    };

    let message = format!(
        "Patch {} submitted: {} with {:.0}% confidence",
        patch.patch_id,
        patch.patch_type.as_str(),
        patch.confidence * 100.0
    );
    ws.patches.push(patch);
    Ok(message.into())
}

fn registry() -> ToolRegistry<PatchWorkspace> {
    ToolRegistry::new().with_fn(
        ToolSpec::new(
            "submit_patch",
            "Submit a security patch for a vulnerability",
            vec![
                ParamSpec::string("original_code", "The original vulnerable code"),
                ParamSpec::string("patched_code", "The fixed code"),
                ParamSpec::string("patch_description", "Description of what the patch does"),
                ParamSpec::number("confidence", "Confidence in the patch (0.0 - 1.0)"),
                ParamSpec::string("patch_type", "Type: fix, mitigation, or workaround"),
                ParamSpec::string_array("test_cases", "List of test cases to verify the patch"),
                ParamSpec::string("notes", "Additional notes or caveats"),
            ],
        ),
        submit_patch,
    )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are an expert security patch developer. Your job is to generate secure,
correct patches for vulnerabilities.
</ROLE>

<OBJECTIVES>
1. Understand the vulnerability thoroughly
2. Generate a minimal, focused fix
3. Preserve the original functionality
4. Follow secure coding best practices
5. Consider edge cases and error handling
</OBJECTIVES>

## Submission
Call submit_patch with:
- original_code: The original vulnerable code
- patched_code: Your fixed code
- patch_description: Clear description of what the patch does
- confidence: Your confidence in the patch (0.0 - 1.0)
- patch_type: fix, mitigation, or workaround
- test_cases: List of test cases to verify the patch
- notes: Any additional notes or caveats

## Guidelines
- Injection vulnerabilities: parameterized queries, input validation, output encoding
- Buffer overflows: safe string functions, bounds checking
- Authentication issues: proper validation, session management
- Cryptographic issues: strong algorithms, proper key management
- Always prefer fixing the root cause over workarounds

Be precise and ensure the patch compiles and doesn't break functionality."#;

pub struct PatchProducer {
    runtime: AgentRuntime<PatchWorkspace>,
}

impl PatchProducer {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "patch_producer",
        description: "Generates security patches for vulnerabilities",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.2,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                PatchWorkspace::default(),
                options,
            ),
        }
    }

    /// Patch one vulnerability. Only a patch submitted during this call
    /// counts; otherwise the placeholder patch is recorded and returned.
    pub async fn generate_patch(&mut self, vuln: &Vulnerability) -> Result<SecurityPatch> {
        let ws = self.runtime.workspace_mut();
        ws.current = Some(vuln.clone());
        let before = ws.patches.len();

        let prompt = format!(
            r#"Generate a security patch for the following vulnerability:

{}

Vulnerable code:
```
{}
```

Suggested remediation: {}

Generate a secure patch and use the submit_patch tool to submit it.
Include test cases to verify the patch works correctly."#,
            vuln.header_block(),
            vuln.snippet_or_placeholder(),
            vuln.remediation.as_deref().unwrap_or("None provided")
        );
        let outcome = self.runtime.run(&prompt, None).await;

        let ws = self.runtime.workspace_mut();
        ws.current = None;
        outcome?;

        if ws.patches.len() > before
            && let Some(last) = ws.patches.last()
        {
            return Ok(last.clone());
        }

        let fallback = SecurityPatch::fallback(ws.ids.next_id(), vuln);
        ws.patches.push(fallback.clone());
        Ok(fallback)
    }

    pub async fn generate_patches(&mut self, vulns: &[Vulnerability]) -> Result<Vec<SecurityPatch>> {
        let mut patches = Vec::with_capacity(vulns.len());
        for vuln in vulns {
            patches.push(self.generate_patch(vuln).await?);
        }
        Ok(patches)
    }

    pub fn patches(&self) -> &[SecurityPatch] {
        &self.runtime.workspace().patches
    }

    pub fn patch_for(&self, vuln_id: &str) -> Option<&SecurityPatch> {
        self.patches().iter().find(|p| p.vulnerability_id == vuln_id)
    }

    pub fn clear_patches(&mut self) {
        self.runtime.workspace_mut().patches.clear();
    }
}

impl SecurityAgent for PatchProducer {
    type Workspace = PatchWorkspace;

    fn runtime(&self) -> &AgentRuntime<PatchWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        json!({
            "patches": self.patches(),
            "total": self.patches().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{ScriptedBackend, gateway_with, sample_vuln, text, tool_call};
    use crate::types::Severity;

    fn producer(backend: Arc<ScriptedBackend>) -> PatchProducer {
        PatchProducer::new(gateway_with(backend), AgentOptions::default())
    }

    #[tokio::test]
    async fn test_submitted_patch_is_normalized() {
        let backend = ScriptedBackend::new(vec![
            tool_call(
                "submit_patch",
                json!({
                    "original_code": "cur.execute(q + uid)",
                    "patched_code": "cur.execute(q, (uid,))",
                    "patch_description": "Bind the id as a parameter",
                    "confidence": 1.7,
                    "patch_type": "rewrite",
                    "test_cases": ["uid = \"1 OR 1=1\" returns one row"],
                    "notes": ""
                }),
            ),
            text("Patched."),
        ]);
        let mut agent = producer(backend);

        let patch = agent
            .generate_patch(&sample_vuln("vuln_7", Severity::High))
            .await
            .unwrap();

        assert_eq!(patch.vulnerability_id, "vuln_7");
        assert_eq!(patch.file_path, "app/db.py");
        assert_eq!(patch.confidence, 1.0);
        assert_eq!(patch.patch_type, PatchType::Fix);
        assert_eq!(patch.test_cases.len(), 1);
        assert!(patch.notes.is_none());
        assert!(agent.patch_for("vuln_7").is_some());

        let result = agent.execution().tool_calls[0].result.clone().unwrap();
        assert!(result.ends_with("submitted: fix with 100% confidence"));
    }

    #[tokio::test]
    async fn test_no_submission_returns_placeholder() {
        let backend = ScriptedBackend::new(vec![text("I cannot patch this.")]);
        let mut agent = producer(backend);
        let vuln = sample_vuln("vuln_3", Severity::Critical);

        let patch = agent.generate_patch(&vuln).await.unwrap();

        assert_eq!(patch.patch_type, PatchType::Workaround);
        assert_eq!(patch.confidence, 0.0);
        assert_eq!(patch.original_code, vuln.code_snippet);
        assert_eq!(
            patch.patched_code,
            "// Patch generation failed - manual review required"
        );
        assert_eq!(patch.notes.as_deref(), Some("Manual intervention required"));
    }

    #[tokio::test]
    async fn test_second_vulnerability_does_not_reuse_first_patch() {
        let backend = ScriptedBackend::new(vec![
            tool_call("submit_patch", json!({"patched_code": "safe()", "confidence": 0.8})),
            text("done"),
            text("no idea"),
        ]);
        let mut agent = producer(backend);
        let vulns = vec![
            sample_vuln("first", Severity::High),
            sample_vuln("second", Severity::High),
        ];

        let patches = agent.generate_patches(&vulns).await.unwrap();
        assert_eq!(patches[0].patched_code, "safe()");
        assert_eq!(patches[1].vulnerability_id, "second");
        assert_eq!(patches[1].patch_type, PatchType::Workaround);
        assert_eq!(agent.results()["total"], 2);
    }

    #[test]
    fn test_to_diff_format() {
        let mut patch = SecurityPatch::fallback("p".into(), &sample_vuln("v", Severity::Low));
        patch.file_path = "src/auth.c".into();
        patch.original_code = "strcpy(dst, src);".into();
        patch.patched_code = "strncpy(dst, src, sizeof dst - 1);\ndst[sizeof dst - 1] = 0;".into();

        assert_eq!(
            patch.to_diff(),
            "--- a/src/auth.c\n+++ b/src/auth.c\n@@ -1,1 +1,2 @@\n\
             -strcpy(dst, src);\n\
             +strncpy(dst, src, sizeof dst - 1);\n\
             +dst[sizeof dst - 1] = 0;"
        );
    }

    #[test]
    fn test_submit_without_current_vulnerability() {
        let mut ws = PatchWorkspace::default();
        let out = submit_patch(&mut ws, &ToolArgs::default()).unwrap();
        assert_eq!(out.into_text(), "Error: No vulnerability being patched");
    }
}
