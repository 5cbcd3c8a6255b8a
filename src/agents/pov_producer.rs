//! Proof-of-Concept Producer
//!
//! Designs minimal, safe reproducers for a confirmed vulnerability. Each
//! `submit_pov` call records one [`ExploitPov`]; a run may submit several.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use super::vuln_analyzer::Vulnerability;
use crate::ai::ModelGateway;
use crate::types::{ParseWithDefault, Result, unix_timestamp_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl ParseWithDefault for RiskLevel {
    fn type_name() -> &'static str {
        "RiskLevel"
    }

    fn default_value() -> Self {
        RiskLevel::Medium
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploitPov {
    pub pov_id: String,
    pub vulnerability_id: String,
    pub exploit_type: String,
    pub payload: String,
    pub payload_hex: Option<String>,
    pub description: String,
    pub preconditions: Vec<String>,
    pub expected_outcome: String,
    pub success_indicators: Vec<String>,
    pub risk_level: RiskLevel,
    pub created_at: f64,
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct PovWorkspace {
    vulnerability: Option<Vulnerability>,
    povs: Vec<ExploitPov>,
    ids: IdSequence,
}

impl Default for PovWorkspace {
    fn default() -> Self {
        Self {
            vulnerability: None,
            povs: Vec::new(),
            ids: IdSequence::new("pov"),
        }
    }
}

fn get_vulnerability(ws: &mut PovWorkspace, _args: &ToolArgs) -> Result<ToolOutput> {
    let value = match &ws.vulnerability {
        Some(vuln) => serde_json::to_value(vuln)?,
        None => json!({}),
    };
    Ok(ToolOutput::Json(value))
}

fn design_input(_ws: &mut PovWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    Ok(format!(
        "Designed {} input targeting '{}' using {} strategy",
        args.str_or("input_type", "string"),
        args.str_or("target_field", "input"),
        args.str_or("strategy", "direct")
    )
    .into())
}

fn submit_pov(ws: &mut PovWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let vulnerability_id = ws
        .vulnerability
        .as_ref()
        .map(|v| v.vuln_id.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let pov = ExploitPov {
        pov_id: ws.ids.next_id(),
        vulnerability_id,
        exploit_type: args.str_or("exploit_type", "unknown"),
        payload: args.str_or("payload", ""),
        payload_hex: args.opt_non_empty("payload_hex"),
        description: args.str_or("description", ""),
        preconditions: args.string_list("preconditions"),
        expected_outcome: args.str_or("expected_outcome", ""),
        success_indicators: args.string_list("success_indicators"),
        risk_level: RiskLevel::parse_or_default(&args.str_or("risk_level", "medium")),
        created_at: unix_timestamp_f64(),
    };

    let message = format!(
        "POV submitted: {} (risk: {})",
        pov.exploit_type,
        pov.risk_level.as_str()
    );
    ws.povs.push(pov);
    Ok(message.into())
}

fn registry() -> ToolRegistry<PovWorkspace> {
    ToolRegistry::new()
        .with_fn(
            ToolSpec::new(
                "get_vulnerability",
                "Get the vulnerability details being analyzed",
                vec![],
            ),
            get_vulnerability,
        )
        .with_fn(
            ToolSpec::new(
                "submit_pov",
                "Submit a proof-of-concept exploit",
                vec![
                    ParamSpec::string("exploit_type", "Type: buffer_overflow, injection, logic_flaw, etc."),
                    ParamSpec::string("payload", "The exploit payload (text or escaped bytes)"),
                    ParamSpec::string("payload_hex", "Hex-encoded payload for binary exploits"),
                    ParamSpec::string("description", "What this POC does"),
                    ParamSpec::string_array("preconditions", "Required conditions for exploit to work"),
                    ParamSpec::string("expected_outcome", "What happens when exploit succeeds"),
                    ParamSpec::string_array("success_indicators", "How to verify exploitation worked"),
                    ParamSpec::string("risk_level", "Risk: low (safe), medium, high (dangerous)"),
                ],
            ),
            submit_pov,
        )
        .with_fn(
            ToolSpec::new(
                "design_input",
                "Design a specific input to trigger the vulnerability",
                vec![
                    ParamSpec::string("input_type", "Type of input: string, binary, structured"),
                    ParamSpec::string("target_field", "Which input field to target"),
                    ParamSpec::string("strategy", "Exploitation strategy"),
                ],
            ),
            design_input,
        )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are a security researcher creating proof-of-concept exploits for DEFENSIVE purposes.
</ROLE>

<OBJECTIVES>
1. Analyze the vulnerability details
2. Design a minimal proof-of-concept that demonstrates the issue
3. Create a safe, reproducible exploit for testing
</OBJECTIVES>

## Guidelines
- POCs should be minimal and targeted
- Include clear preconditions and expected outcomes
- Focus on demonstrating the vulnerability exists, not causing damage
- For memory corruption: craft inputs that trigger the bug safely
- For injection: create payloads that prove execution without harm
- Always include indicators that show successful exploitation

Use the tools to submit your POC designs."#;

pub struct PovProducer {
    runtime: AgentRuntime<PovWorkspace>,
}

impl PovProducer {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "pov_producer",
        description: "Designs safe proof-of-concept exploits",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.2,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                PovWorkspace::default(),
                options,
            ),
        }
    }

    /// Proofs of concept submitted for `vuln` during this call
    pub async fn generate_pov(&mut self, vuln: &Vulnerability) -> Result<Vec<ExploitPov>> {
        let ws = self.runtime.workspace_mut();
        ws.vulnerability = Some(vuln.clone());
        ws.povs.clear();

        let prompt = format!(
            r#"Generate a proof-of-concept exploit for this vulnerability:

Vulnerability Type: {}
Severity: {}
Description: {}
Location: {}:{}
CWE: {}

Vulnerable Code:
```
{}
```

Instructions:
1. Use get_vulnerability to review the details
2. Use design_input to plan your approach
3. Use submit_pov to submit your proof-of-concept
4. Keep the POC minimal and safe for testing"#,
            vuln.vuln_type,
            vuln.severity,
            vuln.description,
            vuln.file_path,
            vuln.line_number,
            vuln.cwe_id.as_deref().unwrap_or("N/A"),
            vuln.snippet_or_placeholder()
        );
        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().povs.clone())
    }

    pub fn povs(&self) -> &[ExploitPov] {
        &self.runtime.workspace().povs
    }
}

impl SecurityAgent for PovProducer {
    type Workspace = PovWorkspace;

    fn runtime(&self) -> &AgentRuntime<PovWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        let ws = self.runtime.workspace();
        json!({
            "vulnerability_id": ws.vulnerability.as_ref().map(|v| v.vuln_id.as_str()),
            "povs": ws.povs,
            "total_generated": ws.povs.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{ScriptedBackend, gateway_with, sample_vuln, text, tool_call};
    use crate::types::Severity;

    #[tokio::test]
    async fn test_generate_pov_records_submission() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::tool_calls(vec![
                ("get_vulnerability", json!({})),
                (
                    "design_input",
                    json!({"input_type": "string", "target_field": "id", "strategy": "tautology"}),
                ),
            ]),
            tool_call(
                "submit_pov",
                json!({
                    "exploit_type": "injection",
                    "payload": "1 OR 1=1",
                    "payload_hex": "",
                    "preconditions": ["Database reachable"],
                    "success_indicators": "All rows returned",
                    "risk_level": "LOW"
                }),
            ),
            text("Submitted."),
        ]);
        let mut agent = PovProducer::new(gateway_with(backend.clone()), AgentOptions::default());
        let vuln = sample_vuln("vuln_9", Severity::High);

        let povs = agent.generate_pov(&vuln).await.unwrap();

        assert_eq!(povs.len(), 1);
        assert_eq!(povs[0].vulnerability_id, "vuln_9");
        assert_eq!(povs[0].risk_level, RiskLevel::Low);
        assert!(povs[0].payload_hex.is_none());
        assert_eq!(povs[0].success_indicators, vec!["All rows returned"]);

        let calls = &agent.execution().tool_calls;
        let context: Value = serde_json::from_str(calls[0].result.as_deref().unwrap()).unwrap();
        assert_eq!(context["vuln_id"], "vuln_9");
        assert_eq!(
            calls[1].result.as_deref(),
            Some("Designed string input targeting 'id' using tautology strategy")
        );
        assert_eq!(
            calls[2].result.as_deref(),
            Some("POV submitted: injection (risk: low)")
        );

        let prompt = &backend.requests()[0].messages[1].content;
        assert!(prompt.contains("Vulnerability Type: SQL Injection"));
        assert!(prompt.contains("Location: app/db.py:12"));
        assert!(prompt.contains("CWE: CWE-89"));
    }

    #[tokio::test]
    async fn test_povs_reset_per_vulnerability() {
        let backend = ScriptedBackend::new(vec![
            tool_call("submit_pov", json!({"exploit_type": "overflow", "risk_level": "extreme"})),
            text("ok"),
            text("nothing"),
        ]);
        let mut agent = PovProducer::new(gateway_with(backend), AgentOptions::default());

        let first = agent.generate_pov(&sample_vuln("a", Severity::High)).await.unwrap();
        assert_eq!(first[0].risk_level, RiskLevel::Medium);

        let second = agent.generate_pov(&sample_vuln("b", Severity::High)).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(agent.results()["vulnerability_id"], "b");
        assert_eq!(agent.results()["total_generated"], 0);
    }
}
