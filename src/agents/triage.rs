//! Triage Agent
//!
//! Assigns a priority, exploitability, impact and CVSS estimate to one
//! vulnerability at a time through `submit_triage`. When the model never
//! submits, a conservative medium-priority verdict is returned instead.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use super::vuln_analyzer::Vulnerability;
use crate::ai::ModelGateway;
use crate::types::{
    ParseWithDefault, Priority, Result, Severity, clamp_cvss, unix_timestamp_f64,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exploitability {
    Trivial,
    Easy,
    #[default]
    Moderate,
    Difficult,
    Theoretical,
    /// Only produced by the fallback verdict
    Unknown,
}

impl ParseWithDefault for Exploitability {
    fn type_name() -> &'static str {
        "Exploitability"
    }

    fn default_value() -> Self {
        Exploitability::Moderate
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "trivial" => Some(Self::Trivial),
            "easy" => Some(Self::Easy),
            "moderate" => Some(Self::Moderate),
            "difficult" => Some(Self::Difficult),
            "theoretical" => Some(Self::Theoretical),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub triage_id: String,
    pub vulnerability_id: String,
    pub priority: Priority,
    pub exploitability: Exploitability,
    pub impact: Severity,
    pub cvss_estimate: f64,
    pub reasoning: String,
    pub recommended_action: String,
    pub estimated_effort: String,
    pub created_at: f64,
}

impl TriageResult {
    /// Verdict used when the model ends a run without submitting
    pub fn fallback(triage_id: String, vulnerability_id: &str) -> Self {
        Self {
            triage_id,
            vulnerability_id: vulnerability_id.to_string(),
            priority: Priority::Medium,
            exploitability: Exploitability::Unknown,
            impact: Severity::Medium,
            cvss_estimate: 5.0,
            reasoning: "Triage failed - using default values".to_string(),
            recommended_action: "Manual review required".to_string(),
            estimated_effort: "Unknown".to_string(),
            created_at: unix_timestamp_f64(),
        }
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority.is_high_priority()
    }
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct TriageWorkspace {
    current: Option<Vulnerability>,
    results: Vec<TriageResult>,
    ids: IdSequence,
}

impl Default for TriageWorkspace {
    fn default() -> Self {
        Self {
            current: None,
            results: Vec::new(),
            ids: IdSequence::new("triage"),
        }
    }
}

fn submit_triage(ws: &mut TriageWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let Some(vuln_id) = ws.current.as_ref().map(|v| v.vuln_id.clone()) else {
        return Ok("Error: No vulnerability being triaged".into());
    };

    let result = TriageResult {
        triage_id: ws.ids.next_id(),
        vulnerability_id: vuln_id,
        priority: Priority::parse_or_default(&args.str_or("priority", "medium")),
        exploitability: Exploitability::parse_or_default(&args.str_or("exploitability", "moderate")),
        impact: Severity::parse_or_default(&args.str_or("impact", "medium")),
        cvss_estimate: clamp_cvss(args.f64_or("cvss_estimate", 5.0)),
        reasoning: args.str_or("reasoning", ""),
        recommended_action: args.str_or("recommended_action", "Review manually"),
        estimated_effort: args.str_or("estimated_effort", "Unknown"),
        created_at: unix_timestamp_f64(),
    };

    let message = format!(
        "Triage {} submitted: Priority={}, CVSS={}",
        result.triage_id, result.priority, result.cvss_estimate
    );
    ws.results.push(result);
    Ok(message.into())
}

fn registry() -> ToolRegistry<TriageWorkspace> {
    ToolRegistry::new().with_fn(
        ToolSpec::new(
            "submit_triage",
            "Submit triage assessment for a vulnerability",
            vec![
                ParamSpec::string("priority", "Priority: critical, high, medium, or low"),
                ParamSpec::string(
                    "exploitability",
                    "How exploitable: trivial, easy, moderate, difficult, theoretical",
                ),
                ParamSpec::string("impact", "Impact level: critical, high, medium, low"),
                ParamSpec::number("cvss_estimate", "Estimated CVSS score (0.0 - 10.0)"),
                ParamSpec::string("reasoning", "Detailed reasoning for the assessment"),
                ParamSpec::string("recommended_action", "Recommended action to take"),
                ParamSpec::string(
                    "estimated_effort",
                    "Estimated effort to fix (e.g., '2 hours', '1 day')",
                ),
            ],
        ),
        submit_triage,
    )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are an expert security vulnerability triage specialist. Your job is to analyze
vulnerabilities and prioritize them.
</ROLE>

## Assessment Dimensions

1. **Exploitability**: How easy is it to exploit?
   - Trivial: Can be exploited with minimal effort, public exploit exists
   - Easy: Requires basic skills, straightforward attack vector
   - Moderate: Requires some expertise or specific conditions
   - Difficult: Requires advanced skills or complex conditions
   - Theoretical: Very difficult to exploit in practice

2. **Impact**: What's the potential damage?
   - Critical: Full system compromise, data breach, RCE
   - High: Significant data exposure, privilege escalation
   - Medium: Limited data exposure, service disruption
   - Low: Minor information disclosure, minimal impact

3. **Priority**: Final priority assignment
   - Critical: Fix immediately, stop everything else
   - High: Fix within 24-48 hours
   - Medium: Fix within a week
   - Low: Fix when convenient

## Submission
Call submit_triage with:
- priority: critical, high, medium, low
- exploitability: trivial, easy, moderate, difficult, theoretical
- impact: critical, high, medium, low
- cvss_estimate: 0.0 - 10.0
- reasoning: Your detailed reasoning
- recommended_action: What should be done
- estimated_effort: hours, days, weeks

Be objective and consistent in your assessments."#;

pub struct TriageAgent {
    runtime: AgentRuntime<TriageWorkspace>,
}

impl TriageAgent {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "triage_agent",
        description: "Prioritizes vulnerabilities by exploitability and impact",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.1,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                TriageWorkspace::default(),
                options,
            ),
        }
    }

    /// Triage one vulnerability. Only a verdict submitted during this call
    /// counts; otherwise the fallback verdict is recorded and returned.
    pub async fn triage_vulnerability(&mut self, vuln: &Vulnerability) -> Result<TriageResult> {
        let ws = self.runtime.workspace_mut();
        ws.current = Some(vuln.clone());
        let before = ws.results.len();

        let prompt = format!(
            r#"Analyze and triage the following vulnerability:

{}

Code snippet:
```
{}
```

Remediation suggestion: {}

Analyze this vulnerability and use the submit_triage tool to submit your assessment."#,
            vuln.header_block(),
            vuln.snippet_or_placeholder(),
            vuln.remediation.as_deref().unwrap_or("None provided")
        );
        let outcome = self.runtime.run(&prompt, None).await;

        let ws = self.runtime.workspace_mut();
        ws.current = None;
        outcome?;

        if ws.results.len() > before
            && let Some(last) = ws.results.last()
        {
            return Ok(last.clone());
        }

        let fallback = TriageResult::fallback(ws.ids.next_id(), &vuln.vuln_id);
        ws.results.push(fallback.clone());
        Ok(fallback)
    }

    pub async fn triage_vulnerabilities(
        &mut self,
        vulns: &[Vulnerability],
    ) -> Result<Vec<TriageResult>> {
        let mut results = Vec::with_capacity(vulns.len());
        for vuln in vulns {
            results.push(self.triage_vulnerability(vuln).await?);
        }
        Ok(results)
    }

    pub fn triage_results(&self) -> &[TriageResult] {
        &self.runtime.workspace().results
    }

    pub fn by_priority(&self, priority: Priority) -> Vec<&TriageResult> {
        self.triage_results()
            .iter()
            .filter(|r| r.priority == priority)
            .collect()
    }

    pub fn clear_results(&mut self) {
        self.runtime.workspace_mut().results.clear();
    }
}

impl SecurityAgent for TriageAgent {
    type Workspace = TriageWorkspace;

    fn runtime(&self) -> &AgentRuntime<TriageWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        json!({
            "triage_results": self.triage_results(),
            "total": self.triage_results().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{ScriptedBackend, gateway_with, sample_vuln, text, tool_call};
    use proptest::prelude::*;

    fn agent(backend: Arc<ScriptedBackend>) -> TriageAgent {
        TriageAgent::new(gateway_with(backend), AgentOptions::default())
    }

    #[tokio::test]
    async fn test_submitted_verdict_is_normalized() {
        let backend = ScriptedBackend::new(vec![
            tool_call(
                "submit_triage",
                json!({
                    "priority": "HIGH",
                    "exploitability": "Easy",
                    "impact": "catastrophic",
                    "cvss_estimate": 14.2,
                    "reasoning": "Reachable from the login form",
                    "recommended_action": "Parameterize the query",
                    "estimated_effort": "2 hours"
                }),
            ),
            text("Submitted."),
        ]);
        let mut triage = agent(backend.clone());

        let result = triage
            .triage_vulnerability(&sample_vuln("vuln_1", Severity::Critical))
            .await
            .unwrap();

        assert_eq!(result.vulnerability_id, "vuln_1");
        assert_eq!(result.priority, Priority::High);
        assert_eq!(result.exploitability, Exploitability::Easy);
        assert_eq!(result.impact, Severity::Medium);
        assert_eq!(result.cvss_estimate, 10.0);
        assert!(result.is_high_priority());

        let prompt = &backend.requests()[0].messages[1].content;
        assert!(prompt.contains("Vulnerability ID: vuln_1"));
        assert!(prompt.contains("CWE: CWE-89"));
        assert!(prompt.contains("Remediation suggestion: None provided"));
    }

    #[tokio::test]
    async fn test_no_submission_yields_fallback_not_stale_result() {
        let backend = ScriptedBackend::new(vec![
            tool_call("submit_triage", json!({"priority": "critical"})),
            text("done"),
            text("I refuse to triage this."),
        ]);
        let mut triage = agent(backend);

        let first = triage
            .triage_vulnerability(&sample_vuln("vuln_1", Severity::High))
            .await
            .unwrap();
        assert_eq!(first.priority, Priority::Critical);

        let second = triage
            .triage_vulnerability(&sample_vuln("vuln_2", Severity::Low))
            .await
            .unwrap();
        assert_eq!(second.vulnerability_id, "vuln_2");
        assert_eq!(second.priority, Priority::Medium);
        assert_eq!(second.exploitability, Exploitability::Unknown);
        assert_eq!(second.cvss_estimate, 5.0);
        assert_eq!(second.reasoning, "Triage failed - using default values");

        assert_eq!(triage.triage_results().len(), 2);
        assert_eq!(triage.by_priority(Priority::Critical).len(), 1);
        assert_eq!(triage.by_priority(Priority::Low).len(), 0);
    }

    #[tokio::test]
    async fn test_batch_triage_preserves_order() {
        let backend = ScriptedBackend::new(vec![]);
        let mut triage = agent(backend);
        let vulns = vec![
            sample_vuln("a", Severity::High),
            sample_vuln("b", Severity::Low),
        ];

        let results = triage.triage_vulnerabilities(&vulns).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.vulnerability_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(triage.results()["total"], 2);
    }

    #[test]
    fn test_submit_without_current_vulnerability() {
        let mut ws = TriageWorkspace::default();
        let out = submit_triage(&mut ws, &ToolArgs::default()).unwrap();
        assert_eq!(out.into_text(), "Error: No vulnerability being triaged");
        assert!(ws.results.is_empty());
    }

    proptest! {
        #[test]
        fn prop_cvss_and_priority_are_bounded(cvss in -100.0f64..100.0, raw in "[a-zA-Z]{0,10}") {
            let mut ws = TriageWorkspace {
                current: Some(sample_vuln("v", Severity::Medium)),
                ..Default::default()
            };
            submit_triage(
                &mut ws,
                &ToolArgs::from_value(json!({"cvss_estimate": cvss, "priority": raw})),
            )
            .unwrap();
            let result = &ws.results[0];
            prop_assert!((0.0..=10.0).contains(&result.cvss_estimate));
            prop_assert!(Severity::ALL.contains(&result.priority));
        }
    }
}
