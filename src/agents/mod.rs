//! Security Review Agents
//!
//! Every agent is a configuration of the shared [`AgentRuntime`] loop: a
//! fixed profile (id, system prompt, temperature), a tool registry that
//! records typed findings into an agent-owned workspace, and a few entry
//! points that build the user prompt and collect what the model submitted.
//!
//! ## Agents
//!
//! | Agent | Entry points | Finding |
//! |-------|--------------|---------|
//! | `vuln_analyzer` | `analyze_code`, `analyze_file` | [`Vulnerability`] |
//! | `triage_agent` | `triage_vulnerability(ies)` | [`TriageResult`] |
//! | `patch_producer` | `generate_patch(es)` | [`SecurityPatch`] |
//! | `diff_analyzer` | `analyze_diff`, `analyze_commit_with_context` | [`DiffVulnerability`] |
//! | `pov_producer` | `generate_pov` | [`ExploitPov`] |
//! | `dynamic_debug` | `plan_debug_session` | [`DebugSession`] |
//! | `branch_flipper` | `generate_flip_input` | [`FlipInput`] |
//! | `harness_decoder` | `decode_input`, `infer_format` | [`InputFormat`] |
//! | `coverage_analyzer` | `analyze_coverage`, `suggest_tests` | [`CoverageReport`] |

pub mod branch_flipper;
pub mod coverage_analyzer;
pub mod diff_analyzer;
pub mod dynamic_debug;
pub mod execution;
pub mod harness_decoder;
pub mod patch_producer;
pub mod pov_producer;
pub mod runtime;
pub mod tools;
pub mod triage;
pub mod vuln_analyzer;

#[cfg(test)]
pub(crate) mod testing;

pub use branch_flipper::{BranchFlipper, BranchTarget, FlipInput};
pub use coverage_analyzer::{CoverageAnalyzer, CoverageData, CoverageGap, CoverageReport};
pub use diff_analyzer::{DiffAnalyzer, DiffVulnerability};
pub use dynamic_debug::{Breakpoint, DebugAction, DebugSession, DynamicDebugAgent};
pub use execution::{AgentInfo, ExecutionRecord, ExecutionStatus, ExecutionSummary, ToolCallRecord};
pub use harness_decoder::{DecodedField, HarnessDecoder, InputFormat};
pub use patch_producer::{PatchProducer, PatchType, SecurityPatch};
pub use pov_producer::{ExploitPov, PovProducer, RiskLevel};
pub use runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
pub use tools::{FnTool, ParamKind, ParamSpec, Tool, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
pub use triage::{Exploitability, TriageAgent, TriageResult};
pub use vuln_analyzer::{FindingOrigin, VulnAnalyzer, Vulnerability};

use serde_json::Value;
use std::sync::Arc;

use crate::ai::ModelGateway;

/// Read-only view shared by every agent
pub trait SecurityAgent {
    type Workspace: Send + 'static;

    fn runtime(&self) -> &AgentRuntime<Self::Workspace>;

    /// Findings accumulated by the most recent entry-point call. Never fails;
    /// an agent that has found nothing reports empty collections.
    fn results(&self) -> Value;

    fn info(&self) -> AgentInfo {
        self.runtime().info()
    }

    fn execution(&self) -> &ExecutionRecord {
        self.runtime().execution()
    }

    fn run_cost(&self) -> f64 {
        self.runtime().run_cost()
    }

    fn lifetime_cost(&self) -> f64 {
        self.runtime().lifetime_cost()
    }
}

/// One instance of each agent, sharing a gateway
pub struct AgentSuite {
    pub vuln: VulnAnalyzer,
    pub triage: TriageAgent,
    pub patch: PatchProducer,
    pub diff: DiffAnalyzer,
    pub pov: PovProducer,
    pub debug: DynamicDebugAgent,
    pub flipper: BranchFlipper,
    pub harness: HarnessDecoder,
    pub coverage: CoverageAnalyzer,
}

impl AgentSuite {
    pub fn new(gateway: Arc<ModelGateway>, options: &AgentOptions) -> Self {
        Self {
            vuln: VulnAnalyzer::new(gateway.clone(), options.clone()),
            triage: TriageAgent::new(gateway.clone(), options.clone()),
            patch: PatchProducer::new(gateway.clone(), options.clone()),
            diff: DiffAnalyzer::new(gateway.clone(), options.clone()),
            pov: PovProducer::new(gateway.clone(), options.clone()),
            debug: DynamicDebugAgent::new(gateway.clone(), options.clone()),
            flipper: BranchFlipper::new(gateway.clone(), options.clone()),
            harness: HarnessDecoder::new(gateway.clone(), options.clone()),
            coverage: CoverageAnalyzer::new(gateway, options.clone()),
        }
    }

    pub fn infos(&self) -> Vec<AgentInfo> {
        vec![
            self.vuln.info(),
            self.triage.info(),
            self.patch.info(),
            self.diff.info(),
            self.pov.info(),
            self.debug.info(),
            self.flipper.info(),
            self.harness.info(),
            self.coverage.info(),
        ]
    }

    /// Sum of every agent's cost since construction
    pub fn total_cost(&self) -> f64 {
        self.vuln.lifetime_cost()
            + self.triage.lifetime_cost()
            + self.patch.lifetime_cost()
            + self.diff.lifetime_cost()
            + self.pov.lifetime_cost()
            + self.debug.lifetime_cost()
            + self.flipper.lifetime_cost()
            + self.harness.lifetime_cost()
            + self.coverage.lifetime_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{ScriptedBackend, gateway_with};

    #[test]
    fn test_suite_lists_every_agent_once() {
        let suite = AgentSuite::new(
            gateway_with(ScriptedBackend::new(vec![])),
            &AgentOptions::default(),
        );
        let infos = suite.infos();
        let ids: Vec<&str> = infos.iter().map(|i| i.id).collect();
        assert_eq!(
            ids,
            vec![
                "vuln_analyzer",
                "triage_agent",
                "patch_producer",
                "diff_analyzer",
                "pov_producer",
                "dynamic_debug",
                "branch_flipper",
                "harness_decoder",
                "coverage_analyzer",
            ]
        );
        assert!(infos.iter().all(|i| !i.tools.is_empty()));
        assert!(infos.iter().all(|i| i.status == ExecutionStatus::Idle));
        assert_eq!(suite.total_cost(), 0.0);
    }

    #[test]
    fn test_results_on_fresh_agents_are_empty() {
        let suite = AgentSuite::new(
            gateway_with(ScriptedBackend::new(vec![])),
            &AgentOptions::default(),
        );
        assert_eq!(suite.vuln.results()["total"], 0);
        assert_eq!(suite.triage.results()["total"], 0);
        assert_eq!(suite.patch.results()["total"], 0);
        assert_eq!(suite.diff.results()["total_found"], 0);
        assert_eq!(suite.pov.results()["total_generated"], 0);
        assert_eq!(suite.debug.results()["total"], 0);
        assert_eq!(suite.flipper.results()["total_generated"], 0);
        assert_eq!(suite.harness.results()["total_decoded"], 0);
        assert_eq!(suite.coverage.results()["total_gaps"], 0);
    }
}
