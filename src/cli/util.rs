//! CLI Common Utilities
//!
//! Shared initialization and report rendering for command handlers.

use serde::Serialize;
use std::sync::Arc;

use crate::agents::AgentOptions;
use crate::ai::{ModelGateway, install_gateway};
use crate::cli::progress::ConsoleRenderer;
use crate::cli::ui::Output;
use crate::config::{ApiKeys, Config, ConfigLoader};
use crate::notifier::{ObserverId, notifier};
use crate::pipeline::{Orchestrator, ReportStore, ReportSummary, SessionReport};
use crate::types::{Result, SessionId};

/// Command execution context
///
/// Loaded configuration plus the report store it points at. Commands that
/// talk to a model also install the process-wide gateway through
/// [`CommandContext::orchestrator`].
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub store: Arc<ReportStore>,
}

impl CommandContext {
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::load()?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        let store = Arc::new(ReportStore::from_config(&config));
        Self { config, store }
    }

    /// Gateway over the loaded `llm` section and environment keys, installed
    /// as the shared instance
    pub fn install_gateway(&self) -> Result<Arc<ModelGateway>> {
        let keys = ApiKeys::from_env();
        if !keys.has_any_key() {
            tracing::warn!(
                "No API keys configured; set {}, {} or {}",
                ApiKeys::OPENAI_VAR,
                ApiKeys::ANTHROPIC_VAR,
                ApiKeys::GOOGLE_VAR
            );
        }
        let gateway = ModelGateway::from_config(&self.config.llm, &keys)?;
        Ok(install_gateway(gateway))
    }

    /// Orchestrator for this context, with an optional per-run model override
    pub fn orchestrator(&self, model: Option<String>) -> Result<Orchestrator> {
        let gateway = self.install_gateway()?;
        let mut options = AgentOptions::from_config(&self.config);
        if let Some(model) = model {
            options = options.with_model(model);
        }
        Ok(Orchestrator::new(
            gateway,
            options,
            self.config.pipeline.clone(),
            Arc::clone(&self.store),
        ))
    }
}

/// Attach a console renderer to the shared notifier for the guard's lifetime
pub struct ProgressGuard {
    id: Option<ObserverId>,
}

impl ProgressGuard {
    pub fn attach(enabled: bool, details: bool) -> Self {
        let id = enabled
            .then(|| notifier().register(Arc::new(ConsoleRenderer::new().with_details(details))));
        Self { id }
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            notifier().unregister(id);
        }
    }
}

/// Parse an optional `--session` argument
pub fn parse_session(session: Option<String>) -> Result<Option<SessionId>> {
    session
        .map(|s| {
            let id = SessionId::new(s);
            id.validate()?;
            Ok(id)
        })
        .transpose()
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human-readable report, or the stored JSON when `as_json` is set
pub fn print_report(report: &SessionReport, as_json: bool) -> Result<()> {
    if as_json {
        return print_json(report);
    }

    let out = Output::new();
    out.header(&format!("Report {}", report.session_id));
    out.field("Type", report.analysis_type);
    out.field("Status", report.status);
    if let Some(target) = report.target.as_deref() {
        out.field("Target", target.lines().next().unwrap_or_default());
    }
    if let Some(project) = report.project_path.as_deref() {
        out.field("Project", project);
    }
    if let Some(commit) = report.commit_id.as_deref() {
        out.field("Commit", commit);
    }
    if let Some(files) = report.files_analyzed {
        out.field("Files", files);
    }
    out.field("Cost", format!("${:.4}", report.cost));

    if !report.vulnerabilities.is_empty() {
        out.section(&format!("Vulnerabilities ({})", report.vulnerabilities.len()));
        for vuln in &report.vulnerabilities {
            out.finding(
                vuln.severity,
                &vuln.vuln_type,
                &format!("{}:{}", vuln.file_path, vuln.line_number),
            );
        }
    }

    if !report.diff_findings.is_empty() {
        out.section(&format!("Commit findings ({})", report.diff_findings.len()));
        for finding in &report.diff_findings {
            out.finding(
                finding.severity,
                &finding.vuln_type,
                &format!("{}:{}", finding.file_path, finding.line_number),
            );
        }
    }

    let high = report.high_priority_vulnerabilities();
    if !high.is_empty() {
        out.section(&format!("High priority ({})", high.len()));
        for vuln in &high {
            let patched = report.patches.iter().any(|p| p.vulnerability_id == vuln.vuln_id);
            let exploits = report
                .povs
                .iter()
                .filter(|p| p.vulnerability_id == vuln.vuln_id)
                .count();
            println!(
                "  {} {} (patch: {}, povs: {})",
                vuln.vuln_id,
                vuln.vuln_type,
                if patched { "yes" } else { "no" },
                exploits
            );
        }
    }

    if !report.input_formats.is_empty() {
        out.section("Input formats");
        for format in &report.input_formats {
            println!("  {} ({} bytes)", format.name, format.total_size);
            for field in &format.fields {
                println!(
                    "    {:>6} +{:<4} {:<16} {}",
                    field.offset, field.size, field.name, field.field_type
                );
            }
        }
    }

    if let Some(summary) = &report.summary {
        out.section("Summary");
        match summary {
            ReportSummary::Analysis(s) => {
                out.field("Total", s.total_vulnerabilities);
                out.field("By severity", s.by_severity);
                out.field("High priority", s.high_priority_count);
                out.field("Patches", s.patches_generated);
                out.field("POVs", s.povs_generated);
                out.field("Debug plans", s.debug_sessions);
                out.field("Fuzz inputs", s.fuzzing_inputs);
            }
            ReportSummary::Diff(s) => {
                out.field("Total", s.total_vulnerabilities);
                out.field("By severity", s.by_severity);
            }
            ReportSummary::Corpus(s) => {
                out.field("Inputs", s.inputs_analyzed);
                out.field("Formats", s.formats_decoded);
                out.field("Fields", s.fields_found);
            }
        }
    }

    if !report.errors.is_empty() {
        out.section(&format!("Errors ({})", report.errors.len()));
        for error in &report.errors {
            out.warning(error);
        }
    }

    Ok(())
}
