//! Analysis Pipeline
//!
//! Drives one target through the agent suite and persists exactly one
//! [`SessionReport`] per run.
//!
//! ## Stages
//!
//! ```text
//! Scan ─→ Vulnerability detection ─┐
//!   └──→ Working-tree diff ────────┴─→ Triage ─→ Deep dive ─→ Coverage
//!                                              (high priority only)
//! ```
//!
//! 1. **Scan**: source files for a project, one unit for a file or code string
//! 2. **Detection**: per unit; a failing file is skipped
//! 3. **Diff**: uncommitted changes, analyzed concurrently with stage 2
//! 4. **Triage**: every finding; critical/high verdicts form the deep-dive set
//! 5. **Deep dive**: patch, exploit POV, debug plan, fuzz inputs (first
//!    `fuzz_limit` items); a failing item is skipped
//! 6. **Coverage**: single file or code only, best-effort
//!
//! Anything escaping the stages fails the run; the report is still written
//! with status `failed`.
//!
//! Commit review ([`Orchestrator::run_commit_analysis`]) and corpus decoding
//! ([`Orchestrator::run_corpus_analysis`]) are separate single-agent runs
//! with their own report shapes.

pub mod git;
pub mod report;
pub mod scanner;
pub mod store;

pub use git::{CommitDiff, commit_diff, parse_diff_line_numbers, working_tree_diff};
pub use report::{
    AnalysisKind, AnalysisSummary, CorpusSummary, DiffSummary, ReportStatus, ReportSummary,
    SessionReport,
};
pub use scanner::SourceScanner;
pub use store::{ReportStats, ReportStore, StoredReport};

use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::agents::{
    AgentOptions, AgentSuite, BranchTarget, CoverageData, DiffAnalyzer, HarnessDecoder,
    SecurityAgent, VulnAnalyzer, Vulnerability,
};
use crate::ai::ModelGateway;
use crate::config::{ApiKeys, Config, PipelineConfig};
use crate::constants::pipeline::INLINE_CODE_PATH;
use crate::notifier::{EventKind, ProgressNotifier};
use crate::types::{Result, ScoutError, SessionId, decode_hex_or_raw};

// =============================================================================
// Targets
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisTarget {
    File(PathBuf),
    Project(PathBuf),
    Code(String),
}

impl AnalysisTarget {
    /// Directory → project, anything else → file, unless `as_code` is set
    pub fn infer(arg: &str, as_code: bool) -> Self {
        if as_code {
            return Self::Code(arg.to_string());
        }
        let path = PathBuf::from(arg);
        if path.is_dir() {
            Self::Project(path)
        } else {
            Self::File(path)
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        match self {
            Self::File(_) => AnalysisKind::File,
            Self::Project(_) => AnalysisKind::Project,
            Self::Code(_) => AnalysisKind::Code,
        }
    }

    /// Value recorded as the report's `target`
    pub fn label(&self) -> String {
        match self {
            Self::File(p) | Self::Project(p) => p.display().to_string(),
            Self::Code(code) => code.clone(),
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            Self::File(p) | Self::Project(p) => Some(p),
            Self::Code(_) => None,
        }
    }
}

impl fmt::Display for AnalysisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(p) => write!(f, "file {}", p.display()),
            Self::Project(p) => write!(f, "project {}", p.display()),
            Self::Code(code) => write!(f, "inline code ({} chars)", code.chars().count()),
        }
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Session-bound view of the notifier
struct Progress<'a> {
    notifier: &'a ProgressNotifier,
    session_id: &'a str,
}

impl<'a> Progress<'a> {
    fn emit(&self, kind: EventKind, data: Value) {
        self.notifier.emit(self.session_id, kind, data);
    }

    fn step_started(&self, step: &str, message: &str) {
        self.emit(
            EventKind::StepStarted,
            json!({"step": step, "message": message, "details": {}}),
        );
    }

    fn step_completed(&self, step: &str, message: String, details: Value) {
        self.emit(
            EventKind::StepCompleted,
            json!({"step": step, "message": message, "details": details}),
        );
    }

    fn vulnerability_found(&self, vuln: &impl serde::Serialize, severity: impl fmt::Display) {
        self.emit(
            EventKind::VulnerabilityFound,
            json!({
                "message": format!("Found {} severity vulnerability", severity),
                "vulnerability": vuln,
            }),
        );
    }
}

/// Output of stages 1-2
#[derive(Default)]
struct ScanOutcome {
    vulnerabilities: Vec<Vulnerability>,
    /// Analyzed source by file label, for the deep-dive stages
    sources: HashMap<String, String>,
    files_analyzed: Option<usize>,
    skipped: Vec<String>,
}

async fn read_source(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Per-item deep-dive failure: logged and kept in the report
fn record_failure(report: &mut SessionReport, stage: &str, vuln_id: &str, e: &ScoutError) {
    warn!("{} failed for {}: {}", stage, vuln_id, e);
    report
        .errors
        .push(format!("{} failed for {}: {}", stage, vuln_id, e));
}

fn file_name(label: &str) -> &str {
    Path::new(label)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(label)
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    gateway: Arc<ModelGateway>,
    options: AgentOptions,
    pipeline: PipelineConfig,
    store: Arc<ReportStore>,
    notifier: Arc<ProgressNotifier>,
    detect_git: bool,
    exclude: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ModelGateway>,
        options: AgentOptions,
        pipeline: PipelineConfig,
        store: Arc<ReportStore>,
    ) -> Self {
        Self {
            gateway,
            options,
            pipeline,
            store,
            notifier: crate::notifier::notifier(),
            detect_git: true,
            exclude: Vec::new(),
        }
    }

    /// Installs a gateway built from `config.llm` as the shared instance
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway = ModelGateway::from_config(&config.llm, &ApiKeys::from_env())?;
        Ok(Self::new(
            crate::ai::install_gateway(gateway),
            AgentOptions::from_config(config),
            config.pipeline.clone(),
            Arc::new(ReportStore::from_config(config)),
        ))
    }

    pub fn with_notifier(mut self, notifier: Arc<ProgressNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    /// Toggle working-tree diff detection for file and project targets
    pub fn with_git_detection(mut self, enabled: bool) -> Self {
        self.detect_git = enabled;
        self
    }

    /// Glob patterns excluded from project scans
    pub fn with_exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    fn session_for(&self, kind: AnalysisKind, requested: Option<SessionId>) -> Result<SessionId> {
        let id = requested.unwrap_or_else(|| SessionId::generate(kind.session_prefix()));
        id.validate()?;
        Ok(id)
    }

    /// Terminal event, persistence and stats, in that order
    async fn finish(
        &self,
        mut report: SessionReport,
        outcome: Result<ReportSummary>,
        progress: &Progress<'_>,
    ) -> Result<SessionReport> {
        match outcome {
            Ok(summary) => {
                info!(
                    session = %report.session_id,
                    vulnerabilities = summary.total_vulnerabilities(),
                    cost = report.cost,
                    "Analysis completed"
                );
                progress.emit(
                    EventKind::AnalysisCompleted,
                    json!({"message": "Analysis completed", "summary": summary}),
                );
                report.complete(summary);
            }
            Err(e) => {
                error!(session = %report.session_id, "Analysis failed: {}", e);
                progress.emit(
                    EventKind::AnalysisFailed,
                    json!({"message": "Analysis failed", "error": e.to_string()}),
                );
                report.fail(e.to_string());
            }
        }

        self.store.save(&report).await?;
        if report.is_completed()
            && let Err(e) = self.store.record_completed(&report).await
        {
            warn!(session = %report.session_id, "Failed to update stats: {}", e);
        }
        Ok(report)
    }

    /// Full review of a file, project or code string
    #[instrument(skip(self, target, session), fields(kind = %target.kind()))]
    pub async fn run_analysis(
        &self,
        target: AnalysisTarget,
        session: Option<SessionId>,
    ) -> Result<SessionReport> {
        let session_id = self.session_for(target.kind(), session)?;
        let progress = Progress {
            notifier: &self.notifier,
            session_id: session_id.as_str(),
        };
        let mut report =
            SessionReport::new(session_id.clone(), target.kind()).with_target(target.label());
        let mut suite = AgentSuite::new(self.gateway.clone(), &self.options);

        info!(session = %session_id, "Starting analysis of {}", target);
        progress.emit(
            EventKind::AnalysisStarted,
            json!({
                "target": target.label(),
                "analysis_type": target.kind(),
                "message": "Analysis started",
            }),
        );

        let outcome = self
            .analyze(&target, &mut suite, &mut report, &progress)
            .await;
        report.cost = suite.total_cost();

        self.finish(report, outcome, &progress).await
    }

    async fn analyze(
        &self,
        target: &AnalysisTarget,
        suite: &mut AgentSuite,
        report: &mut SessionReport,
        progress: &Progress<'_>,
    ) -> Result<ReportSummary> {
        let git_diff = match target.path() {
            Some(path) if self.detect_git => working_tree_diff(path).await,
            _ => None,
        };
        let label = target.label();

        // ===== STAGES 1-3: Scan, detection, diff (concurrent) =====
        let (scanned, diffed) = {
            let AgentSuite { vuln, diff, .. } = &mut *suite;
            let scan = self.scan(target, vuln, progress);
            let diff_review = async {
                let diff_text = git_diff?;
                progress.step_started("diff_analyzer", "Analyzing git diff in parallel...");
                Some(diff.analyze_diff(&diff_text, &label).await)
            };
            tokio::join!(scan, diff_review)
        };
        let mut scanned = scanned?;
        report.errors.append(&mut scanned.skipped);
        report.files_analyzed = scanned.files_analyzed;

        let mut vulnerabilities = scanned.vulnerabilities;
        match diffed {
            Some(Ok(findings)) => {
                progress.step_completed(
                    "diff_analyzer",
                    format!("Found {} diff issues", findings.len()),
                    json!({"count": findings.len()}),
                );
                for finding in &findings {
                    progress.vulnerability_found(finding, finding.severity);
                }
                vulnerabilities.extend(findings.into_iter().map(Vulnerability::from));
            }
            Some(Err(e)) => {
                warn!("Diff analysis failed: {}", e);
                report.errors.push(format!("Diff analysis failed: {}", e));
            }
            None => {}
        }

        let found = vulnerabilities.len();
        progress.step_completed(
            "vuln_analyzer",
            match scanned.files_analyzed {
                Some(files) => format!("Found {} total vulnerabilities in {} files", found, files),
                None => format!("Found {} vulnerabilities", found),
            },
            json!({"count": found}),
        );
        info!("Found {} vulnerabilities", found);
        report.vulnerabilities = vulnerabilities;

        // ===== STAGE 4: Triage =====
        if !report.vulnerabilities.is_empty() {
            self.triage(suite, report, progress).await;
        }

        // ===== STAGE 5: Deep dive =====
        let high_priority = report.high_priority_vulnerabilities();
        if !high_priority.is_empty() {
            self.deep_dive(&high_priority, &scanned.sources, suite, report, progress)
                .await;
        }

        // ===== STAGE 6: Coverage =====
        if !matches!(target, AnalysisTarget::Project(_))
            && let Some((path, code)) = scanned.sources.iter().next()
            && !code.is_empty()
        {
            progress.step_started("coverage_analyzer", "Analyzing code coverage gaps...");
            let data = CoverageData::unmeasured(path.clone(), code.split('\n').count());
            match suite.coverage.analyze_coverage(data, code).await {
                Ok(coverage) => {
                    report.coverage_analysis = coverage;
                    progress.step_completed(
                        "coverage_analyzer",
                        "Coverage analysis complete".to_string(),
                        json!({}),
                    );
                }
                Err(e) => warn!("Coverage analysis failed: {}", e),
            }
        }

        Ok(ReportSummary::Analysis(report.analysis_summary()))
    }

    /// Stages 1-2. Per-file failures in a project are collected, a failing
    /// single unit fails the stage.
    async fn scan(
        &self,
        target: &AnalysisTarget,
        agent: &mut VulnAnalyzer,
        progress: &Progress<'_>,
    ) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();

        let (label, code) = match target {
            AnalysisTarget::Project(root) => {
                let files = SourceScanner::new(root, &self.pipeline)
                    .with_exclude(&self.exclude)
                    .scan()?;
                let total = files.len();
                progress.step_completed(
                    "scanner",
                    format!("Found {} code files", total),
                    json!({"file_count": total}),
                );
                info!("Found {} files to analyze", total);
                progress.step_started("vuln_analyzer", "Analyzing project files...");

                for (i, path) in files.iter().enumerate() {
                    let label = path.display().to_string();
                    progress.emit(
                        EventKind::FileStarted,
                        json!({
                            "file": label,
                            "index": i + 1,
                            "total": total,
                            "message": format!("Analyzing {} ({}/{})", file_name(&label), i + 1, total),
                        }),
                    );

                    let code = match read_source(path).await {
                        Ok(code) => code,
                        Err(e) => {
                            warn!("Skipping {}: {}", label, e);
                            outcome.skipped.push(format!("{}: {}", label, e));
                            continue;
                        }
                    };
                    if code.trim().chars().count() < self.pipeline.min_code_chars {
                        continue;
                    }

                    match agent.analyze_code(&code, &label).await {
                        Ok(found) => {
                            progress.emit(
                                EventKind::FileCompleted,
                                json!({
                                    "file": label,
                                    "vulns_found": found.len(),
                                    "message": format!(
                                        "Found {} vulnerabilities in {}",
                                        found.len(),
                                        file_name(&label)
                                    ),
                                }),
                            );
                            for vuln in &found {
                                progress.vulnerability_found(vuln, vuln.severity);
                            }
                            outcome.vulnerabilities.extend(found);
                            outcome.sources.insert(label, code);
                        }
                        Err(e) => {
                            warn!("Error analyzing {}: {}", label, e);
                            outcome.skipped.push(format!("{}: {}", label, e));
                        }
                    }
                }

                outcome.files_analyzed = Some(total);
                return Ok(outcome);
            }
            AnalysisTarget::File(path) => (path.display().to_string(), read_source(path).await?),
            AnalysisTarget::Code(code) => (INLINE_CODE_PATH.to_string(), code.clone()),
        };

        progress.step_started("vuln_analyzer", "Analyzing code for vulnerabilities...");
        let found = agent.analyze_code(&code, &label).await?;
        for vuln in &found {
            progress.vulnerability_found(vuln, vuln.severity);
        }
        outcome.vulnerabilities = found;
        outcome.sources.insert(label, code);
        Ok(outcome)
    }

    async fn triage(&self, suite: &mut AgentSuite, report: &mut SessionReport, progress: &Progress<'_>) {
        progress.step_started("triage_agent", "Triaging vulnerabilities...");

        for vuln in &report.vulnerabilities {
            match suite.triage.triage_vulnerability(vuln).await {
                Ok(verdict) => report.triage_results.push(verdict),
                Err(e) => {
                    warn!("Triage failed for {}: {}", vuln.vuln_id, e);
                    report
                        .errors
                        .push(format!("Triage failed for {}: {}", vuln.vuln_id, e));
                }
            }
        }

        let high = report
            .triage_results
            .iter()
            .filter(|t| t.is_high_priority())
            .count();
        progress.step_completed(
            "triage_agent",
            format!("{} high priority vulnerabilities", high),
            json!({"high_priority": high}),
        );
        info!("{} high priority vulnerabilities", high);
    }

    /// Stage 5. Items run one at a time; a failing item is recorded and skipped.
    async fn deep_dive(
        &self,
        targets: &[Vulnerability],
        sources: &HashMap<String, String>,
        suite: &mut AgentSuite,
        report: &mut SessionReport,
        progress: &Progress<'_>,
    ) {
        let source_for = |vuln: &Vulnerability| -> String {
            sources
                .get(&vuln.file_path)
                .cloned()
                .unwrap_or_else(|| vuln.code_snippet.clone())
        };

        progress.step_started(
            "patch_producer",
            "Generating patches for high priority vulnerabilities...",
        );
        for vuln in targets {
            match suite.patch.generate_patch(vuln).await {
                Ok(patch) => report.patches.push(patch),
                Err(e) => record_failure(report, "Patch generation", &vuln.vuln_id, &e),
            }
        }
        progress.step_completed(
            "patch_producer",
            format!("Generated {} patches", report.patches.len()),
            json!({"count": report.patches.len()}),
        );

        progress.step_started("pov_producer", "Generating proof-of-concept exploits...");
        for vuln in targets {
            match suite.pov.generate_pov(vuln).await {
                Ok(povs) => report.povs.extend(povs),
                Err(e) => record_failure(report, "POV generation", &vuln.vuln_id, &e),
            }
        }
        progress.step_completed(
            "pov_producer",
            format!("Generated {} POVs", report.povs.len()),
            json!({"count": report.povs.len()}),
        );

        progress.step_started("dynamic_debug", "Creating debug sessions...");
        for vuln in targets {
            match suite.debug.plan_debug_session(vuln, &source_for(vuln)).await {
                Ok(Some(session)) => report.debug_sessions.push(session),
                Ok(None) => {}
                Err(e) => record_failure(report, "Debug planning", &vuln.vuln_id, &e),
            }
        }
        progress.step_completed(
            "dynamic_debug",
            format!("Created {} debug sessions", report.debug_sessions.len()),
            json!({"count": report.debug_sessions.len()}),
        );

        progress.step_started("branch_flipper", "Generating targeted fuzzing inputs...");
        for vuln in targets.iter().take(self.pipeline.fuzz_limit) {
            let branch = BranchTarget::from(vuln);
            match suite
                .flipper
                .generate_flip_input(&branch, &source_for(vuln), &[])
                .await
            {
                Ok(inputs) => report.flip_inputs.extend(inputs),
                Err(e) => record_failure(report, "Flip input generation", &vuln.vuln_id, &e),
            }
        }
        progress.step_completed(
            "branch_flipper",
            format!("Generated {} fuzzing inputs", report.flip_inputs.len()),
            json!({"count": report.flip_inputs.len()}),
        );
    }

    /// Review one commit (or `compare_to..commit`). Git failures are returned
    /// as errors before any report exists.
    #[instrument(skip(self, session), fields(project = %project.display()))]
    pub async fn run_commit_analysis(
        &self,
        project: &Path,
        commit: &str,
        compare_to: Option<&str>,
        session: Option<SessionId>,
    ) -> Result<SessionReport> {
        let commit_diff =
            git::commit_diff(project, commit, compare_to, self.pipeline.max_commit_files).await?;

        let session_id = self.session_for(AnalysisKind::Diff, session)?;
        let progress = Progress {
            notifier: &self.notifier,
            session_id: session_id.as_str(),
        };
        let mut report = SessionReport::new(session_id.clone(), AnalysisKind::Diff);
        report.project_path = Some(project.display().to_string());
        report.commit_id = Some(commit.to_string());
        report.commit_message = Some(commit_diff.message.clone());

        info!(session = %session_id, "Starting commit analysis of {}", commit);
        progress.emit(
            EventKind::AnalysisStarted,
            json!({
                "target": project.display().to_string(),
                "analysis_type": AnalysisKind::Diff,
                "message": "Analysis started",
            }),
        );
        progress.step_started("diff_analyzer", "Analyzing commit for security issues...");

        let mut agent = DiffAnalyzer::new(self.gateway.clone(), self.options.clone());
        let outcome = agent
            .analyze_commit_with_context(
                &commit_diff.diff,
                &commit_diff.message,
                commit_diff.file_contents,
                commit_diff.changed_lines,
            )
            .await
            .map(|findings| {
                progress.step_completed(
                    "diff_analyzer",
                    format!("Found {} issues", findings.len()),
                    json!({"count": findings.len()}),
                );
                for finding in &findings {
                    progress.vulnerability_found(finding, finding.severity);
                }
                let summary = DiffSummary {
                    by_severity: agent.severity_counts(),
                    total_vulnerabilities: findings.len(),
                };
                report.diff_findings = findings;
                ReportSummary::Diff(summary)
            });
        report.cost = agent.lifetime_cost();

        self.finish(report, outcome, &progress).await
    }

    /// Infer the layout of fuzzer corpus inputs (hex, or raw text)
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub async fn run_corpus_analysis(
        &self,
        inputs: &[String],
        harness_code: &str,
        session: Option<SessionId>,
    ) -> Result<SessionReport> {
        if inputs.is_empty() {
            return Err(ScoutError::Validation(
                "At least one input is required".to_string(),
            ));
        }

        let session_id = self.session_for(AnalysisKind::Corpus, session)?;
        let progress = Progress {
            notifier: &self.notifier,
            session_id: session_id.as_str(),
        };
        let mut report = SessionReport::new(session_id.clone(), AnalysisKind::Corpus);

        info!(session = %session_id, "Starting corpus analysis of {} inputs", inputs.len());
        progress.emit(
            EventKind::AnalysisStarted,
            json!({
                "target": "corpus",
                "analysis_type": AnalysisKind::Corpus,
                "message": "Analysis started",
            }),
        );
        progress.step_started("harness_decoder", "Decoding input formats...");

        let samples: Vec<Vec<u8>> = inputs
            .iter()
            .take(self.pipeline.max_corpus_samples)
            .map(|input| decode_hex_or_raw(input))
            .collect();

        let mut agent = HarnessDecoder::new(self.gateway.clone(), self.options.clone());
        let decoded = if samples.len() == 1 {
            agent.decode_input(&samples[0], harness_code).await
        } else {
            agent.infer_format(&samples).await
        };
        match decoded {
            Ok(format) => {
                report.input_formats.extend(format);
                progress.step_completed(
                    "harness_decoder",
                    format!("Decoded {} format(s)", report.input_formats.len()),
                    json!({}),
                );
            }
            Err(e) => {
                warn!("Decode error: {}", e);
                report.errors.push(e.to_string());
            }
        }
        report.cost = agent.lifetime_cost();

        let summary = CorpusSummary {
            inputs_analyzed: inputs.len(),
            formats_decoded: report.input_formats.len(),
            fields_found: report.input_formats.iter().map(|f| f.fields.len()).sum(),
        };
        self.finish(report, Ok(ReportSummary::Corpus(summary)), &progress)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::FindingOrigin;
    use crate::agents::testing::{ScriptedBackend, gateway_with, has_tool_results, text, tool_call};
    use crate::ai::{ChatRequest, ChatResponse};
    use crate::types::Severity;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::notifier::ProgressEvent;

    fn orchestrator(backend: Arc<ScriptedBackend>, reports: &Path) -> (Orchestrator, Arc<ProgressNotifier>) {
        let notifier = Arc::new(ProgressNotifier::new());
        let orchestrator = Orchestrator::new(
            gateway_with(backend),
            AgentOptions::default().with_max_iterations(4),
            PipelineConfig::default(),
            Arc::new(ReportStore::new(reports)),
        )
        .with_notifier(notifier.clone())
        .with_git_detection(false);
        (orchestrator, notifier)
    }

    fn system_prompt(request: &ChatRequest) -> &str {
        &request.messages[0].content
    }

    fn user_prompt(request: &ChatRequest) -> &str {
        &request.messages[1].content
    }

    fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Reports one high-severity finding per analyzed unit and submits a
    /// triage verdict of `priority`; every other agent just answers.
    fn reviewer(
        priority: &'static str,
    ) -> impl Fn(&ChatRequest) -> Result<ChatResponse> + Send + Sync + 'static {
        move |request: &ChatRequest| {
            if has_tool_results(request) {
                return Ok(text("Done."));
            }
            let system = system_prompt(request);
            if system.contains("vulnerability analyzer") {
                Ok(tool_call(
                    "report_vulnerability",
                    json!({
                        "vuln_type": "Command Injection",
                        "severity": "high",
                        "description": "user input reaches os.system",
                        "line_number": 2,
                    }),
                ))
            } else if system.contains("triage") {
                Ok(tool_call(
                    "submit_triage",
                    json!({"priority": priority, "exploitability": "easy", "cvss_estimate": 8.8}),
                ))
            } else {
                Ok(text("Nothing to add."))
            }
        }
    }

    #[tokio::test]
    async fn test_failing_file_does_not_sink_project() {
        let project = TempDir::new().unwrap();
        for i in 1..=10 {
            std::fs::write(
                project.path().join(format!("file_{:02}.py", i)),
                "import os\nos.system(input())\n",
            )
            .unwrap();
        }
        let reports = TempDir::new().unwrap();

        let inner = reviewer("low");
        let backend = ScriptedBackend::handler(move |request| {
            if user_prompt(request).contains("file_05") {
                return Err(ScoutError::LlmApi("backend exploded".into()));
            }
            inner(request)
        });
        let (orchestrator, _) = orchestrator(backend, reports.path());

        let report = orchestrator
            .run_analysis(AnalysisTarget::Project(project.path().to_path_buf()), None)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.files_analyzed, Some(10));
        assert_eq!(report.vulnerabilities.len(), 9);
        assert!(report.vulnerabilities.iter().all(|v| !v.file_path.contains("file_05")));
        assert!(report.errors.iter().any(|e| e.contains("file_05")));
        assert_eq!(report.triage_results.len(), 9);
        assert!(report.patches.is_empty());
        assert!(report.coverage_analysis.is_none());

        let saved = orchestrator.store().get(report.session_id.as_str()).await.unwrap();
        assert_eq!(saved.vulnerabilities.len(), 9);
    }

    #[tokio::test]
    async fn test_clean_code_completes_with_zero_counts() {
        let reports = TempDir::new().unwrap();
        let backend = ScriptedBackend::repeating(text("No vulnerabilities found."));
        let (orchestrator, _) = orchestrator(backend, reports.path());

        let report = orchestrator
            .run_analysis(
                AnalysisTarget::Code("def add(a, b):\n    return a + b\n".into()),
                Some(SessionId::new("clean")),
            )
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.vulnerabilities.is_empty());
        assert!(report.triage_results.is_empty());
        let Some(ReportSummary::Analysis(summary)) = &report.summary else {
            panic!("expected analysis summary");
        };
        assert_eq!(summary, &AnalysisSummary::default());

        let stats = orchestrator.store().stats().await.unwrap();
        assert_eq!(stats.total_reports, 1);
        assert_eq!(stats.total_vulnerabilities, 0);
    }

    #[tokio::test]
    async fn test_high_priority_findings_reach_every_deep_dive_stage() {
        let reports = TempDir::new().unwrap();
        let backend = ScriptedBackend::handler(reviewer("critical"));
        let (orchestrator, notifier) = orchestrator(backend.clone(), reports.path());
        let (_, mut rx) = notifier.subscribe();

        let report = orchestrator
            .run_analysis(
                AnalysisTarget::Code("import os\nos.system(input())\n".into()),
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.vulnerabilities.len(), 1);
        assert_eq!(report.vulnerabilities[0].severity, Severity::High);
        assert_eq!(report.vulnerabilities[0].file_path, INLINE_CODE_PATH);
        assert_eq!(report.triage_results[0].priority, Severity::Critical);
        // Fallback patch when the producer never submits
        assert_eq!(report.patches.len(), 1);
        assert!(report.povs.is_empty());
        assert!(report.debug_sessions.is_empty());
        assert!(report.cost > 0.0);

        let prompts: Vec<String> = backend
            .requests()
            .iter()
            .filter(|r| !has_tool_results(r))
            .map(|r| system_prompt(r).to_string())
            .collect();
        assert!(prompts.iter().any(|p| p.contains("fuzzing expert")));

        let events = drain(&mut rx);
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds.first(), Some(&EventKind::AnalysisStarted));
        assert_eq!(kinds.last(), Some(&EventKind::AnalysisCompleted));
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::VulnerabilityFound).count(),
            1
        );
        let found = events
            .iter()
            .find(|e| e.kind == EventKind::VulnerabilityFound)
            .unwrap();
        assert_eq!(found.field("message"), Some("Found high severity vulnerability"));
        let steps: Vec<&str> = events
            .iter()
            .filter(|e| e.kind == EventKind::StepCompleted)
            .filter_map(|e| e.field("step"))
            .collect();
        assert_eq!(
            steps,
            vec![
                "vuln_analyzer",
                "triage_agent",
                "patch_producer",
                "pov_producer",
                "dynamic_debug",
                "branch_flipper",
                "coverage_analyzer",
            ]
        );
    }

    /// Every unit yields a high finding triaged critical; each deep-dive
    /// agent submits one artifact. Patch requests naming `failing_file` fail.
    fn deep_diver(
        failing_file: Option<&'static str>,
    ) -> impl Fn(&ChatRequest) -> Result<ChatResponse> + Send + Sync + 'static {
        let inner = reviewer("critical");
        move |request: &ChatRequest| {
            if has_tool_results(request) {
                return Ok(text("Done."));
            }
            let system = system_prompt(request);
            if system.contains("patch developer") {
                if failing_file.is_some_and(|f| user_prompt(request).contains(f)) {
                    return Err(ScoutError::LlmApi("patch backend down".into()));
                }
                Ok(tool_call(
                    "submit_patch",
                    json!({"patched_code": "subprocess.run([cmd])", "confidence": 0.9}),
                ))
            } else if system.contains("proof-of-concept") {
                Ok(tool_call(
                    "submit_pov",
                    json!({"exploit_type": "injection", "payload": "; id", "risk_level": "low"}),
                ))
            } else if system.contains("debugging expert") {
                Ok(tool_call("submit_analysis", json!({"analysis": "Break on os.system"})))
            } else if system.contains("fuzzing expert") {
                Ok(tool_call("submit_flip_input", json!({"input_hex": "3b6964"})))
            } else {
                inner(request)
            }
        }
    }

    fn write_project(count: usize) -> TempDir {
        let project = TempDir::new().unwrap();
        for i in 1..=count {
            std::fs::write(
                project.path().join(format!("file_{:02}.py", i)),
                "import os\nos.system(input())\n",
            )
            .unwrap();
        }
        project
    }

    #[tokio::test]
    async fn test_fuzzing_stops_at_fuzz_limit() {
        let project = write_project(7);
        let reports = TempDir::new().unwrap();
        let backend = ScriptedBackend::handler(deep_diver(None));
        let (orchestrator, _) = orchestrator(backend.clone(), reports.path());

        let report = orchestrator
            .run_analysis(AnalysisTarget::Project(project.path().to_path_buf()), None)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.high_priority_vulnerabilities().len(), 7);
        assert_eq!(report.patches.len(), 7);
        assert_eq!(report.povs.len(), 7);
        assert_eq!(report.debug_sessions.len(), 7);

        let fuzz_limit = PipelineConfig::default().fuzz_limit;
        assert_eq!(fuzz_limit, 5);
        assert_eq!(report.flip_inputs.len(), fuzz_limit);
        let branches: std::collections::HashSet<&str> = report
            .flip_inputs
            .iter()
            .map(|input| input.branch_id.as_str())
            .collect();
        assert_eq!(branches.len(), fuzz_limit);

        let fuzz_calls = backend
            .requests()
            .iter()
            .filter(|r| !has_tool_results(r) && system_prompt(r).contains("fuzzing expert"))
            .count();
        assert_eq!(fuzz_calls, fuzz_limit);
    }

    #[tokio::test]
    async fn test_failed_patch_does_not_block_other_items() {
        let project = write_project(3);
        let reports = TempDir::new().unwrap();
        let backend = ScriptedBackend::handler(deep_diver(Some("file_02")));
        let (orchestrator, _) = orchestrator(backend, reports.path());

        let report = orchestrator
            .run_analysis(AnalysisTarget::Project(project.path().to_path_buf()), None)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        let high = report.high_priority_vulnerabilities();
        assert_eq!(high.len(), 3);
        let failed = high
            .iter()
            .find(|v| v.file_path.contains("file_02"))
            .unwrap();

        assert_eq!(report.patches.len(), 2);
        assert!(report.patches.iter().all(|p| p.vulnerability_id != failed.vuln_id));
        assert_eq!(report.povs.len(), 3);
        assert_eq!(report.debug_sessions.len(), 3);
        assert_eq!(report.flip_inputs.len(), 3);

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Patch generation failed"));
        assert!(report.errors[0].contains(&failed.vuln_id));

        let saved = orchestrator.store().get(report.session_id.as_str()).await.unwrap();
        assert_eq!(saved.errors, report.errors);
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) {
        let output = std::process::Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {:?} failed", args);
    }

    #[tokio::test]
    async fn test_dirty_worktree_merges_diff_findings() {
        if !git_available() {
            return;
        }
        let repo = TempDir::new().unwrap();
        let root = repo.path();
        git(root, &["init", "-q"]);
        std::fs::write(root.join("app.py"), "import os\nprint(1)\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "initial"]);
        std::fs::write(root.join("app.py"), "import os\nos.system(input())\n").unwrap();

        let reports = TempDir::new().unwrap();
        let inner = reviewer("low");
        let backend = ScriptedBackend::handler(move |request| {
            if !has_tool_results(request) && system_prompt(request).contains("code diffs") {
                return Ok(tool_call(
                    "report_vulnerability",
                    json!({
                        "file_path": "app.py",
                        "line_number": 2,
                        "change_type": "modified",
                        "vuln_type": "Code Injection",
                        "severity": "critical",
                        "new_code": "os.system(input())",
                    }),
                ));
            }
            inner(request)
        });
        let (orchestrator, _) = orchestrator(backend.clone(), reports.path());
        let orchestrator = orchestrator.with_git_detection(true);

        let report = orchestrator
            .run_analysis(AnalysisTarget::File(root.join("app.py")), None)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.vulnerabilities.len(), 2);
        let from_diff: Vec<&Vulnerability> = report
            .vulnerabilities
            .iter()
            .filter(|v| v.origin == FindingOrigin::Diff)
            .collect();
        assert_eq!(from_diff.len(), 1);
        assert_eq!(from_diff[0].vuln_type, "Code Injection");
        assert_eq!(from_diff[0].severity, Severity::Critical);
        assert_eq!(report.triage_results.len(), 2);

        let Some(ReportSummary::Analysis(summary)) = &report.summary else {
            panic!("expected analysis summary");
        };
        assert_eq!(summary.total_vulnerabilities, 2);
        assert_eq!(summary.by_severity.critical, 1);
        assert_eq!(summary.by_severity.high, 1);

        let diff_prompt = backend
            .requests()
            .into_iter()
            .find(|r| system_prompt(r).contains("code diffs"))
            .unwrap();
        assert!(user_prompt(&diff_prompt).contains("os.system(input())"));
    }

    #[tokio::test]
    async fn test_backend_failure_persists_failed_report() {
        let reports = TempDir::new().unwrap();
        let (orchestrator, notifier) = orchestrator(ScriptedBackend::failing(), reports.path());
        let (_, mut rx) = notifier.subscribe();

        let report = orchestrator
            .run_analysis(
                AnalysisTarget::Code("char buf[8]; strcpy(buf, argv[1]);".into()),
                Some(SessionId::new("broken")),
            )
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.errors.len(), 1);
        assert!(report.summary.is_none());

        let saved = orchestrator.store().get("broken").await.unwrap();
        assert_eq!(saved.status, ReportStatus::Failed);
        assert_eq!(orchestrator.store().stats().await.unwrap().total_reports, 0);

        let last = drain(&mut rx).pop().unwrap();
        assert_eq!(last.kind, EventKind::AnalysisFailed);
        assert!(last.field("error").is_some());
    }

    #[tokio::test]
    async fn test_missing_file_fails_run() {
        let reports = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(ScriptedBackend::new(vec![]), reports.path());

        let report = orchestrator
            .run_analysis(
                AnalysisTarget::File(reports.path().join("missing.py")),
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.analysis_type, AnalysisKind::File);
    }

    #[tokio::test]
    async fn test_invalid_session_id_is_rejected() {
        let reports = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(ScriptedBackend::new(vec![]), reports.path());
        let result = orchestrator
            .run_analysis(AnalysisTarget::Code("x".into()), Some(SessionId::new("../x")))
            .await;
        assert!(matches!(result, Err(ScoutError::Validation(_))));
    }

    #[tokio::test]
    async fn test_corpus_single_input_uses_decode() {
        let reports = TempDir::new().unwrap();
        let backend = ScriptedBackend::new(vec![
            tool_call(
                "define_field",
                json!({"name": "magic", "offset": 0, "size": 4, "field_type": "bytes"}),
            ),
            tool_call("submit_format", json!({"name": "png-ish"})),
        ]);
        let (orchestrator, _) = orchestrator(backend.clone(), reports.path());

        let report = orchestrator
            .run_corpus_analysis(&["89504e47".to_string()], "int LLVMFuzzerTestOneInput()", None)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.session_id.as_str().starts_with("corpus_"));
        assert_eq!(report.input_formats.len(), 1);
        let Some(ReportSummary::Corpus(summary)) = &report.summary else {
            panic!("expected corpus summary");
        };
        assert_eq!(summary.inputs_analyzed, 1);
        assert_eq!(summary.formats_decoded, 1);
        assert_eq!(summary.fields_found, 1);
        assert!(user_prompt(&backend.requests()[0]).contains("89504e47"));
    }

    #[tokio::test]
    async fn test_corpus_decode_error_still_completes() {
        let reports = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(ScriptedBackend::failing(), reports.path());

        let report = orchestrator
            .run_corpus_analysis(&["00ff".to_string(), "not hex".to_string()], "", None)
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.errors.len(), 1);
        assert!(report.input_formats.is_empty());

        let empty = orchestrator.run_corpus_analysis(&[], "", None).await;
        assert!(matches!(empty, Err(ScoutError::Validation(_))));
    }

    #[tokio::test]
    async fn test_commit_analysis_outside_repository_errors() {
        let reports = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(ScriptedBackend::new(vec![]), reports.path());
        let result = orchestrator
            .run_commit_analysis(reports.path(), "HEAD", None, None)
            .await;
        assert!(matches!(result, Err(ScoutError::Git(_))));
        assert!(orchestrator.store().list().await.unwrap().is_empty());
    }

    #[test]
    fn test_target_inference() {
        let dir = TempDir::new().unwrap();
        let as_str = dir.path().to_string_lossy().to_string();
        assert_eq!(AnalysisTarget::infer(&as_str, false).kind(), AnalysisKind::Project);
        assert_eq!(AnalysisTarget::infer("app.py", false).kind(), AnalysisKind::File);
        assert_eq!(
            AnalysisTarget::infer("eval(x)", true),
            AnalysisTarget::Code("eval(x)".into())
        );
    }
}
