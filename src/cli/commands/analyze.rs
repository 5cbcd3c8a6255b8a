//! Analyze Command
//!
//! Full security review of a file, a project directory, or inline code.
//!
//! Usage:
//!   vulnscout analyze <TARGET> [--code] [--session ID] [--model M] [--exclude GLOB]...

use tracing::info;

use crate::cli::util::{CommandContext, ProgressGuard, parse_session, print_report};
use crate::pipeline::{AnalysisTarget, ReportStatus};
use crate::types::{Result, ScoutError};

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub target: String,
    /// Treat `target` as source code rather than a path
    pub code: bool,
    pub session: Option<String>,
    pub model: Option<String>,
    pub exclude: Vec<String>,
    pub no_git: bool,
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

pub async fn run(opts: AnalyzeOptions) -> Result<()> {
    let target = AnalysisTarget::infer(&opts.target, opts.code);
    if let AnalysisTarget::File(path) = &target
        && !path.exists()
    {
        return Err(ScoutError::Validation(format!(
            "Target not found: {} (use --code to analyze a code string)",
            path.display()
        )));
    }

    let session = parse_session(opts.session)?;
    let ctx = CommandContext::load()?;
    let orchestrator = ctx
        .orchestrator(opts.model)?
        .with_exclude(opts.exclude)
        .with_git_detection(!opts.no_git);

    info!("Analyzing {}", target);
    let report = {
        let _progress = ProgressGuard::attach(!opts.quiet && !opts.json, opts.verbose);
        orchestrator.run_analysis(target, session).await?
    };

    print_report(&report, opts.json)?;
    finish(report.status, report.errors.last())
}

/// Failed runs still leave a report behind; the exit status reflects them
pub(crate) fn finish(status: ReportStatus, last_error: Option<&String>) -> Result<()> {
    match status {
        ReportStatus::Failed => Err(ScoutError::pipeline(
            "analysis",
            last_error.cloned().unwrap_or_else(|| "analysis failed".to_string()),
        )),
        _ => Ok(()),
    }
}
