//! Diff Command
//!
//! Security review of a single commit, or of the range between two refs.
//!
//! Usage:
//!   vulnscout diff <PROJECT> <COMMIT> [--compare-to REF]

use std::path::PathBuf;

use super::analyze::finish;
use crate::cli::util::{CommandContext, ProgressGuard, parse_session, print_report};
use crate::types::Result;

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub project: PathBuf,
    pub commit: String,
    pub compare_to: Option<String>,
    pub session: Option<String>,
    pub model: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub async fn run(opts: DiffOptions) -> Result<()> {
    let session = parse_session(opts.session)?;
    let ctx = CommandContext::load()?;
    let orchestrator = ctx.orchestrator(opts.model)?;

    let report = {
        let _progress = ProgressGuard::attach(!opts.quiet && !opts.json, false);
        orchestrator
            .run_commit_analysis(
                &opts.project,
                &opts.commit,
                opts.compare_to.as_deref(),
                session,
            )
            .await?
    };

    print_report(&report, opts.json)?;
    finish(report.status, report.errors.last())
}
