//! Corpus Command
//!
//! Infer the structure of fuzzer inputs. Inputs are hex strings; anything
//! that is not valid hex is taken as raw text.
//!
//! Usage:
//!   vulnscout corpus <INPUT>... [--harness FILE]

use std::path::PathBuf;

use super::analyze::finish;
use crate::cli::util::{CommandContext, ProgressGuard, parse_session, print_report};
use crate::types::{Result, ScoutError};

#[derive(Debug, Clone, Default)]
pub struct CorpusOptions {
    pub inputs: Vec<String>,
    /// Harness source given to the decoder as context
    pub harness: Option<PathBuf>,
    pub session: Option<String>,
    pub model: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub async fn run(opts: CorpusOptions) -> Result<()> {
    if opts.inputs.is_empty() {
        return Err(ScoutError::Validation(
            "At least one input is required".to_string(),
        ));
    }

    let harness = match &opts.harness {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            ScoutError::Validation(format!("Cannot read harness {}: {}", path.display(), e))
        })?,
        None => String::new(),
    };

    let session = parse_session(opts.session)?;
    let ctx = CommandContext::load()?;
    let orchestrator = ctx.orchestrator(opts.model)?;

    let report = {
        let _progress = ProgressGuard::attach(!opts.quiet && !opts.json, false);
        orchestrator
            .run_corpus_analysis(&opts.inputs, &harness, session)
            .await?
    };

    print_report(&report, opts.json)?;
    finish(report.status, report.errors.last())
}
