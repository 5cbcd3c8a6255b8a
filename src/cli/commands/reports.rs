//! Reports Command
//!
//! Browse stored session reports.
//!
//! Usage:
//!   vulnscout reports list [--json]
//!   vulnscout reports show <ID> [--json]

use chrono::{DateTime, Local};
use console::style;
use serde::Serialize;
use tracing::debug;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, print_json, print_report};
use crate::pipeline::{AnalysisKind, ReportStatus};
use crate::types::Result;

#[derive(Debug, Serialize)]
struct ReportRow {
    session_id: String,
    analysis_type: Option<AnalysisKind>,
    status: Option<ReportStatus>,
    vulnerabilities: Option<usize>,
    modified: Option<String>,
}

pub async fn list(json: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let stored = ctx.store.list().await?;

    let mut rows = Vec::with_capacity(stored.len());
    for entry in stored {
        let report = match ctx.store.get(&entry.session_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                debug!("Unreadable report {}: {}", entry.session_id, e);
                None
            }
        };
        rows.push(ReportRow {
            session_id: entry.session_id,
            analysis_type: report.as_ref().map(|r| r.analysis_type),
            status: report.as_ref().map(|r| r.status),
            vulnerabilities: report
                .as_ref()
                .map(|r| r.vulnerabilities.len() + r.diff_findings.len()),
            modified: entry
                .modified
                .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string()),
        });
    }

    if json {
        return print_json(&rows);
    }

    let out = Output::new();
    if rows.is_empty() {
        out.info(&format!("No reports in {}", ctx.store.dir().display()));
        return Ok(());
    }

    out.header(&format!("Reports ({})", rows.len()));
    for row in &rows {
        let status = match row.status {
            Some(ReportStatus::Completed) => style("completed").green().to_string(),
            Some(ReportStatus::Failed) => style("failed").red().to_string(),
            Some(ReportStatus::Running) => style("running").yellow().to_string(),
            None => style("corrupt").red().dim().to_string(),
        };
        println!(
            "  {:<40} {:<8} {:<10} {:>4} {}",
            row.session_id,
            row.analysis_type.map(|k| k.as_str()).unwrap_or("-"),
            status,
            row.vulnerabilities.map(|n| n.to_string()).unwrap_or_default(),
            style(row.modified.as_deref().unwrap_or_default()).dim()
        );
    }
    Ok(())
}

pub async fn show(id: &str, json: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let report = ctx.store.get(id).await?;
    print_report(&report, json)
}
