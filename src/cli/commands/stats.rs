//! Stats Command
//!
//! Aggregate totals over completed reports.

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, print_json};
use crate::types::Result;

pub async fn run(rebuild: bool, json: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let stats = if rebuild {
        ctx.store.rebuild_stats().await?
    } else {
        ctx.store.stats().await?
    };

    if json {
        return print_json(&stats);
    }

    let out = Output::new();
    out.header("VulnScout Statistics");
    out.field("Reports", stats.total_reports);
    out.field("Findings", stats.total_vulnerabilities);
    out.field("Patches", stats.total_patches);
    out.field("Critical", stats.by_severity.critical);
    out.field("High", stats.by_severity.high);
    out.field("Medium", stats.by_severity.medium);
    out.field("Low", stats.by_severity.low);
    if rebuild {
        out.success(&format!("Rebuilt from {}", ctx.store.dir().display()));
    }
    Ok(())
}
