//! Status Command
//!
//! Credentials, models and gateway counters.

use console::style;

use crate::ai::gateway::stats as gateway_stats;
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, print_json};
use crate::config::ApiKeys;
use crate::types::Result;

pub async fn run(json: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let keys = ApiKeys::from_env();
    let reports = ctx.store.list().await?.len();
    let totals = ctx.store.stats().await?;
    let gateway = gateway_stats();

    if json {
        let key_status: serde_json::Map<String, serde_json::Value> = keys
            .status()
            .into_iter()
            .map(|(var, set)| (var.to_string(), set.into()))
            .collect();
        let status = serde_json::json!({
            "api_keys": key_status,
            "default_model": ctx.config.llm.default_model,
            "fallback_models": ctx.config.llm.fallback_models,
            "available_models": keys.available_models(),
            "gateway": gateway,
            "reports": {
                "dir": ctx.store.dir(),
                "count": reports,
                "completed": totals.total_reports,
            },
        });
        return print_json(&status);
    }

    let out = Output::new();
    out.header("VulnScout Status");

    out.section("API keys");
    for (var, set) in keys.status() {
        let mark = if set {
            style("✓ set").green()
        } else {
            style("✗ unset").red()
        };
        println!("  {:<20} {}", var, mark);
    }
    if !keys.has_any_key() {
        out.warning("No model backend is reachable until at least one key is set");
    }

    out.section("Models");
    out.field("Default", &ctx.config.llm.default_model);
    out.field("Fallbacks", ctx.config.llm.fallback_models.join(", "));
    let available = keys.available_models();
    out.field(
        "Available",
        if available.is_empty() {
            "(none)".to_string()
        } else {
            available.join(", ")
        },
    );

    out.section("Gateway");
    out.field("Requests", gateway.total_requests);
    out.field("Cost", format!("${:.4}", gateway.total_cost_usd));

    out.section("Reports");
    out.field("Directory", ctx.store.dir().display());
    out.field("Stored", reports);
    out.field("Completed", totals.total_reports);

    Ok(())
}
