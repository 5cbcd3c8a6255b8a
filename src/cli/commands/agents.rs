//! Agents Command
//!
//! Lists every agent with the model and tools it would run with.

use console::style;

use crate::agents::{AgentOptions, AgentSuite};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, print_json};
use crate::types::Result;

pub fn run(model: Option<String>, json: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let gateway = ctx.install_gateway()?;
    let mut options = AgentOptions::from_config(&ctx.config);
    if let Some(model) = model {
        options = options.with_model(model);
    }
    let infos = AgentSuite::new(gateway, &options).infos();

    if json {
        return print_json(&infos);
    }

    let out = Output::new();
    out.header(&format!("Agents ({})", infos.len()));
    for info in &infos {
        println!(
            "\n  {} {}",
            style(info.id).bold().cyan(),
            style(info.description).dim()
        );
        println!(
            "    model {} · temperature {:.1} · max iterations {}",
            info.model, info.temperature, info.max_iterations
        );
        println!("    tools ({}): {}", info.tools.len(), info.tools.join(", "));
    }
    Ok(())
}
