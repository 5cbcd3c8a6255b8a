//! Config Command
//!
//! Manage VulnScout configuration.
//!
//! Usage:
//!   vulnscout config show [-g] [-f json]
//!   vulnscout config path
//!   vulnscout config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::{Config, ConfigLoader};
use crate::types::Result;

/// Show configuration
pub fn show(global: bool, format: &str) -> Result<()> {
    if !global {
        let config = ConfigLoader::load()?;
        return ConfigLoader::show_config(&config, format == "json");
    }

    let Some(global_path) = ConfigLoader::global_config_path() else {
        println!("Cannot determine global config directory.");
        return Ok(());
    };

    if global_path.exists() {
        let content = std::fs::read_to_string(&global_path)?;
        if format == "toml" {
            println!("{}", content);
        } else {
            println!("# Global Config: {}\n", global_path.display());
            println!("{}", content);
        }
    } else {
        println!("No global config found.");
        println!("Run 'vulnscout config init --global' to create one.");
    }
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    let reports_dir = ConfigLoader::load()
        .map(|c| c.reports.dir)
        .unwrap_or_else(|_| Config::default().reports.dir);
    ConfigLoader::show_path(&reports_dir);
    Ok(())
}

/// Initialize global or project configuration
pub fn init(global: bool, force: bool) -> Result<()> {
    let out = Output::new();
    let config_path = if global {
        ConfigLoader::init_global(force)?
    } else {
        let root = std::env::current_dir()?;
        ConfigLoader::init_project(&root, force)?
    };

    out.success(&format!(
        "Initialized {} configuration",
        if global { "global" } else { "project" }
    ));
    out.field("Config", config_path.display());
    Ok(())
}
