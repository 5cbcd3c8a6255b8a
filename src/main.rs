use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vulnscout::cli::commands::{
    agents, analyze::AnalyzeOptions, config, corpus::CorpusOptions, diff::DiffOptions, reports,
    stats, status,
};

#[derive(Parser)]
#[command(name = "vulnscout")]
#[command(version, about = "LLM-driven security review for source code, commits and fuzz corpora")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Review a file, a project directory, or a code string
    Analyze {
        #[arg(help = "File, directory, or code (with --code)")]
        target: String,
        #[arg(long, help = "Treat TARGET as source code")]
        code: bool,
        #[arg(long, help = "Session id for the report (generated when omitted)")]
        session: Option<String>,
        #[arg(long, short, help = "Model for every agent")]
        model: Option<String>,
        #[arg(long, help = "Glob excluded from project scans (repeatable)")]
        exclude: Vec<String>,
        #[arg(long, help = "Skip uncommitted-change detection")]
        no_git: bool,
        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },

    /// Review one commit, or the changes between two refs
    Diff {
        #[arg(help = "Repository path")]
        project: PathBuf,
        #[arg(help = "Commit to review")]
        commit: String,
        #[arg(long, help = "Base ref; reviews the diff from here to COMMIT")]
        compare_to: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long, short)]
        model: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Infer the layout of fuzzer corpus inputs
    Corpus {
        #[arg(required = true, help = "Inputs as hex (non-hex is taken as raw text)")]
        inputs: Vec<String>,
        #[arg(long, help = "Harness source file used as context")]
        harness: Option<PathBuf>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long, short)]
        model: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Browse stored reports
    Reports {
        #[command(subcommand)]
        action: ReportsAction,
    },

    /// Aggregate totals over completed reports
    Stats {
        #[arg(long, help = "Recompute from the stored reports")]
        rebuild: bool,
        #[arg(long)]
        json: bool,
    },

    /// List agents, their models and tools
    Agents {
        #[arg(long, short)]
        model: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Show API keys, models and gateway counters
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ReportsAction {
    /// List reports, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one report
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n{}", console::style("━━━ PANIC ━━━").red().bold());
        eprintln!(
            "{}",
            console::style("VulnScout encountered an unexpected error:").red()
        );
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "{}",
                console::style(format!(
                    "Location: {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                ))
                .dim()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", console::style("Error:").red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let rt = Runtime::new()?;
    let (verbose, quiet) = (cli.verbose, cli.quiet);

    match cli.command {
        Commands::Analyze {
            target,
            code,
            session,
            model,
            exclude,
            no_git,
            json,
        } => {
            rt.block_on(vulnscout::cli::commands::analyze::run(AnalyzeOptions {
                target,
                code,
                session,
                model,
                exclude,
                no_git,
                json,
                quiet,
                verbose,
            }))?;
        }
        Commands::Diff {
            project,
            commit,
            compare_to,
            session,
            model,
            json,
        } => {
            rt.block_on(vulnscout::cli::commands::diff::run(DiffOptions {
                project,
                commit,
                compare_to,
                session,
                model,
                json,
                quiet,
            }))?;
        }
        Commands::Corpus {
            inputs,
            harness,
            session,
            model,
            json,
        } => {
            rt.block_on(vulnscout::cli::commands::corpus::run(CorpusOptions {
                inputs,
                harness,
                session,
                model,
                json,
                quiet,
            }))?;
        }
        Commands::Reports { action } => match action {
            ReportsAction::List { json } => rt.block_on(reports::list(json))?,
            ReportsAction::Show { id, json } => rt.block_on(reports::show(&id, json))?,
        },
        Commands::Stats { rebuild, json } => rt.block_on(stats::run(rebuild, json))?,
        Commands::Agents { model, json } => agents::run(model, json)?,
        Commands::Status { json } => rt.block_on(status::run(json))?,
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => config::show(global, &format)?,
            ConfigAction::Path => config::path()?,
            ConfigAction::Init { global, force } => config::init(global, force)?,
        },
    }

    Ok(())
}
