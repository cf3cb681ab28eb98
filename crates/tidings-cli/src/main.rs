use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tidings::Emitter;
use tracing_subscriber::filter::EnvFilter;

mod config;
mod scenario;

use config::Config;
use scenario::{Runner, Scenario};

#[derive(Parser)]
#[command(name = "tidings", version, about = "Replay event scenarios against a tidings emitter")]
struct Cli {
    /// Path to tidings.toml (searched upwards from the current directory if omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file and print the dispatch trace
    Run {
        scenario: PathBuf,
        /// Override the configured leak-warning threshold
        #[arg(long, allow_negative_numbers = true)]
        max_listeners: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.logging.filter.parse()?))
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(filter = %config.logging.filter, "logging initialized");

    match cli.command {
        Commands::Run {
            scenario,
            max_listeners,
        } => run_scenario(&config, &scenario, max_listeners)?,
    }

    Ok(())
}

fn run_scenario(config: &Config, path: &Path, max_listeners: Option<i64>) -> Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let scenario = Scenario::from_toml(&source)?;

    let emitter = Emitter::from_config(&config.emitter)?;
    if let Some(n) = max_listeners {
        emitter.set_max_listeners(n)?;
    }
    tracing::info!(
        steps = scenario.steps.len(),
        max_listeners = emitter.max_listeners(),
        "running {}",
        path.display()
    );

    for line in Runner::new(emitter).run(&scenario) {
        println!("{}", line);
    }

    Ok(())
}
