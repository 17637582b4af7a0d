use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod aggregator;
mod catalog;
mod classifier;
mod config;
mod error;
mod experiment;
mod models;
mod output;
mod prompt;
mod provider;
mod rate_limit;
mod replicate;
mod runner;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::ExperimentError;
use crate::models::ModelId;
use crate::output::OutputFormat;
use crate::provider::{Credentials, Providers};
use crate::runner::Runner;

/// Behavioral-economics experiments on large language models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML run file
    #[arg(required_unless_present = "list_presets")]
    run_file: Option<PathBuf>,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log every model call and print raw answers
    #[arg(short, long)]
    verbose: bool,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Replicate API token
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    replicate_api_token: Option<String>,

    /// List the built-in experiments and exit
    #[arg(long)]
    list_presets: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let catalog = Catalog::builtin()?;
    if args.list_presets {
        list_presets(&catalog)?;
        return Ok(());
    }

    let Some(run_file) = args.run_file.as_deref() else {
        anyhow::bail!("A run file is required");
    };
    let config = Config::from_file(run_file)?;
    let credentials = Credentials {
        openai_api_key: args.openai_api_key.clone(),
        replicate_api_token: args.replicate_api_token.clone(),
    };
    let providers = Providers::from_credentials(&credentials, &config.providers)?;
    let mut runner = Runner::new(config, providers, catalog);

    let reports = tokio::select! {
        reports = runner.run_experiments() => reports?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, discarding unfinished experiments");
            return Err(ExperimentError::Cancelled.into());
        }
    };

    output::print_results(&reports, args.output, args.verbose);

    Ok(())
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn list_presets(catalog: &Catalog) -> anyhow::Result<()> {
    println!(
        "{:<22} {:<9} {:<8} {:<15} {}",
        "Experiment", "Scenario", "Priming", "Type", "Source"
    );
    println!("{}", "-".repeat(80));
    for key in catalog.keys() {
        let preset = catalog.lookup(key)?;
        println!(
            "{:<22} {:<9} {:<8} {:<15} {}",
            preset.key.experiment.as_str(),
            preset.key.scenario,
            preset.key.priming,
            format!("{:?}", preset.experiment_type),
            preset.source
        );
    }

    let models: Vec<&str> = ModelId::ALL.iter().map(ModelId::as_str).collect();
    println!();
    println!("Models: {}", models.join(", "));
    Ok(())
}
