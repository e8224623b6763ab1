//! Notebook harness - changed-notebook test runner
//!
//! Finds the notebooks changed since a base revision, builds one shared
//! virtual environment, clones it per notebook and executes each notebook
//! with papermill inside its own clone.
//!
//! ## Usage
//!
//! ```bash
//! # Show what would run
//! notebook-harness list
//!
//! # Run every changed notebook, two at a time
//! notebook-harness run --concurrent 2
//!
//! # One worker of four in CI, with a JSON report
//! notebook-harness run --shard 0/4 --report out/report.json
//!
//! # Run specific notebooks
//! notebook-harness run -n docs/simulation.ipynb
//! ```

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::info;

mod cli;
mod config;
mod discovery;
mod environment;
mod executor;
mod models;
mod output;
mod results;
mod shell;
mod utils;
mod vcs;

use cli::Args;
use config::{EnvConfig, HarnessConfig};
use executor::{Harness, RunPlan};
use output::{OutputFormat, ResultFormatter};
use results::RunReport;
use utils::logger::{init_logger, LogLevel};
use utils::path::absolutize;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    init_logger(LogLevel::for_verbosity(
        args.verbose || env.verbose.unwrap_or(false),
    ));

    let repo_root = absolutize(&args.repo)?;

    match args.command {
        cli::Command::List(list_args) => {
            let config = config::load_effective(args.config.as_deref(), &env)?;
            list_notebooks(config, &repo_root, list_args).await?;
        }
        cli::Command::Run(run_args) => {
            let config = config::load_effective(args.config.as_deref(), &env)?;
            let code = run_notebooks(config, &repo_root, run_args).await?;
            std::process::exit(code);
        }
        cli::Command::BaseEnv => {
            let config = config::load_effective(args.config.as_deref(), &env)?;
            let base = Harness::new(config, &repo_root).prepare().await?;
            println!("session_root: {}", base.session_root.display());
            println!("env_dir:      {}", base.env_dir.display());
        }
        cli::Command::Config(config_args) => {
            manage_config(args.config.as_deref(), &env, config_args)?;
        }
    }

    Ok(())
}

fn formatter(format: &str) -> ResultFormatter {
    let formatter =
        ResultFormatter::new(OutputFormat::from_str(format).unwrap_or(OutputFormat::Table));
    if std::io::stdout().is_terminal() {
        formatter
    } else {
        formatter.no_color()
    }
}

async fn list_notebooks(
    config: HarnessConfig,
    repo_root: &Path,
    args: cli::ListArgs,
) -> Result<()> {
    let notebooks = Harness::new(config, repo_root)
        .list_candidate_notebooks()
        .await?;
    let output = formatter(&args.format).format_notebooks(&notebooks);
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Run the session and return the process exit code
async fn run_notebooks(
    mut config: HarnessConfig,
    repo_root: &Path,
    args: cli::RunArgs,
) -> Result<i32> {
    if let Some(concurrent) = args.concurrent {
        config.max_concurrent = concurrent;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    config.validate()?;

    // explicit notebooks are given relative to the working directory
    let notebooks = args
        .notebooks
        .iter()
        .map(|p| absolutize(p))
        .collect::<Result<Vec<PathBuf>>>()?;
    let plan = RunPlan {
        notebooks,
        shard: args.shard,
    };

    let started_at = Utc::now();
    let session_root = config.session_root.clone();
    let summary = Harness::new(config, repo_root).run(&plan).await?;

    println!("{}", formatter(&args.format).format_summary(&summary));

    if let Some(path) = &args.report {
        RunReport::new(started_at, session_root, summary.clone())
            .with_shard(plan.shard.map(|s| s.to_string()))
            .save(path)?;
    }

    info!("{} of {} notebook(s) failed", summary.failed, summary.total);
    Ok(summary.exit_code())
}

fn manage_config(explicit: Option<&Path>, env: &EnvConfig, args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }

            HarnessConfig::default().save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { format } => {
            let config = config::load_effective(explicit, env)?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Env => {
            config::print_env_help();
            if env.has_any() {
                env.print_summary();
            }
        }
    }

    Ok(())
}
