//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::executor::Shard;

/// Changed-notebook test harness
#[derive(Parser, Debug)]
#[command(name = "notebook-harness")]
#[command(version)]
#[command(about = "Run changed notebooks in isolated, cloned virtual environments")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the notebooks changed since the base revision
    List(ListArgs),

    /// Run notebooks in isolated environments
    Run(RunArgs),

    /// Build the shared base environment without running anything
    BaseEnv,

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Run only this notebook (repeatable); skips change detection
    #[arg(short, long = "notebook")]
    pub notebooks: Vec<PathBuf>,

    /// Run only this slice of the work list, as INDEX/COUNT
    #[arg(long)]
    pub shard: Option<Shard>,

    /// Number of notebooks executed concurrently
    #[arg(long)]
    pub concurrent: Option<usize>,

    /// Per-notebook timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Save a run report to this file (JSON, or CSV by extension)
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Write a configuration file with the defaults
    Init {
        /// Output file path
        #[arg(short, long, default_value = "./notebook-harness.yaml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show environment variable overrides
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_args() {
        let args = Args::parse_from(["notebook-harness", "list", "--format", "json"]);
        match args.command {
            Command::List(list_args) => assert_eq!(list_args.format, "json"),
            _ => panic!("Expected List command"),
        }
        assert_eq!(args.repo, PathBuf::from("."));
    }

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "notebook-harness",
            "--verbose",
            "run",
            "-n",
            "docs/a.ipynb",
            "--notebook",
            "docs/b.ipynb",
            "--shard",
            "1/4",
            "--concurrent",
            "2",
            "--repo",
            "/src/cirq",
        ]);
        assert!(args.verbose);
        assert_eq!(args.repo, PathBuf::from("/src/cirq"));
        match args.command {
            Command::Run(run_args) => {
                assert_eq!(run_args.notebooks.len(), 2);
                assert_eq!(run_args.shard, Some(Shard { index: 1, count: 4 }));
                assert_eq!(run_args.concurrent, Some(2));
                assert!(run_args.timeout.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_invalid_shard_is_rejected() {
        let result = Args::try_parse_from(["notebook-harness", "run", "--shard", "4/4"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_init_defaults() {
        let args = Args::parse_from(["notebook-harness", "config", "init"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { output, force },
            }) => {
                assert_eq!(output, PathBuf::from("./notebook-harness.yaml"));
                assert!(!force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
