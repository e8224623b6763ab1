//! Configuration module
//!
//! Static harness configuration: revision candidates, exclusion globs, base
//! environment packages and the on-disk layout of outputs and environments.

mod env;
mod file;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use env::{print_env_help, EnvConfig};
pub use file::load_effective;

/// Directory name of the shared base environment inside the session root
pub const BASE_ENV_DIR: &str = "proto_dir";

/// Directory inside the session root holding the per-notebook clones, kept
/// apart from the base environment and its lock file
pub const CLONES_DIR: &str = "clones";

/// Harness configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// References tried in order when looking for the diff baseline
    pub base_revisions: Vec<String>,

    /// Notebooks never tested in isolation, with the reason noted alongside
    pub skip_notebooks: Vec<String>,

    /// Notebooks relying on features that are not released yet. Emptied
    /// after every release.
    pub unreleased_notebooks: Vec<String>,

    /// Packages installed into the base environment
    pub packages: Vec<String>,

    /// Extension identifying notebook files
    pub notebook_extension: String,

    /// Root for executed notebooks, relative to the repository root
    pub output_root: PathBuf,

    /// Suffix replacing the notebook extension in output file names
    pub output_suffix: String,

    /// Directory shared by all workers for the base environment and clones
    pub session_root: PathBuf,

    /// Interpreter used to create the base environment
    pub python: String,

    /// Per-notebook execution timeout in seconds, 0 disables it
    pub timeout_secs: u64,

    /// Notebooks executed concurrently within one process
    pub max_concurrent: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_revisions: strings(&["upstream/master", "origin/master", "master"]),
            skip_notebooks: strings(&[
                // vendor notebooks need credentials
                "**/google/*.ipynb",
                "**/pasqal/*.ipynb",
                "**/aqt/*.ipynb",
                "examples/*fidelity*",
            ]),
            unreleased_notebooks: strings(&["docs/characterization/*.ipynb"]),
            packages: strings(&[
                // for running the notebooks
                "papermill",
                "jupyter",
                "virtualenv-clone",
                // assumed to be part of colab
                "seaborn~=0.11.1",
                "ipykernel==5.3.4",
            ]),
            notebook_extension: "ipynb".to_string(),
            output_root: PathBuf::from("out"),
            output_suffix: ".out.ipynb".to_string(),
            session_root: std::env::temp_dir().join("notebook-harness"),
            python: "python3".to_string(),
            timeout_secs: 1800,
            max_concurrent: 1,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if file::is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if file::is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_revisions.is_empty() {
            bail!("At least one base revision candidate is required");
        }
        if self.packages.is_empty() {
            bail!("The base environment needs at least one package");
        }
        if self.notebook_extension.is_empty() {
            bail!("Notebook extension must not be empty");
        }
        if !self
            .output_suffix
            .ends_with(&format!(".{}", self.notebook_extension))
        {
            bail!(
                "Output suffix '{}' must end with '.{}'",
                self.output_suffix,
                self.notebook_extension
            );
        }
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }
        Ok(())
    }

    /// Skip and unreleased patterns merged into one exclusion set
    pub fn exclusion_patterns(&self) -> Vec<String> {
        self.skip_notebooks
            .iter()
            .chain(self.unreleased_notebooks.iter())
            .cloned()
            .collect()
    }

    pub fn notebook_timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
