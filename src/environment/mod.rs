//! Isolated Python environments
//!
//! Creation, package installation, cloning and activation of virtual
//! environments, plus the shared base environment built once per session.

mod base;
mod lock;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::shell::{CommandOutput, CommandRunner, ShellCommand, ShellError};

pub use base::{BaseEnvironment, BaseEnvironmentBuilder};
pub use lock::EnvLock;

#[cfg(test)]
pub(crate) use base::testing;

/// Environment errors
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Failed to lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create environment at {}: {reason}", .dir.display())]
    Create { dir: PathBuf, reason: String },

    #[error("Failed to install packages into {}: {reason}", .dir.display())]
    Install { dir: PathBuf, reason: String },

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("Filesystem error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Variables that make a command run inside an environment, the same
/// changes `bin/activate` applies to a shell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    pub env_dir: PathBuf,
    pub bin_dir: PathBuf,
}

impl Activation {
    pub fn new(env_dir: impl Into<PathBuf>) -> Self {
        let env_dir = env_dir.into();
        let bin_dir = env_dir.join(BIN_DIR);
        Self { env_dir, bin_dir }
    }

    /// Apply activation to a command: `VIRTUAL_ENV`, `PATH` prefixed with the
    /// environment's bin directory, and no `PYTHONHOME`
    pub fn apply(&self, command: ShellCommand) -> ShellCommand {
        let path = match std::env::var_os("PATH") {
            Some(current) => {
                let mut entries = vec![self.bin_dir.clone()];
                entries.extend(std::env::split_paths(&current));
                std::env::join_paths(entries)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| self.bin_dir.to_string_lossy().into_owned())
            }
            None => self.bin_dir.to_string_lossy().into_owned(),
        };

        command
            .env("VIRTUAL_ENV", self.env_dir.to_string_lossy())
            .env("PATH", path)
            .env_remove("PYTHONHOME")
    }

    /// Path of an executable inside the environment
    pub fn executable(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }
}

#[cfg(windows)]
const BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
const BIN_DIR: &str = "bin";

/// Isolated-environment and package-installer collaborator
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    /// Create an environment at `dir` with `interpreter`, installing
    /// `packages` when non-empty
    async fn create(
        &self,
        dir: &Path,
        packages: &[String],
        interpreter: &str,
    ) -> Result<(), EnvironmentError>;

    /// Install `packages` into the environment at `dir`
    async fn install(&self, dir: &Path, packages: &[String]) -> Result<(), EnvironmentError>;

    /// Make a full, independently activatable copy of `src` at `dst`
    async fn clone_env(&self, src: &Path, dst: &Path) -> Result<CommandOutput, ShellError>;

    fn activate(&self, dir: &Path) -> Activation {
        Activation::new(dir)
    }
}

/// Environments managed with `venv`, `pip` and `virtualenv-clone`
pub struct Virtualenv {
    runner: Arc<dyn CommandRunner>,
}

impl Virtualenv {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl EnvironmentProvider for Virtualenv {
    async fn create(
        &self,
        dir: &Path,
        packages: &[String],
        interpreter: &str,
    ) -> Result<(), EnvironmentError> {
        info!("Creating virtual environment at {}", dir.display());

        let cmd = ShellCommand::new(interpreter)
            .args(["-m", "venv"])
            .path_arg(dir);
        let output = self.runner.run(&cmd).await?;
        if !output.success() {
            return Err(EnvironmentError::Create {
                dir: dir.to_path_buf(),
                reason: failure_reason(&output),
            });
        }

        if packages.is_empty() {
            return Ok(());
        }
        self.install(dir, packages).await
    }

    async fn install(&self, dir: &Path, packages: &[String]) -> Result<(), EnvironmentError> {
        info!(
            "Installing {} package(s) into {}",
            packages.len(),
            dir.display()
        );

        let pip = self.activate(dir).executable("pip");
        let cmd = ShellCommand::new(pip.to_string_lossy())
            .arg("install")
            .args(packages.iter().cloned());
        let output = self.runner.run(&cmd).await?;
        if !output.success() {
            return Err(EnvironmentError::Install {
                dir: dir.to_path_buf(),
                reason: failure_reason(&output),
            });
        }
        Ok(())
    }

    async fn clone_env(&self, src: &Path, dst: &Path) -> Result<CommandOutput, ShellError> {
        let clone = self.activate(src).executable("virtualenv-clone");
        let cmd = ShellCommand::new(clone.to_string_lossy())
            .path_arg(src)
            .path_arg(dst);
        self.runner.run(&cmd).await
    }
}

fn failure_reason(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    match output.status {
        Some(code) if stderr.is_empty() => format!("exit status {code}"),
        Some(code) => format!("exit status {code}: {stderr}"),
        None => format!("terminated without exit status: {stderr}"),
    }
}
