//! Shared base environment
//!
//! One fully provisioned environment per session, built by whichever worker
//! takes the lock first. Everyone else waits on the lock, then finds the
//! environment already built and reuses it.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{EnvLock, EnvironmentError, EnvironmentProvider};
use crate::config::{HarnessConfig, BASE_ENV_DIR, CLONES_DIR};
use crate::utils::Timer;

/// Written inside the environment once every package is installed; holds
/// the installed package list, one per line
const COMPLETE_MARKER: &str = ".notebook-harness-complete";

/// Handle to the built base environment, passed to every notebook run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseEnvironment {
    /// Directory shared by all workers; clones are created here
    pub session_root: PathBuf,
    /// The base environment itself
    pub env_dir: PathBuf,
}

impl BaseEnvironment {
    /// Package list of the completely built environment at `env_dir`, or
    /// `None` when the build never finished
    pub async fn built_packages(env_dir: &Path) -> Option<Vec<String>> {
        let marker = tokio::fs::read_to_string(env_dir.join(COMPLETE_MARKER))
            .await
            .ok()?;
        Some(marker.lines().map(str::to_string).collect())
    }

    /// Private clone directory for the environment named `env_name`
    pub fn clone_dir(&self, env_name: &str) -> PathBuf {
        self.session_root.join(CLONES_DIR).join(env_name)
    }
}

/// Builds the base environment at most once per session root
pub struct BaseEnvironmentBuilder {
    provider: Arc<dyn EnvironmentProvider>,
    packages: Vec<String>,
    python: String,
    worker_id: String,
}

impl BaseEnvironmentBuilder {
    pub fn new(provider: Arc<dyn EnvironmentProvider>, config: &HarnessConfig) -> Self {
        Self {
            provider,
            packages: config.packages.clone(),
            python: config.python.clone(),
            worker_id: format!("worker-{}", std::process::id()),
        }
    }

    #[cfg(test)]
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Ensure the base environment under `session_root` exists.
    ///
    /// Idempotent across concurrent callers in any number of processes: the
    /// existence check and the build both happen while holding the lock, and
    /// the lock is released on every exit path.
    pub async fn ensure_base_environment(&self, session_root: &Path) -> Result<BaseEnvironment> {
        let env_dir = session_root.join(BASE_ENV_DIR);
        let _lock = EnvLock::acquire(&env_dir).await?;

        match BaseEnvironment::built_packages(&env_dir).await {
            Some(installed) if installed == self.packages => {
                info!(
                    "{} reusing base environment at {}",
                    self.worker_id,
                    env_dir.display()
                );
            }
            installed => {
                if env_dir.exists() {
                    let reason = match installed {
                        Some(_) => "was built with a different package list",
                        None => "is incomplete",
                    };
                    warn!(
                        "{}: base environment at {} {}, rebuilding it",
                        self.worker_id,
                        env_dir.display(),
                        reason
                    );
                    remove_dir(&env_dir).await?;
                }

                info!(
                    "{} building base environment at {}",
                    self.worker_id,
                    env_dir.display()
                );
                self.build(&env_dir).await?;
            }
        }

        Ok(BaseEnvironment {
            session_root: session_root.to_path_buf(),
            env_dir,
        })
    }

    async fn build(&self, env_dir: &Path) -> Result<(), EnvironmentError> {
        let timer = Timer::start("base environment build");

        self.provider.create(env_dir, &[], &self.python).await?;
        self.provider.install(env_dir, &self.packages).await?;

        let marker = env_dir.join(COMPLETE_MARKER);
        tokio::fs::write(&marker, self.packages.join("\n"))
            .await
            .map_err(|source| EnvironmentError::Io {
                path: marker,
                source,
            })?;

        info!("Base environment ready in {}ms", timer.stop());
        Ok(())
    }
}

async fn remove_dir(dir: &Path) -> Result<(), EnvironmentError> {
    tokio::fs::remove_dir_all(dir)
        .await
        .map_err(|source| EnvironmentError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Provider that builds plain directories instead of real environments

    use super::*;
    use crate::shell::{CommandOutput, ShellError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    pub struct FakeProvider {
        pub creates: AtomicUsize,
        pub installs: AtomicUsize,
        pub fail_install: bool,
        pub fail_clone: bool,
    }

    #[async_trait]
    impl EnvironmentProvider for FakeProvider {
        async fn create(
            &self,
            dir: &Path,
            _packages: &[String],
            _interpreter: &str,
        ) -> Result<(), EnvironmentError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            tokio::fs::create_dir_all(dir.join("bin"))
                .await
                .map_err(|source| EnvironmentError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
        }

        async fn install(&self, dir: &Path, _packages: &[String]) -> Result<(), EnvironmentError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            // widen the window in which a racing builder could slip in
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_install {
                return Err(EnvironmentError::Install {
                    dir: dir.to_path_buf(),
                    reason: "exit status 1".to_string(),
                });
            }
            Ok(())
        }

        async fn clone_env(&self, _src: &Path, dst: &Path) -> Result<CommandOutput, ShellError> {
            if self.fail_clone {
                return Ok(CommandOutput::exited(2, "", "clone failed: disk full\n"));
            }
            std::fs::create_dir_all(dst.join("bin")).ok();
            Ok(CommandOutput::exited(0, "cloned\n", ""))
        }
    }
}
