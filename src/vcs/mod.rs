//! Version control queries
//!
//! The harness only needs two questions answered by git: what kind of object
//! a reference names, and which files differ from it.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::shell::{CommandRunner, ShellCommand};

/// Version-control collaborator
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Object type of `reference` (`commit`, `tree`, ...). Fails when the
    /// reference does not exist, which is normal in shallow clones.
    async fn object_type(&self, reference: &str) -> Result<String>;

    /// Paths that differ between the working tree and `reference`,
    /// relative to the repository root
    async fn diff_names(&self, reference: &str) -> Result<Vec<String>>;
}

/// `git` command-line client rooted at a repository
pub struct GitCli {
    repo_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            repo_root: repo_root.into(),
            runner,
        }
    }

    fn git(&self) -> ShellCommand {
        ShellCommand::new("git").current_dir(&self.repo_root)
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn object_type(&self, reference: &str) -> Result<String> {
        let cmd = self.git().args(["cat-file", "-t", reference]);
        let output = self
            .runner
            .run(&cmd)
            .await
            .with_context(|| format!("Failed to run {cmd}"))?;

        if !output.success() {
            bail!("{cmd} failed: {}", output.stderr.trim());
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn diff_names(&self, reference: &str) -> Result<Vec<String>> {
        // -z keeps paths verbatim; without it git quotes non-ASCII names
        let cmd = self.git().args(["diff", "--name-only", "-z", reference]);
        let output = self
            .runner
            .run(&cmd)
            .await
            .with_context(|| format!("Failed to run {cmd}"))?;

        if !output.success() {
            bail!("{cmd} failed: {}", output.stderr.trim());
        }
        Ok(output
            .stdout
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory repository for unit tests

    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeRepo {
        pub objects: HashMap<String, String>,
        pub changed: Vec<String>,
    }

    impl FakeRepo {
        pub fn with_commit(mut self, reference: &str) -> Self {
            self.objects
                .insert(reference.to_string(), "commit".to_string());
            self
        }

        pub fn with_object(mut self, reference: &str, kind: &str) -> Self {
            self.objects.insert(reference.to_string(), kind.to_string());
            self
        }

        pub fn with_changes(mut self, changed: &[&str]) -> Self {
            self.changed = changed.iter().map(|s| s.to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl VersionControl for FakeRepo {
        async fn object_type(&self, reference: &str) -> Result<String> {
            match self.objects.get(reference) {
                Some(kind) => Ok(kind.clone()),
                None => bail!("fatal: Not a valid object name {reference}"),
            }
        }

        async fn diff_names(&self, reference: &str) -> Result<Vec<String>> {
            if !self.objects.contains_key(reference) {
                bail!("fatal: bad revision '{reference}'");
            }
            Ok(self.changed.clone())
        }
    }
}
