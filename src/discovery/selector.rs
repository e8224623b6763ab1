//! Change set selection
//!
//! Computes the notebooks changed since the base revision, minus everything
//! matched by the exclusion globs, as a sorted list of absolute paths.
//! Parallel workers each recompute this list independently, so the result
//! must be byte-identical for identical repository state.

use anyhow::Result;
use glob::{glob_with, MatchOptions, Pattern};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{resolve_base_revision, DiscoveryError};
use crate::config::HarnessConfig;
use crate::models::Notebook;
use crate::utils::path::{absolutize_from, normalize_path, sort_paths};
use crate::vcs::VersionControl;

/// Glob semantics: `*` stays inside one directory, `**` crosses directories,
/// and hidden entries need an explicit leading dot.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Outcome of the discovery phase
#[derive(Clone, Debug, Default)]
pub struct Selection {
    /// Resolved base revision, `None` when nothing resolved
    pub base_revision: Option<String>,
    /// Sorted, de-duplicated work list
    pub notebooks: Vec<Notebook>,
}

impl Selection {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.notebooks
            .iter()
            .map(|nb| nb.path().to_path_buf())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
    }
}

/// Selects the changed notebooks to run
pub struct NotebookSelector {
    vcs: Arc<dyn VersionControl>,
    repo_root: PathBuf,
    base_revisions: Vec<String>,
    exclusions: Vec<String>,
    extension: String,
}

impl NotebookSelector {
    /// Create a selector with the default revisions, exclusions and extension
    #[cfg(test)]
    pub fn new(vcs: Arc<dyn VersionControl>, repo_root: &Path) -> Self {
        Self::from_config(&HarnessConfig::default(), repo_root, vcs)
    }

    pub fn from_config(
        config: &HarnessConfig,
        repo_root: &Path,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            vcs,
            repo_root: normalize_path(repo_root),
            base_revisions: config.base_revisions.clone(),
            exclusions: config.exclusion_patterns(),
            extension: config.notebook_extension.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_exclusions(mut self, patterns: Vec<String>) -> Self {
        self.exclusions = patterns;
        self
    }

    /// Sorted absolute paths of the notebooks to test
    pub async fn list_candidate_notebooks(&self) -> Result<Vec<PathBuf>> {
        Ok(self.select().await?.paths())
    }

    /// Run the full discovery phase
    pub async fn select(&self) -> Result<Selection> {
        let (base_revision, changed) = match resolve_base_revision(
            self.vcs.as_ref(),
            &self.base_revisions,
        )
        .await
        {
            Ok(rev) => {
                let changed = self.changed_notebooks(&rev).await?;
                (Some(rev), changed)
            }
            Err(e) => {
                warn!(
                    "No changed notebooks are tested (this is expected when notebook tests are not selected): {}",
                    e
                );
                (None, BTreeSet::new())
            }
        };

        let excluded = self.expand_exclusions()?;
        let mut paths: Vec<PathBuf> = changed
            .into_iter()
            .filter(|p| {
                let skip = excluded.contains(p);
                if skip {
                    debug!("Excluding {}", p.display());
                }
                !skip
            })
            .collect();
        sort_paths(&mut paths);

        info!(
            "Selected {} notebook(s) changed since {}",
            paths.len(),
            base_revision.as_deref().unwrap_or("<unresolved>")
        );

        Ok(Selection {
            base_revision,
            notebooks: paths
                .into_iter()
                .map(|p| Notebook::new(p, &self.repo_root))
                .collect(),
        })
    }

    /// Build a work item for an explicitly requested notebook
    pub fn notebook_for(&self, path: &Path) -> Notebook {
        Notebook::new(absolutize_from(&self.repo_root, path), &self.repo_root)
    }

    /// Changed files with the notebook extension, as absolute paths
    async fn changed_notebooks(&self, rev: &str) -> Result<BTreeSet<PathBuf>> {
        let names = self.vcs.diff_names(rev).await?;
        Ok(names
            .iter()
            .map(Path::new)
            .filter(|p| self.has_notebook_extension(p))
            .map(|p| absolutize_from(&self.repo_root, p))
            .collect())
    }

    fn has_notebook_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy() == self.extension.as_str())
            .unwrap_or(false)
    }

    /// Expand every exclusion glob under the repository root and union the
    /// matches into one set.
    pub fn expand_exclusions(&self) -> Result<HashSet<PathBuf>, DiscoveryError> {
        let root = Pattern::escape(&self.repo_root.to_string_lossy());
        let mut excluded = HashSet::new();

        for pattern in &self.exclusions {
            let full = format!("{}/{}", root.trim_end_matches('/'), pattern);
            let entries =
                glob_with(&full, MATCH_OPTIONS).map_err(|source| DiscoveryError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;

            for entry in entries {
                match entry {
                    Ok(path) => {
                        excluded.insert(normalize_path(&path));
                    }
                    Err(e) => debug!("Skipping unreadable path while expanding {}: {}", pattern, e),
                }
            }
        }

        debug!(
            "{} exclusion pattern(s) matched {} path(s)",
            self.exclusions.len(),
            excluded.len()
        );
        Ok(excluded)
    }
}
