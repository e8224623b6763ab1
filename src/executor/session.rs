//! Harness session
//!
//! One end-to-end run: discovery, then the shared base environment, then an
//! isolated run per notebook. Only shared setup can fail the session as a
//! whole; notebook failures are results.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::{NotebookRunner, ParallelExecutor, RunnerSettings, Shard};
use crate::config::HarnessConfig;
use crate::discovery::{NotebookSelector, Selection};
use crate::environment::{
    BaseEnvironment, BaseEnvironmentBuilder, EnvironmentProvider, Virtualenv,
};
use crate::models::{Notebook, NotebookResult, RunSummary};
use crate::shell::{CommandRunner, SystemShell};
use crate::utils::path::{absolutize_from, sort_paths};
use crate::vcs::{GitCli, VersionControl};

/// What to run
#[derive(Clone, Debug, Default)]
pub struct RunPlan {
    /// Explicit notebooks; discovery is used when empty
    pub notebooks: Vec<PathBuf>,
    /// Slice of the work list this process owns
    pub shard: Option<Shard>,
}

/// Wires the collaborators together for one repository
pub struct Harness {
    config: HarnessConfig,
    repo_root: PathBuf,
    vcs: Arc<dyn VersionControl>,
    shell: Arc<dyn CommandRunner>,
    provider: Arc<dyn EnvironmentProvider>,
}

impl Harness {
    /// Harness backed by `git`, `venv`/`pip`/`virtualenv-clone` and papermill
    pub fn new(config: HarnessConfig, repo_root: &Path) -> Self {
        let shell: Arc<dyn CommandRunner> = Arc::new(SystemShell);
        Self::with_collaborators(
            config,
            repo_root,
            Arc::new(GitCli::new(repo_root, shell.clone())),
            shell.clone(),
            Arc::new(Virtualenv::new(shell)),
        )
    }

    pub fn with_collaborators(
        config: HarnessConfig,
        repo_root: &Path,
        vcs: Arc<dyn VersionControl>,
        shell: Arc<dyn CommandRunner>,
        provider: Arc<dyn EnvironmentProvider>,
    ) -> Self {
        Self {
            config,
            repo_root: repo_root.to_path_buf(),
            vcs,
            shell,
            provider,
        }
    }

    fn selector(&self) -> NotebookSelector {
        NotebookSelector::from_config(&self.config, &self.repo_root, self.vcs.clone())
    }

    /// Collection phase: the sorted notebooks changed since the base revision
    pub async fn discover(&self) -> Result<Selection> {
        self.selector().select().await
    }

    /// Work items for the candidate notebooks, in work-list order
    pub async fn list_candidate_notebooks(&self) -> Result<Vec<Notebook>> {
        let selector = self.selector();
        let paths = selector.list_candidate_notebooks().await?;
        Ok(paths.iter().map(|p| selector.notebook_for(p)).collect())
    }

    /// Ensure the shared base environment exists
    pub async fn prepare(&self) -> Result<BaseEnvironment> {
        BaseEnvironmentBuilder::new(self.provider.clone(), &self.config)
            .ensure_base_environment(&self.config.session_root)
            .await
            .context("Failed to prepare the base environment")
    }

    /// Run `notebooks` against an already prepared base environment
    pub async fn execute(
        &self,
        base: &BaseEnvironment,
        notebooks: &[Notebook],
    ) -> Vec<NotebookResult> {
        let runner = Arc::new(NotebookRunner::new(
            self.shell.clone(),
            self.provider.clone(),
            RunnerSettings::from_config(&self.config, &self.repo_root),
        ));
        ParallelExecutor::new(self.config.max_concurrent)
            .run_all(runner, base, notebooks)
            .await
    }

    /// Work list for `plan`: explicit notebooks, or the discovered ones
    pub async fn work_list(&self, plan: &RunPlan) -> Result<Selection> {
        let selection = if plan.notebooks.is_empty() {
            self.discover().await?
        } else {
            let mut paths: Vec<PathBuf> = plan
                .notebooks
                .iter()
                .map(|p| absolutize_from(&self.repo_root, p))
                .collect();
            sort_paths(&mut paths);
            let selector = self.selector();
            Selection {
                base_revision: None,
                notebooks: paths.iter().map(|p| selector.notebook_for(p)).collect(),
            }
        };

        Ok(match plan.shard {
            Some(shard) => {
                let notebooks = shard.select(&selection.notebooks);
                info!(
                    "Shard {} owns {} of {} notebook(s)",
                    shard,
                    notebooks.len(),
                    selection.notebooks.len()
                );
                Selection {
                    notebooks,
                    ..selection
                }
            }
            None => selection,
        })
    }

    /// Full session. The base environment is only built when there is
    /// something to run.
    pub async fn run(&self, plan: &RunPlan) -> Result<RunSummary> {
        let selection = self.work_list(plan).await?;

        if selection.is_empty() {
            info!("No notebooks to run");
            return Ok(RunSummary::new(selection.base_revision, Vec::new()));
        }

        let base = self.prepare().await?;
        let results = self.execute(&base, &selection.notebooks).await;
        let summary = RunSummary::new(selection.base_revision, results);

        info!(
            "Run completed - Pass: {}/{} ({:.1}%)",
            summary.passed,
            summary.total,
            summary.pass_rate()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BASE_ENV_DIR;
    use crate::environment::testing::FakeProvider;
    use crate::models::NotebookStatus;
    use crate::shell::testing::FakeShell;
    use crate::shell::CommandOutput;
    use crate::vcs::testing::FakeRepo;
    use std::sync::atomic::Ordering;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        repo: PathBuf,
        config: HarnessConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        for file in [
            "docs/simulation/foo.ipynb",
            "docs/simulation/bar.ipynb",
            "docs/google/vendor.ipynb",
            "docs/characterization/new.ipynb",
        ] {
            let path = repo.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "{}").unwrap();
        }
        let config = HarnessConfig {
            session_root: dir.path().join("session"),
            ..Default::default()
        };
        Fixture { dir, repo, config }
    }

    /// Papermill stand-in that writes the output and fails `foo.ipynb`
    fn papermill() -> Arc<FakeShell> {
        Arc::new(FakeShell::new(|cmd| {
            let out = cmd.args.last().cloned().unwrap_or_default();
            std::fs::write(&out, "{}").unwrap();
            if cmd.args[0].ends_with("/foo.ipynb") {
                CommandOutput::exited(1, "", "PapermillExecutionError\n")
            } else {
                CommandOutput::exited(0, "", "")
            }
        }))
    }

    fn changed_repo() -> FakeRepo {
        FakeRepo::default().with_commit("origin/master").with_changes(&[
            "docs/simulation/foo.ipynb",
            "docs/simulation/bar.ipynb",
            "docs/google/vendor.ipynb",
            "docs/characterization/new.ipynb",
            "cirq/ops.py",
        ])
    }

    #[tokio::test]
    async fn test_end_to_end_reports_failure_and_pass() {
        let fx = fixture();
        let provider = Arc::new(FakeProvider::default());
        let harness = Harness::with_collaborators(
            fx.config.clone(),
            &fx.repo,
            Arc::new(changed_repo()),
            papermill(),
            provider.clone(),
        );

        let summary = harness.run(&RunPlan::default()).await.unwrap();

        assert_eq!(summary.base_revision.as_deref(), Some("origin/master"));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(provider.installs.load(Ordering::SeqCst), 1);

        let bar = &summary.results[0];
        assert_eq!(bar.notebook, "bar.ipynb");
        assert_eq!(bar.status, NotebookStatus::Pass);

        let foo = &summary.results[1];
        assert_eq!(foo.status, NotebookStatus::Fail);
        let message = foo.message.as_deref().unwrap();
        assert!(message.contains("foo.ipynb"));
        assert!(message.contains("out/docs/simulation/foo.out.ipynb"));
        assert!(fx.repo.join("out/docs/simulation/foo.out.ipynb").is_file());
        assert!(fx.dir.path().join("session/clones/docs__simulation__foo").is_dir());
    }

    #[tokio::test]
    async fn test_nothing_to_run_skips_base_environment() {
        let fx = fixture();
        let provider = Arc::new(FakeProvider::default());
        let harness = Harness::with_collaborators(
            fx.config.clone(),
            &fx.repo,
            // shallow clone: no candidate revision exists
            Arc::new(FakeRepo::default()),
            papermill(),
            provider.clone(),
        );

        let summary = harness.run(&RunPlan::default()).await.unwrap();

        assert_eq!(summary.total, 0);
        assert_eq!(summary.exit_code(), 0);
        assert!(summary.base_revision.is_none());
        assert_eq!(provider.creates.load(Ordering::SeqCst), 0);
        assert!(!fx.config.session_root.join(BASE_ENV_DIR).exists());
    }

    #[tokio::test]
    async fn test_explicit_notebooks_and_shard() {
        let fx = fixture();
        let harness = Harness::with_collaborators(
            fx.config.clone(),
            &fx.repo,
            Arc::new(FakeRepo::default()),
            papermill(),
            Arc::new(FakeProvider::default()),
        );
        let plan = RunPlan {
            notebooks: vec![
                PathBuf::from("docs/simulation/foo.ipynb"),
                PathBuf::from("./docs/simulation/bar.ipynb"),
                PathBuf::from("docs/simulation/bar.ipynb"),
            ],
            shard: Some(Shard::new(0, 2).unwrap()),
        };

        let selection = harness.work_list(&plan).await.unwrap();
        assert_eq!(
            selection.paths(),
            vec![fx.repo.join("docs/simulation/bar.ipynb")]
        );

        let summary = harness.run(&plan).await.unwrap();
        assert_eq!(summary.total, 1);
        assert!(summary.is_all_passed());
    }

    #[tokio::test]
    async fn test_base_environment_failure_aborts_session() {
        let fx = fixture();
        let harness = Harness::with_collaborators(
            fx.config.clone(),
            &fx.repo,
            Arc::new(changed_repo()),
            papermill(),
            Arc::new(FakeProvider {
                fail_install: true,
                ..Default::default()
            }),
        );

        let err = harness.run(&RunPlan::default()).await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to prepare the base environment"));
    }

    #[tokio::test]
    async fn test_list_candidate_notebooks() {
        let fx = fixture();
        let harness = Harness::with_collaborators(
            fx.config.clone(),
            &fx.repo,
            Arc::new(changed_repo()),
            papermill(),
            Arc::new(FakeProvider::default()),
        );

        let listed = harness.list_candidate_notebooks().await.unwrap();

        let rel: Vec<PathBuf> = listed.iter().map(|nb| nb.rel_path().to_path_buf()).collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("docs/simulation/bar.ipynb"),
                PathBuf::from("docs/simulation/foo.ipynb"),
            ]
        );
    }
}
