//! Per-notebook runner
//!
//! Runs one notebook through `prepare output -> clone -> execute` inside a
//! private copy of the base environment. The steps form one linear pipeline:
//! the first failing step ends it and the whole run becomes one failed
//! outcome. Nothing is retried.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::environment::{Activation, BaseEnvironment, EnvironmentProvider};
use crate::models::{ExecutionOutcome, Notebook, NotebookState, RunStep};
use crate::shell::{CommandOutput, CommandRunner, ShellCommand};
use crate::utils::path::absolutize_from;
use crate::utils::Timer;

/// Notebook execution collaborator: `papermill <input> <output>`
#[derive(Clone, Debug)]
pub struct Papermill {
    program: String,
}

impl Default for Papermill {
    fn default() -> Self {
        Self {
            program: "papermill".to_string(),
        }
    }
}

impl Papermill {
    /// Command executing `input` and writing the executed notebook, outputs
    /// included, to `output`. Exits non-zero when a cell fails.
    pub fn command(&self, env: &Activation, input: &Path, output: &Path) -> ShellCommand {
        ShellCommand::new(env.executable(&self.program).to_string_lossy())
            .path_arg(input)
            .path_arg(output)
    }
}

/// Layout and limits shared by every notebook run
#[derive(Clone, Debug)]
pub struct RunnerSettings {
    pub repo_root: PathBuf,
    pub output_root: PathBuf,
    pub output_suffix: String,
    pub timeout: Option<Duration>,
}

impl RunnerSettings {
    pub fn from_config(config: &HarnessConfig, repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            output_root: config.output_root.clone(),
            output_suffix: config.output_suffix.clone(),
            timeout: config.notebook_timeout(),
        }
    }
}

/// Paths a single run works with
struct StepContext<'a> {
    notebook: &'a Notebook,
    base: &'a BaseEnvironment,
    env_dir: PathBuf,
    output_file: PathBuf,
}

/// Runs notebooks in isolated environment clones
pub struct NotebookRunner {
    shell: Arc<dyn CommandRunner>,
    provider: Arc<dyn EnvironmentProvider>,
    engine: Papermill,
    settings: RunnerSettings,
}

impl NotebookRunner {
    pub fn new(
        shell: Arc<dyn CommandRunner>,
        provider: Arc<dyn EnvironmentProvider>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            shell,
            provider,
            engine: Papermill::default(),
            settings,
        }
    }

    /// Output path of `notebook` as shown to users
    pub fn output_path_for(&self, notebook: &Notebook) -> PathBuf {
        notebook.output_path(&self.settings.output_root, &self.settings.output_suffix)
    }

    /// Run one notebook. Failures are part of the returned outcome.
    pub async fn run_notebook(
        &self,
        notebook: &Notebook,
        base: &BaseEnvironment,
    ) -> ExecutionOutcome {
        let timer = Timer::start(format!("notebook {notebook}"));
        let output_path = self.output_path_for(notebook);
        let ctx = StepContext {
            notebook,
            base,
            env_dir: base.clone_dir(&notebook.env_name()),
            output_file: absolutize_from(&self.settings.repo_root, &output_path),
        };

        let mut outcome = ExecutionOutcome::new(output_path);
        info!("Running {}", notebook);

        for step in RunStep::ALL {
            advance(&mut outcome, notebook, step.state());

            match self.run_step(step, &ctx).await {
                Ok(output) => {
                    outcome.append_streams(&output.stdout, &output.stderr);
                    outcome.exit_code = output.status;
                    outcome.timed_out = output.timed_out;
                    if !output.success() {
                        outcome.failed_step = Some(step);
                        break;
                    }
                }
                Err(e) => {
                    outcome.append_streams("", &format!("{e:#}\n"));
                    outcome.exit_code = None;
                    outcome.failed_step = Some(step);
                    break;
                }
            }
        }

        outcome.duration_ms = timer.stop();
        debug!(
            "{} finished in state {} with exit status {}",
            notebook,
            outcome.final_state(),
            outcome.status_code()
        );
        outcome
    }

    async fn run_step(&self, step: RunStep, ctx: &StepContext<'_>) -> Result<CommandOutput> {
        match step {
            RunStep::PrepareOutput => self.prepare_output(ctx).await,
            RunStep::Clone => self.clone_environment(ctx).await,
            RunStep::Execute => self.execute(ctx).await,
        }
    }

    /// Create the output directory; already existing is fine
    async fn prepare_output(&self, ctx: &StepContext<'_>) -> Result<CommandOutput> {
        if let Some(dir) = ctx.output_file.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        }
        Ok(CommandOutput::exited(0, "", ""))
    }

    /// Copy the base environment into this notebook's private directory.
    ///
    /// A clone left behind by an earlier session is owned by this notebook
    /// alone, so it is removed first.
    async fn clone_environment(&self, ctx: &StepContext<'_>) -> Result<CommandOutput> {
        if ctx.env_dir.exists() {
            debug!("Removing stale clone {}", ctx.env_dir.display());
            tokio::fs::remove_dir_all(&ctx.env_dir)
                .await
                .with_context(|| format!("Failed to remove {}", ctx.env_dir.display()))?;
        }

        let output = self
            .provider
            .clone_env(&ctx.base.env_dir, &ctx.env_dir)
            .await
            .with_context(|| format!("Failed to clone into {}", ctx.env_dir.display()))?;
        Ok(output)
    }

    /// Execute the notebook with the clone activated and its directory as
    /// the working directory
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<CommandOutput> {
        let activation = self.provider.activate(&ctx.env_dir);
        let cmd = self
            .engine
            .command(&activation, ctx.notebook.path(), &ctx.output_file)
            .current_dir(&ctx.env_dir)
            .timeout(self.settings.timeout);
        let cmd = activation.apply(cmd);

        let output = self
            .shell
            .run(&cmd)
            .await
            .with_context(|| format!("Failed to execute {}", ctx.notebook))?;
        Ok(output)
    }
}

fn advance(outcome: &mut ExecutionOutcome, notebook: &Notebook, next: NotebookState) {
    if outcome.reached != next {
        debug_assert!(outcome.reached.can_transition_to(next));
        debug!("{}: {} -> {}", notebook, outcome.reached, next);
        outcome.reached = next;
    }
}
