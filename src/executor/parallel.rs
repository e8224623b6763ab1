//! Parallel notebook execution
//!
//! Fans the per-notebook runner out over the work list with bounded
//! concurrency, and partitions the work list between independent workers.

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use super::NotebookRunner;
use crate::environment::BaseEnvironment;
use crate::models::{ExecutionOutcome, Notebook, NotebookResult};
use crate::results::reporter;
use crate::utils::Timer;

/// Parallel notebook executor
pub struct ParallelExecutor {
    max_concurrent: usize,
}

impl ParallelExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run every notebook against `base`, returning results in work-list
    /// order. A failing notebook never affects its siblings.
    pub async fn run_all(
        &self,
        runner: Arc<NotebookRunner>,
        base: &BaseEnvironment,
        notebooks: &[Notebook],
    ) -> Vec<NotebookResult> {
        info!(
            "Running {} notebook(s), at most {} at a time",
            notebooks.len(),
            self.max_concurrent
        );

        let timer = Timer::start("notebook batch");
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(notebooks.len());

        for notebook in notebooks {
            let semaphore = semaphore.clone();
            let runner = runner.clone();
            let base = base.clone();
            let notebook = notebook.clone();

            handles.push(tokio::spawn(async move {
                // the semaphore is never closed, so a permit always arrives
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = runner.run_notebook(&notebook, &base).await;
                reporter::report(&notebook, &outcome)
            }));
        }

        let results = join_all(handles)
            .await
            .into_iter()
            .zip(notebooks)
            .map(|(joined, notebook)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Worker for {} aborted: {}", notebook, e);
                    let mut outcome = ExecutionOutcome::new(runner.output_path_for(notebook));
                    outcome.stderr = format!("worker aborted: {e}\n");
                    reporter::report(notebook, &outcome)
                }
            })
            .collect::<Vec<_>>();

        info!("Batch finished in {}ms", timer.stop());
        results
    }
}

/// Deterministic slice of the sorted work list owned by one worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shard {
    pub index: usize,
    pub count: usize,
}

impl Shard {
    pub fn new(index: usize, count: usize) -> Result<Self> {
        if count == 0 {
            bail!("Shard count must be at least 1");
        }
        if index >= count {
            bail!("Shard index {index} is out of range for {count} shard(s)");
        }
        Ok(Self { index, count })
    }

    /// Items at positions `i` with `i % count == index`. Every worker
    /// derives the same sorted list, so shards are disjoint and complete.
    pub fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .enumerate()
            .filter(|(i, _)| i % self.count == self.index)
            .map(|(_, item)| item.clone())
            .collect()
    }
}

impl FromStr for Shard {
    type Err = anyhow::Error;

    /// Parse `INDEX/COUNT`, e.g. `0/4`
    fn from_str(s: &str) -> Result<Self> {
        let (index, count) = s
            .split_once('/')
            .with_context(|| format!("Invalid shard '{s}', expected INDEX/COUNT"))?;
        let index = index
            .trim()
            .parse()
            .with_context(|| format!("Invalid shard index in '{s}'"))?;
        let count = count
            .trim()
            .parse()
            .with_context(|| format!("Invalid shard count in '{s}'"))?;
        Self::new(index, count)
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}
