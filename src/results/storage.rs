//! Run report persistence
//!
//! A finished run is written as one JSON document, or as CSV rows when the
//! report path ends in `.csv`, for CI artifacts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::RunSummary;

/// Persisted record of one harness run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run ID
    pub id: String,

    /// Timestamp when discovery started
    pub started_at: DateTime<Utc>,

    /// Timestamp when the last notebook finished
    pub completed_at: DateTime<Utc>,

    /// Directory holding the base environment and the clones
    pub session_root: PathBuf,

    /// Shard of the work list this worker ran, as `INDEX/COUNT`
    pub shard: Option<String>,

    pub environment: EnvironmentInfo,

    pub summary: RunSummary,
}

/// Host the run happened on
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        session_root: impl Into<PathBuf>,
        summary: RunSummary,
    ) -> Self {
        Self {
            id: generate_run_id(),
            started_at,
            completed_at: Utc::now(),
            session_root: session_root.into(),
            shard: None,
            environment: EnvironmentInfo::default(),
            summary,
        }
    }

    pub fn with_shard(mut self, shard: Option<String>) -> Self {
        self.shard = shard;
        self
    }

    /// Write the report, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        if path.extension().map(|e| e == "csv").unwrap_or(false) {
            self.write_csv(path)?;
        } else {
            let file = File::create(path)
                .with_context(|| format!("Failed to create report file: {}", path.display()))?;
            serde_json::to_writer_pretty(BufWriter::new(file), self)
                .context("Failed to write run report")?;
        }

        info!("Saved run report {} to {}", self.id, path.display());
        Ok(())
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;

        writer.write_record([
            "run_id",
            "notebook",
            "path",
            "status",
            "exit_code",
            "duration_ms",
            "output_path",
            "message",
        ])?;

        for result in &self.summary.results {
            writer.write_record([
                self.id.clone(),
                result.notebook.clone(),
                result.path.display().to_string(),
                result.status.to_string(),
                result.exit_code.map(|c| c.to_string()).unwrap_or_default(),
                result.duration_ms.to_string(),
                result.output_path.display().to_string(),
                result.message.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionOutcome, Notebook, NotebookResult, NotebookStatus};
    use tempfile::tempdir;

    fn summary() -> RunSummary {
        let root = Path::new("/repo");
        let a = Notebook::new("/repo/docs/a.ipynb", root);
        let foo = Notebook::new("/repo/docs/foo.ipynb", root);
        let mut ok = ExecutionOutcome::new("out/docs/a.out.ipynb");
        ok.exit_code = Some(0);
        let mut bad = ExecutionOutcome::new("out/docs/foo.out.ipynb");
        bad.exit_code = Some(1);

        RunSummary::new(
            Some("origin/master".to_string()),
            vec![
                NotebookResult::pass(&a, &ok),
                NotebookResult::fail(&foo, &bad, "Notebook failure: foo.ipynb"),
            ],
        )
    }

    #[test]
    fn test_run_id_format() {
        let id = generate_run_id();
        assert_eq!(id.len(), "20261018_101500_0042".len());
        assert_eq!(&id[8..9], "_");
    }

    #[test]
    fn test_json_report_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/run.json");
        let report = RunReport::new(Utc::now(), "/tmp/session", summary())
            .with_shard(Some("0/2".to_string()));

        report.save(&path).unwrap();
        let loaded: RunReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.shard.as_deref(), Some("0/2"));
        assert_eq!(loaded.summary.failed, 1);
        assert_eq!(loaded.summary.results[1].status, NotebookStatus::Fail);
        assert_eq!(
            loaded.summary.base_revision.as_deref(),
            Some("origin/master")
        );
    }

    #[test]
    fn test_csv_report_has_one_row_per_notebook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.csv");

        RunReport::new(Utc::now(), "/tmp/session", summary())
            .save(&path)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("run_id,notebook"));
        assert!(lines[2].contains("foo.ipynb"));
        assert!(lines[2].contains("FAIL"));
    }
}
