//! Output formatters for notebook results
//!
//! Provides table, JSON, CSV and summary output formats.

use serde::Serialize;

use crate::models::{Notebook, NotebookResult, NotebookStatus, RunSummary};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Work list entry as rendered by `list`
#[derive(Serialize)]
struct ListedNotebook {
    path: String,
    rel_path: String,
    env_name: String,
}

impl From<&Notebook> for ListedNotebook {
    fn from(notebook: &Notebook) -> Self {
        Self {
            path: notebook.path().display().to_string(),
            rel_path: notebook.rel_path().display().to_string(),
            env_name: notebook.env_name(),
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        if self.format == OutputFormat::JsonPretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }

    fn status_label(&self, status: NotebookStatus) -> &'static str {
        match (status, self.colorize) {
            (NotebookStatus::Pass, true) => "\x1b[32m✓ PASS\x1b[0m",
            (NotebookStatus::Fail, true) => "\x1b[31m✗ FAIL\x1b[0m",
            (NotebookStatus::Pass, false) => "✓ PASS",
            (NotebookStatus::Fail, false) => "✗ FAIL",
        }
    }

    fn format_result_table(&self, result: &NotebookResult) -> String {
        let mut line = format!(
            "{:40} {} [{:>8}ms]",
            result.notebook,
            self.status_label(result.status),
            result.duration_ms
        );
        if result.status == NotebookStatus::Fail {
            line.push_str(&format!("\n    -> {}", result.output_path.display()));
        }
        line
    }

    /// Format a run summary
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json | OutputFormat::JsonPretty => self.json(summary),
            OutputFormat::Csv => csv_rows(&summary.results, true),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!(
            " Notebooks changed since {}\n",
            summary.base_revision.as_deref().unwrap_or("<unresolved>")
        ));
        output.push_str("══════════════════════════════════════════════════════════════\n");

        for result in &summary.results {
            output.push_str(&format!(" {}\n", self.format_result_table(result)));
        }

        output.push_str("──────────────────────────────────────────────────────────────\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            " Total: {} | Pass: {} | Fail: {}\n",
            summary.total, pass_str, fail_str
        ));
        output.push_str(&format!(
            " Pass Rate: {:5.1}% | Duration: {}ms\n",
            summary.pass_rate(),
            summary.total_duration_ms
        ));

        let failures: Vec<_> = summary.failures().collect();
        if !failures.is_empty() {
            output.push_str("\n Failures:\n");
            for failure in failures {
                if let Some(message) = &failure.message {
                    output.push_str(&format!("   - {message}\n"));
                }
            }
        }

        output
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{}/{} notebook(s) passed ({:.1}%) in {}ms",
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.total_duration_ms
        )
    }

    /// Format the work list
    pub fn format_notebooks(&self, notebooks: &[Notebook]) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let listed: Vec<ListedNotebook> = notebooks.iter().map(Into::into).collect();
                self.json(&listed)
            }
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                let _ = writer.write_record(["path", "rel_path", "env_name"]);
                for nb in notebooks {
                    let listed = ListedNotebook::from(nb);
                    let _ = writer.write_record([listed.path, listed.rel_path, listed.env_name]);
                }
                into_string(writer)
            }
            OutputFormat::Summary => format!("{} notebook(s) selected", notebooks.len()),
            OutputFormat::Table => notebooks
                .iter()
                .map(|nb| nb.path().display().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn csv_rows(results: &[NotebookResult], header: bool) -> String {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if header {
        let _ = writer.write_record([
            "notebook",
            "status",
            "exit_code",
            "duration_ms",
            "output_path",
            "message",
        ]);
    }
    for result in results {
        let _ = writer.write_record([
            result.notebook.clone(),
            result.status.to_string(),
            result.exit_code.map(|c| c.to_string()).unwrap_or_default(),
            result.duration_ms.to_string(),
            result.output_path.display().to_string(),
            result.message.clone().unwrap_or_default(),
        ]);
    }
    into_string(writer)
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> String {
    writer
        .into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_string())
        .unwrap_or_default()
}
