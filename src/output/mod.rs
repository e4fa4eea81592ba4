//! Report formatting and progress display

use crate::task::{Outcome, RunSummary, TaskStatus};
use crate::RunError;
use chrono::{DateTime, Utc};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};

/// Output format options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<String>,
    pub colored: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
        }
    }
}

/// JSON report envelope
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Utc>,
    summary: &'a RunSummary,
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Write the run report to the configured sink
    pub fn write_summary(&self, summary: &RunSummary) -> crate::Result<()> {
        let output = match self.config.format {
            OutputFormat::Text => self.format_text(summary),
            OutputFormat::Json => self.format_json(summary)?,
            OutputFormat::Csv => self.format_csv(summary)?,
        };

        match &self.config.file {
            Some(path) => {
                let mut file = File::create(path)?;
                file.write_all(output.as_bytes())?;
            }
            None => {
                io::stdout().write_all(output.as_bytes())?;
            }
        }

        Ok(())
    }

    fn use_color(&self) -> bool {
        // ANSI sequences only make sense on the terminal
        self.config.colored && self.config.file.is_none()
    }

    fn format_text(&self, summary: &RunSummary) -> String {
        let mut out = String::new();
        let color = self.use_color();

        let header = format!(
            "Batch run report - {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if color {
            out.push_str(&format!("{}\n", header.bright_white().bold()));
        } else {
            out.push_str(&format!("{}\n", header));
        }
        out.push_str(&"=".repeat(50));
        out.push('\n');

        let lines = [
            ("Total tasks", summary.total.to_string()),
            ("Completed", summary.completed().to_string()),
            ("Succeeded", summary.succeeded.to_string()),
            ("Failed", summary.failed.to_string()),
            ("Timed out", summary.timed_out.to_string()),
            ("Cancelled", summary.cancelled.to_string()),
            (
                "Duration",
                format!(
                    "{:.1}s ({:.1} tasks/sec)",
                    summary.duration.as_secs_f64(),
                    summary.run_rate()
                ),
            ),
        ];
        for (label, value) in lines {
            out.push_str(&format!("{:<14} {}\n", format!("{}:", label), value));
        }

        let troubled: Vec<&Outcome> = summary
            .per_task
            .iter()
            .filter(|o| !o.is_success())
            .collect();

        if !troubled.is_empty() {
            out.push('\n');
            let heading = format!("{:<10} {:<10} {:<9} {:<6} {}",
                "TASK", "STATUS", "ATTEMPTS", "EXIT", "DURATION");
            if color {
                out.push_str(&format!("{}\n", heading.bright_white().bold()));
            } else {
                out.push_str(&format!("{}\n", heading));
            }

            for outcome in troubled {
                let status = outcome.status.as_str();
                let status_cell = if color {
                    match outcome.status {
                        TaskStatus::Failure => status.bright_red().to_string(),
                        TaskStatus::TimedOut => status.bright_yellow().to_string(),
                        TaskStatus::Cancelled => status.bright_magenta().to_string(),
                        TaskStatus::Success => status.bright_green().to_string(),
                    }
                } else {
                    status.to_string()
                };

                let exit = outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string());

                out.push_str(&format!(
                    "{:<10} {:<10} {:<9} {:<6} {:.1}s\n",
                    outcome.task_id,
                    status_cell,
                    outcome.attempts_used,
                    exit,
                    outcome.duration.as_secs_f64()
                ));

                if let Some(error) = &outcome.error {
                    out.push_str(&format!("           {}\n", error));
                }
            }
        }

        out
    }

    fn format_json(&self, summary: &RunSummary) -> crate::Result<String> {
        let report = RunReport {
            generated_at: Utc::now(),
            summary,
        };

        serde_json::to_string_pretty(&report)
            .map_err(|e| RunError::OutputError(format!("JSON serialization failed: {}", e)))
    }

    fn format_csv(&self, summary: &RunSummary) -> crate::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer
            .write_record([
                "task_id",
                "status",
                "attempts_used",
                "exit_code",
                "duration_ms",
                "error",
            ])
            .map_err(|e| RunError::OutputError(format!("CSV write failed: {}", e)))?;

        for outcome in &summary.per_task {
            let exit_code = outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_default();
            writer
                .write_record([
                    outcome.task_id.clone(),
                    outcome.status.as_str().to_string(),
                    outcome.attempts_used.to_string(),
                    exit_code,
                    outcome.duration.as_millis().to_string(),
                    outcome.error.clone().unwrap_or_default(),
                ])
                .map_err(|e| RunError::OutputError(format!("CSV write failed: {}", e)))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| RunError::OutputError(format!("CSV flush failed: {}", e)))?;

        String::from_utf8(bytes)
            .map_err(|e| RunError::OutputError(format!("CSV not valid UTF-8: {}", e)))
    }
}

/// Terminal progress bar fed from aggregator counters
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "[{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ETA {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
        );
        Self { bar }
    }

    pub fn update(&self, completed: usize) {
        self.bar.set_position(completed as u64);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
