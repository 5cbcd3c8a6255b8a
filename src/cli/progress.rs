//! Console Progress Rendering
//!
//! Prints pipeline progress events to stderr as they arrive. The renderer is
//! a passive [`ProgressObserver`]; it never blocks the pipeline.

use console::style;
use serde_json::Value;
use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;

use crate::notifier::{EventKind, ProgressEvent, ProgressObserver};
use crate::types::Result;

/// Console progress renderer
pub struct ConsoleRenderer {
    started: Mutex<Option<Instant>>,
    show_details: bool,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(None),
            show_details: false,
        }
    }

    /// Also print `vulnerability_found` descriptions and step details
    pub fn with_details(mut self, show: bool) -> Self {
        self.show_details = show;
        self
    }

    fn elapsed_secs(&self) -> u64 {
        self.started
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .map(|s| s.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// One styled line per event, or `None` for events not shown
    pub fn render(&self, event: &ProgressEvent) -> Option<String> {
        if event.kind == EventKind::AnalysisStarted {
            *self.started.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        }

        let message = event.field("message").unwrap_or_default();
        let line = match event.kind {
            EventKind::AnalysisStarted => format!(
                "{} {} {}",
                style("▶").cyan().bold(),
                style(message).bold(),
                style(event.field("target").map(short_target).unwrap_or_default()).dim()
            ),
            EventKind::StepStarted => format!(
                "  {} {} {}",
                style("•").blue(),
                style(event.field("step").unwrap_or("step")).bold(),
                message
            ),
            EventKind::StepCompleted => {
                let details = if self.show_details {
                    event
                        .data
                        .get("details")
                        .filter(|d| !d.is_null())
                        .map(|d| format!(" {}", style(d).dim()))
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                format!(
                    "  {} {} {}{}",
                    style("✓").green(),
                    style(event.field("step").unwrap_or("step")).bold(),
                    message,
                    details
                )
            }
            EventKind::FileStarted => {
                let index = event.data.get("index").and_then(Value::as_u64).unwrap_or(0);
                let total = event.data.get("total").and_then(Value::as_u64).unwrap_or(0);
                format!(
                    "    {} {}/{} {}",
                    render_progress_bar(index as usize, total as usize, 20),
                    index,
                    total,
                    style(event.field("file").unwrap_or_default()).dim()
                )
            }
            EventKind::FileCompleted => return None,
            EventKind::VulnerabilityFound => {
                let vuln = event.data.get("vulnerability");
                let severity = vuln
                    .and_then(|v| v.get("severity"))
                    .and_then(Value::as_str)
                    .unwrap_or("medium");
                let kind = vuln
                    .and_then(|v| v.get("vuln_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let mut line = format!("    {} {}", severity_badge(severity), kind);
                if self.show_details
                    && let Some(desc) = vuln
                        .and_then(|v| v.get("description"))
                        .and_then(Value::as_str)
                {
                    line.push_str(&format!(" {}", style(desc).dim()));
                }
                line
            }
            EventKind::AnalysisCompleted => format!(
                "{} {} {}",
                style("✓").green().bold(),
                style(message).bold(),
                style(format!("({})", format_duration(self.elapsed_secs()))).dim()
            ),
            EventKind::AnalysisFailed => format!(
                "{} {}: {}",
                style("✗").red().bold(),
                style(message).bold(),
                event.field("error").unwrap_or_default()
            ),
        };

        Some(line)
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleRenderer {
    fn notify(&self, event: &ProgressEvent) -> Result<()> {
        if let Some(line) = self.render(event) {
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "{}", line)?;
        }
        Ok(())
    }
}

fn severity_badge(severity: &str) -> String {
    let label = format!("[{}]", severity.to_uppercase());
    match severity {
        "critical" => style(label).red().bold().to_string(),
        "high" => style(label).red().to_string(),
        "medium" => style(label).yellow().to_string(),
        _ => style(label).dim().to_string(),
    }
}

/// Inline code targets are shown as their first line only
fn short_target(target: &str) -> String {
    let first = target.lines().next().unwrap_or_default();
    if first.chars().count() > 60 || target.contains('\n') {
        format!("{}…", first.chars().take(60).collect::<String>())
    } else {
        first.to_string()
    }
}

/// Render a simple progress bar
fn render_progress_bar(completed: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return format!("[{}]", " ".repeat(width));
    }

    let progress = (completed as f32 / total as f32).min(1.0);
    let filled = (progress * width as f32) as usize;
    let empty = width.saturating_sub(filled);

    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format duration as human-readable string
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
