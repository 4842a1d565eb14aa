//! Reporters consume workflow events as they are emitted.
//!
//! A reporter error is logged and otherwise ignored; it never changes the
//! outcome of a run.

use anyhow::Result;
use crossterm::style::{Color, Stylize};
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use forgeloop_stage_api::{EventType, WorkflowEvent};
use forgeloop_utils::logging::use_color;

use crate::report::{RunReport, RunStatus};

pub trait Reporter: Send + Sync {
    fn on_event(&self, event: &WorkflowEvent) -> Result<()>;

    fn on_complete(&self, _report: &RunReport) -> Result<()> {
        Ok(())
    }
}

/// Emits every event as a structured tracing event.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn on_event(&self, event: &WorkflowEvent) -> Result<()> {
        match event.event_type {
            EventType::Error => warn!(
                seq = event.sequence,
                stage = %event.stage_name,
                payload = %event.payload,
                "Workflow event: error"
            ),
            other => info!(
                seq = event.sequence,
                stage = %event.stage_name,
                event = %other,
                "Workflow event"
            ),
        }
        Ok(())
    }

    fn on_complete(&self, report: &RunReport) -> Result<()> {
        info!(
            run_id = %report.run_id,
            status = %report.status,
            events = report.events.len(),
            iterations = report.iterations.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Run finished"
        );
        Ok(())
    }
}

/// Human-readable progress lines, colored when stdout is a terminal.
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
    color: bool,
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl ConsoleReporter {
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            out: Mutex::new(Box::new(std::io::stdout())),
            color: use_color(),
        }
    }

    /// Write uncolored lines to `out`.
    #[must_use]
    pub fn to_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            color: false,
        }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            format!("{}", text.with(color))
        } else {
            text.to_string()
        }
    }

    fn line(&self, text: &str) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{text}")?;
        out.flush()?;
        Ok(())
    }
}

impl Reporter for ConsoleReporter {
    fn on_event(&self, event: &WorkflowEvent) -> Result<()> {
        let stage = &event.stage_name;
        let text = match event.event_type {
            EventType::StageStart => format!("{} {stage}", self.paint("▶", Color::Cyan)),
            EventType::StageEnd => {
                let status = event.payload["status"].as_str().unwrap_or("unknown");
                let (mark, color) = match status {
                    "success" => ("✓", Color::Green),
                    "skipped" => ("-", Color::DarkGrey),
                    _ => ("✗", Color::Red),
                };
                match event.payload["error"].as_str() {
                    Some(error) => format!("{} {stage}: {error}", self.paint(mark, color)),
                    None => format!("{} {stage}", self.paint(mark, color)),
                }
            }
            EventType::StageSkipped => {
                format!("{} {stage} (skipped)", self.paint("-", Color::DarkGrey))
            }
            EventType::Intervention => format!(
                "{} {stage}: {}",
                self.paint("↻", Color::Yellow),
                event.payload["decision"].as_str().unwrap_or("?")
            ),
            EventType::Error => format!(
                "{} {stage}: {}",
                self.paint("!", Color::Red),
                event.payload["error"].as_str().unwrap_or("fault")
            ),
        };
        self.line(&text)
    }

    fn on_complete(&self, report: &RunReport) -> Result<()> {
        let color = match report.status {
            RunStatus::Success => Color::Green,
            RunStatus::Error => Color::Red,
            RunStatus::Cancelled => Color::Yellow,
        };
        self.line(&format!(
            "run {} finished: {} ({} iteration(s), {:.1}s)",
            report.run_id,
            self.paint(&report.status.to_string(), color),
            report.iterations.len(),
            report.duration.as_secs_f64()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn event(event_type: EventType, stage: &str, payload: Value) -> WorkflowEvent {
        WorkflowEvent {
            sequence: 0,
            event_type,
            stage_name: stage.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_console_lines() {
        let buf = SharedBuf::default();
        let reporter = ConsoleReporter::to_writer(buf.clone());

        reporter
            .on_event(&event(EventType::StageStart, "coding", json!({})))
            .unwrap();
        reporter
            .on_event(&event(
                EventType::StageEnd,
                "verification",
                json!({"status": "failed", "error": "retry budget exhausted"}),
            ))
            .unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "▶ coding\n✗ verification: retry budget exhausted\n");
    }
}
