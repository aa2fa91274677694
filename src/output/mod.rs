//! Output formatting module
//!
//! Handles:
//! - Human-readable event lines (HumanSink) and JSON export
//! - Run summary in human and JSON form
//! - Listings for --list-events and --print-mute-rules

use anyhow::Result;
use std::fmt::Write as _;
use std::io::Write;

use crate::error::EsmResult;
use crate::models::{ClassifiedEvent, EventKind, PipelineSummary};
use crate::mute::RuleTable;
use crate::pipeline::{export_json, JsonStyle, PersistenceSink};

/// One line per event: time, kind, pid, process path, context and target
pub fn format_event_line(event: &ClassifiedEvent) -> String {
    let process_path = event
        .process
        .executable
        .as_ref()
        .map(|exe| exe.path.as_str())
        .unwrap_or("-");

    let mut line = format!(
        "{} {:<28} [{}] {}",
        event.time.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        event.kind.short_name(),
        event.process.pid,
        process_path
    );
    if let Some(context) = &event.context {
        let _ = write!(line, " | {}", context);
    }
    match (&event.target_path, &event.context) {
        (Some(target), Some(context)) if context.contains(target.as_str()) => {}
        (Some(target), _) => {
            let _ = write!(line, " -> {}", target);
        }
        (None, _) => {}
    }
    line
}

/// Writes `format_event_line` output
pub struct HumanSink<W> {
    writer: W,
}

impl<W: Write + Send> HumanSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> PersistenceSink for HumanSink<W> {
    fn persist(&mut self, batch: &[ClassifiedEvent]) -> EsmResult<()> {
        for event in batch {
            writeln!(self.writer, "{}", format_event_line(event))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

pub fn format_summary(summary: &PipelineSummary) -> String {
    let mut out = String::from("Pipeline Summary:\n");
    let _ = writeln!(out, "  Received: {} messages", summary.received);
    if summary.unsubscribed > 0 {
        let _ = writeln!(out, "  Unsubscribed: {} messages", summary.unsubscribed);
    }
    let _ = writeln!(out, "  Suppressed: {} messages", summary.suppressed);
    let _ = writeln!(out, "  Admitted: {} messages", summary.admitted);
    if summary.unknown > 0 {
        let _ = writeln!(out, "  Unknown kind: {} messages", summary.unknown);
    }
    let _ = writeln!(out, "  Persisted: {} events in {} flushes", summary.persisted, summary.flushes);
    if summary.deadline_overruns > 0 {
        let _ = writeln!(out, "  Deadline overruns: {}", summary.deadline_overruns);
    }
    if summary.sink_failures > 0 {
        let _ = writeln!(out, "  Sink failures: {}", summary.sink_failures);
    }
    let _ = writeln!(out, "  Save interval: {:.3}s", summary.save_interval);

    let duration_sec = summary.duration_ms as f64 / 1000.0;
    if duration_sec < 1.0 {
        let _ = writeln!(out, "  Duration: {}ms", summary.duration_ms);
    } else {
        let _ = writeln!(out, "  Duration: {:.2}s", duration_sec);
    }

    if let Some(true) = summary.interrupted {
        let _ = writeln!(out, "  Status: Interrupted by user");
    }
    out
}

/// Print the run summary to stderr, keeping stdout for events
pub fn print_summary(summary: &PipelineSummary, json: bool) -> Result<()> {
    if json {
        eprintln!("{}", export_json(summary, JsonStyle::Pretty)?);
    } else {
        eprint!("{}", format_summary(summary));
    }
    Ok(())
}

/// Supported kinds, default subscriptions marked with `*`
pub fn format_event_list(json: bool) -> Result<String> {
    let defaults = EventKind::default_subscriptions();
    if json {
        let entries: Vec<serde_json::Value> = EventKind::supported()
            .into_iter()
            .map(|kind| {
                serde_json::json!({
                    "name": kind.name(),
                    "code": kind.code(),
                    "default": defaults.contains(&kind),
                })
            })
            .collect();
        return Ok(export_json(&entries, JsonStyle::Pretty)?);
    }

    let mut out = String::new();
    for kind in EventKind::supported() {
        let marker = if defaults.contains(&kind) { "*" } else { " " };
        let code = kind.code().unwrap_or_default();
        let _ = writeln!(out, "{} {:>3}  {}", marker, code, kind.name());
    }
    let _ = writeln!(out, "\n* subscribed by default");
    Ok(out)
}

/// Effective rule table as a JSON list of rule records
pub fn format_rule_records(table: &RuleTable) -> Result<String> {
    Ok(export_json(&table.to_records(), JsonStyle::Pretty)?)
}
