//! Logging backend setup and structured pipeline events
//!
//! Provides:
//! - init_logger: macOS Unified Logging under the esmonitor subsystem, stderr elsewhere
//! - PipelineLogger: JSON payloads for pipeline lifecycle events

use anyhow::{anyhow, Result};
use log::{error, info, warn, LevelFilter};
use serde_json::json;
use std::time::Duration;

use crate::constants::APP_SUBSYSTEM;
use crate::models::{EventKind, PipelineSummary};

/// Install the process wide logger
#[cfg(target_os = "macos")]
pub fn init_logger(level: LevelFilter) -> Result<()> {
    let logger = oslog::OsLogger::new(APP_SUBSYSTEM).level_filter(level);
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| anyhow!("Failed to set logger: {}", e))?;
    log::set_max_level(level);
    Ok(())
}

/// Install the process wide logger
#[cfg(not(target_os = "macos"))]
pub fn init_logger(level: LevelFilter) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .map_err(|e| anyhow!("Failed to set logger for {}: {}", APP_SUBSYSTEM, e))?;
    Ok(())
}

/// Minimum level of structured pipeline events that get emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
}

/// Structured logger for pipeline lifecycle events
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    level: LogLevel,
}

impl Default for PipelineLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl PipelineLogger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    pub fn log_startup(&self, source: &str, rule_count: usize, subscriptions: usize, deadline: Duration) {
        let message = json!({
            "event": "pipeline_startup",
            "pid": std::process::id(),
            "source": source,
            "mute_rules": rule_count,
            "subscriptions": subscriptions,
            "deadline_ms": deadline.as_millis() as u64,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, "Pipeline started", &message)
    }

    pub fn log_shutdown(&self, summary: &PipelineSummary) {
        let reason = if summary.interrupted == Some(true) {
            "signal"
        } else {
            "source_exhausted"
        };
        let message = json!({
            "event": "pipeline_shutdown",
            "reason": reason,
            "received": summary.received,
            "suppressed": summary.suppressed,
            "admitted": summary.admitted,
            "persisted": summary.persisted,
            "deadline_overruns": summary.deadline_overruns,
            "sink_failures": summary.sink_failures,
            "duration_ms": summary.duration_ms,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, "Pipeline shutting down", &message)
    }

    pub fn log_rule_reload(&self, rule_count: usize) {
        let message = json!({
            "event": "mute_rules_reloaded",
            "mute_rules": rule_count,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Info, "Mute rules reloaded", &message)
    }

    /// The previous table stays live when a reload fails
    pub fn log_reload_failure(&self, err: &anyhow::Error) {
        let message = json!({
            "event": "mute_rules_reload_failed",
            "message": format!("{:#}", err),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Error, "Mute rule reload failed", &message)
    }

    pub fn log_deadline_overrun(&self, kind: EventKind, seq_num: u64, elapsed: Duration, deadline: Duration) {
        let message = json!({
            "event": "deadline_overrun",
            "event_type": kind.name(),
            "seq_num": seq_num,
            "elapsed_ms": elapsed.as_millis() as u64,
            "deadline_ms": deadline.as_millis() as u64,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(
            LogLevel::Warn,
            &format!("Processing of {} exceeded the source deadline", kind.short_name()),
            &message,
        )
    }

    pub fn log_sink_failure(&self, batch_len: usize, err: &dyn std::error::Error) {
        let message = json!({
            "event": "sink_failure",
            "dropped": batch_len,
            "message": err.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(LogLevel::Error, "Failed to persist event batch", &message)
    }

    fn log_structured(&self, level: LogLevel, message: &str, data: &serde_json::Value) {
        if !self.should_log(level) {
            return;
        }

        let full_message = format!("{} | {}", message, data);
        match level {
            LogLevel::Error => error!("{}", full_message),
            LogLevel::Warn => warn!("{}", full_message),
            LogLevel::Info => info!("{}", full_message),
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        match (self.level, level) {
            (_, LogLevel::Error) => true,
            (LogLevel::Warn | LogLevel::Info, LogLevel::Warn) => true,
            (LogLevel::Info, LogLevel::Info) => true,
            _ => false,
        }
    }
}
