//! Error types shared across the library
//!
//! Nothing on the delivery path aborts the pipeline: these errors surface from
//! configuration loading, rule parsing and the I/O edges (source and sink).

use std::path::PathBuf;

/// Errors produced by esmonitor library code
#[derive(Debug, thiserror::Error)]
pub enum EsmError {
    #[error("Invalid mute rule entry at index {index}: {reason}")]
    RuleParse { index: usize, reason: String },

    #[error("Mute rule file is not a JSON array of rule records: {0}")]
    RuleFile(#[source] serde_json::Error),

    #[error("Unknown event kind name: {0}")]
    UnknownEventKind(String),

    #[error("Unknown mute path type: {0}")]
    UnknownMuteMode(String),

    /// Note: bounds must match the validation in config::PipelineSettings
    #[error("Invalid processing deadline: {0}ms. Must be between 1 and 60000 milliseconds")]
    InvalidDeadline(u64),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Persistence sink failed: {0}")]
    Sink(#[from] std::io::Error),
}

pub type EsmResult<T> = std::result::Result<T, EsmError>;
