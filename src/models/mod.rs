//! Data models module
//!
//! Defines core data structures:
//! - EventKind: the closed set of notification kinds
//! - RawMessage: the raw notification as delivered by an event source
//! - DomainEvent: one typed record per kind
//! - ClassifiedEvent: a DomainEvent plus message metadata and its indexing triple
//! - PipelineSummary: aggregated run statistics

pub mod artifacts;
pub mod event_kind;
pub mod events;
pub mod raw;

pub use artifacts::*;
pub use event_kind::EventKind;
pub use events::*;
pub use raw::{RawMessage, RawPayload, RawProcess};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A classified, enriched event ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub id: Uuid,
    /// Canonical kind name, `NOT_MAPPED` for unknown kinds
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    pub version: u32,
    pub time: DateTime<Utc>,
    pub mach_time: u64,
    pub seq_num: u64,
    pub global_seq_num: Option<u64>,
    pub thread_id: Option<u64>,
    /// Process that caused the event
    pub process: Process,
    pub event: DomainEvent,
    /// Human summary used for search and display
    pub context: Option<String>,
    /// Affected object, `None` when the kind has no meaningful one
    pub target_path: Option<String>,
}

impl ClassifiedEvent {
    pub fn event_type(&self) -> &'static str {
        self.kind.name()
    }
}

/// Summary statistics for a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Messages pulled from the source
    pub received: u64,
    /// Messages dropped because their kind is not subscribed
    pub unsubscribed: u64,
    /// Messages rejected by mute rules
    pub suppressed: u64,
    /// Messages that passed admission
    pub admitted: u64,
    /// Admitted messages of an unmodelled kind
    pub unknown: u64,
    /// Events handed to the persistence sink
    pub persisted: u64,
    /// Flushes performed
    pub flushes: u64,
    /// Messages whose processing exceeded the source deadline
    pub deadline_overruns: u64,
    /// Failed sink writes
    pub sink_failures: u64,
    /// Flush interval in seconds at the time of the snapshot
    pub save_interval: f64,
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
    /// Whether the run was interrupted by a signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}
