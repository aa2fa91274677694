//! esmonitor - macOS Endpoint Security event core
//!
//! This library exposes the admission filter, the classifier, the adaptive
//! flush throttle and the pipeline that ties them between an event source
//! and a persistence sink.

pub mod classify;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod mute;
pub mod output;
pub mod pipeline;
pub mod throttle;

pub use classify::Classifier;
pub use error::{EsmError, EsmResult};
pub use mute::AdmissionFilter;
pub use pipeline::Pipeline;
pub use throttle::ThrottleController;
