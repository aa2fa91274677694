//! Global constants for esmonitor
//!
//! Centralized location for application-wide constants

use std::time::Duration;

/// Application subsystem identifier for macOS Unified Logging System
pub const APP_SUBSYSTEM: &str = "com.sutro.esmonitor";

/// Default category for pipeline ULS logging
pub const PIPELINE_CATEGORY: &str = "pipeline";

/// Configuration file name under the user configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the user configuration directory
pub const CONFIG_DIR_NAME: &str = "esmonitor";

//
// Throttle parameters
//

/// Event rate (events/second) at or above which flushes are slowed down
pub const HEAVY_FLOW_RATE: f64 = 1000.0;

/// Seconds of extra flush interval per event/second above the heavy flow rate
pub const THROTTLE_FACTOR: f64 = 0.001;

/// Lower bound of the flush interval in seconds
pub const MIN_SAVE_INTERVAL: f64 = 0.1;

/// Upper bound of the flush interval in seconds
pub const MAX_SAVE_INTERVAL: f64 = 1.5;

/// Fixed step subtracted from the flush interval when load relaxes
pub const DE_THROTTLE_RATE: f64 = 0.1;

/// Length of the rate measurement window
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Delay before a relaxation step is applied
pub const DE_THROTTLE_GRACE: Duration = Duration::from_secs(1);

//
// Enrichment bounds
//

/// Maximum number of paths remembered by the quarantine-awareness cache
pub const QUARANTINE_CACHE_CAPACITY: usize = 1000;

/// Maximum number of executables whose signing chain is remembered
pub const CERTIFICATE_CACHE_CAPACITY: usize = 1000;

/// Number of leading bytes inspected to decide whether a file is text
pub const TEXT_PROBE_BYTES: usize = 512;

/// Upper bound on script / plist content read on the delivery path
pub const MAX_CONTENT_BYTES: u64 = 1024 * 1024;

/// Number of characters of the command line kept in the exec summary context
pub const EXEC_CONTEXT_CHARS: usize = 200;

/// Interpreters whose script argument is resolved and read
pub const SUPPORTED_INTERPRETERS: &[&str] = &[
    "bash",
    "osascript",
    "ruby",
    "perl",
    "python",
    "node",
    "swift",
];

/// Property list listing bundle identifiers Apple forces into File Quarantine
pub const FORCED_QUARANTINE_PLIST: &str =
    "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/Exceptions.plist";

/// Extended attribute carrying the quarantine flag
pub const QUARANTINE_XATTR: &str = "com.apple.quarantine";

/// Default per-message processing deadline in milliseconds
pub const DEFAULT_PROCESSING_DEADLINE_MS: u64 = 5000;

/// Event kind name used for messages outside the modelled set
pub const UNMAPPED_EVENT_NAME: &str = "NOT_MAPPED";
