//! Configuration management
//!
//! Handles TOML configuration parsing, validation and the pieces built from it:
//! - PipelineConfiguration: `[pipeline]` and `[enrichment]` sections
//! - default_config_path: per-user configuration location
//! - build_rule_table / build_enrichment: runtime objects derived from settings

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::classify::{
    load_forced_quarantine, CertificateLookup, CodesignCertificates, Enrichment, FileProbe, FsProbe,
    NoLookup, PlistFiles, PlistLookup, QuarantineLookup, XattrQuarantine,
};
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_PROCESSING_DEADLINE_MS, FORCED_QUARANTINE_PLIST,
};
use crate::error::EsmError;
use crate::models::EventKind;
use crate::mute::RuleTable;

/// Bounds for `processing_deadline_ms`
const DEADLINE_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=60_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfiguration {
    pub pipeline: PipelineSettings,
    pub enrichment: EnrichmentSettings,
}

/// Admission and delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// JSON file with additional mute rule records
    pub mute_rules_path: Option<PathBuf>,
    /// Start from the built-in mute set
    pub use_default_mute_set: bool,
    /// Per-message processing budget in milliseconds (1-60000)
    pub processing_deadline_ms: u64,
    /// Event kind names to subscribe to (empty = default subscriptions)
    pub subscriptions: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mute_rules_path: None,
            use_default_mute_set: true,
            processing_deadline_ms: DEFAULT_PROCESSING_DEADLINE_MS,
            subscriptions: Vec::new(),
        }
    }
}

/// Which classification time lookups are performed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub certificate_chains: bool,
    pub script_content: bool,
    pub quarantine: bool,
    pub forced_quarantine_plist: PathBuf,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            certificate_chains: true,
            script_content: true,
            quarantine: true,
            forced_quarantine_plist: PathBuf::from(FORCED_QUARANTINE_PLIST),
        }
    }
}

/// `<config dir>/esmonitor/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl PipelineConfiguration {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, else the default location; a missing default file means defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        match default_config_path() {
            Some(default) if default.exists() => Self::load_from_file(&default),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let deadline = self.pipeline.processing_deadline_ms;
        if !DEADLINE_RANGE_MS.contains(&deadline) {
            return Err(EsmError::InvalidDeadline(deadline).into());
        }

        for name in &self.pipeline.subscriptions {
            EventKind::from_name(name).with_context(|| "Invalid subscription list")?;
        }
        Ok(())
    }

    pub fn processing_deadline(&self) -> Duration {
        Duration::from_millis(self.pipeline.processing_deadline_ms)
    }

    /// Configured subscriptions, or the defaults when none are listed
    pub fn subscriptions(&self) -> Result<Vec<EventKind>> {
        if self.pipeline.subscriptions.is_empty() {
            return Ok(EventKind::default_subscriptions());
        }
        self.pipeline
            .subscriptions
            .iter()
            .map(|name| EventKind::from_name(name).map_err(anyhow::Error::from))
            .collect()
    }

    /// Defaults (if enabled) merged with the rule file (if any).
    ///
    /// Malformed entries in the rule file are skipped; an unreadable file or a
    /// document that is not a list of records is an error.
    pub fn build_rule_table(&self) -> Result<RuleTable> {
        let mut builder = RuleTable::builder();
        if self.pipeline.use_default_mute_set {
            builder = builder.with_defaults();
        }

        if let Some(path) = &self.pipeline.mute_rules_path {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read mute rules: {}", path.display()))?;
            let report = builder
                .add_json(&json)
                .with_context(|| format!("Failed to parse mute rules: {}", path.display()))?;
            if !report.is_clean() {
                warn!(
                    "Skipped {} malformed mute rule entries in {}",
                    report.skipped.len(),
                    path.display()
                );
            }
        }

        let table = builder.build();
        info!("Mute rule table built with {} rules", table.len());
        Ok(table)
    }

    /// Enrichment collaborators, with disabled lookups replaced by no-ops
    pub fn build_enrichment(&self) -> Enrichment {
        let settings = &self.enrichment;

        let certificates: Arc<dyn CertificateLookup> = if settings.certificate_chains {
            Arc::new(CodesignCertificates)
        } else {
            Arc::new(NoLookup)
        };
        let quarantine: Arc<dyn QuarantineLookup> = if settings.quarantine {
            Arc::new(XattrQuarantine)
        } else {
            Arc::new(NoLookup)
        };
        let files: Arc<dyn FileProbe> = Arc::new(FsProbe);
        let plists: Arc<dyn PlistLookup> = Arc::new(PlistFiles);

        let forced = if settings.quarantine {
            load_forced_quarantine(&settings.forced_quarantine_plist).unwrap_or_else(|e| {
                warn!("Forced quarantine table unavailable: {}", e);
                HashSet::new()
            })
        } else {
            HashSet::new()
        };

        Enrichment::new(certificates, quarantine, files, plists)
            .with_forced_quarantine(forced)
            .with_script_content(settings.script_content)
    }
}
