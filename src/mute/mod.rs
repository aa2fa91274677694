//! Path mute rules and the admission filter
//!
//! Provides:
//! - MuteMode / RuleScope / MuteRule: one declarative path predicate
//! - RuleTable: immutable rule set, deduplicated per (scope, mode)
//! - RuleTableBuilder: merges the default set with user supplied records
//! - AdmissionFilter: admit/suppress decision over a shared, swappable table

pub mod defaults;
pub mod filter;

pub use filter::{evaluate, Admission, AdmissionFilter, CandidatePaths, RuleTableHandle};

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{EsmError, EsmResult};
use crate::models::EventKind;

const MODE_PREFIX: &str = "ES_MUTE_PATH_TYPE_";

/// How a rule path is compared with a candidate path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MuteMode {
    /// Subject path starts with the rule path
    Prefix,
    /// Subject path equals the rule path
    Literal,
    /// Affected-object path starts with the rule path
    TargetPrefix,
    /// Affected-object path equals the rule path
    TargetLiteral,
}

impl MuteMode {
    pub const ALL: [MuteMode; 4] = [
        MuteMode::Prefix,
        MuteMode::Literal,
        MuteMode::TargetPrefix,
        MuteMode::TargetLiteral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MuteMode::Prefix => "PREFIX",
            MuteMode::Literal => "LITERAL",
            MuteMode::TargetPrefix => "TARGET_PREFIX",
            MuteMode::TargetLiteral => "TARGET_LITERAL",
        }
    }

    /// Whether the rule applies to the affected-object path
    pub fn is_target(self) -> bool {
        matches!(self, MuteMode::TargetPrefix | MuteMode::TargetLiteral)
    }

    /// Compare a candidate path with a rule path
    pub fn matches(self, candidate: &str, rule_path: &str) -> bool {
        match self {
            MuteMode::Prefix | MuteMode::TargetPrefix => candidate.starts_with(rule_path),
            MuteMode::Literal | MuteMode::TargetLiteral => candidate == rule_path,
        }
    }
}

impl fmt::Display for MuteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MuteMode {
    type Err = EsmError;

    /// Accepts `PREFIX` as well as `ES_MUTE_PATH_TYPE_PREFIX`, any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let short = upper.strip_prefix(MODE_PREFIX).unwrap_or(&upper);
        MuteMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == short)
            .ok_or_else(|| EsmError::UnknownMuteMode(s.to_string()))
    }
}

/// Which events a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleScope {
    /// Every kind
    Global,
    /// Exactly one kind
    Event(EventKind),
}

/// A single path predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MuteRule {
    pub scope: RuleScope,
    pub mode: MuteMode,
    pub path: String,
}

impl MuteRule {
    pub fn new(scope: RuleScope, mode: MuteMode, path: impl Into<String>) -> Self {
        MuteRule {
            scope,
            mode,
            path: path.into(),
        }
    }
}

/// External rule record: `{"path": ..., "type": ..., "events": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteRuleRecord {
    pub path: String,
    #[serde(rename = "type")]
    pub mode: String,
    /// Empty for a global rule; `null` reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub events: Vec<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl MuteRuleRecord {
    /// Expand into one rule per listed kind, or one global rule
    pub fn to_rules(&self) -> EsmResult<Vec<MuteRule>> {
        if self.path.is_empty() {
            return Err(EsmError::RuleParse {
                index: 0,
                reason: "empty path".to_string(),
            });
        }
        let mode: MuteMode = self.mode.parse()?;

        if self.events.is_empty() {
            return Ok(vec![MuteRule::new(RuleScope::Global, mode, self.path.as_str())]);
        }

        self.events
            .iter()
            .map(|name| {
                EventKind::from_name(name)
                    .map(|kind| MuteRule::new(RuleScope::Event(kind), mode, self.path.as_str()))
            })
            .collect()
    }
}

/// Entries skipped while building a table from records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleParseReport {
    /// Entries turned into rules
    pub accepted: usize,
    /// (index, reason) for every skipped entry
    pub skipped: Vec<(usize, String)>,
}

impl RuleParseReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Immutable mute rule table.
///
/// Paths are grouped by `(scope, mode)` with set semantics, so duplicate
/// rules collapse and insertion order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    groups: BTreeMap<(RuleScope, MuteMode), BTreeSet<String>>,
}

impl RuleTable {
    pub fn builder() -> RuleTableBuilder {
        RuleTableBuilder::new()
    }

    /// The built-in table for the current user
    pub fn default_set() -> Self {
        RuleTableBuilder::new().with_defaults().build()
    }

    /// An empty table that admits everything
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON array of rule records, skipping malformed entries
    pub fn from_json_str(json: &str) -> EsmResult<(Self, RuleParseReport)> {
        let mut builder = RuleTableBuilder::new();
        let report = builder.add_json(json)?;
        Ok((builder.build(), report))
    }

    /// Paths for one `(scope, mode)` group
    pub fn paths(&self, scope: RuleScope, mode: MuteMode) -> Option<&BTreeSet<String>> {
        self.groups.get(&(scope, mode))
    }

    /// Every effective rule, in a stable order
    pub fn rules(&self) -> impl Iterator<Item = MuteRule> + '_ {
        self.groups.iter().flat_map(|((scope, mode), paths)| {
            paths
                .iter()
                .map(move |path| MuteRule::new(*scope, *mode, path.as_str()))
        })
    }

    pub fn contains(&self, rule: &MuteRule) -> bool {
        self.paths(rule.scope, rule.mode)
            .is_some_and(|paths| paths.contains(&rule.path))
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export back to the external record form.
    ///
    /// Event-specific rules sharing a path and mode are folded into one
    /// record listing every kind.
    pub fn to_records(&self) -> Vec<MuteRuleRecord> {
        let mut folded: BTreeMap<(MuteMode, &str), Vec<String>> = BTreeMap::new();
        let mut records = Vec::new();

        for ((scope, mode), paths) in &self.groups {
            for path in paths {
                match scope {
                    RuleScope::Global => records.push(MuteRuleRecord {
                        path: path.clone(),
                        mode: mode.as_str().to_string(),
                        events: Vec::new(),
                    }),
                    RuleScope::Event(kind) => folded
                        .entry((*mode, path.as_str()))
                        .or_default()
                        .push(kind.name().to_string()),
                }
            }
        }

        records.extend(folded.into_iter().map(|((mode, path), events)| MuteRuleRecord {
            path: path.to_string(),
            mode: mode.as_str().to_string(),
            events,
        }));
        records
    }
}

/// Accumulates rules and produces one immutable [`RuleTable`]
#[derive(Debug, Clone, Default)]
pub struct RuleTableBuilder {
    groups: BTreeMap<(RuleScope, MuteMode), BTreeSet<String>>,
}

impl RuleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the built-in rules, resolving the user cache directory from `$HOME`
    pub fn with_defaults(self) -> Self {
        let home = dirs::home_dir();
        self.with_defaults_for_home(home.as_deref())
    }

    pub fn with_defaults_for_home(mut self, home: Option<&Path>) -> Self {
        self.add_rules(defaults::default_rules(home));
        self
    }

    pub fn rule(mut self, rule: MuteRule) -> Self {
        self.add(rule);
        self
    }

    pub fn add(&mut self, rule: MuteRule) {
        self.groups
            .entry((rule.scope, rule.mode))
            .or_default()
            .insert(rule.path);
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = MuteRule>) {
        for rule in rules {
            self.add(rule);
        }
    }

    /// Add records, skipping any entry that cannot be turned into rules
    pub fn add_records(&mut self, records: &[serde_json::Value]) -> RuleParseReport {
        let mut report = RuleParseReport::default();

        for (index, value) in records.iter().enumerate() {
            match parse_record(value).and_then(|record| record.to_rules()) {
                Ok(rules) => {
                    self.add_rules(rules);
                    report.accepted += 1;
                }
                Err(e) => {
                    let reason = match e {
                        EsmError::RuleParse { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    warn!("Skipping mute rule entry {}: {}", index, reason);
                    report.skipped.push((index, reason));
                }
            }
        }

        report
    }

    /// Add records from a JSON array; only a non-array document is an error
    pub fn add_json(&mut self, json: &str) -> EsmResult<RuleParseReport> {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(json).map_err(EsmError::RuleFile)?;
        Ok(self.add_records(&values))
    }

    pub fn build(self) -> RuleTable {
        RuleTable {
            groups: self.groups,
        }
    }
}

/// A record is either an object or a string holding an encoded object
fn parse_record(value: &serde_json::Value) -> EsmResult<MuteRuleRecord> {
    let parsed = match value {
        serde_json::Value::String(encoded) => serde_json::from_str(encoded),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| EsmError::RuleParse {
        index: 0,
        reason: e.to_string(),
    })
}
