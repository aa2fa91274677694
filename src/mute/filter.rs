//! Admission decisions over a rule table
//!
//! Evaluation order:
//! 1. Rules scoped to the message's kind
//! 2. Global rules
//! 3. Otherwise admit
//!
//! Subject modes (prefix, literal) test the instigating process executable
//! and the kind's primary path; target modes test the affected-object path.

use std::borrow::Cow;
use std::sync::{Arc, RwLock};

use super::{MuteMode, MuteRule, RuleScope, RuleTable};
use crate::models::artifacts::join_path;
use crate::models::raw::{RawFile, RawNewPath};
use crate::models::{EventKind, RawMessage, RawPayload};

/// Paths of a message that mute rules are tested against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePaths<'a> {
    /// Executable of the process that caused the event
    pub process: Option<Cow<'a, str>>,
    /// Kind specific subject, e.g. the mapped file of an mmap
    pub primary: Option<Cow<'a, str>>,
    /// Affected object, e.g. the destination of a rename
    pub target: Option<Cow<'a, str>>,
}

impl<'a> CandidatePaths<'a> {
    pub fn new(
        process: Option<&'a str>,
        primary: Option<&'a str>,
        target: Option<&'a str>,
    ) -> Self {
        CandidatePaths {
            process: process.map(Cow::Borrowed),
            primary: primary.map(Cow::Borrowed),
            target: target.map(Cow::Borrowed),
        }
    }

    /// Extract candidate paths without classifying the message
    pub fn from_message(msg: &'a RawMessage) -> Self {
        let process = msg.process.executable_path().map(Cow::Borrowed);
        let (primary, target) = match &msg.payload {
            RawPayload::Create(create) => {
                let dest = destination(create.existing_file.as_ref(), create.new_path.as_ref());
                (dest.clone(), dest)
            }
            RawPayload::Rename(rename) => (
                file_path(&rename.source),
                destination(rename.existing_file.as_ref(), rename.new_path.as_ref()),
            ),
            RawPayload::Open(open) => same(file_path(&open.file)),
            RawPayload::Close(close) => same(file_path(&close.target)),
            RawPayload::Write(f) | RawPayload::Dup(f) | RawPayload::ListExtattr(f) => {
                same(file_path(&f.target))
            }
            RawPayload::Unlink(unlink) => same(file_path(&unlink.target)),
            RawPayload::Mmap(mmap) => same(file_path(&mmap.source)),
            RawPayload::ProcCheck(check) => same(
                check
                    .target
                    .as_ref()
                    .and_then(|p| p.executable_path())
                    .map(Cow::Borrowed),
            ),
            RawPayload::Link(link) => (
                file_path(&link.source),
                Some(Cow::Owned(join_path(
                    link.target_dir.path_str(),
                    &link.target_filename,
                ))),
            ),
            RawPayload::SetExtattr(x) | RawPayload::GetExtattr(x) | RawPayload::DeleteExtattr(x) => {
                (None, file_path(&x.target))
            }
            RawPayload::SetMode(m) => (None, file_path(&m.target)),
            RawPayload::UipcBind(bind) => (
                None,
                Some(Cow::Owned(join_path(bind.dir.path_str(), &bind.filename))),
            ),
            RawPayload::UipcConnect(conn) => (None, file_path(&conn.file)),
            RawPayload::Exec(exec) => (None, exec.target.executable_path().map(Cow::Borrowed)),
            RawPayload::Fork(fork) => (None, fork.child.executable_path().map(Cow::Borrowed)),
            RawPayload::Signal(sig) => (None, sig.target.executable_path().map(Cow::Borrowed)),
            RawPayload::Trace(trace) => (None, trace.target.executable_path().map(Cow::Borrowed)),
            RawPayload::GetTask(task) => (None, task.target.executable_path().map(Cow::Borrowed)),
            RawPayload::RemoteThreadCreate(rtc) => {
                (None, rtc.target.executable_path().map(Cow::Borrowed))
            }
            _ => (None, None),
        };

        CandidatePaths {
            process,
            primary,
            target,
        }
    }

    fn subjects(&self) -> impl Iterator<Item = &str> {
        self.process.as_deref().into_iter().chain(self.primary.as_deref())
    }
}

fn file_path(file: &RawFile) -> Option<Cow<'_, str>> {
    file.path.as_deref().map(Cow::Borrowed)
}

fn same(path: Option<Cow<'_, str>>) -> (Option<Cow<'_, str>>, Option<Cow<'_, str>>) {
    (path.clone(), path)
}

fn destination<'a>(
    existing: Option<&'a RawFile>,
    new_path: Option<&'a RawNewPath>,
) -> Option<Cow<'a, str>> {
    existing.and_then(file_path).or_else(|| {
        new_path.map(|np| Cow::Owned(join_path(np.dir.path_str(), &np.filename)))
    })
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Suppressed by the first matching rule
    Suppress(MuteRule),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Decide whether a message of `kind` with `paths` is suppressed by `table`.
///
/// Pure: the same inputs always give the same answer.
pub fn evaluate(kind: EventKind, paths: &CandidatePaths<'_>, table: &RuleTable) -> Admission {
    for scope in [RuleScope::Event(kind), RuleScope::Global] {
        for mode in MuteMode::ALL {
            let Some(rule_paths) = table.paths(scope, mode) else {
                continue;
            };

            let matched = if mode.is_target() {
                paths
                    .target
                    .as_deref()
                    .and_then(|candidate| first_match(mode, candidate, rule_paths))
            } else {
                paths
                    .subjects()
                    .find_map(|candidate| first_match(mode, candidate, rule_paths))
            };

            if let Some(rule_path) = matched {
                return Admission::Suppress(MuteRule::new(scope, mode, rule_path));
            }
        }
    }
    Admission::Admit
}

fn first_match<'t>(
    mode: MuteMode,
    candidate: &str,
    rule_paths: &'t std::collections::BTreeSet<String>,
) -> Option<&'t str> {
    match mode {
        MuteMode::Literal | MuteMode::TargetLiteral => {
            rule_paths.get(candidate).map(String::as_str)
        }
        MuteMode::Prefix | MuteMode::TargetPrefix => rule_paths
            .iter()
            .find(|rule_path| mode.matches(candidate, rule_path))
            .map(String::as_str),
    }
}

/// Shared reference to the live rule table, replaced wholesale on reload
#[derive(Debug, Default)]
pub struct RuleTableHandle {
    current: RwLock<Arc<RuleTable>>,
}

impl RuleTableHandle {
    pub fn new(table: RuleTable) -> Self {
        RuleTableHandle {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Snapshot of the live table; later swaps do not affect it
    pub fn current(&self) -> Arc<RuleTable> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Atomically install a new table, returning the previous one
    pub fn replace(&self, table: RuleTable) -> Arc<RuleTable> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, Arc::new(table))
    }
}

/// Admission filter bound to a swappable rule table
#[derive(Debug, Clone)]
pub struct AdmissionFilter {
    rules: Arc<RuleTableHandle>,
}

impl AdmissionFilter {
    pub fn new(rules: Arc<RuleTableHandle>) -> Self {
        AdmissionFilter { rules }
    }

    pub fn with_table(table: RuleTable) -> Self {
        Self::new(Arc::new(RuleTableHandle::new(table)))
    }

    pub fn rules(&self) -> &Arc<RuleTableHandle> {
        &self.rules
    }

    pub fn check(&self, msg: &RawMessage) -> Admission {
        let table = self.rules.current();
        evaluate(msg.kind(), &CandidatePaths::from_message(msg), &table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::raw::{RawCreate, RawFileTarget, RawRename};
    use crate::models::RawProcess;

    fn file(path: &str) -> RawFile {
        RawFile {
            path: Some(path.to_string()),
            ..Default::default()
        }
    }

    fn message(event_type: u32, exe: &str, payload: RawPayload) -> RawMessage {
        RawMessage {
            event_type,
            version: 7,
            process: RawProcess {
                executable: Some(file(exe)),
                ..Default::default()
            },
            payload,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_candidates_join_new_path() {
        let msg = message(
            13,
            "/bin/zsh",
            RawPayload::Create(RawCreate {
                existing_file: None,
                new_path: Some(RawNewPath {
                    dir: file("/tmp"),
                    filename: "out.txt".into(),
                    mode: 0o644,
                }),
            }),
        );
        let paths = CandidatePaths::from_message(&msg);
        assert_eq!(paths.process.as_deref(), Some("/bin/zsh"));
        assert_eq!(paths.primary.as_deref(), Some("/tmp/out.txt"));
        assert_eq!(paths.target.as_deref(), Some("/tmp/out.txt"));
    }

    #[test]
    fn test_rename_target_is_destination() {
        let msg = message(
            25,
            "/usr/bin/mv",
            RawPayload::Rename(RawRename {
                source: file("/tmp/a"),
                existing_file: Some(file("/tmp/b")),
                new_path: None,
            }),
        );
        let paths = CandidatePaths::from_message(&msg);
        assert_eq!(paths.primary.as_deref(), Some("/tmp/a"));
        assert_eq!(paths.target.as_deref(), Some("/tmp/b"));
    }

    #[test]
    fn test_event_rules_only_match_their_kind() {
        let table = RuleTable::builder()
            .rule(MuteRule::new(
                RuleScope::Event(EventKind::Write),
                MuteMode::Prefix,
                "/usr/sbin/",
            ))
            .build();

        let write = message(33, "/usr/sbin/cfprefsd", RawPayload::Write(RawFileTarget { target: file("/tmp/x") }));
        let dup = message(73, "/usr/sbin/cfprefsd", RawPayload::Dup(RawFileTarget { target: file("/tmp/x") }));

        let filter = AdmissionFilter::with_table(table);
        assert!(!filter.check(&write).is_admitted());
        assert!(filter.check(&dup).is_admitted());
    }

    #[test]
    fn test_global_target_literal() {
        let table = RuleTable::builder()
            .rule(MuteRule::new(RuleScope::Global, MuteMode::TargetLiteral, "/dev/null"))
            .build();
        let filter = AdmissionFilter::with_table(table);

        let to_null = message(73, "/bin/sh", RawPayload::Dup(RawFileTarget { target: file("/dev/null") }));
        let to_tty = message(73, "/bin/sh", RawPayload::Dup(RawFileTarget { target: file("/dev/ttys000") }));

        assert_eq!(
            filter.check(&to_null),
            Admission::Suppress(MuteRule::new(RuleScope::Global, MuteMode::TargetLiteral, "/dev/null"))
        );
        assert!(filter.check(&to_tty).is_admitted());
    }

    #[test]
    fn test_target_modes_ignore_subject_paths() {
        let table = RuleTable::builder()
            .rule(MuteRule::new(RuleScope::Global, MuteMode::TargetPrefix, "/bin/"))
            .build();
        let paths = CandidatePaths::new(Some("/bin/sh"), Some("/bin/sh"), None);
        assert!(evaluate(EventKind::Exec, &paths, &table).is_admitted());
    }

    #[test]
    fn test_handle_swap_leaves_old_snapshot_intact() {
        let handle = RuleTableHandle::new(RuleTable::empty());
        let before = handle.current();
        let previous = handle.replace(
            RuleTable::builder()
                .rule(MuteRule::new(RuleScope::Global, MuteMode::Literal, "/bin/ls"))
                .build(),
        );
        assert!(before.is_empty());
        assert!(previous.is_empty());
        assert_eq!(handle.current().len(), 1);
    }
}
