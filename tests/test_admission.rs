//! Admission filter behaviour over whole messages and rule tables

mod helpers;

use esmonitor::models::EventKind;
use esmonitor::mute::{
    evaluate, Admission, AdmissionFilter, CandidatePaths, MuteMode, MuteRule, RuleScope, RuleTable,
};
use helpers::create_at;
use std::collections::BTreeSet;

#[test]
fn test_literal_create_rule_suppresses_exact_target() {
    let table = RuleTable::builder()
        .rule(MuteRule::new(
            RuleScope::Event(EventKind::Create),
            MuteMode::Literal,
            "/usr/sbin/cfprefsd",
        ))
        .build();
    let filter = AdmissionFilter::with_table(table);

    assert!(!filter.check(&create_at("/usr/sbin/cfprefsd")).is_admitted());
    assert!(filter.check(&create_at("/usr/sbin/cfprefsd2")).is_admitted());
}

#[test]
fn test_target_prefix_create_rule() {
    let table = RuleTable::builder()
        .rule(MuteRule::new(
            RuleScope::Event(EventKind::Create),
            MuteMode::TargetPrefix,
            "/Library/Caches/",
        ))
        .build();
    let filter = AdmissionFilter::with_table(table);

    assert_eq!(
        filter.check(&create_at("/Library/Caches/foo.tmp")),
        Admission::Suppress(MuteRule::new(
            RuleScope::Event(EventKind::Create),
            MuteMode::TargetPrefix,
            "/Library/Caches/",
        ))
    );
    assert_eq!(filter.check(&create_at("/Library/Cache2/foo.tmp")), Admission::Admit);
}

#[test]
fn test_event_scoped_rule_does_not_leak_to_other_kinds() {
    let table = RuleTable::builder()
        .rule(MuteRule::new(
            RuleScope::Event(EventKind::Unlink),
            MuteMode::TargetPrefix,
            "/tmp/",
        ))
        .build();
    let filter = AdmissionFilter::with_table(table);
    assert!(filter.check(&create_at("/tmp/file")).is_admitted());
}

#[test]
fn test_global_rule_matches_process_executable() {
    let table = RuleTable::builder()
        .rule(MuteRule::new(RuleScope::Global, MuteMode::Prefix, "/usr/bin/"))
        .build();
    let filter = AdmissionFilter::with_table(table);
    // helpers::message attributes every event to /usr/bin/touch
    assert!(!filter.check(&create_at("/Users/me/report.txt")).is_admitted());
}

fn sample_paths() -> Vec<(EventKind, Option<&'static str>, Option<&'static str>, Option<&'static str>)> {
    vec![
        (EventKind::Create, Some("/usr/bin/touch"), Some("/tmp/a"), Some("/tmp/a")),
        (EventKind::Exec, Some("/bin/zsh"), None, Some("/usr/bin/git")),
        (EventKind::Open, Some("/Applications/Mail.app/Contents/MacOS/Mail"), Some("/Library/Caches/x"), Some("/Library/Caches/x")),
        (EventKind::XpcConnect, Some("/usr/libexec/trustd"), None, None),
        (EventKind::Rename, None, Some("/Users/me/a"), Some("/Users/me/b")),
    ]
}

fn sample_rules() -> Vec<MuteRule> {
    vec![
        MuteRule::new(RuleScope::Global, MuteMode::Prefix, "/usr/libexec/"),
        MuteRule::new(RuleScope::Event(EventKind::Open), MuteMode::TargetPrefix, "/Library/Caches/"),
        MuteRule::new(RuleScope::Event(EventKind::Exec), MuteMode::TargetLiteral, "/usr/bin/git"),
        MuteRule::new(RuleScope::Event(EventKind::Rename), MuteMode::Literal, "/Users/me/a"),
        MuteRule::new(RuleScope::Global, MuteMode::TargetPrefix, "/tmp/"),
    ]
}

#[test]
fn test_adding_rules_never_admits_more() {
    let rules = sample_rules();
    let paths = sample_paths();

    let mut builder = RuleTable::builder();
    let mut previous: Vec<bool> = paths.iter().map(|_| true).collect();

    for rule in rules {
        builder.add(rule);
        let table = builder.clone().build();
        let current: Vec<bool> = paths
            .iter()
            .map(|(kind, process, primary, target)| {
                evaluate(*kind, &CandidatePaths::new(*process, *primary, *target), &table).is_admitted()
            })
            .collect();

        for (before, after) in previous.iter().zip(&current) {
            assert!(*before || !*after, "a suppressed event became admitted");
        }
        previous = current;
    }
    assert!(previous.iter().all(|admitted| !admitted));
}

#[test]
fn test_evaluation_is_pure() {
    let mut builder = RuleTable::builder();
    builder.add_rules(sample_rules());
    let table = builder.build();

    for (kind, process, primary, target) in sample_paths() {
        let paths = CandidatePaths::new(process, primary, target);
        let first = evaluate(kind, &paths, &table);
        let second = evaluate(kind, &paths, &table);
        assert_eq!(first, second);
    }
}

#[test]
fn test_json_rules_match_in_memory_rules() {
    let json = r#"[
        {"path": "/usr/libexec/", "type": "PREFIX"},
        {"path": "/Library/Caches/", "type": "ES_MUTE_PATH_TYPE_TARGET_PREFIX", "events": ["ES_EVENT_TYPE_NOTIFY_OPEN"]},
        {"path": "/usr/bin/git", "type": "TARGET_LITERAL", "events": ["exec"]},
        {"path": "/Users/me/a", "type": "literal", "events": ["RENAME"]},
        {"path": "/tmp/", "type": "TARGET_PREFIX", "events": []}
    ]"#;
    let (from_json, report) = RuleTable::from_json_str(json).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.accepted, 5);

    let mut builder = RuleTable::builder();
    builder.add_rules(sample_rules());
    let direct = builder.build();

    let json_set: BTreeSet<MuteRule> = from_json.rules().collect();
    let direct_set: BTreeSet<MuteRule> = direct.rules().collect();
    assert_eq!(json_set, direct_set);

    // Exported records rebuild the same table
    let exported = serde_json::to_string(&from_json.to_records()).unwrap();
    let (rebuilt, _) = RuleTable::from_json_str(&exported).unwrap();
    assert_eq!(rebuilt.rules().collect::<BTreeSet<_>>(), json_set);
}

#[test]
fn test_malformed_entries_are_skipped() {
    let json = r#"[
        {"path": "/tmp/", "type": "TARGET_PREFIX", "events": ["CREATE"]},
        {"path": "/x", "type": "SOMETIMES"},
        {"path": "/y", "type": "PREFIX", "events": ["NOT_AN_EVENT"]},
        "{\"path\": \"/var/\", \"type\": \"PREFIX\"}",
        42
    ]"#;
    let (table, report) = RuleTable::from_json_str(json).unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_null_or_missing_events_make_global_rules() {
    let json = r#"[
        {"path": "/tmp/", "type": "PREFIX", "events": null},
        {"path": "/opt/", "type": "PREFIX"},
        {"path": "/var/", "type": "PREFIX", "events": []}
    ]"#;
    let (table, report) = RuleTable::from_json_str(json).unwrap();
    assert!(report.is_clean());
    for path in ["/tmp/", "/opt/", "/var/"] {
        assert!(table.contains(&MuteRule::new(RuleScope::Global, MuteMode::Prefix, path)));
    }
}

#[test]
fn test_table_swap_is_visible_to_filter() {
    let filter = AdmissionFilter::with_table(RuleTable::empty());
    let message = create_at("/private/var/folders/x");
    assert!(filter.check(&message).is_admitted());

    let snapshot = filter.rules().current();
    filter.rules().replace(
        RuleTable::builder()
            .rule(MuteRule::new(RuleScope::Global, MuteMode::TargetPrefix, "/private/var/folders/"))
            .build(),
    );

    assert!(!filter.check(&message).is_admitted());
    // Earlier snapshots are unaffected
    assert!(snapshot.is_empty());
}

#[test]
fn test_default_set_is_not_empty() {
    let table = RuleTable::default_set();
    assert!(!table.is_empty());
    assert!(table.rules().any(|rule| rule.scope == RuleScope::Global));
}
