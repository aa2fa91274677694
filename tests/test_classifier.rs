//! Classification of raw messages into typed events

mod helpers;

use esmonitor::classify::{Classifier, Enrichment};
use esmonitor::models::raw::{RawSignal, RawXpcConnect};
use esmonitor::models::{DomainEvent, EventKind, RawMessage, RawPayload};
use esmonitor::pipeline::{export_json, JsonStyle};
use helpers::{create_at, message, mprotect, process};

fn classifier() -> Classifier {
    Classifier::new(Enrichment::disabled())
}

#[test]
fn test_mprotect_read_execute() {
    let event = classifier().classify(&mprotect(0x1 | 0x4, 0x1_0000_4000, 64 * 1024));

    let DomainEvent::Mprotect(mp) = &event.event else {
        panic!("expected mprotect, got {:?}", event.event);
    };
    assert_eq!(mp.protection_flags, vec!["VM_PROT_READ", "VM_PROT_EXECUTE"]);
    assert_eq!(mp.hex_address, "0x100004000");
    assert_eq!(mp.kb_size, 64);
    assert_eq!(event.context.as_deref(), Some("(READ|EXECUTE)(64 kb) → /usr/bin/touch"));
    assert_eq!(event.target_path, None);
}

#[test]
fn test_every_supported_kind_classifies_to_itself() {
    let classifier = classifier();
    for kind in EventKind::supported() {
        // No payload at all: every optional group is absent
        let event = classifier.classify(&message(kind, RawPayload::None));
        assert_eq!(event.kind, kind);
        assert_eq!(event.event.kind(), kind, "payload arm mismatch for {}", kind);
        assert_eq!(event.event_type(), kind.name());
    }
}

#[test]
fn test_every_supported_kind_survives_old_versions() {
    let classifier = classifier();
    for kind in EventKind::supported() {
        for version in 1..=8 {
            let mut raw = message(kind, RawPayload::None);
            raw.version = version;
            let event = classifier.classify(&raw);
            assert_eq!(event.event.kind(), kind);
        }
    }
}

#[test]
fn test_unmapped_codes_become_unknown() {
    let classifier = classifier();
    for code in [0u32, 1_000, u32::MAX] {
        if EventKind::from_code(code) != EventKind::Unknown {
            continue;
        }
        let raw = RawMessage {
            event_type: code,
            version: 6,
            ..Default::default()
        };
        let event = classifier.classify(&raw);
        assert_eq!(event.event, DomainEvent::Unknown);
        assert_eq!(event.event_type(), "NOT_MAPPED");
        assert_eq!(event.context, None);
        assert_eq!(event.target_path, None);
    }
}

#[test]
fn test_sequence_fields_gated_by_version() {
    let mut raw = create_at("/tmp/new.txt");
    raw.global_seq_num = Some(77);
    raw.thread_id = Some(12);

    raw.version = 3;
    let old = classifier().classify(&raw);
    assert_eq!(old.global_seq_num, None);
    assert_eq!(old.thread_id, None);

    raw.version = 4;
    let new = classifier().classify(&raw);
    assert_eq!(new.global_seq_num, Some(77));
    assert_eq!(new.thread_id, Some(12));
}

#[test]
fn test_create_target_path() {
    let event = classifier().classify(&create_at("/Users/me/Downloads/file.zip"));
    let DomainEvent::Create(create) = &event.event else {
        panic!("expected create");
    };
    assert_eq!(create.destination_path, "/Users/me/Downloads/file.zip");
    assert_eq!(event.target_path.as_deref(), Some("/Users/me/Downloads/file.zip"));
}

#[test]
fn test_signal_context() {
    let raw = message(
        EventKind::Signal,
        RawPayload::Signal(RawSignal {
            sig: 9,
            target: process("/Applications/Safari.app/Contents/MacOS/Safari"),
        }),
    );
    let event = classifier().classify(&raw);
    assert_eq!(
        event.context.as_deref(),
        Some("[SIGKILL] /Applications/Safari.app/Contents/MacOS/Safari")
    );
    assert_eq!(
        event.target_path.as_deref(),
        Some("/Applications/Safari.app/Contents/MacOS/Safari")
    );
}

#[test]
fn test_xpc_connect_has_no_target() {
    let raw = message(
        EventKind::XpcConnect,
        RawPayload::XpcConnect(RawXpcConnect {
            service_name: "com.apple.example".to_string(),
            service_domain_type: 1,
        }),
    );
    let event = classifier().classify(&raw);
    assert_eq!(
        event.context.as_deref(),
        Some("touch → com.apple.example in ES_XPC_DOMAIN_TYPE_SYSTEM")
    );
    assert_eq!(event.target_path, None);
}

#[test]
fn test_export_is_sorted_and_unescaped() {
    let event = classifier().classify(&create_at("/tmp/out.log"));
    let text = export_json(&event, JsonStyle::Compact).unwrap();

    assert!(text.contains("\"event_type\":\"ES_EVENT_TYPE_NOTIFY_CREATE\""));
    assert!(text.contains("\"target_path\":\"/tmp/out.log\""));
    assert!(!text.contains("\\/"));

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}
