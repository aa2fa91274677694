//! End to end pipeline runs over replay files and in-memory sinks

mod helpers;

use esmonitor::classify::{CertificateLookup, Classifier, Enrichment, NoLookup};
use esmonitor::error::{EsmError, EsmResult};
use esmonitor::models::raw::RawExec;
use esmonitor::models::{ClassifiedEvent, EventKind, RawPayload, X509Cert};
use esmonitor::mute::{AdmissionFilter, MuteMode, MuteRule, RuleScope, RuleTable};
use esmonitor::pipeline::{JsonLinesSource, MemorySink, PersistenceSink, Pipeline};
use esmonitor::throttle::ThrottleController;
use helpers::{create_at, message, process, write_jsonl};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn pipeline(table: RuleTable) -> Pipeline {
    Pipeline::new(
        AdmissionFilter::with_table(table),
        Classifier::new(Enrichment::disabled()),
        ThrottleController::system(),
    )
}

fn tmp_mute_table() -> RuleTable {
    RuleTable::builder()
        .rule(MuteRule::new(
            RuleScope::Event(EventKind::Create),
            MuteMode::TargetPrefix,
            "/tmp/muted/",
        ))
        .build()
}

#[tokio::test]
async fn test_replay_keeps_delivery_order() {
    let dir = tempdir().unwrap();
    let messages: Vec<_> = (0..50)
        .map(|i| {
            let mut raw = create_at(&format!("/data/file{}.txt", i));
            raw.seq_num = i;
            raw
        })
        .collect();
    let input = write_jsonl(dir.path(), "events.jsonl", &messages);

    let source = JsonLinesSource::open(&input, Duration::from_secs(5)).unwrap();
    let ledger = source.ledger();
    let sink = MemorySink::new();

    let summary = pipeline(RuleTable::empty()).run(source, sink.clone()).await.unwrap();

    let seqs: Vec<u64> = sink.events().iter().map(|e| e.seq_num).collect();
    assert_eq!(seqs, (0..50).collect::<Vec<u64>>());
    assert_eq!(summary.received, 50);
    assert_eq!(summary.admitted, 50);
    assert_eq!(summary.persisted, 50);
    assert_eq!(summary.flushes as usize, sink.batch_sizes().len());
    assert_eq!(ledger.retained(), 50);
    assert_eq!(ledger.released(), 50);
}

#[tokio::test]
async fn test_every_message_released_once_whatever_the_outcome() {
    let dir = tempdir().unwrap();
    let mut unknown = create_at("/data/x");
    unknown.event_type = 4242;
    let messages = vec![
        create_at("/tmp/muted/a"),
        create_at("/data/kept"),
        message(EventKind::Mprotect, RawPayload::None), // not a default subscription
        unknown,
        create_at("/tmp/muted/b"),
    ];
    let input = write_jsonl(dir.path(), "mixed.jsonl", &messages);

    let source = JsonLinesSource::open(&input, Duration::from_secs(5)).unwrap();
    let ledger = source.ledger();
    let sink = MemorySink::new();

    let summary = pipeline(tmp_mute_table()).run(source, sink.clone()).await.unwrap();

    assert_eq!(summary.received, 5);
    assert_eq!(summary.suppressed, 2);
    assert_eq!(summary.unsubscribed, 1);
    assert_eq!(summary.admitted, 2);
    assert_eq!(summary.unknown, 1);
    assert_eq!(summary.persisted, 2);
    assert_eq!(ledger.retained(), 5);
    assert_eq!(ledger.released(), 5);
    assert_eq!(ledger.outstanding(), 0);

    let kinds: Vec<EventKind> = sink.events().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Create, EventKind::Unknown]);
}

#[tokio::test]
async fn test_explicit_subscriptions() {
    let dir = tempdir().unwrap();
    let input = write_jsonl(
        dir.path(),
        "events.jsonl",
        &[
            create_at("/data/a"),
            message(EventKind::Mprotect, RawPayload::None),
        ],
    );
    let source = JsonLinesSource::open(&input, Duration::from_secs(5)).unwrap();
    let sink = MemorySink::new();

    let summary = pipeline(RuleTable::empty())
        .with_subscriptions([EventKind::Mprotect])
        .run(source, sink.clone())
        .await
        .unwrap();

    assert_eq!(summary.unsubscribed, 1);
    assert_eq!(sink.events()[0].kind, EventKind::Mprotect);
}

#[tokio::test]
async fn test_shutdown_before_start_pulls_nothing() {
    let dir = tempdir().unwrap();
    let input = write_jsonl(dir.path(), "events.jsonl", &[create_at("/data/a")]);
    let source = JsonLinesSource::open(&input, Duration::from_secs(5)).unwrap();
    let ledger = source.ledger();

    let summary = pipeline(RuleTable::empty())
        .with_shutdown(Arc::new(AtomicBool::new(true)))
        .run(source, MemorySink::new())
        .await
        .unwrap();

    assert_eq!(summary.received, 0);
    assert_eq!(summary.interrupted, Some(true));
    assert_eq!(ledger.retained(), 0);
}

#[tokio::test]
async fn test_pending_reload_swaps_rule_table() {
    let dir = tempdir().unwrap();
    let input = write_jsonl(
        dir.path(),
        "events.jsonl",
        &[create_at("/tmp/muted/a"), create_at("/tmp/muted/b")],
    );
    let source = JsonLinesSource::open(&input, Duration::from_secs(5)).unwrap();
    let sink = MemorySink::new();

    let pipeline = pipeline(RuleTable::empty())
        .with_reload(Arc::new(AtomicBool::new(true)), Box::new(|| Ok::<_, anyhow::Error>(tmp_mute_table())));
    let filter = pipeline.filter().clone();
    let summary = pipeline.run(source, sink.clone()).await.unwrap();

    assert_eq!(summary.suppressed, 2);
    assert!(sink.is_empty());
    assert_eq!(filter.rules().current().len(), 1);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_table() {
    let dir = tempdir().unwrap();
    let input = write_jsonl(dir.path(), "events.jsonl", &[create_at("/tmp/muted/a")]);
    let source = JsonLinesSource::open(&input, Duration::from_secs(5)).unwrap();

    let summary = pipeline(tmp_mute_table())
        .with_reload(
            Arc::new(AtomicBool::new(true)),
            Box::new(|| Err::<RuleTable, _>(anyhow::anyhow!("rule file vanished"))),
        )
        .run(source, MemorySink::new())
        .await
        .unwrap();

    assert_eq!(summary.suppressed, 1);
}

struct FailingSink;

impl PersistenceSink for FailingSink {
    fn persist(&mut self, _batch: &[ClassifiedEvent]) -> EsmResult<()> {
        Err(EsmError::Sink(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "downstream closed",
        )))
    }
}

#[tokio::test]
async fn test_sink_failures_are_counted_not_fatal() {
    let dir = tempdir().unwrap();
    let input = write_jsonl(dir.path(), "events.jsonl", &[create_at("/data/a"), create_at("/data/b")]);
    let source = JsonLinesSource::open(&input, Duration::from_secs(5)).unwrap();

    let summary = pipeline(RuleTable::empty()).run(source, FailingSink).await.unwrap();

    assert_eq!(summary.admitted, 2);
    assert_eq!(summary.persisted, 0);
    assert!(summary.sink_failures >= 1);
}

/// Certificate lookup that takes longer than any sane deadline
struct SlowCertificates;

impl CertificateLookup for SlowCertificates {
    fn certificate_chain(&self, _path: &str) -> Vec<X509Cert> {
        std::thread::sleep(Duration::from_millis(20));
        Vec::new()
    }
}

#[tokio::test]
async fn test_deadline_overruns_are_counted() {
    let dir = tempdir().unwrap();
    let mut target = process("/Applications/Slow.app/Contents/MacOS/Slow");
    target.codesigning_flags = 0x1;
    let exec = message(
        EventKind::Exec,
        RawPayload::Exec(RawExec {
            target,
            args: vec!["Slow".to_string()],
            ..Default::default()
        }),
    );
    let input = write_jsonl(dir.path(), "events.jsonl", &[exec]);
    let source = JsonLinesSource::open(&input, Duration::from_millis(1)).unwrap();

    let none = Arc::new(NoLookup);
    let enrichment = Enrichment::new(Arc::new(SlowCertificates), none.clone(), none.clone(), none)
        .with_script_content(false);
    let summary = Pipeline::new(
        AdmissionFilter::with_table(RuleTable::empty()),
        Classifier::new(enrichment),
        ThrottleController::system(),
    )
    .run(source, MemorySink::new())
    .await
    .unwrap();

    assert_eq!(summary.deadline_overruns, 1);
    assert_eq!(summary.persisted, 1);
}
