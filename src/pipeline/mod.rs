//! Event pipeline between an event source and a persistence sink
//!
//! Two loops run concurrently:
//! - delivery (blocking thread): pull, retain, subscription check, admission,
//!   throttle accounting, classification, release, hand off in FIFO order
//! - flush (async task): batch classified events and persist them every
//!   `save_interval`, with a final drain once delivery stops
//!
//! Shutdown stops pulling new messages. A message already pulled is always
//! classified and handed off before the delivery loop exits.

pub mod sink;
pub mod source;
pub mod stats;

pub use sink::{export_json, to_sorted_value, DiscardSink, JsonLinesSink, JsonStyle, MemorySink, PersistenceSink};
pub use source::{JsonLinesSource, RetainLedger};
pub use stats::PipelineStats;

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::classify::Classifier;
use crate::error::EsmResult;
use crate::logging::PipelineLogger;
use crate::models::{ClassifiedEvent, EventKind, PipelineSummary, RawMessage};
use crate::mute::{Admission, AdmissionFilter, RuleTable};
use crate::throttle::{Adjustment, ThrottleController};

/// Producer of raw messages.
///
/// Every message handed out must be retained before use and released after
/// use, exactly once each. `RetainedMessage` enforces the pairing.
pub trait EventSource: Send {
    /// Next message, `None` once the source is exhausted
    fn next_message(&mut self) -> EsmResult<Option<RawMessage>>;

    fn retain(&self, message: &RawMessage);

    fn release(&self, message: &RawMessage);

    /// Time budget for processing one message
    fn deadline(&self) -> Duration;

    fn describe(&self) -> String {
        "event source".to_string()
    }
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn next_message(&mut self) -> EsmResult<Option<RawMessage>> {
        (**self).next_message()
    }

    fn retain(&self, message: &RawMessage) {
        (**self).retain(message)
    }

    fn release(&self, message: &RawMessage) {
        (**self).release(message)
    }

    fn deadline(&self) -> Duration {
        (**self).deadline()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A message retained on its source for as long as the guard lives
pub struct RetainedMessage<'a, S: EventSource + ?Sized> {
    source: &'a S,
    message: RawMessage,
}

impl<'a, S: EventSource + ?Sized> RetainedMessage<'a, S> {
    pub fn new(source: &'a S, message: RawMessage) -> Self {
        source.retain(&message);
        Self { source, message }
    }
}

impl<S: EventSource + ?Sized> Deref for RetainedMessage<'_, S> {
    type Target = RawMessage;

    fn deref(&self) -> &RawMessage {
        &self.message
    }
}

impl<S: EventSource + ?Sized> Drop for RetainedMessage<'_, S> {
    fn drop(&mut self) {
        self.source.release(&self.message);
    }
}

/// Rebuilds the rule table when a reload is requested
pub type RuleRebuild = Box<dyn Fn() -> Result<RuleTable> + Send>;

struct RuleReload {
    requested: Arc<AtomicBool>,
    rebuild: RuleRebuild,
}

/// Admission, classification and paced persistence of raw messages
pub struct Pipeline {
    filter: AdmissionFilter,
    classifier: Classifier,
    throttle: ThrottleController,
    subscriptions: HashSet<EventKind>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
    reload: Option<RuleReload>,
    logger: PipelineLogger,
}

impl Pipeline {
    pub fn new(filter: AdmissionFilter, classifier: Classifier, throttle: ThrottleController) -> Self {
        Self {
            filter,
            classifier,
            throttle,
            subscriptions: EventKind::default_subscriptions().into_iter().collect(),
            stats: Arc::new(PipelineStats::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            reload: None,
            logger: PipelineLogger::default(),
        }
    }

    /// Replace the active subscription set; an empty list keeps the defaults
    pub fn with_subscriptions(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        let kinds: HashSet<EventKind> = kinds.into_iter().collect();
        if !kinds.is_empty() {
            self.subscriptions = kinds;
        }
        self
    }

    /// Flag that stops the delivery loop when set
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Rebuild and swap the rule table whenever `requested` is set
    pub fn with_reload(mut self, requested: Arc<AtomicBool>, rebuild: RuleRebuild) -> Self {
        self.reload = Some(RuleReload { requested, rebuild });
        self
    }

    pub fn with_logger(mut self, logger: PipelineLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn throttle(&self) -> &ThrottleController {
        &self.throttle
    }

    pub fn filter(&self) -> &AdmissionFilter {
        &self.filter
    }

    /// Run until the source is exhausted or shutdown is requested
    pub async fn run<S, K>(self, source: S, sink: K) -> Result<PipelineSummary>
    where
        S: EventSource + 'static,
        K: PersistenceSink,
    {
        let started = Instant::now();
        self.logger.log_startup(
            &source.describe(),
            self.filter.rules().current().len(),
            self.subscriptions.len(),
            source.deadline(),
        );

        let throttle = self.throttle.clone();
        let stats = Arc::clone(&self.stats);
        let shutdown = Arc::clone(&self.shutdown);
        let logger = self.logger.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        let delivery = Delivery {
            filter: self.filter,
            classifier: self.classifier,
            throttle: self.throttle,
            subscriptions: self.subscriptions,
            stats: self.stats,
            shutdown: self.shutdown,
            reload: self.reload,
            logger: self.logger,
        };
        let delivering = tokio::task::spawn_blocking(move || delivery.run(source, tx));

        let flushed = flush_loop(rx, sink, &throttle, &stats, &logger).await;
        let delivered = delivering.await.context("Delivery loop panicked")?;
        delivered.context("Event source failed")?;
        flushed.context("Persistence sink failed to flush")?;

        let summary = stats.snapshot(
            throttle.save_interval(),
            started.elapsed(),
            shutdown.load(Ordering::SeqCst),
        );
        logger.log_shutdown(&summary);
        Ok(summary)
    }
}

struct Delivery {
    filter: AdmissionFilter,
    classifier: Classifier,
    throttle: ThrottleController,
    subscriptions: HashSet<EventKind>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
    reload: Option<RuleReload>,
    logger: PipelineLogger,
}

impl Delivery {
    fn run<S: EventSource>(self, mut source: S, tx: mpsc::UnboundedSender<ClassifiedEvent>) -> EsmResult<()> {
        let deadline = source.deadline();

        while !self.shutdown.load(Ordering::SeqCst) {
            self.apply_pending_reload();

            let Some(raw) = source.next_message()? else {
                break;
            };
            let started = Instant::now();
            let message = RetainedMessage::new(&source, raw);

            let Some(event) = self.process(&message) else {
                continue;
            };

            let elapsed = started.elapsed();
            if elapsed > deadline {
                self.stats.record_deadline_overrun();
                self.logger
                    .log_deadline_overrun(event.kind, event.seq_num, elapsed, deadline);
            }
            drop(message);

            if tx.send(event).is_err() {
                debug!("Flush loop gone, stopping delivery");
                break;
            }
        }
        Ok(())
    }

    /// Admission and classification of one retained message
    fn process(&self, message: &RawMessage) -> Option<ClassifiedEvent> {
        self.stats.record_received();

        let kind = message.kind();
        if kind != EventKind::Unknown && !self.subscriptions.contains(&kind) {
            self.stats.record_unsubscribed();
            return None;
        }

        if let Admission::Suppress(rule) = self.filter.check(message) {
            self.stats.record_suppressed();
            debug!("Muted {} #{} by {:?}", kind.short_name(), message.seq_num, rule);
            return None;
        }
        self.stats.record_admitted();

        match self.throttle.register_event() {
            Adjustment::Increased { rate, interval } => {
                debug!("Heavy flow at {:.0} events/s, save interval now {:.4}s", rate, interval)
            }
            Adjustment::DecreaseScheduled { rate } => {
                debug!("Light flow at {:.0} events/s, relaxing save interval", rate)
            }
            Adjustment::None | Adjustment::Steady { .. } => {}
        }

        let event = self.classifier.classify(message);
        if event.kind == EventKind::Unknown {
            self.stats.record_unknown();
        }
        Some(event)
    }

    fn apply_pending_reload(&self) {
        let Some(reload) = &self.reload else {
            return;
        };
        if !reload.requested.swap(false, Ordering::SeqCst) {
            return;
        }

        match (reload.rebuild)() {
            Ok(table) => {
                let count = table.len();
                self.filter.rules().replace(table);
                self.logger.log_rule_reload(count);
            }
            Err(e) => self.logger.log_reload_failure(&e),
        }
    }
}

async fn flush_loop<K: PersistenceSink>(
    mut rx: mpsc::UnboundedReceiver<ClassifiedEvent>,
    mut sink: K,
    throttle: &ThrottleController,
    stats: &PipelineStats,
    logger: &PipelineLogger,
) -> EsmResult<()> {
    let mut pending: Vec<ClassifiedEvent> = Vec::new();

    loop {
        let tick = tokio::time::sleep(throttle.save_interval_duration());
        tokio::pin!(tick);

        let open = loop {
            tokio::select! {
                _ = &mut tick => break true,
                received = rx.recv() => match received {
                    Some(event) => pending.push(event),
                    None => break false,
                },
            }
        };

        persist_pending(&mut sink, &mut pending, stats, logger);
        if !open {
            break;
        }
    }

    info!("Delivery finished, {} events persisted", stats.persisted());
    sink.flush()
}

fn persist_pending<K: PersistenceSink>(
    sink: &mut K,
    pending: &mut Vec<ClassifiedEvent>,
    stats: &PipelineStats,
    logger: &PipelineLogger,
) {
    if pending.is_empty() {
        return;
    }

    match sink.persist(pending) {
        Ok(()) => stats.record_flush(pending.len()),
        Err(e) => {
            stats.record_sink_failure();
            logger.log_sink_failure(pending.len(), &e);
        }
    }
    pending.clear();
}
