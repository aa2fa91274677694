//! Persistence sinks
//!
//! - JsonLinesSink: one JSON document per event, keys sorted, slashes unescaped
//! - MemorySink: keeps events in memory, shared between clones
//! - DiscardSink: accepts and drops everything

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::EsmResult;
use crate::models::ClassifiedEvent;

/// Destination of classified events.
///
/// Batches arrive in delivery order; a failed batch is dropped, not retried.
pub trait PersistenceSink: Send {
    fn persist(&mut self, batch: &[ClassifiedEvent]) -> EsmResult<()>;

    fn flush(&mut self) -> EsmResult<()> {
        Ok(())
    }
}

impl<K: PersistenceSink + ?Sized> PersistenceSink for Box<K> {
    fn persist(&mut self, batch: &[ClassifiedEvent]) -> EsmResult<()> {
        (**self).persist(batch)
    }

    fn flush(&mut self) -> EsmResult<()> {
        (**self).flush()
    }
}

/// Rebuild every object with its keys in lexicographic order
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// JSON rendering with stable key ordering
pub fn to_sorted_value<T: Serialize>(value: &T) -> EsmResult<Value> {
    Ok(sort_keys(serde_json::to_value(value)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonStyle {
    #[default]
    Compact,
    Pretty,
}

/// Serialize one value in the export format
pub fn export_json<T: Serialize>(value: &T, style: JsonStyle) -> EsmResult<String> {
    let value = to_sorted_value(value)?;
    let text = match style {
        JsonStyle::Compact => serde_json::to_string(&value)?,
        JsonStyle::Pretty => serde_json::to_string_pretty(&value)?,
    };
    Ok(text)
}

pub struct JsonLinesSink<W> {
    writer: W,
    style: JsonStyle,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W, style: JsonStyle) -> Self {
        Self { writer, style }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> PersistenceSink for JsonLinesSink<W> {
    fn persist(&mut self, batch: &[ClassifiedEvent]) -> EsmResult<()> {
        for event in batch {
            let line = export_json(event, self.style)?;
            writeln!(self.writer, "{}", line)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> EsmResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory sink; clones share storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<ClassifiedEvent>>>,
    batches: Arc<Mutex<Vec<usize>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ClassifiedEvent> {
        lock(&self.events).clone()
    }

    /// Size of every persisted batch, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batches).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceSink for MemorySink {
    fn persist(&mut self, batch: &[ClassifiedEvent]) -> EsmResult<()> {
        lock(&self.events).extend_from_slice(batch);
        lock(&self.batches).push(batch.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl PersistenceSink for DiscardSink {
    fn persist(&mut self, _batch: &[ClassifiedEvent]) -> EsmResult<()> {
        Ok(())
    }
}
