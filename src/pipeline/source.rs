//! Replay source reading one raw message per JSON line

use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::EventSource;
use crate::error::{EsmError, EsmResult};
use crate::models::RawMessage;

/// Retain/release bookkeeping of a source
#[derive(Debug, Default)]
pub struct RetainLedger {
    retained: AtomicU64,
    released: AtomicU64,
}

impl RetainLedger {
    pub fn retained(&self) -> u64 {
        self.retained.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Messages retained but not yet released
    pub fn outstanding(&self) -> u64 {
        self.retained().saturating_sub(self.released())
    }
}

/// Reads `RawMessage` JSON lines from a file or any buffered reader.
///
/// Blank lines are ignored and malformed lines are skipped with a warning.
pub struct JsonLinesSource<R> {
    reader: R,
    origin: PathBuf,
    line_number: usize,
    skipped: u64,
    deadline: Duration,
    ledger: Arc<RetainLedger>,
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open(path: &Path, deadline: Duration) -> EsmResult<Self> {
        let file = File::open(path).map_err(|source| EsmError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::with_origin(BufReader::new(file), path, deadline))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R, deadline: Duration) -> Self {
        Self::with_origin(reader, Path::new("<stdin>"), deadline)
    }

    fn with_origin(reader: R, origin: &Path, deadline: Duration) -> Self {
        Self {
            reader,
            origin: origin.to_path_buf(),
            line_number: 0,
            skipped: 0,
            deadline,
            ledger: Arc::new(RetainLedger::default()),
        }
    }

    pub fn ledger(&self) -> Arc<RetainLedger> {
        Arc::clone(&self.ledger)
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: BufRead + Send> EventSource for JsonLinesSource<R> {
    fn next_message(&mut self) -> EsmResult<Option<RawMessage>> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|source| EsmError::Io {
                    path: self.origin.clone(),
                    source,
                })?;
            if read == 0 {
                debug!("{} exhausted after {} lines", self.origin.display(), self.line_number);
                return Ok(None);
            }
            self.line_number += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            // Bytes go straight to serde so invalid UTF-8 is just another malformed line
            match serde_json::from_slice::<RawMessage>(&line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        "Skipping malformed message at {}:{}: {}",
                        self.origin.display(),
                        self.line_number,
                        e
                    );
                }
            }
        }
    }

    fn retain(&self, _message: &RawMessage) {
        self.ledger.retained.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, _message: &RawMessage) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    fn describe(&self) -> String {
        self.origin.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;
    use std::io::Cursor;

    #[test]
    fn test_skips_blank_and_malformed_lines() {
        let input = concat!(
            "{\"event_type\": 9, \"version\": 6, \"seq_num\": 1}\n",
            "\n",
            "not json at all\n",
            "{\"event_type\": 13, \"version\": 6, \"seq_num\": 2}\n",
        );
        let mut source = JsonLinesSource::new(Cursor::new(input), Duration::from_secs(5));

        let first = source.next_message().unwrap().unwrap();
        assert_eq!(first.kind(), EventKind::Exec);
        let second = source.next_message().unwrap().unwrap();
        assert_eq!(second.kind(), EventKind::Create);
        assert_eq!(second.seq_num, 2);
        assert!(source.next_message().unwrap().is_none());
        assert_eq!(source.skipped(), 1);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut input = b"{\"event_type\": 13, \"version\": 6, \"seq_num\": 1}\n".to_vec();
        input.extend_from_slice(b"{\"path\": \"\xff\xfe\"}\n");
        input.extend_from_slice(b"\xc3\x28\n");
        input.extend_from_slice(b"{\"event_type\": 13, \"version\": 6, \"seq_num\": 3}\n");
        let mut source = JsonLinesSource::new(Cursor::new(input), Duration::from_secs(5));

        assert_eq!(source.next_message().unwrap().unwrap().seq_num, 1);
        assert_eq!(source.next_message().unwrap().unwrap().seq_num, 3);
        assert!(source.next_message().unwrap().is_none());
        assert_eq!(source.skipped(), 2);
    }

    #[test]
    fn test_open_missing_file() {
        let err = JsonLinesSource::open(Path::new("/nonexistent/esmonitor.jsonl"), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, EsmError::Io { .. }));
    }
}
