//! Raw message builders shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use esmonitor::models::raw::{RawCreate, RawFile, RawMprotect, RawNewPath};
use esmonitor::models::{EventKind, RawMessage, RawPayload, RawProcess};

pub fn raw_file(path: &str) -> RawFile {
    RawFile {
        path: Some(path.to_string()),
        ..Default::default()
    }
}

pub fn process(executable: &str) -> RawProcess {
    RawProcess {
        pid: 501,
        executable: Some(raw_file(executable)),
        ..Default::default()
    }
}

/// Version 6 message of `kind` caused by /usr/bin/touch
pub fn message(kind: EventKind, payload: RawPayload) -> RawMessage {
    RawMessage {
        event_type: kind.code().unwrap_or(9999),
        version: 6,
        process: process("/usr/bin/touch"),
        payload,
        ..Default::default()
    }
}

/// CREATE of a not yet existing file at `path`
pub fn create_at(path: &str) -> RawMessage {
    let (dir, filename) = path.rsplit_once('/').unwrap_or(("", path));
    message(
        EventKind::Create,
        RawPayload::Create(RawCreate {
            existing_file: None,
            new_path: Some(RawNewPath {
                dir: raw_file(dir),
                filename: filename.to_string(),
                mode: 0o644,
            }),
        }),
    )
}

pub fn mprotect(protection: i32, address: u64, size: u64) -> RawMessage {
    message(
        EventKind::Mprotect,
        RawPayload::Mprotect(RawMprotect {
            protection,
            address,
            size,
        }),
    )
}

/// Write messages as a JSON lines replay file
pub fn write_jsonl(dir: &Path, name: &str, messages: &[RawMessage]) -> PathBuf {
    let path = dir.join(name);
    let body: Vec<String> = messages
        .iter()
        .map(|m| serde_json::to_string(m).unwrap())
        .collect();
    fs::write(&path, body.join("\n") + "\n").unwrap();
    path
}
