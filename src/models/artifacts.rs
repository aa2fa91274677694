//! Shared building blocks of domain events
//!
//! Process, File and Stat are converted from their raw counterparts; the
//! enrichment-derived pieces (certificates, code signing type, quarantine
//! state, launch items) are filled in by the classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::raw::{RawFd, RawFile, RawNewPath, RawProcess, RawStat, RawStatfs};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub st_dev: i32,
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_size: i64,
    pub st_blocks: i64,
    pub st_blksize: i32,
    pub st_flags: u32,
    pub st_atime: i64,
    pub st_mtime: i64,
    pub st_ctime: i64,
    pub st_birthtime: i64,
}

impl From<&RawStat> for Stat {
    fn from(raw: &RawStat) -> Self {
        Stat {
            st_dev: raw.st_dev,
            st_ino: raw.st_ino,
            st_mode: raw.st_mode,
            st_nlink: raw.st_nlink,
            st_uid: raw.st_uid,
            st_gid: raw.st_gid,
            st_size: raw.st_size,
            st_blocks: raw.st_blocks,
            st_blksize: raw.st_blksize,
            st_flags: raw.st_flags,
            st_atime: raw.st_atime,
            st_mtime: raw.st_mtime,
            st_ctime: raw.st_ctime,
            st_birthtime: raw.st_birthtime,
        }
    }
}

/// A file system object referenced by an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    /// Last path component
    pub name: String,
    pub path_truncated: bool,
    pub stat: Stat,
}

impl File {
    pub fn from_path(path: &str) -> Self {
        File {
            path: path.to_string(),
            name: file_name(path),
            ..Default::default()
        }
    }
}

impl From<&RawFile> for File {
    fn from(raw: &RawFile) -> Self {
        let path = raw.path.clone().unwrap_or_default();
        File {
            name: file_name(&path),
            path,
            path_truncated: raw.path_truncated,
            stat: raw.stat.as_ref().map(Stat::from).unwrap_or_default(),
        }
    }
}

/// Last component of a path, empty for an empty path
pub fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Directory + filename pair for objects that do not exist yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPath {
    pub dir: File,
    pub filename: String,
    pub mode: u32,
}

impl NewPath {
    /// `dir/filename`
    pub fn joined(&self) -> String {
        join_path(&self.dir.path, &self.filename)
    }
}

impl From<&RawNewPath> for NewPath {
    fn from(raw: &RawNewPath) -> Self {
        NewPath {
            dir: File::from(&raw.dir),
            filename: raw.filename.clone(),
            mode: raw.mode,
        }
    }
}

/// Join a directory and a file name with exactly one separator
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    if name.is_empty() {
        return dir.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// One certificate of a code signing chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Cert {
    /// Subject summary, e.g. `Developer ID Application: Example (ABCDE12345)`
    pub summary: String,
    /// SHA-1 of the DER encoding when the lookup provides it
    pub thumbprint: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSigningType {
    Platform,
    Adhoc,
    AppStore,
    DeveloperId,
    #[default]
    Unknown,
    Unsigned,
}

/// How a bundle participates in File Quarantine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineAwareness {
    /// Not a bundle, or the bundle did not opt in
    Disabled,
    /// Apple forces quarantine for this signing identifier
    Forced,
    /// Bundle sets `LSFileQuarantineEnabled`
    OptIn,
}

/// Quarantine attribute state of a file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineStatus {
    NotQuarantined,
    Quarantined,
    NotFound,
}

impl QuarantineStatus {
    /// Numeric form used by downstream stores: 1 quarantined, 0 not, 2 missing
    pub fn code(self) -> u8 {
        match self {
            QuarantineStatus::NotQuarantined => 0,
            QuarantineStatus::Quarantined => 1,
            QuarantineStatus::NotFound => 2,
        }
    }
}

/// A process participating in an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub pid: i32,
    pub pidversion: i32,
    pub ppid: i32,
    pub original_ppid: i32,
    pub ruid: u32,
    pub euid: u32,
    pub rgid: u32,
    pub egid: u32,
    pub group_id: i32,
    pub session_id: i32,
    pub codesigning_flags: u32,
    pub is_platform_binary: bool,
    pub is_es_client: bool,
    pub signing_id: Option<String>,
    pub team_id: Option<String>,
    pub cdhash: Option<String>,
    pub executable: Option<File>,
    pub tty: Option<File>,
    pub start_time: Option<DateTime<Utc>>,
    pub responsible_pid: Option<i32>,
    pub parent_pid: Option<i32>,
    pub code_signing_type: CodeSigningType,
}

impl Process {
    /// Convert a raw process, keeping version-gated fields only when `version` allows
    pub fn from_raw(raw: &RawProcess, version: u32) -> Self {
        Process {
            pid: raw.pid,
            pidversion: raw.pidversion,
            ppid: raw.ppid,
            original_ppid: raw.original_ppid,
            ruid: raw.ruid,
            euid: raw.euid,
            rgid: raw.rgid,
            egid: raw.egid,
            group_id: raw.group_id,
            session_id: raw.session_id,
            codesigning_flags: raw.codesigning_flags,
            is_platform_binary: raw.is_platform_binary,
            is_es_client: raw.is_es_client,
            signing_id: raw.signing_id.clone(),
            team_id: raw.team_id.clone(),
            cdhash: raw.cdhash.clone(),
            executable: raw.executable.as_ref().map(File::from),
            tty: if version >= 2 { raw.tty.as_ref().map(File::from) } else { None },
            start_time: if version >= 3 {
                raw.start_time
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            } else {
                None
            },
            responsible_pid: if version >= 4 { raw.responsible_pid } else { None },
            parent_pid: if version >= 4 { raw.parent_pid } else { None },
            code_signing_type: CodeSigningType::Unknown,
        }
    }

    pub fn executable_path(&self) -> Option<&str> {
        self.executable.as_ref().map(|exe| exe.path.as_str())
    }

    pub fn executable_name(&self) -> Option<&str> {
        self.executable.as_ref().map(|exe| exe.name.as_str())
    }
}

/// An open descriptor inherited across exec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub fd: i32,
    pub fdtype: u32,
    pub fdtype_name: String,
    pub pipe_id: Option<u64>,
}

impl From<&RawFd> for FileDescriptor {
    fn from(raw: &RawFd) -> Self {
        let fdtype_name = match raw.fdtype {
            1 => "PROX_FDTYPE_VNODE",
            2 => "PROX_FDTYPE_SOCKET",
            3 => "PROX_FDTYPE_PSHM",
            4 => "PROX_FDTYPE_PSEM",
            5 => "PROX_FDTYPE_KQUEUE",
            6 => "PROX_FDTYPE_PIPE",
            7 => "PROX_FDTYPE_FSEVENTS",
            9 => "PROX_FDTYPE_NETPOLICY",
            10 => "PROX_FDTYPE_CHANNEL",
            11 => "PROX_FDTYPE_NEXUS",
            _ => "PROX_FDTYPE_UNKNOWN",
        };
        FileDescriptor {
            fd: raw.fd,
            fdtype: raw.fdtype,
            fdtype_name: fdtype_name.to_string(),
            pipe_id: if raw.fdtype == 6 { raw.pipe_id } else { None },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statfs {
    pub f_bsize: u32,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_files: u64,
    pub f_owner: u32,
    pub f_type: u32,
    pub f_flags: u32,
    pub f_fstypename: String,
    pub f_mntonname: String,
    pub f_mntfromname: String,
}

impl From<&RawStatfs> for Statfs {
    fn from(raw: &RawStatfs) -> Self {
        Statfs {
            f_bsize: raw.f_bsize,
            f_blocks: raw.f_blocks,
            f_bfree: raw.f_bfree,
            f_files: raw.f_files,
            f_owner: raw.f_owner,
            f_type: raw.f_type,
            f_flags: raw.f_flags,
            f_fstypename: raw.f_fstypename.clone(),
            f_mntonname: raw.f_mntonname.clone(),
            f_mntfromname: raw.f_mntfromname.clone(),
        }
    }
}

/// Background Task Management item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchItem {
    pub item_type: i32,
    pub item_type_string: String,
    pub legacy: bool,
    pub managed: bool,
    pub uid: u32,
    pub item_path: String,
    pub app_path: Option<String>,
    /// Property list text for agents and daemons
    pub plist_contents: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_from_raw_with_absent_fields() {
        let file = File::from(&RawFile::default());
        assert_eq!(file.path, "");
        assert_eq!(file.name, "");
        assert_eq!(file.stat, Stat::default());
    }

    #[test]
    fn test_join_path_separators() {
        assert_eq!(join_path("/tmp", "a.txt"), "/tmp/a.txt");
        assert_eq!(join_path("/tmp/", "a.txt"), "/tmp/a.txt");
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("/tmp", ""), "/tmp");
    }

    #[test]
    fn test_process_version_gating() {
        let raw = RawProcess {
            tty: Some(RawFile { path: Some("/dev/ttys001".into()), ..Default::default() }),
            start_time: Some(1_700_000_000),
            responsible_pid: Some(1),
            parent_pid: Some(1),
            ..Default::default()
        };

        let v1 = Process::from_raw(&raw, 1);
        assert!(v1.tty.is_none());
        assert!(v1.start_time.is_none());
        assert!(v1.responsible_pid.is_none());

        let v4 = Process::from_raw(&raw, 4);
        assert_eq!(v4.tty.as_ref().map(|t| t.name.as_str()), Some("ttys001"));
        assert!(v4.start_time.is_some());
        assert_eq!(v4.parent_pid, Some(1));
    }

    #[test]
    fn test_pipe_id_only_for_pipes() {
        let pipe = FileDescriptor::from(&RawFd { fd: 3, fdtype: 6, pipe_id: Some(9) });
        assert_eq!(pipe.pipe_id, Some(9));
        assert_eq!(pipe.fdtype_name, "PROX_FDTYPE_PIPE");
        let vnode = FileDescriptor::from(&RawFd { fd: 4, fdtype: 1, pipe_id: Some(9) });
        assert_eq!(vnode.pipe_id, None);
    }
}
