//! Raw notification input model
//!
//! Mirrors the layout of an Endpoint Security message closely enough to be
//! replayed from JSON lines:
//! - RawMessage: kind code, schema version, timestamps, originating process
//! - RawProcess / RawFile / RawStat: the shared building blocks
//! - RawPayload: one externally tagged arm per modelled kind
//!
//! Every struct defaults missing fields, so absent pointers in a payload
//! decode to empty values rather than failing the whole message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event_kind::EventKind;

/// One notification as delivered by the event source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    /// Raw `es_event_type_t` code
    pub event_type: u32,
    /// Message schema version
    pub version: u32,
    /// Wall clock time of the notification
    pub time: DateTime<Utc>,
    pub mach_time: u64,
    pub seq_num: u64,
    /// Present from version 4
    pub global_seq_num: Option<u64>,
    /// Thread that caused the event, present from version 4
    pub thread_id: Option<u64>,
    /// Process that caused the event
    pub process: RawProcess,
    pub payload: RawPayload,
}

impl RawMessage {
    pub fn kind(&self) -> EventKind {
        EventKind::from_code(self.event_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStat {
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

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFile {
    pub path: Option<String>,
    pub path_truncated: bool,
    pub stat: Option<RawStat>,
}

impl RawFile {
    pub fn path_str(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProcess {
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
    /// Hex encoded code directory hash
    pub cdhash: Option<String>,
    pub executable: Option<RawFile>,
    /// Present from version 2
    pub tty: Option<RawFile>,
    /// Unix seconds, present from version 3
    pub start_time: Option<i64>,
    /// Present from version 4
    pub responsible_pid: Option<i32>,
    /// Present from version 4
    pub parent_pid: Option<i32>,
}

impl RawProcess {
    pub fn executable_path(&self) -> Option<&str> {
        self.executable.as_ref().and_then(|exe| exe.path.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAuditToken {
    pub pid: i32,
    pub pidversion: i32,
    pub euid: u32,
}

/// Kind specific payload of a raw message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawPayload {
    #[default]
    None,
    Exec(RawExec),
    Open(RawOpen),
    Fork(RawFork),
    Close(RawClose),
    Create(RawCreate),
    Exit(RawExit),
    GetTask(RawGetTask),
    Link(RawLink),
    Mmap(RawMmap),
    Mprotect(RawMprotect),
    Mount(RawMount),
    IokitOpen(RawIokitOpen),
    Rename(RawRename),
    SetExtattr(RawExtattr),
    SetMode(RawSetMode),
    Signal(RawSignal),
    Unlink(RawUnlink),
    Write(RawFileTarget),
    GetExtattr(RawExtattr),
    ListExtattr(RawFileTarget),
    DeleteExtattr(RawExtattr),
    Dup(RawFileTarget),
    UipcBind(RawUipcBind),
    UipcConnect(RawUipcConnect),
    PtyGrant(RawPtyGrant),
    ProcCheck(RawProcCheck),
    ProcSuspendResume(RawProcSuspendResume),
    CsInvalidated {},
    Trace(RawTrace),
    RemoteThreadCreate(RawRemoteThreadCreate),
    XpMalwareDetected(RawXpMalwareDetected),
    XpMalwareRemediated(RawXpMalwareRemediated),
    LwSessionLogin(RawLwSession),
    LwSessionUnlock(RawLwSession),
    OpensshLogin(RawOpensshLogin),
    OpensshLogout(RawOpensshLogout),
    LoginLogin(RawLoginLogin),
    BtmLaunchItemAdd(RawBtmLaunchItemEvent),
    BtmLaunchItemRemove(RawBtmLaunchItemEvent),
    ProfileAdd(RawProfileAdd),
    AuthorizationPetition(RawAuthorizationPetition),
    AuthorizationJudgement(RawAuthorizationJudgement),
    OdGroupAdd(RawOdGroupMembership),
    OdGroupRemove(RawOdGroupMembership),
    OdModifyPassword(RawOdModifyPassword),
    OdAttributeValueAdd(RawOdAttributeValueAdd),
    OdCreateUser(RawOdCreateUser),
    OdCreateGroup(RawOdCreateGroup),
    XpcConnect(RawXpcConnect),
    GatekeeperUserOverride(RawGatekeeperUserOverride),
    TccModify(RawTccModify),
}

//
// Process events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFd {
    pub fd: i32,
    pub fdtype: u32,
    /// Only set for pipe descriptors
    pub pipe_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExec {
    pub target: RawProcess,
    pub args: Vec<String>,
    pub env: Vec<String>,
    /// Version 2
    pub script: Option<RawFile>,
    /// Version 3
    pub cwd: Option<RawFile>,
    /// Version 4
    pub last_fd: Option<i32>,
    /// Version 4
    pub fds: Vec<RawFd>,
    /// Version 6
    pub image_cputype: Option<i32>,
    /// Version 6
    pub image_cpusubtype: Option<i32>,
    /// Version 7
    pub dyld_exec_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFork {
    pub child: RawProcess,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExit {
    pub stat: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSignal {
    pub sig: i32,
    pub target: RawProcess,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProcCheck {
    pub target: Option<RawProcess>,
    #[serde(rename = "type")]
    pub check_type: u32,
    pub flavor: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProcSuspendResume {
    pub target: Option<RawProcess>,
    #[serde(rename = "type")]
    pub action_type: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTrace {
    pub target: RawProcess,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawThreadState {
    pub flavor: i32,
    pub state_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRemoteThreadCreate {
    pub target: RawProcess,
    pub thread_state: Option<RawThreadState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGetTask {
    pub target: RawProcess,
    /// Version 5
    #[serde(rename = "type")]
    pub task_type: Option<u32>,
}

//
// File system events
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFileTarget {
    pub target: RawFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOpen {
    pub fflag: i32,
    pub file: RawFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawClose {
    pub modified: bool,
    pub target: RawFile,
    /// Version 6
    pub was_mapped_writable: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNewPath {
    pub dir: RawFile,
    pub filename: String,
    pub mode: u32,
}

/// Create carries either an existing file or a directory + filename pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCreate {
    pub existing_file: Option<RawFile>,
    pub new_path: Option<RawNewPath>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRename {
    pub source: RawFile,
    pub existing_file: Option<RawFile>,
    pub new_path: Option<RawNewPath>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawUnlink {
    pub target: RawFile,
    pub parent_dir: RawFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLink {
    pub source: RawFile,
    pub target_dir: RawFile,
    pub target_filename: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExtattr {
    pub target: RawFile,
    pub extattr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSetMode {
    pub mode: u32,
    pub target: RawFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStatfs {
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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMount {
    pub statfs: RawStatfs,
    /// Version 8
    pub disposition: Option<i32>,
}

//
// Memory events
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMmap {
    pub protection: i32,
    pub max_protection: i32,
    pub flags: i32,
    pub file_pos: u64,
    pub source: RawFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMprotect {
    pub protection: i32,
    pub address: u64,
    pub size: u64,
}

//
// Kernel, socket and pty events
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawIokitOpen {
    pub user_client_type: u32,
    pub user_client_class: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawUipcBind {
    pub dir: RawFile,
    pub filename: String,
    pub mode: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawUipcConnect {
    pub file: RawFile,
    pub domain: i32,
    #[serde(rename = "type")]
    pub socket_type: i32,
    pub protocol: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPtyGrant {
    pub dev: u64,
}

//
// Login, XProtect and service management events
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawXpMalwareDetected {
    pub signature_version: String,
    pub malware_identifier: String,
    pub incident_identifier: String,
    pub detected_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawXpMalwareRemediated {
    pub signature_version: String,
    pub malware_identifier: String,
    pub incident_identifier: String,
    pub action_type: String,
    pub success: bool,
    pub result_description: String,
    pub remediated_path: Option<String>,
    pub remediated_process_audit_token: Option<RawAuditToken>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLwSession {
    pub username: String,
    pub graphical_session_id: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOpensshLogin {
    pub success: bool,
    pub result_type: i32,
    pub source_address_type: i32,
    pub source_address: String,
    pub username: String,
    pub uid: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOpensshLogout {
    pub source_address_type: i32,
    pub source_address: String,
    pub username: String,
    pub uid: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLoginLogin {
    pub success: bool,
    pub failure_message: Option<String>,
    pub username: String,
    pub uid: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBtmLaunchItem {
    pub item_type: i32,
    pub legacy: bool,
    pub managed: bool,
    pub uid: u32,
    pub item_url: String,
    pub app_url: Option<String>,
}

/// Shared by launch item add and remove
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBtmLaunchItemEvent {
    pub instigator: Option<RawProcess>,
    pub app: Option<RawProcess>,
    pub item: RawBtmLaunchItem,
    /// Add only
    pub executable_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    pub identifier: String,
    pub uuid: String,
    pub install_source: i32,
    pub organization: String,
    pub display_name: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProfileAdd {
    pub instigator: Option<RawProcess>,
    pub is_update: bool,
    pub profile: RawProfile,
}

//
// Authorization events
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAuthorizationPetition {
    pub instigator: Option<RawProcess>,
    pub petitioner: Option<RawProcess>,
    pub flags: u32,
    pub rights: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAuthorizationResult {
    pub right_name: String,
    pub rule_class: i32,
    pub granted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAuthorizationJudgement {
    pub instigator: Option<RawProcess>,
    pub petitioner: Option<RawProcess>,
    pub return_code: i32,
    pub results: Vec<RawAuthorizationResult>,
}

//
// Open Directory events
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOdMember {
    pub member_type: i32,
    pub member_value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOdGroupMembership {
    pub instigator: Option<RawProcess>,
    pub error_code: i32,
    pub group_name: String,
    pub member: Option<RawOdMember>,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOdModifyPassword {
    pub instigator: Option<RawProcess>,
    pub error_code: i32,
    pub account_type: i32,
    pub account_name: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOdAttributeValueAdd {
    pub instigator: Option<RawProcess>,
    pub error_code: i32,
    pub record_type: i32,
    pub record_name: String,
    pub attribute_name: String,
    pub attribute_value: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOdCreateUser {
    pub instigator: Option<RawProcess>,
    pub error_code: i32,
    pub user_name: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOdCreateGroup {
    pub instigator: Option<RawProcess>,
    pub error_code: i32,
    pub group_name: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

//
// XPC, TCC and Gatekeeper events
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawXpcConnect {
    pub service_name: String,
    pub service_domain_type: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSigningInfo {
    pub signing_id: String,
    pub team_id: String,
    pub cdhash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGatekeeperUserOverride {
    pub file_type: i32,
    /// Set when the override only carries a path
    pub file_path: Option<String>,
    pub file: Option<RawFile>,
    pub sha256: Option<String>,
    pub signing_info: Option<RawSigningInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTccModify {
    pub service: String,
    pub identity: String,
    pub identity_type: i32,
    pub update_type: i32,
    pub instigator: Option<RawProcess>,
    pub responsible: Option<RawProcess>,
    pub right: i32,
    pub reason: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_message_decodes_with_defaults() {
        let msg: RawMessage = serde_json::from_str(r#"{"event_type": 13}"#).unwrap();
        assert_eq!(msg.kind(), EventKind::Create);
        assert_eq!(msg.version, 0);
        assert!(msg.process.executable.is_none());
        assert!(matches!(msg.payload, RawPayload::None));
    }

    #[test]
    fn test_payload_is_externally_tagged() {
        let json = r#"{
            "event_type": 21,
            "version": 7,
            "process": {"pid": 42, "executable": {"path": "/usr/bin/true"}},
            "payload": {"mprotect": {"protection": 5, "address": 4096, "size": 8192}}
        }"#;
        let msg: RawMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.process.executable_path(), Some("/usr/bin/true"));
        match msg.payload {
            RawPayload::Mprotect(mp) => {
                assert_eq!(mp.protection, 5);
                assert_eq!(mp.size, 8192);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_empty_cs_invalidated_payload() {
        let msg: RawMessage =
            serde_json::from_str(r#"{"event_type": 94, "payload": {"cs_invalidated": {}}}"#).unwrap();
        assert!(matches!(msg.payload, RawPayload::CsInvalidated {}));
    }
}
