//! Typed domain events
//!
//! [`DomainEvent`] has exactly one arm per modelled [`EventKind`], each
//! owning its own record type. Fields that depend on the message schema
//! version are `Option`s and stay `None` below the required version.

use serde::{Deserialize, Serialize};

use super::artifacts::{
    File, FileDescriptor, LaunchItem, NewPath, Process, QuarantineAwareness, QuarantineStatus,
    Statfs, X509Cert,
};
use super::event_kind::EventKind;

//
// Process events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecEvent {
    pub target: Process,
    pub args: Vec<String>,
    /// Arguments joined by single spaces, trimmed
    pub command_line: String,
    pub env: Vec<String>,
    /// Kernel reported script, version 2
    pub script: Option<File>,
    /// Version 3
    pub cwd: Option<File>,
    /// Version 4
    pub last_fd: Option<i32>,
    /// Version 4
    pub fds: Vec<FileDescriptor>,
    /// Version 6
    pub image_cputype: Option<i32>,
    /// Version 6
    pub image_cpusubtype: Option<i32>,
    /// Version 7
    pub dyld_exec_path: Option<String>,
    /// Script resolved from the arguments of a whitelisted interpreter
    pub script_path: Option<String>,
    pub script_content: Option<String>,
    pub certificate_chain: Vec<X509Cert>,
    pub file_quarantine_type: Option<QuarantineAwareness>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForkEvent {
    pub child: Process,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub stat: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub sig: i32,
    pub signal_name: String,
    pub target: Process,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcCheckEvent {
    pub target: Option<Process>,
    pub check_type: u32,
    pub type_string: String,
    pub flavor: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcSuspendResumeEvent {
    pub target: Option<Process>,
    pub action_type: u32,
    pub type_string: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub target: Process,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub flavor: i32,
    pub state_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteThreadCreateEvent {
    pub target: Process,
    pub thread_state: Option<ThreadState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTaskEvent {
    pub target: Process,
    /// Version 5
    pub task_type: Option<u32>,
    pub type_string: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsInvalidatedEvent {}

//
// File system events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenEvent {
    pub fflag: i32,
    pub fflag_names: Vec<String>,
    pub file: File,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub modified: bool,
    pub target: File,
    /// Version 6
    pub was_mapped_writable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateEvent {
    pub destination_path: String,
    pub existing_file: Option<File>,
    pub new_path: Option<NewPath>,
    pub is_quarantined: Option<QuarantineStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenameEvent {
    pub source: File,
    pub destination_path: String,
    pub existing_file: Option<File>,
    pub new_path: Option<NewPath>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnlinkEvent {
    pub target: File,
    pub parent_dir: File,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkEvent {
    pub source: File,
    pub target_dir: File,
    pub target_filename: String,
}

/// Write, dup and listextattr only carry the affected file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileTargetEvent {
    pub target: File,
}

/// Shared by setextattr, getextattr and deleteextattr
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtattrEvent {
    pub target: File,
    pub extattr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetModeEvent {
    pub mode: u32,
    /// Octal rendering, e.g. `0755`
    pub mode_string: String,
    pub target: File,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountEvent {
    pub statfs: Statfs,
    /// Version 8
    pub disposition: Option<i32>,
    pub disposition_string: Option<String>,
}

//
// Memory events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MmapEvent {
    pub protection: i32,
    pub protection_flags: Vec<String>,
    pub max_protection: i32,
    pub flags: i32,
    pub file_pos: u64,
    pub source: File,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MprotectEvent {
    pub protection: i32,
    pub protection_flags: Vec<String>,
    pub address: u64,
    pub hex_address: String,
    pub size: u64,
    pub kb_size: u64,
}

//
// Kernel, socket and pty events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IokitOpenEvent {
    pub user_client_type: u32,
    pub user_client_class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UipcBindEvent {
    pub dir: File,
    pub filename: String,
    pub mode: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UipcConnectEvent {
    pub file: File,
    pub domain: i32,
    pub domain_string: String,
    pub socket_type: i32,
    pub type_string: String,
    pub protocol: i32,
    pub protocol_string: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PtyGrantEvent {
    pub dev: u64,
}

//
// XProtect, login and service management events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XpMalwareDetectedEvent {
    pub signature_version: String,
    pub malware_identifier: String,
    pub incident_identifier: String,
    pub detected_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XpMalwareRemediatedEvent {
    pub signature_version: String,
    pub malware_identifier: String,
    pub incident_identifier: String,
    pub action_type: String,
    pub success: bool,
    pub result_description: String,
    pub remediated_path: String,
    pub remediated_process_pid: Option<i32>,
}

/// Shared by loginwindow login and unlock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LwSessionEvent {
    pub username: String,
    pub graphical_session_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpensshLoginEvent {
    pub success: bool,
    pub result_type: i32,
    pub result_type_string: String,
    pub source_address_type: i32,
    pub source_address_type_string: String,
    pub source_address: String,
    pub username: String,
    pub uid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpensshLogoutEvent {
    pub source_address_type: i32,
    pub source_address_type_string: String,
    pub source_address: String,
    pub username: String,
    pub uid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginLoginEvent {
    pub success: bool,
    pub failure_message: Option<String>,
    pub username: String,
    pub uid: Option<u32>,
}

/// Shared by launch item add and remove
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BtmLaunchItemEvent {
    pub instigator: Option<Process>,
    pub app: Option<Process>,
    pub item: LaunchItem,
    pub executable_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub identifier: String,
    pub uuid: String,
    pub install_source: i32,
    pub install_source_string: String,
    pub organization: String,
    pub display_name: String,
    pub scope: String,
}

impl Profile {
    /// `display_name (identifier)` summary
    pub fn summary(&self) -> String {
        match (self.display_name.is_empty(), self.identifier.is_empty()) {
            (false, false) => format!("{} ({})", self.display_name, self.identifier),
            (false, true) => self.display_name.clone(),
            _ => self.identifier.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAddEvent {
    pub instigator: Option<Process>,
    pub is_update: bool,
    pub profile: Profile,
}

//
// Authorization events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationPetitionEvent {
    pub instigator: Option<Process>,
    pub petitioner: Option<Process>,
    pub flags: u32,
    pub rights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub right_name: String,
    pub rule_class: i32,
    pub rule_class_string: String,
    pub granted: bool,
}

impl AuthorizationResult {
    /// `right_name (granted)` style summary
    pub fn description(&self) -> String {
        format!(
            "{} ({})",
            self.right_name,
            if self.granted { "granted" } else { "denied" }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationJudgementEvent {
    pub instigator: Option<Process>,
    pub petitioner: Option<Process>,
    pub return_code: i32,
    pub results: Vec<AuthorizationResult>,
}

//
// Open Directory events
//

/// Shared by group add and group remove
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdGroupMembershipEvent {
    pub instigator: Option<Process>,
    pub error_code: i32,
    pub error_code_human: String,
    pub group_name: String,
    pub member: Option<String>,
    pub member_type: Option<String>,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdModifyPasswordEvent {
    pub instigator: Option<Process>,
    pub error_code: i32,
    pub error_code_human: String,
    pub account_type: String,
    pub account_name: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdAttributeValueAddEvent {
    pub instigator: Option<Process>,
    pub error_code: i32,
    pub error_code_human: String,
    pub record_type: String,
    pub record_name: String,
    pub attribute_name: String,
    pub attribute_value: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdCreateUserEvent {
    pub instigator: Option<Process>,
    pub error_code: i32,
    pub error_code_human: String,
    pub user_name: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdCreateGroupEvent {
    pub instigator: Option<Process>,
    pub error_code: i32,
    pub error_code_human: String,
    pub group_name: String,
    pub node_name: String,
    pub db_path: Option<String>,
}

//
// XPC, TCC and Gatekeeper events
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XpcConnectEvent {
    pub service_name: String,
    pub service_domain_type: i32,
    pub service_domain_type_string: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SigningInfo {
    pub signing_id: String,
    pub team_id: String,
    pub cdhash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatekeeperUserOverrideEvent {
    pub file_type: i32,
    pub file_path: Option<String>,
    pub file: Option<File>,
    pub sha256: Option<String>,
    pub signing_info: Option<SigningInfo>,
}

impl GatekeeperUserOverrideEvent {
    /// Overridden path, from either the bare path or the file record
    pub fn override_path(&self) -> String {
        self.file_path
            .clone()
            .or_else(|| self.file.as_ref().map(|f| f.path.clone()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TccModifyEvent {
    pub service: String,
    pub identity: String,
    pub identity_type: i32,
    pub identity_type_string: String,
    pub update_type: i32,
    pub update_type_string: String,
    pub instigator: Option<Process>,
    pub responsible: Option<Process>,
    pub right: i32,
    pub right_string: String,
    pub reason: i32,
    pub reason_string: String,
}

/// One typed record per notification kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEvent {
    Exec(ExecEvent),
    Open(OpenEvent),
    Fork(ForkEvent),
    Close(CloseEvent),
    Create(CreateEvent),
    Exit(ExitEvent),
    GetTask(GetTaskEvent),
    Link(LinkEvent),
    Mmap(MmapEvent),
    Mprotect(MprotectEvent),
    Mount(MountEvent),
    IokitOpen(IokitOpenEvent),
    Rename(RenameEvent),
    SetExtattr(ExtattrEvent),
    SetMode(SetModeEvent),
    Signal(SignalEvent),
    Unlink(UnlinkEvent),
    Write(FileTargetEvent),
    GetExtattr(ExtattrEvent),
    ListExtattr(FileTargetEvent),
    DeleteExtattr(ExtattrEvent),
    Dup(FileTargetEvent),
    UipcBind(UipcBindEvent),
    UipcConnect(UipcConnectEvent),
    PtyGrant(PtyGrantEvent),
    ProcCheck(ProcCheckEvent),
    ProcSuspendResume(ProcSuspendResumeEvent),
    CsInvalidated(CsInvalidatedEvent),
    Trace(TraceEvent),
    RemoteThreadCreate(RemoteThreadCreateEvent),
    XpMalwareDetected(XpMalwareDetectedEvent),
    XpMalwareRemediated(XpMalwareRemediatedEvent),
    LwSessionLogin(LwSessionEvent),
    LwSessionUnlock(LwSessionEvent),
    OpensshLogin(OpensshLoginEvent),
    OpensshLogout(OpensshLogoutEvent),
    LoginLogin(LoginLoginEvent),
    BtmLaunchItemAdd(BtmLaunchItemEvent),
    BtmLaunchItemRemove(BtmLaunchItemEvent),
    ProfileAdd(ProfileAddEvent),
    AuthorizationPetition(AuthorizationPetitionEvent),
    AuthorizationJudgement(AuthorizationJudgementEvent),
    OdGroupAdd(OdGroupMembershipEvent),
    OdGroupRemove(OdGroupMembershipEvent),
    OdModifyPassword(OdModifyPasswordEvent),
    OdAttributeValueAdd(OdAttributeValueAddEvent),
    OdCreateUser(OdCreateUserEvent),
    OdCreateGroup(OdCreateGroupEvent),
    XpcConnect(XpcConnectEvent),
    GatekeeperUserOverride(GatekeeperUserOverrideEvent),
    TccModify(TccModifyEvent),
    /// Kind outside the modelled set, no typed detail
    Unknown,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::Exec(_) => EventKind::Exec,
            DomainEvent::Open(_) => EventKind::Open,
            DomainEvent::Fork(_) => EventKind::Fork,
            DomainEvent::Close(_) => EventKind::Close,
            DomainEvent::Create(_) => EventKind::Create,
            DomainEvent::Exit(_) => EventKind::Exit,
            DomainEvent::GetTask(_) => EventKind::GetTask,
            DomainEvent::Link(_) => EventKind::Link,
            DomainEvent::Mmap(_) => EventKind::Mmap,
            DomainEvent::Mprotect(_) => EventKind::Mprotect,
            DomainEvent::Mount(_) => EventKind::Mount,
            DomainEvent::IokitOpen(_) => EventKind::IokitOpen,
            DomainEvent::Rename(_) => EventKind::Rename,
            DomainEvent::SetExtattr(_) => EventKind::SetExtattr,
            DomainEvent::SetMode(_) => EventKind::SetMode,
            DomainEvent::Signal(_) => EventKind::Signal,
            DomainEvent::Unlink(_) => EventKind::Unlink,
            DomainEvent::Write(_) => EventKind::Write,
            DomainEvent::GetExtattr(_) => EventKind::GetExtattr,
            DomainEvent::ListExtattr(_) => EventKind::ListExtattr,
            DomainEvent::DeleteExtattr(_) => EventKind::DeleteExtattr,
            DomainEvent::Dup(_) => EventKind::Dup,
            DomainEvent::UipcBind(_) => EventKind::UipcBind,
            DomainEvent::UipcConnect(_) => EventKind::UipcConnect,
            DomainEvent::PtyGrant(_) => EventKind::PtyGrant,
            DomainEvent::ProcCheck(_) => EventKind::ProcCheck,
            DomainEvent::ProcSuspendResume(_) => EventKind::ProcSuspendResume,
            DomainEvent::CsInvalidated(_) => EventKind::CsInvalidated,
            DomainEvent::Trace(_) => EventKind::Trace,
            DomainEvent::RemoteThreadCreate(_) => EventKind::RemoteThreadCreate,
            DomainEvent::XpMalwareDetected(_) => EventKind::XpMalwareDetected,
            DomainEvent::XpMalwareRemediated(_) => EventKind::XpMalwareRemediated,
            DomainEvent::LwSessionLogin(_) => EventKind::LwSessionLogin,
            DomainEvent::LwSessionUnlock(_) => EventKind::LwSessionUnlock,
            DomainEvent::OpensshLogin(_) => EventKind::OpensshLogin,
            DomainEvent::OpensshLogout(_) => EventKind::OpensshLogout,
            DomainEvent::LoginLogin(_) => EventKind::LoginLogin,
            DomainEvent::BtmLaunchItemAdd(_) => EventKind::BtmLaunchItemAdd,
            DomainEvent::BtmLaunchItemRemove(_) => EventKind::BtmLaunchItemRemove,
            DomainEvent::ProfileAdd(_) => EventKind::ProfileAdd,
            DomainEvent::AuthorizationPetition(_) => EventKind::AuthorizationPetition,
            DomainEvent::AuthorizationJudgement(_) => EventKind::AuthorizationJudgement,
            DomainEvent::OdGroupAdd(_) => EventKind::OdGroupAdd,
            DomainEvent::OdGroupRemove(_) => EventKind::OdGroupRemove,
            DomainEvent::OdModifyPassword(_) => EventKind::OdModifyPassword,
            DomainEvent::OdAttributeValueAdd(_) => EventKind::OdAttributeValueAdd,
            DomainEvent::OdCreateUser(_) => EventKind::OdCreateUser,
            DomainEvent::OdCreateGroup(_) => EventKind::OdCreateGroup,
            DomainEvent::XpcConnect(_) => EventKind::XpcConnect,
            DomainEvent::GatekeeperUserOverride(_) => EventKind::GatekeeperUserOverride,
            DomainEvent::TccModify(_) => EventKind::TccModify,
            DomainEvent::Unknown => EventKind::Unknown,
        }
    }
}
