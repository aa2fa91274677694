//! Classification of admitted raw messages
//!
//! `Classifier::classify` is total: every modelled kind yields its own
//! [`DomainEvent`] arm, whatever shape the payload is in. A payload that is
//! absent or belongs to another kind is read as all-default fields, and
//! kinds outside the modelled set become [`DomainEvent::Unknown`].
//!
//! Enrichment runs synchronously while translating:
//! - Exec: certificate chain, code signing type, script resolution and content, quarantine awareness
//! - Create: quarantine attribute of the destination
//! - Launch items: property list contents of agents and daemons
//! - Any validly signed process: certificate authorities, cached per executable

pub mod decode;
pub mod enrichment;
pub mod memory;
pub mod process;
pub mod summary;

pub use enrichment::{
    load_forced_quarantine, BoundedCache, CertificateCache, CertificateLookup,
    CodesignCertificates, Enrichment, FileProbe, FsProbe, NoLookup, PlistFiles, PlistLookup,
    QuarantineCache, QuarantineLookup, XattrQuarantine,
};
pub use summary::{summarize, Summary};

use log::debug;
use std::borrow::Cow;
use std::path::Path;
use uuid::Uuid;

use crate::models::raw::*;
use crate::models::*;

use self::memory::{hex_address, kb_size, protection_flags};
use self::process::{
    code_signing_type, command_line, is_interpreter, resolve_script, CS_ADHOC, CS_VALID,
};

/// Borrow the payload of the expected arm, or an all-default one
macro_rules! payload {
    ($msg:expr, $variant:ident) => {
        match &$msg.payload {
            RawPayload::$variant(raw) => Cow::Borrowed(raw),
            _ => Cow::Owned(Default::default()),
        }
    };
}

/// Translates raw messages into classified events
#[derive(Debug, Clone)]
pub struct Classifier {
    enrichment: Enrichment,
}

impl Classifier {
    pub fn new(enrichment: Enrichment) -> Self {
        Classifier { enrichment }
    }

    /// Classifier with OS backed enrichment
    pub fn system() -> Self {
        Self::new(Enrichment::system())
    }

    pub fn enrichment(&self) -> &Enrichment {
        &self.enrichment
    }

    /// Translate, enrich and summarize one message
    pub fn classify(&self, msg: &RawMessage) -> ClassifiedEvent {
        let process = self.process(&msg.process, msg.version);
        let event = self.translate(msg);
        let summary = summarize(&event, &process);

        ClassifiedEvent {
            id: Uuid::new_v4(),
            kind: event.kind(),
            version: msg.version,
            time: msg.time,
            mach_time: msg.mach_time,
            seq_num: msg.seq_num,
            global_seq_num: if msg.version >= 4 { msg.global_seq_num } else { None },
            thread_id: if msg.version >= 4 { msg.thread_id } else { None },
            process,
            event,
            context: summary.context,
            target_path: summary.target_path,
        }
    }

    /// The typed record of one message, without metadata
    pub fn translate(&self, msg: &RawMessage) -> DomainEvent {
        let version = msg.version;

        match msg.kind() {
            EventKind::Exec => DomainEvent::Exec(self.exec(&*payload!(msg, Exec), version)),
            EventKind::Fork => DomainEvent::Fork(ForkEvent {
                child: self.process(&payload!(msg, Fork).child, version),
            }),
            EventKind::Exit => DomainEvent::Exit(ExitEvent {
                stat: payload!(msg, Exit).stat,
            }),
            EventKind::Signal => {
                let raw = payload!(msg, Signal);
                DomainEvent::Signal(SignalEvent {
                    sig: raw.sig,
                    signal_name: decode::signal_name(raw.sig),
                    target: self.process(&raw.target, version),
                })
            }
            EventKind::ProcCheck => {
                let raw = payload!(msg, ProcCheck);
                DomainEvent::ProcCheck(ProcCheckEvent {
                    target: raw.target.as_ref().map(|p| self.process(p, version)),
                    check_type: raw.check_type,
                    type_string: decode::proc_check_type(raw.check_type),
                    flavor: raw.flavor,
                })
            }
            EventKind::ProcSuspendResume => {
                let raw = payload!(msg, ProcSuspendResume);
                DomainEvent::ProcSuspendResume(ProcSuspendResumeEvent {
                    target: raw.target.as_ref().map(|p| self.process(p, version)),
                    action_type: raw.action_type,
                    type_string: decode::suspend_resume_type(raw.action_type),
                })
            }
            EventKind::Trace => DomainEvent::Trace(TraceEvent {
                target: self.process(&payload!(msg, Trace).target, version),
            }),
            EventKind::RemoteThreadCreate => {
                let raw = payload!(msg, RemoteThreadCreate);
                DomainEvent::RemoteThreadCreate(RemoteThreadCreateEvent {
                    target: self.process(&raw.target, version),
                    thread_state: raw.thread_state.as_ref().map(|state| ThreadState {
                        flavor: state.flavor,
                        state_size: state.state_size,
                    }),
                })
            }
            EventKind::GetTask => {
                let raw = payload!(msg, GetTask);
                let task_type = if version >= 5 { raw.task_type } else { None };
                DomainEvent::GetTask(GetTaskEvent {
                    target: self.process(&raw.target, version),
                    task_type,
                    type_string: task_type.map(decode::get_task_type),
                })
            }
            EventKind::CsInvalidated => DomainEvent::CsInvalidated(CsInvalidatedEvent {}),

            EventKind::Open => {
                let raw = payload!(msg, Open);
                DomainEvent::Open(OpenEvent {
                    fflag: raw.fflag,
                    fflag_names: decode::open_flags(raw.fflag),
                    file: File::from(&raw.file),
                })
            }
            EventKind::Close => {
                let raw = payload!(msg, Close);
                DomainEvent::Close(CloseEvent {
                    modified: raw.modified,
                    target: File::from(&raw.target),
                    was_mapped_writable: if version >= 6 { raw.was_mapped_writable } else { None },
                })
            }
            EventKind::Create => DomainEvent::Create(self.create(&*payload!(msg, Create))),
            EventKind::Rename => {
                let raw = payload!(msg, Rename);
                let existing_file = raw.existing_file.as_ref().map(File::from);
                let new_path = raw.new_path.as_ref().map(NewPath::from);
                DomainEvent::Rename(RenameEvent {
                    source: File::from(&raw.source),
                    destination_path: destination_path(existing_file.as_ref(), new_path.as_ref()),
                    existing_file,
                    new_path,
                })
            }
            EventKind::Unlink => {
                let raw = payload!(msg, Unlink);
                DomainEvent::Unlink(UnlinkEvent {
                    target: File::from(&raw.target),
                    parent_dir: File::from(&raw.parent_dir),
                })
            }
            EventKind::Link => {
                let raw = payload!(msg, Link);
                DomainEvent::Link(LinkEvent {
                    source: File::from(&raw.source),
                    target_dir: File::from(&raw.target_dir),
                    target_filename: raw.target_filename.clone(),
                })
            }
            EventKind::Write => DomainEvent::Write(file_target(&*payload!(msg, Write))),
            EventKind::Dup => DomainEvent::Dup(file_target(&*payload!(msg, Dup))),
            EventKind::ListExtattr => {
                DomainEvent::ListExtattr(file_target(&*payload!(msg, ListExtattr)))
            }
            EventKind::SetExtattr => DomainEvent::SetExtattr(extattr(&*payload!(msg, SetExtattr))),
            EventKind::GetExtattr => DomainEvent::GetExtattr(extattr(&*payload!(msg, GetExtattr))),
            EventKind::DeleteExtattr => {
                DomainEvent::DeleteExtattr(extattr(&*payload!(msg, DeleteExtattr)))
            }
            EventKind::SetMode => {
                let raw = payload!(msg, SetMode);
                DomainEvent::SetMode(SetModeEvent {
                    mode: raw.mode,
                    mode_string: decode::octal_mode(raw.mode),
                    target: File::from(&raw.target),
                })
            }
            EventKind::Mount => {
                let raw = payload!(msg, Mount);
                let disposition = if version >= 8 { raw.disposition } else { None };
                DomainEvent::Mount(MountEvent {
                    statfs: Statfs::from(&raw.statfs),
                    disposition,
                    disposition_string: disposition.map(decode::mount_disposition),
                })
            }

            EventKind::Mmap => {
                let raw = payload!(msg, Mmap);
                DomainEvent::Mmap(MmapEvent {
                    protection: raw.protection,
                    protection_flags: protection_flags(raw.protection),
                    max_protection: raw.max_protection,
                    flags: raw.flags,
                    file_pos: raw.file_pos,
                    source: File::from(&raw.source),
                })
            }
            EventKind::Mprotect => {
                let raw = payload!(msg, Mprotect);
                DomainEvent::Mprotect(MprotectEvent {
                    protection: raw.protection,
                    protection_flags: protection_flags(raw.protection),
                    address: raw.address,
                    hex_address: hex_address(raw.address),
                    size: raw.size,
                    kb_size: kb_size(raw.size),
                })
            }

            EventKind::IokitOpen => {
                let raw = payload!(msg, IokitOpen);
                DomainEvent::IokitOpen(IokitOpenEvent {
                    user_client_type: raw.user_client_type,
                    user_client_class: raw.user_client_class.clone(),
                })
            }
            EventKind::UipcBind => {
                let raw = payload!(msg, UipcBind);
                DomainEvent::UipcBind(UipcBindEvent {
                    dir: File::from(&raw.dir),
                    filename: raw.filename.clone(),
                    mode: raw.mode,
                })
            }
            EventKind::UipcConnect => {
                let raw = payload!(msg, UipcConnect);
                DomainEvent::UipcConnect(UipcConnectEvent {
                    file: File::from(&raw.file),
                    domain: raw.domain,
                    domain_string: decode::socket_domain(raw.domain),
                    socket_type: raw.socket_type,
                    type_string: decode::socket_type(raw.socket_type),
                    protocol: raw.protocol,
                    protocol_string: decode::socket_protocol(raw.protocol),
                })
            }
            EventKind::PtyGrant => DomainEvent::PtyGrant(PtyGrantEvent {
                dev: payload!(msg, PtyGrant).dev,
            }),

            EventKind::XpMalwareDetected => {
                let raw = payload!(msg, XpMalwareDetected);
                DomainEvent::XpMalwareDetected(XpMalwareDetectedEvent {
                    signature_version: raw.signature_version.clone(),
                    malware_identifier: raw.malware_identifier.clone(),
                    incident_identifier: raw.incident_identifier.clone(),
                    detected_path: raw.detected_path.clone(),
                })
            }
            EventKind::XpMalwareRemediated => {
                let raw = payload!(msg, XpMalwareRemediated);
                DomainEvent::XpMalwareRemediated(XpMalwareRemediatedEvent {
                    signature_version: raw.signature_version.clone(),
                    malware_identifier: raw.malware_identifier.clone(),
                    incident_identifier: raw.incident_identifier.clone(),
                    action_type: raw.action_type.clone(),
                    success: raw.success,
                    result_description: raw.result_description.clone(),
                    remediated_path: raw.remediated_path.clone().unwrap_or_default(),
                    remediated_process_pid: raw
                        .remediated_process_audit_token
                        .as_ref()
                        .map(|token| token.pid),
                })
            }
            EventKind::LwSessionLogin => {
                DomainEvent::LwSessionLogin(lw_session(&*payload!(msg, LwSessionLogin)))
            }
            EventKind::LwSessionUnlock => {
                DomainEvent::LwSessionUnlock(lw_session(&*payload!(msg, LwSessionUnlock)))
            }
            EventKind::OpensshLogin => {
                let raw = payload!(msg, OpensshLogin);
                DomainEvent::OpensshLogin(OpensshLoginEvent {
                    success: raw.success,
                    result_type: raw.result_type,
                    result_type_string: decode::openssh_result(raw.result_type),
                    source_address_type: raw.source_address_type,
                    source_address_type_string: decode::address_type(raw.source_address_type),
                    source_address: raw.source_address.clone(),
                    username: raw.username.clone(),
                    uid: raw.uid,
                })
            }
            EventKind::OpensshLogout => {
                let raw = payload!(msg, OpensshLogout);
                DomainEvent::OpensshLogout(OpensshLogoutEvent {
                    source_address_type: raw.source_address_type,
                    source_address_type_string: decode::address_type(raw.source_address_type),
                    source_address: raw.source_address.clone(),
                    username: raw.username.clone(),
                    uid: raw.uid,
                })
            }
            EventKind::LoginLogin => {
                let raw = payload!(msg, LoginLogin);
                DomainEvent::LoginLogin(LoginLoginEvent {
                    success: raw.success,
                    failure_message: raw.failure_message.clone(),
                    username: raw.username.clone(),
                    uid: raw.uid,
                })
            }
            EventKind::BtmLaunchItemAdd => DomainEvent::BtmLaunchItemAdd(
                self.launch_item_event(&*payload!(msg, BtmLaunchItemAdd), version),
            ),
            EventKind::BtmLaunchItemRemove => DomainEvent::BtmLaunchItemRemove(
                self.launch_item_event(&*payload!(msg, BtmLaunchItemRemove), version),
            ),
            EventKind::ProfileAdd => {
                let raw = payload!(msg, ProfileAdd);
                DomainEvent::ProfileAdd(ProfileAddEvent {
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    is_update: raw.is_update,
                    profile: Profile {
                        identifier: raw.profile.identifier.clone(),
                        uuid: raw.profile.uuid.clone(),
                        install_source: raw.profile.install_source,
                        install_source_string: decode::profile_source(raw.profile.install_source),
                        organization: raw.profile.organization.clone(),
                        display_name: raw.profile.display_name.clone(),
                        scope: raw.profile.scope.clone(),
                    },
                })
            }

            EventKind::AuthorizationPetition => {
                let raw = payload!(msg, AuthorizationPetition);
                DomainEvent::AuthorizationPetition(AuthorizationPetitionEvent {
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    petitioner: self.optional_process(raw.petitioner.as_ref(), version),
                    flags: raw.flags,
                    rights: raw.rights.clone(),
                })
            }
            EventKind::AuthorizationJudgement => {
                let raw = payload!(msg, AuthorizationJudgement);
                DomainEvent::AuthorizationJudgement(AuthorizationJudgementEvent {
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    petitioner: self.optional_process(raw.petitioner.as_ref(), version),
                    return_code: raw.return_code,
                    results: raw
                        .results
                        .iter()
                        .map(|result| AuthorizationResult {
                            right_name: result.right_name.clone(),
                            rule_class: result.rule_class,
                            rule_class_string: decode::authorization_rule_class(result.rule_class),
                            granted: result.granted,
                        })
                        .collect(),
                })
            }

            EventKind::OdGroupAdd => {
                DomainEvent::OdGroupAdd(self.od_group(&*payload!(msg, OdGroupAdd), version))
            }
            EventKind::OdGroupRemove => {
                DomainEvent::OdGroupRemove(self.od_group(&*payload!(msg, OdGroupRemove), version))
            }
            EventKind::OdModifyPassword => {
                let raw = payload!(msg, OdModifyPassword);
                DomainEvent::OdModifyPassword(OdModifyPasswordEvent {
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    error_code: raw.error_code,
                    error_code_human: decode::od_error(raw.error_code),
                    account_type: decode::od_account_type(raw.account_type),
                    account_name: raw.account_name.clone(),
                    node_name: raw.node_name.clone(),
                    db_path: raw.db_path.clone(),
                })
            }
            EventKind::OdAttributeValueAdd => {
                let raw = payload!(msg, OdAttributeValueAdd);
                DomainEvent::OdAttributeValueAdd(OdAttributeValueAddEvent {
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    error_code: raw.error_code,
                    error_code_human: decode::od_error(raw.error_code),
                    record_type: decode::od_record_type(raw.record_type),
                    record_name: raw.record_name.clone(),
                    attribute_name: raw.attribute_name.clone(),
                    attribute_value: raw.attribute_value.clone(),
                    node_name: raw.node_name.clone(),
                    db_path: raw.db_path.clone(),
                })
            }
            EventKind::OdCreateUser => {
                let raw = payload!(msg, OdCreateUser);
                DomainEvent::OdCreateUser(OdCreateUserEvent {
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    error_code: raw.error_code,
                    error_code_human: decode::od_error(raw.error_code),
                    user_name: raw.user_name.clone(),
                    node_name: raw.node_name.clone(),
                    db_path: raw.db_path.clone(),
                })
            }
            EventKind::OdCreateGroup => {
                let raw = payload!(msg, OdCreateGroup);
                DomainEvent::OdCreateGroup(OdCreateGroupEvent {
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    error_code: raw.error_code,
                    error_code_human: decode::od_error(raw.error_code),
                    group_name: raw.group_name.clone(),
                    node_name: raw.node_name.clone(),
                    db_path: raw.db_path.clone(),
                })
            }

            EventKind::XpcConnect => {
                let raw = payload!(msg, XpcConnect);
                DomainEvent::XpcConnect(XpcConnectEvent {
                    service_name: raw.service_name.clone(),
                    service_domain_type: raw.service_domain_type,
                    service_domain_type_string: decode::xpc_domain(raw.service_domain_type),
                })
            }
            EventKind::GatekeeperUserOverride => {
                let raw = payload!(msg, GatekeeperUserOverride);
                DomainEvent::GatekeeperUserOverride(GatekeeperUserOverrideEvent {
                    file_type: raw.file_type,
                    file_path: raw.file_path.clone(),
                    file: raw.file.as_ref().map(File::from),
                    sha256: raw.sha256.clone(),
                    signing_info: raw.signing_info.as_ref().map(|info| SigningInfo {
                        signing_id: info.signing_id.clone(),
                        team_id: info.team_id.clone(),
                        cdhash: info.cdhash.clone(),
                    }),
                })
            }
            EventKind::TccModify => {
                let raw = payload!(msg, TccModify);
                DomainEvent::TccModify(TccModifyEvent {
                    service: raw.service.clone(),
                    identity: raw.identity.clone(),
                    identity_type: raw.identity_type,
                    identity_type_string: decode::tcc_identity_type(raw.identity_type),
                    update_type: raw.update_type,
                    update_type_string: decode::tcc_update_type(raw.update_type),
                    instigator: self.optional_process(raw.instigator.as_ref(), version),
                    responsible: self.optional_process(raw.responsible.as_ref(), version),
                    right: raw.right,
                    right_string: decode::tcc_right(raw.right),
                    reason: raw.reason,
                    reason_string: decode::tcc_reason(raw.reason),
                })
            }

            EventKind::Unknown => {
                debug!("Unmapped event type {}", msg.event_type);
                DomainEvent::Unknown
            }
        }
    }

    /// Convert a process and classify its signing
    fn process(&self, raw: &RawProcess, version: u32) -> Process {
        let mut process = Process::from_raw(raw, version);
        let flags = process.codesigning_flags;
        // Platform and ad-hoc signatures are decided by flags alone
        let needs_chain = !process.is_platform_binary
            && flags & CS_ADHOC != CS_ADHOC
            && flags & CS_VALID == CS_VALID;
        let chain = match process.executable_path() {
            Some(path) if needs_chain && !path.is_empty() => {
                self.enrichment.certificate_chain(path)
            }
            _ => Vec::new(),
        };
        process.code_signing_type = code_signing_type(
            flags,
            process.is_platform_binary,
            process.executable_path(),
            &chain,
        );
        process
    }

    fn optional_process(&self, raw: Option<&RawProcess>, version: u32) -> Option<Process> {
        raw.map(|p| self.process(p, version))
    }

    fn exec(&self, raw: &RawExec, version: u32) -> ExecEvent {
        let enrichment = &self.enrichment;
        let mut target = Process::from_raw(&raw.target, version);

        let script = if version >= 2 { raw.script.as_ref().map(File::from) } else { None };
        let cwd = if version >= 3 { raw.cwd.as_ref().map(File::from) } else { None };

        let mut script_content = match &script {
            Some(script) if enrichment.script_content => enrichment.files.read_text(&script.path),
            _ => None,
        };

        let mut script_path = None;
        let interpreter = target.executable_name().is_some_and(is_interpreter);
        if let Some(cwd) = cwd.as_ref().filter(|_| interpreter && script_content.is_none()) {
            let resolved = resolve_script(&raw.args, &cwd.path, enrichment.files.as_ref());
            if let Some(resolved) = resolved {
                if enrichment.script_content {
                    script_content = enrichment.files.read_text(&resolved);
                }
                script_path = Some(resolved);
            }
        }
        if script_path.is_none() {
            script_path = script.as_ref().map(|s| s.path.clone());
        }

        let certificate_chain = match target.executable_path() {
            Some(path) if target.codesigning_flags & CS_VALID == CS_VALID => {
                enrichment.certificate_chain(path)
            }
            _ => Vec::new(),
        };
        target.code_signing_type = code_signing_type(
            target.codesigning_flags,
            target.is_platform_binary,
            target.executable_path(),
            &certificate_chain,
        );

        let file_quarantine_type = target
            .executable_path()
            .map(|path| enrichment.quarantine_awareness(path, target.signing_id.as_deref()));

        ExecEvent {
            command_line: command_line(&raw.args),
            args: raw.args.clone(),
            env: raw.env.clone(),
            script,
            cwd,
            last_fd: if version >= 4 { raw.last_fd } else { None },
            fds: if version >= 4 {
                raw.fds.iter().map(FileDescriptor::from).collect()
            } else {
                Vec::new()
            },
            image_cputype: if version >= 6 { raw.image_cputype } else { None },
            image_cpusubtype: if version >= 6 { raw.image_cpusubtype } else { None },
            dyld_exec_path: if version >= 7 {
                raw.dyld_exec_path.clone().filter(|p| !p.is_empty())
            } else {
                None
            },
            script_path,
            script_content,
            certificate_chain,
            file_quarantine_type,
            target,
        }
    }

    fn create(&self, raw: &RawCreate) -> CreateEvent {
        let existing_file = raw.existing_file.as_ref().map(File::from);
        let new_path = raw.new_path.as_ref().map(NewPath::from);
        let destination = destination_path(existing_file.as_ref(), new_path.as_ref());
        let is_quarantined = if destination.is_empty() {
            None
        } else {
            Some(self.enrichment.quarantine.quarantine_status(&destination))
        };

        CreateEvent {
            destination_path: destination,
            existing_file,
            new_path,
            is_quarantined,
        }
    }

    fn launch_item_event(&self, raw: &RawBtmLaunchItemEvent, version: u32) -> BtmLaunchItemEvent {
        BtmLaunchItemEvent {
            instigator: self.optional_process(raw.instigator.as_ref(), version),
            app: self.optional_process(raw.app.as_ref(), version),
            item: self.launch_item(&raw.item),
            executable_path: raw.executable_path.clone(),
        }
    }

    fn launch_item(&self, raw: &RawBtmLaunchItem) -> LaunchItem {
        let item_path = url_path(&raw.item_url);
        let app_path = raw.app_url.as_deref().map(url_path);

        let plist_contents = if raw.item_type == decode::BTM_ITEM_AGENT
            || raw.item_type == decode::BTM_ITEM_DAEMON
        {
            let plist_path = if raw.legacy {
                Some(item_path.clone())
            } else {
                app_path.as_ref().map(|app| {
                    Path::new(app)
                        .join(item_path.trim_start_matches('/'))
                        .to_string_lossy()
                        .into_owned()
                })
            };
            plist_path.and_then(|path| self.plist_contents(&path))
        } else {
            None
        };

        LaunchItem {
            item_type: raw.item_type,
            item_type_string: decode::btm_item_type(raw.item_type),
            legacy: raw.legacy,
            managed: raw.managed,
            uid: raw.uid,
            item_path,
            app_path,
            plist_contents,
        }
    }

    /// Text of a property list, rendering binary plists as XML
    fn plist_contents(&self, path: &str) -> Option<String> {
        let contents = self
            .enrichment
            .files
            .read_text(path)
            .or_else(|| self.enrichment.plists.xml_text(Path::new(path)));
        if contents.is_none() {
            debug!("No readable launch item plist at {}", path);
        }
        contents
    }

    fn od_group(&self, raw: &RawOdGroupMembership, version: u32) -> OdGroupMembershipEvent {
        OdGroupMembershipEvent {
            instigator: self.optional_process(raw.instigator.as_ref(), version),
            error_code: raw.error_code,
            error_code_human: decode::od_error(raw.error_code),
            group_name: raw.group_name.clone(),
            member: raw.member.as_ref().map(|m| m.member_value.clone()),
            member_type: raw.member.as_ref().map(|m| decode::od_member_type(m.member_type)),
            node_name: raw.node_name.clone(),
            db_path: raw.db_path.clone(),
        }
    }
}

fn destination_path(existing: Option<&File>, new_path: Option<&NewPath>) -> String {
    existing
        .map(|file| file.path.clone())
        .or_else(|| new_path.map(NewPath::joined))
        .unwrap_or_default()
}

fn file_target(raw: &RawFileTarget) -> FileTargetEvent {
    FileTargetEvent {
        target: File::from(&raw.target),
    }
}

fn extattr(raw: &RawExtattr) -> ExtattrEvent {
    ExtattrEvent {
        target: File::from(&raw.target),
        extattr: raw.extattr.clone(),
    }
}

fn lw_session(raw: &RawLwSession) -> LwSessionEvent {
    LwSessionEvent {
        username: raw.username.clone(),
        graphical_session_id: raw.graphical_session_id,
    }
}

/// File system path of a `file://` URL, percent-decoded, trailing slash dropped
fn url_path(url: &str) -> String {
    let path = url
        .strip_prefix("file://localhost")
        .or_else(|| url.strip_prefix("file://"))
        .unwrap_or(url);
    let decoded = percent_decode(path);
    match decoded.trim_end_matches('/') {
        "" if decoded.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FakeCertificates(Vec<X509Cert>);

    impl CertificateLookup for FakeCertificates {
        fn certificate_chain(&self, _path: &str) -> Vec<X509Cert> {
            self.0.clone()
        }
    }

    struct FakeQuarantine;

    impl QuarantineLookup for FakeQuarantine {
        fn quarantine_status(&self, path: &str) -> QuarantineStatus {
            if path.ends_with(".dmg") {
                QuarantineStatus::Quarantined
            } else {
                QuarantineStatus::NotQuarantined
            }
        }
    }

    fn classifier_with_certs(certs: Vec<X509Cert>) -> Classifier {
        Classifier::new(Enrichment::new(
            Arc::new(FakeCertificates(certs)),
            Arc::new(FakeQuarantine),
            Arc::new(FsProbe),
            Arc::new(NoLookup),
        ))
    }

    fn message(json: &str) -> RawMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_exec_enrichment() {
        let classifier = classifier_with_certs(vec![X509Cert {
            summary: "Developer ID Application: Example (ABCDE12345)".to_string(),
            thumbprint: None,
        }]);
        let msg = message(
            r#"{
                "event_type": 9,
                "version": 7,
                "process": {"executable": {"path": "/bin/zsh"}},
                "payload": {"exec": {
                    "target": {"codesigning_flags": 1, "executable": {"path": "/usr/local/bin/tool"}},
                    "args": ["tool", "--flag", "value"],
                    "last_fd": 3,
                    "image_cputype": 16777228,
                    "dyld_exec_path": ""
                }}
            }"#,
        );

        let classified = classifier.classify(&msg);
        assert_eq!(classified.kind, EventKind::Exec);
        assert_eq!(classified.context.as_deref(), Some("tool --flag value"));
        assert_eq!(classified.target_path.as_deref(), Some("/usr/local/bin/tool"));

        let DomainEvent::Exec(exec) = classified.event else {
            panic!("expected exec");
        };
        assert_eq!(exec.command_line, "tool --flag value");
        assert_eq!(exec.certificate_chain.len(), 1);
        assert_eq!(exec.target.code_signing_type, CodeSigningType::DeveloperId);
        assert_eq!(exec.last_fd, Some(3));
        assert_eq!(exec.image_cputype, Some(16777228));
        assert_eq!(exec.dyld_exec_path, None);
        assert_eq!(exec.file_quarantine_type, Some(QuarantineAwareness::Disabled));
    }

    #[test]
    fn test_fork_child_signing_uses_certificates() {
        let classifier = classifier_with_certs(vec![X509Cert {
            summary: "Developer ID Application: Example (ABCDE12345)".to_string(),
            thumbprint: None,
        }]);
        let msg = message(
            r#"{
                "event_type": 11,
                "version": 6,
                "process": {"is_platform_binary": true, "executable": {"path": "/sbin/launchd"}},
                "payload": {"fork": {
                    "child": {"codesigning_flags": 1, "executable": {"path": "/Applications/Tool.app/Contents/MacOS/Tool"}}
                }}
            }"#,
        );

        let classified = classifier.classify(&msg);
        assert_eq!(classified.process.code_signing_type, CodeSigningType::Platform);
        let DomainEvent::Fork(fork) = classified.event else {
            panic!("expected fork");
        };
        assert_eq!(fork.child.code_signing_type, CodeSigningType::DeveloperId);
    }

    struct CountingCertificates(std::sync::atomic::AtomicUsize);

    impl CertificateLookup for CountingCertificates {
        fn certificate_chain(&self, _path: &str) -> Vec<X509Cert> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            vec![X509Cert {
                summary: "Apple Mac OS Application Signing".to_string(),
                thumbprint: None,
            }]
        }
    }

    #[test]
    fn test_certificate_chain_looked_up_once_per_path() {
        let certificates = Arc::new(CountingCertificates(Default::default()));
        let none = Arc::new(NoLookup);
        let classifier = Classifier::new(Enrichment::new(
            certificates.clone(),
            none.clone(),
            none.clone(),
            none,
        ));
        let msg = message(
            r#"{
                "event_type": 13,
                "version": 6,
                "process": {"codesigning_flags": 1, "executable": {"path": "/Applications/Store.app/Contents/MacOS/Store"}}
            }"#,
        );

        for _ in 0..3 {
            let classified = classifier.classify(&msg);
            assert_eq!(classified.process.code_signing_type, CodeSigningType::AppStore);
        }
        assert_eq!(certificates.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(classifier.enrichment().certificate_cache().len(), 1);
    }

    #[test]
    fn test_exec_fields_gated_by_version() {
        let classifier = classifier_with_certs(Vec::new());
        let msg = message(
            r#"{
                "event_type": 9,
                "version": 1,
                "payload": {"exec": {
                    "script": {"path": "/tmp/x.sh"},
                    "cwd": {"path": "/tmp"},
                    "last_fd": 3,
                    "fds": [{"fd": 0, "fdtype": 1}]
                }}
            }"#,
        );
        let DomainEvent::Exec(exec) = classifier.translate(&msg) else {
            panic!("expected exec");
        };
        assert!(exec.script.is_none());
        assert!(exec.cwd.is_none());
        assert!(exec.last_fd.is_none());
        assert!(exec.fds.is_empty());
        assert!(exec.certificate_chain.is_empty());
    }

    #[test]
    fn test_interpreter_script_is_resolved_and_read() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("job.rb"), "puts 1\n").unwrap();
        let cwd = dir.path().to_string_lossy().into_owned();

        let classifier = classifier_with_certs(Vec::new());
        let msg = message(&format!(
            r#"{{
                "event_type": 9,
                "version": 3,
                "payload": {{"exec": {{
                    "target": {{"executable": {{"path": "/usr/bin/ruby"}}}},
                    "args": ["ruby", "-w", "job.rb"],
                    "cwd": {{"path": "{}"}}
                }}}}
            }}"#,
            cwd
        ));
        let DomainEvent::Exec(exec) = classifier.translate(&msg) else {
            panic!("expected exec");
        };
        assert!(exec.script_path.as_deref().is_some_and(|p| p.ends_with("job.rb")));
        assert_eq!(exec.script_content.as_deref(), Some("puts 1\n"));
    }

    #[test]
    fn test_create_destination_and_quarantine() {
        let classifier = classifier_with_certs(Vec::new());
        let msg = message(
            r#"{
                "event_type": 13,
                "payload": {"create": {"new_path": {"dir": {"path": "/Users/me/Downloads"}, "filename": "x.dmg"}}}
            }"#,
        );
        let classified = classifier.classify(&msg);
        assert_eq!(classified.context.as_deref(), Some("/Users/me/Downloads/x.dmg"));
        let DomainEvent::Create(create) = classified.event else {
            panic!("expected create");
        };
        assert_eq!(create.is_quarantined, Some(QuarantineStatus::Quarantined));
    }

    #[test]
    fn test_mismatched_payload_defaults() {
        let classifier = Classifier::new(Enrichment::disabled());
        let msg = message(r#"{"event_type": 21, "payload": {"exit": {"stat": 1}}}"#);
        let DomainEvent::Mprotect(mprotect) = classifier.translate(&msg) else {
            panic!("expected mprotect");
        };
        assert_eq!(mprotect.protection_flags, vec!["VM_PROT_NONE"]);
        assert_eq!(mprotect.hex_address, "0x0");
    }

    #[test]
    fn test_unmapped_code_is_unknown() {
        let classifier = Classifier::new(Enrichment::disabled());
        let classified = classifier.classify(&message(r#"{"event_type": 4242}"#));
        assert_eq!(classified.event, DomainEvent::Unknown);
        assert_eq!(classified.event_type(), "NOT_MAPPED");
        assert!(classified.context.is_none());
    }

    #[test]
    fn test_launch_agent_plist_contents() {
        let dir = TempDir::new().unwrap();
        let agents = dir.path().join("Contents/Library/LaunchAgents");
        fs::create_dir_all(&agents).unwrap();
        fs::write(agents.join("com.example.agent.plist"), "<plist></plist>\n").unwrap();

        let classifier = classifier_with_certs(Vec::new());
        let raw = RawBtmLaunchItem {
            item_type: decode::BTM_ITEM_AGENT,
            legacy: false,
            item_url: "Contents/Library/LaunchAgents/com.example.agent.plist".to_string(),
            app_url: Some(format!("file://{}/", dir.path().display())),
            ..Default::default()
        };
        let item = classifier.launch_item(&raw);
        assert_eq!(item.item_type_string, "ES_BTM_ITEM_TYPE_AGENT");
        assert_eq!(item.plist_contents.as_deref(), Some("<plist></plist>\n"));

        let login_item = RawBtmLaunchItem { item_type: 2, ..raw };
        assert!(classifier.launch_item(&login_item).plist_contents.is_none());
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("file:///Applications/My%20App.app/"), "/Applications/My App.app");
        assert_eq!(url_path("file:///"), "/");
        assert_eq!(url_path("relative/item.plist"), "relative/item.plist");
        assert_eq!(url_path("bad%zz"), "bad%zz");
    }
}
