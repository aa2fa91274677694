//! Indexing summaries of domain events
//!
//! Every classified event carries a `(context, target_path)` pair next to its
//! kind name. The context is a short human line used for search and display;
//! the target path is the affected object, `None` when the kind has none and
//! `Some("")` when the kind has one whose path is empty.

use crate::constants::EXEC_CONTEXT_CHARS;
use crate::models::{file_name, DomainEvent, Process};

use super::decode::{self, GET_TASK_PREFIX, MOUNT_DISPOSITION_PREFIX, SUSPEND_RESUME_PREFIX, TCC_REASON_PREFIX};
use super::memory::protection_summary;

/// Context line and affected path of one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub context: Option<String>,
    pub target_path: Option<String>,
}

impl Summary {
    fn new(context: impl Into<String>, target_path: Option<String>) -> Self {
        Summary {
            context: Some(context.into()),
            target_path,
        }
    }

    /// Same string for both context and target
    fn path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(path.clone(), Some(path))
    }

    fn context_only(context: impl Into<String>) -> Self {
        Self::new(context, None)
    }
}

fn exe_path(process: Option<&Process>) -> String {
    process
        .and_then(Process::executable_path)
        .unwrap_or_default()
        .to_string()
}

fn exe_name(process: Option<&Process>) -> String {
    process
        .and_then(Process::executable_name)
        .unwrap_or_default()
        .to_string()
}

/// Summarize `event` caused by `process`
pub fn summarize(event: &DomainEvent, process: &Process) -> Summary {
    let initiator_path = exe_path(Some(process));

    match event {
        DomainEvent::Exec(exec) => {
            let context: String = exec.command_line.chars().take(EXEC_CONTEXT_CHARS).collect();
            Summary::new(context, exec.target.executable_path().map(str::to_string))
        }
        DomainEvent::Fork(fork) => Summary::new(
            exe_name(Some(&fork.child)),
            fork.child.executable_path().map(str::to_string),
        ),
        DomainEvent::Exit(_) => Summary::new(exe_name(Some(process)), Some(initiator_path)),
        DomainEvent::Signal(signal) => {
            let target = exe_path(Some(&signal.target));
            Summary::new(format!("[{}] {}", signal.signal_name, target), Some(target))
        }
        DomainEvent::ProcSuspendResume(suspend) => {
            let target = suspend.target.as_ref();
            Summary::new(
                format!(
                    "[{}] {}",
                    decode::short(&suspend.type_string, SUSPEND_RESUME_PREFIX),
                    exe_name(target)
                ),
                Some(exe_path(target)),
            )
        }
        DomainEvent::ProcCheck(check) => {
            let target = exe_path(check.target.as_ref());
            Summary::new(format!("[{}] {}", check.type_string, target), Some(target))
        }
        DomainEvent::RemoteThreadCreate(remote) => {
            let target = remote
                .target
                .executable_path()
                .unwrap_or("Unknown")
                .to_string();
            let context = match &remote.thread_state {
                Some(state) => format!("[flavor {}, {} bytes] {}", state.flavor, state.state_size, target),
                None => target.clone(),
            };
            Summary::new(context, Some(target))
        }
        DomainEvent::Trace(trace) => Summary::new(
            trace.target.executable_name().unwrap_or("Unknown"),
            Some(trace.target.executable_path().unwrap_or("Unknown").to_string()),
        ),
        DomainEvent::GetTask(task) => match task.target.executable_path() {
            Some(path) => {
                let context = match &task.type_string {
                    Some(type_string) => {
                        format!("[{}] {}", decode::short(type_string, GET_TASK_PREFIX), path)
                    }
                    None => path.to_string(),
                };
                Summary::new(context, Some(path.to_string()))
            }
            None => Summary::context_only(""),
        },
        DomainEvent::CsInvalidated(_) => Summary::context_only(initiator_path),

        DomainEvent::Mmap(mmap) => Summary::path(mmap.source.path.clone()),
        DomainEvent::Mprotect(mprotect) => Summary::context_only(format!(
            "({})({} kb) → {}",
            protection_summary(&mprotect.protection_flags),
            mprotect.kb_size,
            initiator_path
        )),

        DomainEvent::Create(create) => Summary::path(create.destination_path.clone()),
        DomainEvent::Rename(rename) => {
            let destination_name = file_name(&rename.destination_path);
            Summary::new(
                format!("{} → {}", rename.source.name, destination_name),
                Some(rename.destination_path.clone()),
            )
        }
        DomainEvent::Open(open) => Summary::path(open.file.path.clone()),
        DomainEvent::Close(close) => Summary::path(close.target.path.clone()),
        DomainEvent::Write(target) | DomainEvent::Dup(target) | DomainEvent::ListExtattr(target) => {
            Summary::path(target.target.path.clone())
        }
        DomainEvent::Unlink(unlink) => Summary::path(unlink.target.path.clone()),
        DomainEvent::Link(link) => Summary::path(crate::models::join_path(
            &link.target_dir.path,
            &link.target_filename,
        )),
        DomainEvent::SetExtattr(attr) | DomainEvent::GetExtattr(attr) | DomainEvent::DeleteExtattr(attr) => {
            Summary::new(
                format!("[{}] {}", attr.extattr, attr.target.path),
                Some(attr.target.path.clone()),
            )
        }
        DomainEvent::SetMode(set_mode) => Summary::new(
            format!("({}) → {}", set_mode.mode_string, set_mode.target.path),
            Some(set_mode.target.path.clone()),
        ),
        DomainEvent::Mount(mount) => {
            let mount_point = mount.statfs.f_mntonname.clone();
            let disposition = mount
                .disposition_string
                .as_deref()
                .map(|d| decode::short(d, MOUNT_DISPOSITION_PREFIX))
                .unwrap_or_default();
            Summary::new(format!("[{}] {}", disposition, mount_point), Some(mount_point))
        }

        DomainEvent::PtyGrant(pty) => Summary::new(
            format!("({}) → {}", pty.dev, initiator_path),
            Some(initiator_path),
        ),
        DomainEvent::IokitOpen(iokit) => Summary::context_only(iokit.user_client_class.clone()),
        DomainEvent::UipcConnect(connect) => {
            let metadata = if connect.protocol != 0 {
                format!(
                    "{}, {}, {}",
                    connect.protocol_string, connect.type_string, connect.domain_string
                )
            } else {
                format!("[{}]", connect.type_string)
            };
            Summary::new(
                format!("{} → {}", metadata, connect.file.path),
                Some(connect.file.path.clone()),
            )
        }
        DomainEvent::UipcBind(bind) => {
            Summary::path(crate::models::join_path(&bind.dir.path, &bind.filename))
        }

        DomainEvent::XpMalwareDetected(detected) => Summary::path(detected.detected_path.clone()),
        DomainEvent::XpMalwareRemediated(remediated) => {
            Summary::path(remediated.remediated_path.clone())
        }
        DomainEvent::LwSessionLogin(session) | DomainEvent::LwSessionUnlock(session) => {
            Summary::context_only(session.username.clone())
        }
        DomainEvent::LoginLogin(login) => Summary::context_only(login.username.clone()),
        DomainEvent::OpensshLogin(login) => Summary::context_only(format!(
            "[{}] {} → {}",
            if login.success { "Success" } else { "Fail" },
            login.source_address,
            login.username
        )),
        DomainEvent::OpensshLogout(logout) => Summary::context_only(logout.source_address.clone()),
        DomainEvent::BtmLaunchItemAdd(btm) | DomainEvent::BtmLaunchItemRemove(btm) => {
            Summary::context_only(btm.item.item_path.clone())
        }
        DomainEvent::ProfileAdd(profile) => Summary::context_only(profile.profile.summary()),

        DomainEvent::AuthorizationJudgement(judgement) => {
            let results = judgement
                .results
                .iter()
                .map(|result| result.description())
                .collect::<Vec<_>>()
                .join("|");
            Summary::new(
                format!(
                    "{}: {} → {}",
                    results,
                    exe_name(judgement.petitioner.as_ref()),
                    exe_name(judgement.instigator.as_ref())
                ),
                Some(exe_path(judgement.instigator.as_ref())),
            )
        }
        DomainEvent::AuthorizationPetition(petition) => Summary::new(
            format!(
                "[{}] {} → {}",
                petition.rights.join(","),
                exe_name(petition.petitioner.as_ref()),
                exe_name(petition.instigator.as_ref())
            ),
            Some(exe_path(petition.petitioner.as_ref())),
        ),

        DomainEvent::OdCreateUser(od) => Summary::context_only(format!(
            "[{}] {} in {}",
            od.error_code_human, od.user_name, od.node_name
        )),
        DomainEvent::OdModifyPassword(od) => Summary::context_only(format!(
            "[{}] {} in {}",
            od.error_code_human, od.account_name, od.node_name
        )),
        DomainEvent::OdGroupAdd(od) => Summary::context_only(format!(
            "[{}] Added {} to {} in {}",
            od.error_code_human,
            od.member.as_deref().unwrap_or_default(),
            od.group_name,
            od.node_name
        )),
        DomainEvent::OdGroupRemove(od) => Summary::context_only(format!(
            "[{}] Removed {} from {} in {}",
            od.error_code_human,
            od.member.as_deref().unwrap_or_default(),
            od.group_name,
            od.node_name
        )),
        DomainEvent::OdCreateGroup(od) => Summary::context_only(format!(
            "[{}] {} in {}",
            od.error_code_human, od.group_name, od.node_name
        )),
        DomainEvent::OdAttributeValueAdd(od) => Summary::context_only(format!(
            "[{}] {} → {} in {}",
            od.error_code_human, od.attribute_name, od.attribute_value, od.node_name
        )),

        DomainEvent::XpcConnect(xpc) => Summary::context_only(format!(
            "{} → {} in {}",
            file_name(&initiator_path),
            xpc.service_name,
            xpc.service_domain_type_string
        )),
        DomainEvent::TccModify(tcc) => Summary::context_only(format!(
            "[{}] {} → {}",
            decode::short(&tcc.reason_string, TCC_REASON_PREFIX),
            tcc.service,
            tcc.identity
        )),
        DomainEvent::GatekeeperUserOverride(gatekeeper) => Summary::path(gatekeeper.override_path()),

        DomainEvent::Unknown => Summary::default(),
    }
}
