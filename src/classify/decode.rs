//! Human readable names for numeric payload fields
//!
//! Names carry their Endpoint Security prefix (`ES_MOUNT_DISPOSITION_...`)
//! so they can be shortened uniformly for summaries.

type Table = &'static [(i64, &'static str)];

fn lookup(table: Table, value: i64) -> Option<&'static str> {
    table
        .iter()
        .find(|(code, _)| *code == value)
        .map(|(_, name)| *name)
}

fn prefixed(prefix: &str, table: Table, value: i64) -> String {
    format!("{}{}", prefix, lookup(table, value).unwrap_or("UNKNOWN"))
}

/// Drop an Endpoint Security prefix from a decoded name
pub fn short(name: &str, prefix: &str) -> String {
    name.strip_prefix(prefix).unwrap_or(name).to_string()
}

const SIGNALS: Table = &[
    (1, "SIGHUP"),
    (2, "SIGINT"),
    (3, "SIGQUIT"),
    (4, "SIGILL"),
    (5, "SIGTRAP"),
    (6, "SIGABRT"),
    (7, "SIGEMT"),
    (8, "SIGFPE"),
    (9, "SIGKILL"),
    (10, "SIGBUS"),
    (11, "SIGSEGV"),
    (12, "SIGSYS"),
    (13, "SIGPIPE"),
    (14, "SIGALRM"),
    (15, "SIGTERM"),
    (16, "SIGURG"),
    (17, "SIGSTOP"),
    (18, "SIGTSTP"),
    (19, "SIGCONT"),
    (20, "SIGCHLD"),
    (21, "SIGTTIN"),
    (22, "SIGTTOU"),
    (23, "SIGIO"),
    (24, "SIGXCPU"),
    (25, "SIGXFSZ"),
    (26, "SIGVTALRM"),
    (27, "SIGPROF"),
    (28, "SIGWINCH"),
    (29, "SIGINFO"),
    (30, "SIGUSR1"),
    (31, "SIGUSR2"),
];

pub fn signal_name(sig: i32) -> String {
    lookup(SIGNALS, sig.into())
        .map(str::to_string)
        .unwrap_or_else(|| format!("SIG{}", sig))
}

pub const PROC_CHECK_PREFIX: &str = "ES_PROC_CHECK_TYPE_";
const PROC_CHECK_TYPES: Table = &[
    (0x0, "LISTPIDS"),
    (0x1, "PIDINFO"),
    (0x2, "PIDFDINFO"),
    (0x3, "KERNMSGBUF"),
    (0x4, "SETCONTROL"),
    (0x5, "PIDFILEPORTINFO"),
    (0x6, "TERMINATE"),
    (0x7, "DIRTYCONTROL"),
    (0x8, "PIDRUSAGE"),
    (0xe, "UDATA_INFO"),
];

pub fn proc_check_type(value: u32) -> String {
    prefixed(PROC_CHECK_PREFIX, PROC_CHECK_TYPES, value.into())
}

pub const SUSPEND_RESUME_PREFIX: &str = "ES_PROC_SUSPEND_RESUME_TYPE_";
const SUSPEND_RESUME_TYPES: Table = &[(0, "SUSPEND"), (1, "RESUME"), (3, "SHUTDOWN_SOCKETS")];

pub fn suspend_resume_type(value: u32) -> String {
    prefixed(SUSPEND_RESUME_PREFIX, SUSPEND_RESUME_TYPES, value.into())
}

pub const GET_TASK_PREFIX: &str = "ES_GET_TASK_TYPE_";
const GET_TASK_TYPES: Table = &[(0, "TASK_FOR_PID"), (1, "EXPOSE_TASK"), (2, "IDENTITY_TOKEN")];

pub fn get_task_type(value: u32) -> String {
    prefixed(GET_TASK_PREFIX, GET_TASK_TYPES, value.into())
}

pub const MOUNT_DISPOSITION_PREFIX: &str = "ES_MOUNT_DISPOSITION_";
const MOUNT_DISPOSITIONS: Table = &[
    (0, "EXTERNAL"),
    (1, "INTERNAL"),
    (2, "NETWORK"),
    (3, "VIRTUAL"),
    (4, "NULLFS"),
    (5, "UNKNOWN"),
];

pub fn mount_disposition(value: i32) -> String {
    prefixed(MOUNT_DISPOSITION_PREFIX, MOUNT_DISPOSITIONS, value.into())
}

pub const BTM_ITEM_PREFIX: &str = "ES_BTM_ITEM_TYPE_";
pub const BTM_ITEM_AGENT: i32 = 3;
pub const BTM_ITEM_DAEMON: i32 = 4;
const BTM_ITEM_TYPES: Table = &[
    (0, "USER_ITEM"),
    (1, "APP"),
    (2, "LOGIN_ITEM"),
    (3, "AGENT"),
    (4, "DAEMON"),
];

pub fn btm_item_type(value: i32) -> String {
    prefixed(BTM_ITEM_PREFIX, BTM_ITEM_TYPES, value.into())
}

pub const TCC_REASON_PREFIX: &str = "ES_TCC_AUTHORIZATION_REASON_";
const TCC_REASONS: Table = &[
    (0, "NONE"),
    (1, "ERROR"),
    (2, "USER_CONSENT"),
    (3, "USER_SET"),
    (4, "SYSTEM_SET"),
    (5, "SERVICE_POLICY"),
    (6, "MDM_POLICY"),
    (7, "SERVICE_OVERRIDE_POLICY"),
    (8, "MISSING_USAGE_STRING"),
    (9, "PROMPT_TIMEOUT"),
    (10, "PREFLIGHT_UNKNOWN"),
    (11, "ENTITLED"),
    (12, "APP_TYPE_POLICY"),
    (13, "PROMPT_CANCEL"),
];

pub fn tcc_reason(value: i32) -> String {
    prefixed(TCC_REASON_PREFIX, TCC_REASONS, value.into())
}

const TCC_RIGHTS: Table = &[
    (0, "DENIED"),
    (1, "UNKNOWN"),
    (2, "ALLOWED"),
    (3, "LIMITED"),
    (4, "ADD_MODIFY_ADDED"),
    (5, "SESSION_PID"),
    (6, "LEARN_MORE"),
];

pub fn tcc_right(value: i32) -> String {
    prefixed("ES_TCC_AUTHORIZATION_RIGHT_", TCC_RIGHTS, value.into())
}

const TCC_IDENTITY_TYPES: Table = &[
    (0, "BUNDLE_ID"),
    (1, "EXECUTABLE_PATH"),
    (2, "POLICY_ID"),
    (3, "FILE_PROVIDER_DOMAIN_ID"),
];

pub fn tcc_identity_type(value: i32) -> String {
    prefixed("ES_TCC_IDENTITY_TYPE_", TCC_IDENTITY_TYPES, value.into())
}

const TCC_EVENT_TYPES: Table = &[(0, "UNKNOWN"), (1, "CREATE"), (2, "MODIFY"), (3, "DELETE")];

pub fn tcc_update_type(value: i32) -> String {
    prefixed("ES_TCC_EVENT_TYPE_", TCC_EVENT_TYPES, value.into())
}

const XPC_DOMAINS: Table = &[
    (1, "SYSTEM"),
    (2, "USER"),
    (3, "USER_LOGIN"),
    (4, "SESSION"),
    (5, "PID"),
    (6, "MANAGER"),
    (7, "PORT"),
    (8, "GUI"),
];

pub fn xpc_domain(value: i32) -> String {
    prefixed("ES_XPC_DOMAIN_TYPE_", XPC_DOMAINS, value.into())
}

const SOCKET_DOMAINS: Table = &[(1, "AF_UNIX"), (2, "AF_INET"), (30, "AF_INET6")];

pub fn socket_domain(value: i32) -> String {
    lookup(SOCKET_DOMAINS, value.into())
        .map(str::to_string)
        .unwrap_or_else(|| format!("AF_{}", value))
}

const SOCKET_TYPES: Table = &[
    (1, "SOCK_STREAM"),
    (2, "SOCK_DGRAM"),
    (3, "SOCK_RAW"),
    (4, "SOCK_RDM"),
    (5, "SOCK_SEQPACKET"),
];

pub fn socket_type(value: i32) -> String {
    lookup(SOCKET_TYPES, value.into())
        .map(str::to_string)
        .unwrap_or_else(|| format!("SOCK_{}", value))
}

const SOCKET_PROTOCOLS: Table = &[
    (0, "IPPROTO_IP"),
    (1, "IPPROTO_ICMP"),
    (6, "IPPROTO_TCP"),
    (17, "IPPROTO_UDP"),
    (58, "IPPROTO_ICMPV6"),
];

pub fn socket_protocol(value: i32) -> String {
    lookup(SOCKET_PROTOCOLS, value.into())
        .map(str::to_string)
        .unwrap_or_else(|| format!("IPPROTO_{}", value))
}

const AUTH_RULE_CLASSES: Table = &[
    (0, "USER"),
    (1, "RULE"),
    (2, "MECHANISM"),
    (3, "ALLOW"),
    (4, "DENY"),
    (5, "UNKNOWN"),
    (6, "INVALID"),
];

pub fn authorization_rule_class(value: i32) -> String {
    prefixed("ES_AUTHORIZATION_RULE_CLASS_", AUTH_RULE_CLASSES, value.into())
}

const OD_ERRORS: Table = &[
    (0, "Success"),
    (1000, "SessionLocalOnlyDaemonInUse"),
    (1001, "SessionNormalDaemonInUse"),
    (1002, "SessionDaemonNotRunning"),
    (1003, "SessionDaemonRefused"),
    (2000, "NodeUnknownName"),
    (2001, "NodeUnknownType"),
    (2002, "NodeDisabled"),
    (2100, "NodeConnectionFailed"),
    (2200, "NodeUnknownHost"),
    (3000, "QuerySynchronize"),
    (3102, "QueryTimeout"),
    (4000, "RecordReadOnlyNode"),
    (4001, "RecordPermissionError"),
    (4100, "RecordParameterError"),
    (4101, "RecordInvalidType"),
    (4102, "RecordAlreadyExists"),
    (4103, "RecordTypeDisabled"),
    (4104, "RecordNoLongerExists"),
    (4200, "RecordAttributeUnknownType"),
    (4201, "RecordAttributeNotFound"),
    (4202, "RecordAttributeValueSchemaError"),
    (4203, "RecordAttributeValueNotFound"),
    (5000, "CredentialsInvalid"),
    (5100, "CredentialsMethodNotSupported"),
    (5101, "CredentialsNotAuthorized"),
    (5102, "CredentialsParameterError"),
    (5103, "CredentialsOperationFailed"),
    (5200, "CredentialsServerUnreachable"),
    (5201, "CredentialsServerNotFound"),
    (5202, "CredentialsServerError"),
    (5203, "CredentialsServerTimeout"),
    (5300, "CredentialsAccountNotFound"),
    (5301, "CredentialsAccountDisabled"),
    (5302, "CredentialsAccountExpired"),
    (5303, "CredentialsAccountInactive"),
    (5400, "CredentialsPasswordExpired"),
    (5401, "CredentialsPasswordChangeRequired"),
    (5402, "CredentialsPasswordQualityFailed"),
    (5403, "CredentialsPasswordTooShort"),
    (5404, "CredentialsPasswordTooLong"),
    (5407, "CredentialsPasswordChangeTooSoon"),
    (10000, "PluginOperationNotSupported"),
    (10001, "PluginError"),
    (10002, "DaemonError"),
    (10003, "PluginOperationTimeout"),
];

pub fn od_error(code: i32) -> String {
    lookup(OD_ERRORS, code.into())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Error {}", code))
}

const OD_MEMBER_TYPES: Table = &[(0, "USER_NAME"), (1, "USER_UUID"), (2, "GROUP_UUID")];

pub fn od_member_type(value: i32) -> String {
    prefixed("ES_OD_MEMBER_TYPE_", OD_MEMBER_TYPES, value.into())
}

const OD_ACCOUNT_TYPES: Table = &[(0, "USER"), (1, "COMPUTER")];

pub fn od_account_type(value: i32) -> String {
    prefixed("ES_OD_ACCOUNT_TYPE_", OD_ACCOUNT_TYPES, value.into())
}

const OD_RECORD_TYPES: Table = &[(0, "USER"), (1, "GROUP")];

pub fn od_record_type(value: i32) -> String {
    prefixed("ES_OD_RECORD_TYPE_", OD_RECORD_TYPES, value.into())
}

const OPENSSH_RESULTS: Table = &[
    (0, "LOGIN_EXCEED_MAXTRIES"),
    (1, "LOGIN_ROOT_DENIED"),
    (2, "AUTH_SUCCESS"),
    (3, "AUTH_FAIL_NONE"),
    (4, "AUTH_FAIL_PASSWD"),
    (5, "AUTH_FAIL_KBDINT"),
    (6, "AUTH_FAIL_PUBKEY"),
    (7, "AUTH_FAIL_HOSTBASED"),
    (8, "AUTH_FAIL_GSSAPI"),
    (9, "INVALID_USER"),
];

pub fn openssh_result(value: i32) -> String {
    prefixed("ES_OPENSSH_", OPENSSH_RESULTS, value.into())
}

const ADDRESS_TYPES: Table = &[(0, "NONE"), (1, "IPV4"), (2, "IPV6"), (3, "NAMED_SOCKET")];

pub fn address_type(value: i32) -> String {
    prefixed("ES_ADDRESS_TYPE_", ADDRESS_TYPES, value.into())
}

const PROFILE_SOURCES: Table = &[(0, "MANAGED"), (1, "INSTALL")];

pub fn profile_source(value: i32) -> String {
    prefixed("ES_PROFILE_SOURCE_", PROFILE_SOURCES, value.into())
}

const OPEN_FLAGS: &[(i32, &str)] = &[
    (0x0000_0001, "FREAD"),
    (0x0000_0002, "FWRITE"),
    (0x0000_0004, "O_NONBLOCK"),
    (0x0000_0008, "O_APPEND"),
    (0x0000_0010, "O_SHLOCK"),
    (0x0000_0020, "O_EXLOCK"),
    (0x0000_0040, "O_ASYNC"),
    (0x0000_0080, "O_FSYNC"),
    (0x0000_0100, "O_NOFOLLOW"),
    (0x0000_0200, "O_CREAT"),
    (0x0000_0400, "O_TRUNC"),
    (0x0000_0800, "O_EXCL"),
    (0x0000_8000, "O_EVTONLY"),
    (0x0002_0000, "O_NOCTTY"),
    (0x0010_0000, "O_DIRECTORY"),
    (0x0020_0000, "O_SYMLINK"),
    (0x0100_0000, "O_CLOEXEC"),
];

/// Kernel `fflag` bits of an open, in bit order
pub fn open_flags(fflag: i32) -> Vec<String> {
    OPEN_FLAGS
        .iter()
        .filter(|(bit, _)| fflag & bit != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// `0755` style rendering of permission bits
pub fn octal_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_codes() {
        assert_eq!(signal_name(9), "SIGKILL");
        assert_eq!(signal_name(64), "SIG64");
        assert_eq!(mount_disposition(2), "ES_MOUNT_DISPOSITION_NETWORK");
        assert_eq!(mount_disposition(42), "ES_MOUNT_DISPOSITION_UNKNOWN");
        assert_eq!(od_error(4102), "RecordAlreadyExists");
        assert_eq!(od_error(7), "Error 7");
        assert_eq!(short(&tcc_reason(2), TCC_REASON_PREFIX), "USER_CONSENT");
    }

    #[test]
    fn test_open_flags_and_mode() {
        assert_eq!(open_flags(0x1 | 0x2 | 0x200), vec!["FREAD", "FWRITE", "O_CREAT"]);
        assert!(open_flags(0).is_empty());
        assert_eq!(octal_mode(0o100755), "0755");
    }
}
