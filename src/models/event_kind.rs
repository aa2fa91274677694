//! The closed set of notification kinds the pipeline understands
//!
//! Kind codes follow `es_event_type_t`. Any code outside the table folds to
//! [`EventKind::Unknown`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::constants::UNMAPPED_EVENT_NAME;
use crate::error::EsmError;

const NAME_PREFIX: &str = "ES_EVENT_TYPE_NOTIFY_";

macro_rules! event_kinds {
    ($( $variant:ident = $code:literal => $name:literal, default_on: $default:literal; )*) => {
        /// Discriminant of a raw notification
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $( $variant, )*
            /// Catch-all for kernel kinds outside the modelled set
            Unknown,
        }

        impl EventKind {
            /// Every modelled kind, in kernel code order
            pub const SUPPORTED: &'static [EventKind] = &[ $( EventKind::$variant, )* ];

            /// Map a raw kernel kind code, folding unrecognized codes to `Unknown`
            pub fn from_code(code: u32) -> Self {
                match code {
                    $( $code => EventKind::$variant, )*
                    _ => EventKind::Unknown,
                }
            }

            /// Raw kernel code, `None` for `Unknown`
            pub fn code(self) -> Option<u32> {
                match self {
                    $( EventKind::$variant => Some($code), )*
                    EventKind::Unknown => None,
                }
            }

            /// Canonical name, e.g. `ES_EVENT_TYPE_NOTIFY_EXEC`
            pub fn name(self) -> &'static str {
                match self {
                    $( EventKind::$variant => $name, )*
                    EventKind::Unknown => UNMAPPED_EVENT_NAME,
                }
            }

            fn default_on(self) -> bool {
                match self {
                    $( EventKind::$variant => $default, )*
                    EventKind::Unknown => false,
                }
            }
        }
    };
}

event_kinds! {
    Exec = 9 => "ES_EVENT_TYPE_NOTIFY_EXEC", default_on: true;
    Open = 10 => "ES_EVENT_TYPE_NOTIFY_OPEN", default_on: false;
    Fork = 11 => "ES_EVENT_TYPE_NOTIFY_FORK", default_on: true;
    Close = 12 => "ES_EVENT_TYPE_NOTIFY_CLOSE", default_on: false;
    Create = 13 => "ES_EVENT_TYPE_NOTIFY_CREATE", default_on: true;
    Exit = 15 => "ES_EVENT_TYPE_NOTIFY_EXIT", default_on: true;
    GetTask = 16 => "ES_EVENT_TYPE_NOTIFY_GET_TASK", default_on: false;
    Link = 19 => "ES_EVENT_TYPE_NOTIFY_LINK", default_on: true;
    Mmap = 20 => "ES_EVENT_TYPE_NOTIFY_MMAP", default_on: true;
    Mprotect = 21 => "ES_EVENT_TYPE_NOTIFY_MPROTECT", default_on: false;
    Mount = 22 => "ES_EVENT_TYPE_NOTIFY_MOUNT", default_on: true;
    IokitOpen = 24 => "ES_EVENT_TYPE_NOTIFY_IOKIT_OPEN", default_on: true;
    Rename = 25 => "ES_EVENT_TYPE_NOTIFY_RENAME", default_on: true;
    SetExtattr = 27 => "ES_EVENT_TYPE_NOTIFY_SETEXTATTR", default_on: false;
    SetMode = 29 => "ES_EVENT_TYPE_NOTIFY_SETMODE", default_on: true;
    Signal = 31 => "ES_EVENT_TYPE_NOTIFY_SIGNAL", default_on: false;
    Unlink = 32 => "ES_EVENT_TYPE_NOTIFY_UNLINK", default_on: false;
    Write = 33 => "ES_EVENT_TYPE_NOTIFY_WRITE", default_on: false;
    GetExtattr = 64 => "ES_EVENT_TYPE_NOTIFY_GETEXTATTR", default_on: false;
    ListExtattr = 66 => "ES_EVENT_TYPE_NOTIFY_LISTEXTATTR", default_on: false;
    DeleteExtattr = 70 => "ES_EVENT_TYPE_NOTIFY_DELETEEXTATTR", default_on: true;
    Dup = 73 => "ES_EVENT_TYPE_NOTIFY_DUP", default_on: false;
    UipcBind = 76 => "ES_EVENT_TYPE_NOTIFY_UIPC_BIND", default_on: true;
    UipcConnect = 78 => "ES_EVENT_TYPE_NOTIFY_UIPC_CONNECT", default_on: true;
    PtyGrant = 83 => "ES_EVENT_TYPE_NOTIFY_PTY_GRANT", default_on: true;
    ProcCheck = 86 => "ES_EVENT_TYPE_NOTIFY_PROC_CHECK", default_on: false;
    ProcSuspendResume = 93 => "ES_EVENT_TYPE_NOTIFY_PROC_SUSPEND_RESUME", default_on: false;
    CsInvalidated = 94 => "ES_EVENT_TYPE_NOTIFY_CS_INVALIDATED", default_on: true;
    Trace = 96 => "ES_EVENT_TYPE_NOTIFY_TRACE", default_on: true;
    RemoteThreadCreate = 97 => "ES_EVENT_TYPE_NOTIFY_REMOTE_THREAD_CREATE", default_on: true;
    XpMalwareDetected = 112 => "ES_EVENT_TYPE_NOTIFY_XP_MALWARE_DETECTED", default_on: true;
    XpMalwareRemediated = 113 => "ES_EVENT_TYPE_NOTIFY_XP_MALWARE_REMEDIATED", default_on: true;
    LwSessionLogin = 114 => "ES_EVENT_TYPE_NOTIFY_LW_SESSION_LOGIN", default_on: false;
    LwSessionUnlock = 117 => "ES_EVENT_TYPE_NOTIFY_LW_SESSION_UNLOCK", default_on: true;
    OpensshLogin = 120 => "ES_EVENT_TYPE_NOTIFY_OPENSSH_LOGIN", default_on: true;
    OpensshLogout = 121 => "ES_EVENT_TYPE_NOTIFY_OPENSSH_LOGOUT", default_on: false;
    LoginLogin = 122 => "ES_EVENT_TYPE_NOTIFY_LOGIN_LOGIN", default_on: true;
    BtmLaunchItemAdd = 124 => "ES_EVENT_TYPE_NOTIFY_BTM_LAUNCH_ITEM_ADD", default_on: true;
    BtmLaunchItemRemove = 125 => "ES_EVENT_TYPE_NOTIFY_BTM_LAUNCH_ITEM_REMOVE", default_on: true;
    ProfileAdd = 126 => "ES_EVENT_TYPE_NOTIFY_PROFILE_ADD", default_on: true;
    AuthorizationPetition = 129 => "ES_EVENT_TYPE_NOTIFY_AUTHORIZATION_PETITION", default_on: true;
    AuthorizationJudgement = 130 => "ES_EVENT_TYPE_NOTIFY_AUTHORIZATION_JUDGEMENT", default_on: true;
    OdGroupAdd = 132 => "ES_EVENT_TYPE_NOTIFY_OD_GROUP_ADD", default_on: true;
    OdGroupRemove = 133 => "ES_EVENT_TYPE_NOTIFY_OD_GROUP_REMOVE", default_on: false;
    OdModifyPassword = 135 => "ES_EVENT_TYPE_NOTIFY_OD_MODIFY_PASSWORD", default_on: true;
    OdAttributeValueAdd = 138 => "ES_EVENT_TYPE_NOTIFY_OD_ATTRIBUTE_VALUE_ADD", default_on: true;
    OdCreateUser = 141 => "ES_EVENT_TYPE_NOTIFY_OD_CREATE_USER", default_on: true;
    OdCreateGroup = 142 => "ES_EVENT_TYPE_NOTIFY_OD_CREATE_GROUP", default_on: true;
    XpcConnect = 145 => "ES_EVENT_TYPE_NOTIFY_XPC_CONNECT", default_on: true;
    GatekeeperUserOverride = 146 => "ES_EVENT_TYPE_NOTIFY_GATEKEEPER_USER_OVERRIDE", default_on: true;
    TccModify = 147 => "ES_EVENT_TYPE_NOTIFY_TCC_MODIFY", default_on: true;
}

impl EventKind {
    pub fn supported() -> Vec<EventKind> {
        Self::SUPPORTED.to_vec()
    }

    /// Kinds subscribed to when no explicit subscription list is configured
    pub fn default_subscriptions() -> Vec<EventKind> {
        Self::SUPPORTED
            .iter()
            .copied()
            .filter(|kind| kind.default_on())
            .collect()
    }

    /// Name without the `ES_EVENT_TYPE_NOTIFY_` prefix, e.g. `EXEC`
    pub fn short_name(self) -> &'static str {
        self.name().strip_prefix(NAME_PREFIX).unwrap_or(self.name())
    }

    /// Parse a kind name.
    ///
    /// Accepts the canonical name (`ES_EVENT_TYPE_NOTIFY_EXEC`), the
    /// `NOTIFY_EXEC` form and the bare short name in any case (`exec`).
    pub fn from_name(name: &str) -> Result<Self, EsmError> {
        let upper = name.trim().to_ascii_uppercase();
        let short = upper
            .strip_prefix(NAME_PREFIX)
            .or_else(|| upper.strip_prefix("NOTIFY_"))
            .unwrap_or(&upper);

        Self::SUPPORTED
            .iter()
            .copied()
            .find(|kind| kind.short_name() == short)
            .ok_or_else(|| EsmError::UnknownEventKind(name.to_string()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        if name == UNMAPPED_EVENT_NAME {
            return Ok(EventKind::Unknown);
        }
        EventKind::from_name(&name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_for_every_supported_kind() {
        for kind in EventKind::SUPPORTED {
            let code = kind.code().expect("supported kinds carry a code");
            assert_eq!(EventKind::from_code(code), *kind);
        }
    }

    #[test]
    fn test_unrecognized_codes_fold_to_unknown() {
        assert_eq!(EventKind::from_code(0), EventKind::Unknown);
        assert_eq!(EventKind::from_code(14), EventKind::Unknown); // EXCHANGEDATA
        assert_eq!(EventKind::from_code(9999), EventKind::Unknown);
        assert_eq!(EventKind::Unknown.code(), None);
    }

    #[test]
    fn test_name_parsing_variants() {
        assert_eq!(EventKind::from_name("ES_EVENT_TYPE_NOTIFY_EXEC").unwrap(), EventKind::Exec);
        assert_eq!(EventKind::from_name("NOTIFY_CREATE").unwrap(), EventKind::Create);
        assert_eq!(EventKind::from_name("mprotect").unwrap(), EventKind::Mprotect);
        assert_eq!(EventKind::from_name(" xpc_connect ").unwrap(), EventKind::XpcConnect);
        assert!(EventKind::from_name("ES_EVENT_TYPE_NOTIFY_EXCHANGEDATA").is_err());
        assert!(EventKind::from_name("").is_err());
    }

    #[test]
    fn test_supported_set_size_and_defaults() {
        assert_eq!(EventKind::SUPPORTED.len(), 51);
        let defaults = EventKind::default_subscriptions();
        assert!(defaults.contains(&EventKind::Exec));
        assert!(!defaults.contains(&EventKind::Open));
        assert!(!defaults.contains(&EventKind::Unknown));
    }

    #[test]
    fn test_serde_uses_canonical_name() {
        let json = serde_json::to_string(&EventKind::Rename).unwrap();
        assert_eq!(json, "\"ES_EVENT_TYPE_NOTIFY_RENAME\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::Rename);
        let unknown: EventKind = serde_json::from_str("\"NOT_MAPPED\"").unwrap();
        assert_eq!(unknown, EventKind::Unknown);
    }
}
