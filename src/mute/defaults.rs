//! Built-in mute rules silencing noisy first-party daemons

use std::path::Path;

use super::{MuteMode, MuteRule, RuleScope};
use crate::models::EventKind;

const METADATA_FRAMEWORK: &str =
    "/System/Library/Frameworks/CoreServices.framework/Versions/A/Frameworks/Metadata.framework";
const MDWORKER_SHARED: &str = "/System/Library/Frameworks/CoreServices.framework/Versions/A/Frameworks/Metadata.framework/Versions/A/Support/mdworker_shared";
const MTL_COMPILER_SERVICE: &str = "/System/Library/Frameworks/Metal.framework/Versions/A/XPCServices/MTLCompilerService.xpc/Contents/MacOS/MTLCompilerService";
const BIOME_AGENT: &str =
    "/System/Library/PrivateFrameworks/BiomeStreams.framework/Support/BiomeAgent";
const BOOT_KERNEL_COLLECTION: &str =
    "/private/var/db/KernelExtensionManagement/KernelCollections/BootKernelCollection.kc";
const STREAMING_EXTRACTOR: &str =
    "/System/Library/PrivateFrameworks/StreamingExtractor.framework";

/// Processes whose memory mapping activity is pure noise
const MEMORY_NOISE: &[&str] = &[
    "/usr/bin/tailspin",
    "/usr/libexec/spindump",
    BOOT_KERNEL_COLLECTION,
    MDWORKER_SHARED,
    MTL_COMPILER_SERVICE,
    "/usr/libexec/knowledge-agent",
    "/usr/libexec/locationd",
    BIOME_AGENT,
    "/usr/libexec/xpcproxy",
    "/usr/libexec/opendirectoryd",
    "/System/Library/Frameworks/CoreSpotlight.framework/spotlightknowledged",
    "/usr/libexec/mobileassetd",
];

type EventRuleGroup = (EventKind, MuteMode, &'static [&'static str]);

const EVENT_RULES: &[EventRuleGroup] = &[
    (
        EventKind::Create,
        MuteMode::Literal,
        &[
            "/usr/sbin/cfprefsd",
            "/usr/libexec/logd",
            "/System/Library/PrivateFrameworks/PackageKit.framework/Versions/A/Resources/system_installd",
            "/System/Library/Frameworks/AddressBook.framework/Versions/A/Helpers/AddressBookManager.app/Contents/MacOS/AddressBookManager",
            "/usr/libexec/mobileassetd",
        ],
    ),
    (
        EventKind::Close,
        MuteMode::Literal,
        &[
            "/usr/libexec/runningboardd",
            "/usr/libexec/biomesyncd",
            MTL_COMPILER_SERVICE,
            "/usr/libexec/containermanagerd",
        ],
    ),
    (
        EventKind::Create,
        MuteMode::TargetPrefix,
        &["/System/Library/PrivateFrameworks/BiomeStreams.framework"],
    ),
    (
        EventKind::Rename,
        MuteMode::Literal,
        &["/usr/sbin/cfprefsd", "/usr/libexec/logd", "/usr/libexec/mobileassetd"],
    ),
    (
        EventKind::Open,
        MuteMode::Prefix,
        &[
            "/usr/libexec/xpcproxy",
            "/usr/sbin/cfprefsd",
            "/Library/SystemExtensions/",
            "/System/Library/CoreServices/Spotlight.app",
            METADATA_FRAMEWORK,
            "/System/Library/PrivateFrameworks/SkyLight.framework",
            "/System/Library/PrivateFrameworks/AXAssetLoader.framework",
            "/System/Library/Frameworks/AudioToolbox.framework",
            "/System/Library/PrivateFrameworks/SiriTTSService.framework",
            "/System/Library/PrivateFrameworks/TCC.framework",
        ],
    ),
    (
        EventKind::Write,
        MuteMode::Prefix,
        &[
            "/Library/SystemExtensions/",
            "/usr/libexec/lsd",
            "/usr/sbin/cfprefsd",
            "/System/Library/CoreServices/Spotlight.app",
            METADATA_FRAMEWORK,
            "/usr/sbin/systemstats",
        ],
    ),
    (
        EventKind::Close,
        MuteMode::Prefix,
        &[
            "/Library/SystemExtensions/",
            "/usr/libexec/lsd",
            "/usr/sbin/cfprefsd",
            "/usr/libexec/xpcproxy",
            "/System/Library/CoreServices/Spotlight.app",
            METADATA_FRAMEWORK,
            "/System/Library/PrivateFrameworks/AXAssetLoader.framework",
            "/System/Library/PrivateFrameworks/SiriTTSService.framework",
            "/System/Library/CoreServices/NotificationCenter.app",
            "/usr/sbin/systemstats",
            "/System/Library/PrivateFrameworks/TCC.framework",
            "/usr/libexec/mobileassetd",
            "/System/Library/PrivateFrameworks/SkyLight.framework",
            "/System/Library/Frameworks/AudioToolbox.framework",
            "/System/Library/PrivateFrameworks/BiomeStreams.framework",
            "/System/Library/CoreServices/ManagedClient.app",
            "/System/Library/Frameworks/Contacts.framework",
            "/System/Library/Frameworks/VideoToolbox.framework",
            "/System/Library/PrivateFrameworks/CoreDuetContext.framework",
            "/System/Library/CoreServices/diagnostics_agent",
        ],
    ),
    (EventKind::Mmap, MuteMode::Literal, MEMORY_NOISE),
    (EventKind::Mprotect, MuteMode::Literal, MEMORY_NOISE),
    (
        EventKind::Mmap,
        MuteMode::TargetPrefix,
        &[
            "/Library/Caches/",
            "/private/var/db/",
            "/System/Volumes/Preboot/Cryptexes/OS/System/Library/dyld/",
            METADATA_FRAMEWORK,
        ],
    ),
    (EventKind::Dup, MuteMode::TargetLiteral, &["/dev/null", "/dev/console"]),
    (
        EventKind::Dup,
        MuteMode::Prefix,
        &[METADATA_FRAMEWORK, "/System/Library/PrivateFrameworks/BiomeStreams.framework"],
    ),
    (
        EventKind::Dup,
        MuteMode::Literal,
        &["/usr/libexec/xpcproxy", "/usr/sbin/cfprefsd"],
    ),
    (
        EventKind::ProcCheck,
        MuteMode::Prefix,
        &[
            "/usr/libexec/sysmond",
            "/Applications/Xcode.app",
            "/usr/sbin/systemstats",
            "/System/Library/PrivateFrameworks/CoreDuetContext.framework",
            "/System/Library/PrivateFrameworks/CoreAnalytics.framework",
            "/usr/sbin/mDNSResponder",
            "/usr/libexec/trustd",
            METADATA_FRAMEWORK,
            "/usr/sbin/distnoted",
            "/usr/libexec/mobileassetd",
            "/System/Library/PrivateFrameworks/SiriTTSService.framework",
            "/usr/sbin/cfprefsd",
            "/usr/libexec/xpcproxy",
            "/System/Library/PrivateFrameworks/DataAccess.framework",
            "/System/Library/Frameworks/Contacts.framework",
            "/System/Library/Frameworks/Accounts.framework",
            "/System/Library/PrivateFrameworks/CalendarDaemon.framework",
            "/System/Library/Frameworks/ApplicationServices.framework/Versions/A/Frameworks/ATS.framework",
        ],
    ),
    (EventKind::Create, MuteMode::Prefix, &[STREAMING_EXTRACTOR]),
    (EventKind::SetMode, MuteMode::Prefix, &[STREAMING_EXTRACTOR]),
    (
        EventKind::Mmap,
        MuteMode::Prefix,
        &["/Applications/Xcode.app/Contents/SharedFrameworks"],
    ),
    (EventKind::Exit, MuteMode::Prefix, &[METADATA_FRAMEWORK]),
    (
        EventKind::ProcCheck,
        MuteMode::Literal,
        &[
            METADATA_FRAMEWORK,
            "/usr/libexec/airportd",
            "/usr/libexec/usermanagerd",
            "/usr/libexec/containermanagerd",
            "/System/Library/PrivateFrameworks/CloudKitDaemon.framework/support/cloudd",
            "/usr/libexec/rosetta/oahd",
        ],
    ),
    (
        EventKind::IokitOpen,
        MuteMode::Literal,
        &["/usr/libexec/PerfPowerServices"],
    ),
    (
        EventKind::SetMode,
        MuteMode::Literal,
        &["/usr/sbin/cfprefsd", "/usr/libexec/mobileassetd"],
    ),
    (
        EventKind::XpcConnect,
        MuteMode::Literal,
        &["/usr/sbin/bluetoothd", "/usr/libexec/airportd"],
    ),
];

const GLOBAL_RULES: &[(MuteMode, &[&str])] = &[
    (
        MuteMode::Literal,
        &[
            "/usr/libexec/logd",
            "/System/Library/CoreServices/Diagnostics Reporter.app/Contents/MacOS/Diagnostics Reporter",
            "/usr/libexec/ReportMemoryException",
            "/usr/sbin/spindump",
            BIOME_AGENT,
            MDWORKER_SHARED,
            "/usr/libexec/duetexpertd",
            "/System/Library/PrivateFrameworks/HelpData.framework/Versions/A/Resources/helpd",
        ],
    ),
    (
        MuteMode::Prefix,
        &[
            "/Applications/Xcode.app/Contents/Developer/Toolchains/XcodeDefault.xctoolchain",
            METADATA_FRAMEWORK,
        ],
    ),
    (
        MuteMode::TargetLiteral,
        &[
            "/usr/sbin/spindump",
            "/usr/libexec/tailspind",
            "/dev/null",
            MDWORKER_SHARED,
        ],
    ),
];

/// Kinds whose writes into the user's cache directory are muted
const USER_CACHE_KINDS: &[EventKind] = &[EventKind::Create, EventKind::Rename];

/// The complete default rule list.
///
/// `home` is the current user's home directory; when known, creates and
/// renames landing in `~/Library/Caches` are muted as well.
pub fn default_rules(home: Option<&Path>) -> Vec<MuteRule> {
    let mut rules = Vec::new();

    for (kind, mode, paths) in EVENT_RULES {
        rules.extend(
            paths
                .iter()
                .map(|path| MuteRule::new(RuleScope::Event(*kind), *mode, *path)),
        );
    }

    if let Some(home) = home {
        let caches = home.join("Library/Caches");
        let caches = caches.to_string_lossy();
        for kind in USER_CACHE_KINDS {
            rules.push(MuteRule::new(
                RuleScope::Event(*kind),
                MuteMode::TargetPrefix,
                caches.as_ref(),
            ));
        }
    }

    for (mode, paths) in GLOBAL_RULES {
        rules.extend(
            paths
                .iter()
                .map(|path| MuteRule::new(RuleScope::Global, *mode, *path)),
        );
    }

    rules
}
