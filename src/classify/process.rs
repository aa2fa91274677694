//! Process helpers used by exec translation
//!
//! - Command line reconstruction from the argument vector
//! - Interpreter detection and script resolution from arguments
//! - Code signing type from flags and certificate summaries

use std::path::Path;

use crate::constants::SUPPORTED_INTERPRETERS;
use crate::models::{CodeSigningType, X509Cert};

use super::enrichment::FileProbe;

/// Kernel `CS_VALID` code signing flag
pub const CS_VALID: u32 = 0x0000_0001;
/// Kernel `CS_ADHOC` code signing flag
pub const CS_ADHOC: u32 = 0x0000_0002;

const APP_STORE_AUTHORITY: &str = "Apple Mac OS";
const DEVELOPER_ID_AUTHORITY: &str = "Developer ID Application";

/// Arguments joined by single spaces, surrounding whitespace trimmed
pub fn command_line(args: &[String]) -> String {
    args.join(" ").trim().to_string()
}

/// Whether an executable name belongs to a whitelisted interpreter (`python3` counts as `python`)
pub fn is_interpreter(executable_name: &str) -> bool {
    SUPPORTED_INTERPRETERS
        .iter()
        .any(|interpreter| executable_name.starts_with(interpreter))
}

/// First non-flag argument after argv[0] that resolves to a text file.
///
/// Relative arguments are resolved against the working directory.
pub fn resolve_script(args: &[String], cwd: &str, probe: &dyn FileProbe) -> Option<String> {
    args.iter()
        .skip(1)
        .filter(|arg| !arg.starts_with('-'))
        .map(|arg| {
            if arg.starts_with('/') {
                arg.clone()
            } else {
                Path::new(cwd).join(arg).to_string_lossy().into_owned()
            }
        })
        .find(|candidate| probe.is_text(candidate))
}

/// Classify how a process is signed
pub fn code_signing_type(
    codesigning_flags: u32,
    is_platform_binary: bool,
    executable_path: Option<&str>,
    chain: &[X509Cert],
) -> CodeSigningType {
    if is_platform_binary {
        return CodeSigningType::Platform;
    }
    if codesigning_flags & CS_ADHOC == CS_ADHOC {
        return CodeSigningType::Adhoc;
    }
    if codesigning_flags & CS_VALID == CS_VALID && executable_path.is_some_and(|p| !p.is_empty()) {
        let has_authority = |needle: &str| chain.iter().any(|cert| cert.summary.starts_with(needle));
        if has_authority(APP_STORE_AUTHORITY) {
            return CodeSigningType::AppStore;
        }
        if has_authority(DEVELOPER_ID_AUTHORITY) {
            return CodeSigningType::DeveloperId;
        }
        return CodeSigningType::Unknown;
    }
    CodeSigningType::Unsigned
}
