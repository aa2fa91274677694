//! Memory protection decoding for mmap and mprotect

const VM_PROT_NONE: &str = "VM_PROT_NONE";

const VM_PROT_FLAGS: &[(i32, &str)] = &[
    (0x1, "VM_PROT_READ"),
    (0x2, "VM_PROT_WRITE"),
    (0x4, "VM_PROT_EXECUTE"),
];

/// Named flags set in a protection mask, in bit order
pub fn protection_flags(protection: i32) -> Vec<String> {
    if protection == 0 {
        return vec![VM_PROT_NONE.to_string()];
    }
    VM_PROT_FLAGS
        .iter()
        .filter(|(bit, _)| protection & bit != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// `READ|EXECUTE` form used in summaries
pub fn protection_summary(flags: &[String]) -> String {
    flags
        .iter()
        .map(|flag| flag.strip_prefix("VM_PROT_").unwrap_or(flag))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn hex_address(address: u64) -> String {
    format!("0x{:x}", address)
}

/// Whole kilobytes, truncated
pub fn kb_size(size: u64) -> u64 {
    size / 1024
}
