//! Compilation reasons
//!
//! The reason tag travels with each compile call so the compiler can record
//! why artifacts were produced.

/// Reasons that belong to the app-install family
pub const REASONS_FOR_INSTALL: &[&str] = &[
    "install",
    "install-fast",
    "install-bulk",
    "install-bulk-secondary",
    "install-bulk-downgraded",
    "install-bulk-secondary-downgraded",
];

/// Suffix appended to install reasons when a metadata file is passed
pub const DM_SUFFIX: &str = "-dm";

/// Whether `reason` is one of the app-install reasons
pub fn is_install_reason(reason: &str) -> bool {
    REASONS_FOR_INSTALL.contains(&reason)
}

/// The reason to report to the compiler.
///
/// Install reasons get the `-dm` suffix when a metadata file accompanies the
/// compile. The suffix is only a signal: the file is passed either way and
/// the compiler is free to ignore its contents.
pub fn reason_for_compile(reason: &str, has_metadata_file: bool) -> String {
    if has_metadata_file && is_install_reason(reason) {
        format!("{}{}", reason, DM_SUFFIX)
    } else {
        reason.to_string()
    }
}
