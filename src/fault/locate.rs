//! Fault location: where did it break, in a form safe to show?

use super::Fault;

const UNKNOWN: &str = "unknown";

/// Marker for the source root inside a raw file path. Everything after it is
/// kept; everything before it is deployment layout.
const SOURCE_ROOT_MARKER: &str = "src";

/// Display-ready description of where a fault was raised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FaultInfo {
    pub source_file: String,
    pub declaring_type: String,
    pub method_name: String,
    pub line_number: u32,
    pub original_message: String,
}

impl FaultInfo {
    /// `declaring_type::method_name()`, the form shown in diagnostics and
    /// stored in audit records.
    pub fn qualified_method(&self) -> String {
        format!("{}::{}()", self.declaring_type, self.method_name)
    }
}

/// Extracts the raising site of `fault`.
///
/// Only the site the fault itself recorded is inspected. Missing pieces come
/// back as `"unknown"` (or line `0`); this function has no failure mode.
pub fn locate(fault: &Fault, host_root: &str) -> FaultInfo {
    let original_message = fault.message().to_owned();
    let Some(site) = fault.site() else {
        return FaultInfo {
            source_file: UNKNOWN.to_owned(),
            declaring_type: UNKNOWN.to_owned(),
            method_name: UNKNOWN.to_owned(),
            line_number: 0,
            original_message,
        };
    };

    FaultInfo {
        source_file: display_path(site.file(), host_root),
        declaring_type: site.declaring_type().unwrap_or(UNKNOWN).to_owned(),
        method_name: site.function().unwrap_or(UNKNOWN).to_owned(),
        line_number: site.line(),
        original_message,
    }
}

fn display_path(raw: &str, host_root: &str) -> String {
    if raw.is_empty() {
        return UNKNOWN.to_owned();
    }
    if let Some(idx) = raw.find(SOURCE_ROOT_MARKER) {
        return raw[idx + SOURCE_ROOT_MARKER.len()..].to_owned();
    }
    if !host_root.is_empty() {
        if let Some(rest) = raw.strip_prefix(host_root) {
            return rest.to_owned();
        }
    }
    raw.to_owned()
}
