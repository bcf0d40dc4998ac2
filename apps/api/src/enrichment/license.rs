//! License Normalizer: maps free-text license strings to SPDX identifiers.

use serde_json::Value;

use crate::models::import::RowPayload;

/// Identifiers `detect_license` will report in normalized form.
pub const SPDX_LICENSES: &[&str] = &[
    "MIT",
    "Apache-2.0",
    "GPL-3.0",
    "BSD-2-Clause",
    "BSD-3-Clause",
    "ISC",
    "LGPL-2.1",
    "LGPL-3.0",
    "MPL-2.0",
    "AGPL-3.0",
];

pub const UNKNOWN_LICENSE: &str = "Unknown";

/// Licenses rejected when no explicit allowlist is configured.
const DEFAULT_DENYLIST: &[&str] = &["GPL-3.0", "AGPL-3.0"];

/// Keyword normalization. Keywords are tested in a fixed order, so any string
/// containing "GPL" (including LGPL/AGPL variants) resolves on the GPL rule.
/// No keyword match returns the input untouched.
pub fn normalize_license(license: &str) -> String {
    let upper = license.trim().to_uppercase();
    let has_3 = upper.contains('3');

    let normalized = if upper.contains("MIT") {
        "MIT"
    } else if upper.contains("APACHE") {
        "Apache-2.0"
    } else if upper.contains("GPL") {
        if has_3 {
            "GPL-3.0"
        } else {
            "GPL-2.0"
        }
    } else if upper.contains("BSD") {
        if has_3 {
            "BSD-3-Clause"
        } else {
            "BSD-2-Clause"
        }
    } else if upper.contains("ISC") {
        "ISC"
    } else if upper.contains("LGPL") {
        if has_3 {
            "LGPL-3.0"
        } else {
            "LGPL-2.1"
        }
    } else if upper.contains("MPL") {
        "MPL-2.0"
    } else if upper.contains("AGPL") {
        "AGPL-3.0"
    } else {
        return license.to_string();
    };
    normalized.to_string()
}

/// Detects a license from a declared string, falling back to package metadata
/// (`license`, then the first `licenses` entry) when nothing was declared.
pub fn detect_license(declared: Option<&str>, fallback: &RowPayload) -> String {
    match declared.filter(|d| !d.is_empty()) {
        Some(declared) => {
            let normalized = normalize_license(declared);
            if SPDX_LICENSES.contains(&normalized.as_str()) {
                normalized
            } else {
                declared.to_string()
            }
        }
        None => detect_from_metadata(fallback),
    }
}

fn detect_from_metadata(metadata: &RowPayload) -> String {
    if let Some(license) = metadata.get("license").and_then(license_text) {
        return normalize_license(&license);
    }

    if let Some(first) = metadata
        .get("licenses")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
    {
        if let Some(license) = license_text(first) {
            return normalize_license(&license);
        }
    }

    UNKNOWN_LICENSE.to_string()
}

/// A license entry is either a bare string or an object carrying a `type`.
fn license_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("type").and_then(license_text),
        _ => None,
    }
}

/// Policy check. An empty allowlist denies only the strong-copyleft defaults.
pub fn is_compliant(license: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return !DEFAULT_DENYLIST.contains(&license);
    }
    allowlist.iter().any(|allowed| allowed == license)
}
