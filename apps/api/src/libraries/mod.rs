//! Canonical library read-side: detail view, soft delete, enrichment trigger.

pub mod handlers;

use serde::Serialize;

use crate::enrichment::license::{is_compliant, normalize_license};
use crate::models::library::Library;
use crate::models::vulnerability::{Severity, Vulnerability};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
    pub total: usize,
}

pub fn summarize(vulnerabilities: &[Vulnerability]) -> SeveritySummary {
    let mut summary = SeveritySummary::default();
    for vuln in vulnerabilities {
        match vuln.severity {
            Severity::Critical => summary.critical += 1,
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
            Severity::Unknown => summary.unknown += 1,
        }
        summary.total += 1;
    }
    summary
}

/// Compliance of the detected license, falling back to the declared one.
/// `None` when the library carries no license at all.
pub fn license_compliance(library: &Library, allowlist: &[String]) -> Option<bool> {
    library
        .license_detected
        .as_deref()
        .or(library.license_declared.as_deref())
        .filter(|l| !l.trim().is_empty())
        .map(|l| is_compliant(&normalize_license(l), allowlist))
}
