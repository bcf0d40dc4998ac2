//! Mapping Engine: applies a user-supplied column→canonical-field dictionary to a row.
//!
//! Pure and unvalidated: whatever the source column holds is carried over as text.
//! Shape or type checks on the values are out of scope here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::import::{payload_text, RowPayload};
use crate::models::library::LibraryAttributes;

/// The library attributes an import column can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Name,
    Version,
    Purl,
    LicenseDeclared,
    LicenseDetected,
    Owner,
    Environment,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Name,
        CanonicalField::Version,
        CanonicalField::Purl,
        CanonicalField::LicenseDeclared,
        CanonicalField::LicenseDetected,
        CanonicalField::Owner,
        CanonicalField::Environment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Name => "name",
            CanonicalField::Version => "version",
            CanonicalField::Purl => "purl",
            CanonicalField::LicenseDeclared => "license_declared",
            CanonicalField::LicenseDetected => "license_detected",
            CanonicalField::Owner => "owner",
            CanonicalField::Environment => "environment",
        }
    }

    fn slot<'a>(&self, attrs: &'a mut LibraryAttributes) -> &'a mut Option<String> {
        match self {
            CanonicalField::Name => &mut attrs.name,
            CanonicalField::Version => &mut attrs.version,
            CanonicalField::Purl => &mut attrs.purl,
            CanonicalField::LicenseDeclared => &mut attrs.license_declared,
            CanonicalField::LicenseDetected => &mut attrs.license_detected,
            CanonicalField::Owner => &mut attrs.owner,
            CanonicalField::Environment => &mut attrs.environment,
        }
    }
}

/// Source column name → canonical field.
pub type ColumnMapping = BTreeMap<String, CanonicalField>;

/// Builds candidate library attributes from one row. Unmapped fields stay `None`.
pub fn apply_mapping(row: &RowPayload, mapping: &ColumnMapping) -> LibraryAttributes {
    let mut attrs = LibraryAttributes::default();
    for (column, field) in mapping {
        if let Some(value) = payload_text(row, column) {
            *field.slot(&mut attrs) = Some(value);
        }
    }
    attrs
}

impl LibraryAttributes {
    /// Identity extraction: reads canonical field names straight off a raw payload.
    pub fn from_payload(row: &RowPayload) -> Self {
        let mut attrs = LibraryAttributes::default();
        for field in CanonicalField::ALL {
            *field.slot(&mut attrs) = payload_text(row, field.as_str());
        }
        attrs
    }
}
