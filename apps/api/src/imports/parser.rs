//! Ingestion Parser: turns raw upload bytes into an ordered sequence of field→value rows.
//!
//! CSV support is naive: lines are split on bare commas and quoted or
//! escaped commas are NOT understood. Malformed CSV never fails; short lines yield
//! empty strings for the missing trailing columns.

use serde_json::Value;
use thiserror::Error;

use crate::models::import::{payload_text, RowPayload};

/// Only this many parsed rows are persisted per import; the rest are dropped.
pub const MAX_PERSISTED_ROWS: usize = 1000;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),

    #[error("Unsupported JSON shape: {0}")]
    UnsupportedShape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Csv,
    Json,
}

impl ContentKind {
    /// JSON when the declared content type or the file extension says so, CSV otherwise.
    pub fn detect(content_type: Option<&str>, filename: &str) -> Self {
        let declared_json = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim())
            .is_some_and(|ct| ct.eq_ignore_ascii_case("application/json"));
        if declared_json || filename.to_ascii_lowercase().ends_with(".json") {
            ContentKind::Json
        } else {
            ContentKind::Csv
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedUpload {
    pub headers: Vec<String>,
    pub rows: Vec<RowPayload>,
}

pub fn parse_upload(bytes: &[u8], kind: ContentKind) -> Result<ParsedUpload, ParseError> {
    match kind {
        ContentKind::Csv => Ok(parse_csv(&String::from_utf8_lossy(bytes))),
        ContentKind::Json => parse_json(bytes),
    }
}

pub fn parse_csv(text: &str) -> ParsedUpload {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split('\n');

    let headers: Vec<String> = match lines.next() {
        Some(first) if !first.trim().is_empty() => {
            first.split(',').map(|h| h.trim().to_string()).collect()
        }
        _ => return ParsedUpload::default(),
    };

    let rows = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = values.get(i).copied().unwrap_or("");
                    (header.clone(), Value::String(value.to_string()))
                })
                .collect::<RowPayload>()
        })
        .collect();

    ParsedUpload { headers, rows }
}

/// Accepts a top-level array of objects, an object carrying a `rows` array, or a
/// single object (treated as a one-row upload).
pub fn parse_json(bytes: &[u8]) -> Result<ParsedUpload, ParseError> {
    let data: Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let rows = match data {
        Value::Array(items) => objects_only(items)?,
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(items)) => objects_only(items)?,
            Some(Value::Null) | None => vec![map],
            Some(other) => {
                return Err(ParseError::UnsupportedShape(format!(
                    "`rows` must be an array, got {}",
                    json_kind(&other)
                )))
            }
        },
        other => {
            return Err(ParseError::UnsupportedShape(format!(
                "expected an array or object, got {}",
                json_kind(&other)
            )))
        }
    };

    let headers = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();

    Ok(ParsedUpload { headers, rows })
}

/// Source row identifier: the row's `id`, else its `name`, else empty.
pub fn source_id(row: &RowPayload) -> String {
    payload_text(row, "id")
        .filter(|s| !s.is_empty())
        .or_else(|| payload_text(row, "name"))
        .unwrap_or_default()
}

fn objects_only(items: Vec<Value>) -> Result<Vec<RowPayload>, ParseError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(ParseError::UnsupportedShape(format!(
                "row {i} is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
