//! Parsing of hazard catalog responses.
//!
//! The backend is inconsistent about the envelope (bare array vs.
//! `{"data": [...]}`) and about field types (`verified` arrives as a bool or
//! as a string, ids as strings or numbers), so records are read field by
//! field from a [`serde_json::Value`] rather than through a strict derive.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use roadwatch_hazard_models::{Coordinate, HazardCategory, HazardPoint, ReportStatus};
use serde_json::Value;

use crate::SourceError;

/// Parses a catalog response body into hazards.
///
/// Records without a usable id or coordinate are skipped. Duplicate ids keep
/// their first occurrence. `fetched_at` stands in for missing or unparseable
/// creation dates.
///
/// # Errors
///
/// Returns [`SourceError::Shape`] if the body is neither an array nor an
/// object with a `data` array.
pub fn parse_catalog(
    body: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<HazardPoint>, SourceError> {
    let records = match body {
        Value::Array(records) => records,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(SourceError::Shape {
                    message: "object response without a `data` array".to_string(),
                });
            }
        },
        other => {
            return Err(SourceError::Shape {
                message: format!("expected array or object, got {}", value_kind(other)),
            });
        }
    };

    let mut seen = BTreeSet::new();
    let mut hazards = Vec::with_capacity(records.len());

    for record in records {
        let Some(hazard) = parse_record(record, fetched_at) else {
            log::debug!("Skipping unusable hazard record: {record}");
            continue;
        };
        if !seen.insert(hazard.id.clone()) {
            log::debug!("Skipping duplicate hazard id {}", hazard.id);
            continue;
        }
        hazards.push(hazard);
    }

    if hazards.len() < records.len() {
        log::debug!(
            "Parsed {} of {} hazard records",
            hazards.len(),
            records.len()
        );
    }

    Ok(hazards)
}

/// Parses one backend record. Returns `None` if it lacks an id or a valid
/// coordinate.
#[must_use]
pub fn parse_record(record: &Value, fetched_at: DateTime<Utc>) -> Option<HazardPoint> {
    let id = match record.get("id")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let coordinate = Coordinate::new(
        number_field(record, "latitude")?,
        number_field(record, "longitude")?,
    );
    if !coordinate.is_valid() {
        return None;
    }

    let reporter_name = string_field(record, "username")
        .or_else(|| string_field(record, "name"))
        .unwrap_or_default();

    let category = string_field(record, "type")
        .map_or(HazardCategory::Other, |raw| HazardCategory::from_raw(&raw));

    let created_at = string_field(record, "dateCreated")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map_or(fetched_at, |dt| dt.with_timezone(&Utc));

    Some(HazardPoint {
        id,
        coordinate,
        category,
        reporter_name,
        description: string_field(record, "description").unwrap_or_default(),
        verified: bool_field(record, "verified").unwrap_or(false),
        created_at,
        image_url: string_field(record, "imageUrl"),
        status: string_field(record, "status").and_then(|raw| raw.parse::<ReportStatus>().ok()),
    })
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn number_field(record: &Value, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_field(record: &Value, key: &str) -> Option<bool> {
    match record.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
