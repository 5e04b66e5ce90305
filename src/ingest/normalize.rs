//! Coercion of raw upstream entries into [`Point`]s.
//!
//! Upstream payloads mix two shapes: bare `[lat, lon, ...]` arrays and
//! objects with `lat`/`lon`/optional `time` fields. Anything else is
//! dropped, as is any entry whose coordinates are not finite numbers.

use crate::models::Point;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

/// Current wall-clock time, formatted the way points carry it.
pub fn processing_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize one source payload.
///
/// Returns `None` if the payload is not an array. Otherwise returns the
/// kept points in source order, which may be empty.
pub fn normalize_payload(payload: &Value, now: &str) -> Option<Vec<Point>> {
    let entries = payload.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| normalize_entry(entry, now))
            .collect(),
    )
}

/// Classify and coerce a single entry.
pub fn normalize_entry(entry: &Value, now: &str) -> Option<Point> {
    let (lat, lon, time) = match entry {
        Value::Array(pair) if pair.len() >= 2 => (&pair[0], &pair[1], None),
        Value::Object(fields) => {
            let lat = fields.get("lat")?;
            let lon = fields.get("lon")?;
            (lat, lon, fields.get("time").and_then(coerce_time))
        }
        _ => return None,
    };

    Some(Point {
        lat: coerce_number(lat)?,
        lon: coerce_number(lon)?,
        time: time.unwrap_or_else(|| now.to_string()),
    })
}

/// Numbers and numeric strings coerce; the result must be finite.
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    number.is_finite().then_some(number)
}

fn coerce_time(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
