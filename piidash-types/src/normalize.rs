//! Ingest-boundary normalization.
//!
//! Backend records are loosely shaped. Every tolerance for malformed input
//! lives here, so the stores and view models only ever see `User`.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::{DataSources, ListMap, User, UserId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RejectedRecord {
    #[error("record is not an object")]
    NotAnObject,
    #[error("record has no integer id")]
    MissingId,
}

/// Normalize one raw record into a `User`, computing its data-source count.
pub fn user_from_value(value: &Value) -> Result<User, RejectedRecord> {
    let obj = value.as_object().ok_or(RejectedRecord::NotAnObject)?;
    let id = obj.get("id").and_then(id_from_value).ok_or(RejectedRecord::MissingId)?;
    let name = obj.get("name").and_then(Value::as_str).map(str::to_string);
    let pii = obj.get("pii").and_then(Value::as_object).map(list_map_from_object);
    let data_sources = obj
        .get("dataSources")
        .or_else(|| obj.get("data_sources"))
        .and_then(data_sources_from_value);
    Ok(User::new(id, name, pii, data_sources))
}

/// Normalize a batch, skipping (and logging) records that cannot be keyed.
pub fn users_from_values(values: &[Value]) -> Vec<User> {
    values
        .iter()
        .enumerate()
        .filter_map(|(idx, value)| match user_from_value(value) {
            Ok(user) => Some(user),
            Err(reason) => {
                warn!(index = idx, %reason, "skipping user record");
                None
            }
        })
        .collect()
}

/// Parse id text leniently. Surrounding whitespace, integral decimal and
/// exponent forms (`"7.0"`, `"7e0"`) and `0x`/`0o`/`0b` prefixes are
/// accepted; anything that is not a whole number in range is `None`.
pub fn id_from_text(text: &str) -> Option<UserId> {
    let text = text.trim();
    if let Ok(id) = text.parse::<UserId>() {
        return Some(id);
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = text.strip_prefix(prefix) {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return None;
            }
            return UserId::from_str_radix(digits, radix).ok();
        }
    }
    text.parse::<f64>().ok().and_then(integral_id)
}

fn id_from_value(value: &Value) -> Option<UserId> {
    if let Some(id) = value.as_i64() {
        return Some(id);
    }
    value.as_f64().and_then(integral_id)
}

// `i64::MAX as f64` rounds up to 2^63, which is already out of range.
fn integral_id(f: f64) -> Option<UserId> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn data_sources_from_value(value: &Value) -> Option<DataSources> {
    match value {
        Value::Array(items) => Some(DataSources::Flat(string_items(items))),
        Value::Object(obj) => Some(DataSources::Grouped(list_map_from_object(obj))),
        _ => None,
    }
}

// A non-list value keeps its key with an empty list: the key still counts as
// present, the value contributes nothing.
fn list_map_from_object(obj: &Map<String, Value>) -> ListMap {
    obj.iter()
        .map(|(k, v)| {
            let values = v.as_array().map(|items| string_items(items)).unwrap_or_default();
            (k.as_str(), values)
        })
        .collect()
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}
