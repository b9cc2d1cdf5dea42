//! Own-property access on structured JSON values.
//!
//! Objects expose their member names. Arrays expose canonical decimal
//! indices plus `length`, which is never enumerated as an element but can be
//! looked up and written like any other key.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::{Error, Result};

pub(crate) const LENGTH: &str = "length";

/// Whether a value can back a store.
pub(crate) fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// JSON kind name, used in error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether `key` is written like an array index ("0", "17", never "007" or "+1").
fn is_canonical_index(key: &str) -> bool {
    !key.is_empty()
        && !(key.len() > 1 && key.starts_with('0'))
        && key.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a canonical array index that fits in `usize`.
fn array_index(key: &str) -> Option<usize> {
    is_canonical_index(key).then(|| key.parse().ok()).flatten()
}

/// The entry stored under `key`, if `value` owns it.
pub(crate) fn entry<'a>(value: &'a Value, key: &str) -> Option<Cow<'a, Value>> {
    match value {
        Value::Object(map) => map.get(key).map(Cow::Borrowed),
        Value::Array(items) if key == LENGTH => Some(Cow::Owned(Value::from(items.len()))),
        Value::Array(items) => array_index(key)
            .and_then(|index| items.get(index))
            .map(Cow::Borrowed),
        _ => None,
    }
}

pub(crate) fn has_own(value: &Value, key: &str) -> bool {
    entry(value, key).is_some()
}

/// Every key `value` owns, in storage order.
pub(crate) fn own_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => (0..items.len())
            .map(|index| index.to_string())
            .chain(std::iter::once(LENGTH.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Largest array a keyed write may grow or pad to.
pub(crate) const MAX_ARRAY_LEN: usize = 1 << 20;

/// Where a keyed write lands.
enum Slot {
    Member,
    Length(usize),
    Index(usize),
}

fn invalid(key: &str, reason: &'static str) -> Error {
    Error::InvalidKey {
        key: key.to_string(),
        reason,
    }
}

fn slot(value: &Value, key: &str, next: &Value) -> Result<Slot> {
    match value {
        Value::Object(_) => Ok(Slot::Member),
        Value::Array(_) if key == LENGTH => next
            .as_u64()
            .and_then(|len| usize::try_from(len).ok())
            .filter(|len| *len <= MAX_ARRAY_LEN)
            .map(Slot::Length)
            .ok_or_else(|| invalid(key, "array length must be a whole number within range")),
        Value::Array(_) => match array_index(key) {
            Some(index) if index < MAX_ARRAY_LEN => Ok(Slot::Index(index)),
            _ if is_canonical_index(key) => Err(invalid(key, "array index out of range")),
            _ => Err(invalid(key, "not an array index")),
        },
        _ => Err(invalid(key, "value has no keys")),
    }
}

/// Check that `value` can hold `next` under `key` without changing it.
/// Rewriting an entry with the value it already holds always passes.
pub(crate) fn check_write(value: &Value, key: &str, next: &Value) -> Result<()> {
    if entry(value, key).as_deref() == Some(next) {
        return Ok(());
    }
    slot(value, key, next).map(|_| ())
}

/// Store `next` under `key`, or leave `value` untouched and report why not.
///
/// Writing past the end of an array pads it with nulls; writing `length`
/// truncates or pads. Neither may grow an array past `MAX_ARRAY_LEN`.
pub(crate) fn write_own(value: &mut Value, key: &str, next: Value) -> Result<()> {
    if entry(value, key).as_deref() == Some(&next) {
        return Ok(());
    }
    let slot = slot(value, key, &next)?;
    match (value, slot) {
        (Value::Object(map), Slot::Member) => {
            map.insert(key.to_string(), next);
        }
        (Value::Array(items), Slot::Length(len)) => items.resize(len, Value::Null),
        (Value::Array(items), Slot::Index(index)) => {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items[index] = next;
        }
        _ => return Err(Error::InvariantViolation("write slot does not match value")),
    }
    Ok(())
}
