//! Node codec: the persisted representation of a whisper.
//!
//! Every backend stores the same flat record,
//! `{id, message, motif, phrase, author, timestamp, parent, children}`,
//! with `children` an ordered id list and `parent` an id or explicit null.
//! Decoding validates the required fields and normalizes legacy records
//! (pre-dating the current schema) in one idempotent pass, so repair
//! happens once at load time instead of being smeared across read paths.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::WhisperNode;

/// Encode a node into its persisted JSON record.
pub fn encode(node: &WhisperNode) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(node)?)
}

/// Decode a persisted record, tolerating legacy shapes.
///
/// Returns the node and whether any repair was applied. Legacy quirks
/// accepted here:
/// - missing or null `children` → empty list
/// - missing `author`/`motif`/`phrase`, or present as `""` → `None`
/// - missing `parent` → root
///
/// `id`, `message`, and `timestamp` are required; a record without them is
/// rejected rather than guessed at.
pub fn decode(value: &Value) -> Result<(WhisperNode, bool), StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid_record("record is not an object"))?;

    let id = required_str(obj, "id")?;
    let id = Uuid::parse_str(id)
        .map_err(|e| invalid_record(format!("bad id {:?}: {}", id, e)))?;

    let message = required_str(obj, "message")?.to_string();

    let raw_timestamp = required_str(obj, "timestamp")?;
    let timestamp = parse_timestamp(raw_timestamp)
        .ok_or_else(|| invalid_record(format!("bad timestamp {:?}", raw_timestamp)))?;

    let mut repaired = false;

    let parent = match obj.get("parent") {
        None => {
            repaired = true;
            None
        }
        Some(Value::Null) => None,
        Some(Value::String(s)) => Some(
            Uuid::parse_str(s)
                .map_err(|e| invalid_record(format!("bad parent {:?}: {}", s, e)))?,
        ),
        Some(other) => return Err(invalid_record(format!("bad parent {:?}", other))),
    };

    let children = match obj.get("children") {
        None | Some(Value::Null) => {
            repaired = true;
            Vec::new()
        }
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| invalid_record(format!("bad child id {:?}", v)))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(invalid_record(format!("bad children {:?}", other))),
    };

    let motif = optional_str(obj, "motif", &mut repaired)?;
    let phrase = optional_str(obj, "phrase", &mut repaired)?;
    let author = optional_str(obj, "author", &mut repaired)?;

    Ok((
        WhisperNode {
            id,
            message,
            motif,
            phrase,
            author,
            timestamp,
            parent,
            children,
        },
        repaired,
    ))
}

fn invalid_record(msg: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("malformed whisper record: {}", msg))
}

fn required_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    field: &str,
) -> Result<&'a str, StoreError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_record(format!("missing required field {:?}", field)))
}

/// Optional free-text field. Older writers persisted absent values as `""`
/// instead of null; both normalize to `None`. Anything that is neither a
/// string nor null is rejected, not coerced.
fn optional_str(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    repaired: &mut bool,
) -> Result<Option<String>, StoreError> {
    match obj.get(field) {
        None => {
            *repaired = true;
            Ok(None)
        }
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => {
            *repaired = true;
            Ok(None)
        }
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid_record(format!("bad {} {:?}", field, other))),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
