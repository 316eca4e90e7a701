//! Decoding of batch-update payloads.

use serde_json::Value;

use crate::batch::JobUpdate;
use crate::error::StreamError;

/// Decodes an event payload: a JSON array of update records or a single
/// record object.
///
/// Array elements that fail to decode are logged and skipped so the rest of
/// the event still applies.
pub fn decode_payload(data: &str) -> Result<Vec<JobUpdate>, StreamError> {
    let value: Value =
        serde_json::from_str(data.trim()).map_err(|e| StreamError::Decode(e.to_string()))?;

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value::<JobUpdate>(item) {
                Ok(update) => Some(update),
                Err(e) => {
                    log::warn!("Skipping undecodable update at index {}: {}", index, e);
                    None
                }
            })
            .collect()),
        Value::Object(_) => serde_json::from_value(value)
            .map(|update| vec![update])
            .map_err(|e| StreamError::Decode(e.to_string())),
        other => Err(StreamError::Decode(format!(
            "expected an update object or array, got {}",
            json_kind(&other)
        ))),
    }
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
