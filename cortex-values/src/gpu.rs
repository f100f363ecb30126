//! GPU selection normalization (spec.md §4.2, §9, testable property #11).
//!
//! The configuration bundle accepts GPU ids in whatever shape an admin
//! client or a migrated legacy row happens to carry: a JSON array of
//! integers, a JSON string holding an array (`"[0,1]"`), or a JSON string
//! holding *another* JSON string (`"\"[0,1]\""`, produced by a client that
//! double-encoded). `normalize_gpu_ids` is the single place that collapses
//! all of these into a plain `Vec<i64>`, used both when the controller
//! builds `CUDA_VISIBLE_DEVICES` and when the registry normalizes a row on
//! write.

use cortex_common::error::{CortexError, ErrorKind};
use serde_json::Value;

/// Normalizes any of the accepted `gpu_ids` encodings into a clean integer
/// list. `None` and JSON `null` both mean "no explicit selection" and
/// normalize to an empty list.
pub fn normalize_gpu_ids(raw: Option<&Value>) -> Result<Vec<i64>, CortexError> {
    match raw {
        None => Ok(Vec::new()),
        Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_i64().ok_or_else(|| {
                    CortexError::validation("gpu_ids", "array elements must be integers")
                })
            })
            .collect(),
        Some(Value::String(s)) => normalize_string(s),
        other => Err(CortexError::validation(
            "gpu_ids",
            format!("unsupported gpu_ids encoding: {other:?}"),
        )),
    }
}

fn normalize_string(s: &str) -> Result<Vec<i64>, CortexError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(_)) => {
            let parsed: Value = serde_json::from_str(trimmed)
                .map_err(|e| CortexError::validation("gpu_ids", e.to_string()))?;
            normalize_gpu_ids(Some(&parsed))
        }
        // Double-encoded: the string itself decodes to another JSON string
        // (or, defensively, to anything non-array) — recurse one level.
        Ok(Value::String(inner)) => normalize_string(&inner),
        Ok(_) | Err(_) => Err(CortexError::validation(
            "gpu_ids",
            format!("could not parse gpu_ids string: {trimmed}"),
        )),
    }
}

/// Builds the `CUDA_VISIBLE_DEVICES` value from a normalized id list.
pub fn cuda_visible_devices(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// `true` iff every accepted representation of `err` is reported as a
/// `validation_error` (used by callers that only care about the kind).
pub fn is_validation_error(err: &CortexError) -> bool {
    err.kind() == ErrorKind::ValidationError
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_four_accepted_encodings_normalize_identically() {
        let expected = vec![0, 1];

        assert_eq!(normalize_gpu_ids(None).unwrap(), Vec::<i64>::new());
        assert_eq!(
            normalize_gpu_ids(Some(&json!([0, 1]))).unwrap(),
            expected
        );
        assert_eq!(
            normalize_gpu_ids(Some(&json!("[0,1]"))).unwrap(),
            expected
        );
        assert_eq!(
            normalize_gpu_ids(Some(&json!("\"[0,1]\""))).unwrap(),
            expected
        );
    }

    #[test]
    fn null_normalizes_to_empty() {
        assert_eq!(normalize_gpu_ids(Some(&json!(null))).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn non_integer_array_elements_are_rejected() {
        assert!(normalize_gpu_ids(Some(&json!(["a", "b"]))).is_err());
    }

    #[test]
    fn cuda_visible_devices_joins_with_commas() {
        assert_eq!(cuda_visible_devices(&[0, 1, 2]), "0,1,2");
        assert_eq!(cuda_visible_devices(&[]), "");
    }
}
