//! Identifier validation and normalization
//!
//! Entity identifiers arrive from the API and from reloaded CSV exports in
//! several shapes: integers, floats, decimal strings, and the sentinel
//! values spreadsheet tooling leaves behind ("nan", empty cells, nulls).
//! Everything downstream (cache keys, endpoint paths, filenames) works on
//! the normalized integer-string form produced here.

use std::fmt;

use serde_json::Value;

use crate::error::{HubSpotError, Result};

/// A validated, normalized entity identifier.
///
/// Wraps the base-10 integer string ("123") used for cache keys, endpoint
/// paths, and filenames. Construct via [`normalize`]; raw values never flow
/// past this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check whether a raw identifier value can be normalized.
pub fn is_valid(value: &Value) -> bool {
    normalize(value).is_ok()
}

/// Normalize a raw identifier value to its integer string form.
///
/// Accepts numbers and decimal strings; fractional parts are truncated, not
/// rounded, so `"123.0"`, `123.0`, `"123"`, and `123` all normalize to
/// `"123"`. Null, empty or whitespace-only strings, and `"nan"` in any
/// casing are rejected. Note that JSON cannot carry a float NaN directly;
/// `serde_json` maps non-finite floats to null, which lands in the null arm.
pub fn normalize(value: &Value) -> Result<RecordId> {
    match value {
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Ok(RecordId(integer.to_string()))
            } else if let Some(unsigned) = number.as_u64() {
                Ok(RecordId(unsigned.to_string()))
            } else if let Some(float) = number.as_f64() {
                truncate_float(float, &number.to_string())
            } else {
                Err(HubSpotError::InvalidIdentifier(number.to_string()))
            }
        }
        Value::String(raw) => normalize_str(raw),
        other => Err(HubSpotError::InvalidIdentifier(other.to_string())),
    }
}

/// Normalize an identifier arriving as text (CSV cells, string properties).
pub fn normalize_str(raw: &str) -> Result<RecordId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Err(HubSpotError::InvalidIdentifier(raw.to_string()));
    }

    // Integer fast path keeps full precision for ids beyond f64's mantissa.
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Ok(RecordId(integer.to_string()));
    }
    if let Ok(unsigned) = trimmed.parse::<u64>() {
        return Ok(RecordId(unsigned.to_string()));
    }

    match trimmed.parse::<f64>() {
        Ok(float) => truncate_float(float, raw),
        Err(_) => Err(HubSpotError::InvalidIdentifier(raw.to_string())),
    }
}

fn truncate_float(value: f64, raw: &str) -> Result<RecordId> {
    if !value.is_finite() {
        return Err(HubSpotError::InvalidIdentifier(raw.to_string()));
    }
    Ok(RecordId((value.trunc() as i64).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_valid_ids_normalize_to_integer_string() {
        let inputs = vec![json!(123), json!("123"), json!(123.0), json!("123.0")];

        for input in inputs {
            assert!(is_valid(&input), "expected {:?} to be valid", input);
            assert_eq!(normalize(&input).unwrap().as_str(), "123");
        }
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let inputs = vec![
            Value::Null,
            json!(""),
            json!("nan"),
            json!("NaN"),
            json!("   "),
            Value::from(f64::NAN),
        ];

        for input in inputs {
            assert!(!is_valid(&input), "expected {:?} to be invalid", input);
            assert!(normalize(&input).is_err());
        }
    }

    #[test]
    fn test_fractional_parts_truncate() {
        assert_eq!(normalize(&json!(123.9)).unwrap().as_str(), "123");
        assert_eq!(normalize(&json!("456.7")).unwrap().as_str(), "456");
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        assert_eq!(normalize_str("  789  ").unwrap().as_str(), "789");
    }

    #[test]
    fn test_non_numeric_strings_rejected() {
        assert!(normalize_str("12abc").is_err());
        assert!(normalize_str("true").is_err());
        assert!(normalize_str("inf").is_err());
    }

    #[test]
    fn test_negative_ids_preserved() {
        assert_eq!(normalize(&json!(-5)).unwrap().as_str(), "-5");
        assert_eq!(normalize_str("-5.0").unwrap().as_str(), "-5");
    }

    #[test]
    fn test_booleans_and_objects_rejected() {
        assert!(normalize(&json!(true)).is_err());
        assert!(normalize(&json!({"id": 1})).is_err());
        assert!(normalize(&json!([1])).is_err());
    }

    proptest! {
        #[test]
        fn prop_integer_representations_agree(id in 0u32..1_000_000_000) {
            let expected = id.to_string();
            let as_number = normalize(&json!(id)).unwrap();
            let as_string = normalize(&json!(expected.clone())).unwrap();
            let as_float = normalize(&json!(id as f64)).unwrap();
            let as_decimal = normalize_str(&format!("{}.0", id)).unwrap();

            prop_assert_eq!(as_number.as_str(), expected.as_str());
            prop_assert_eq!(as_string.as_str(), expected.as_str());
            prop_assert_eq!(as_float.as_str(), expected.as_str());
            prop_assert_eq!(as_decimal.as_str(), expected.as_str());
        }

        #[test]
        fn prop_whitespace_only_invalid(ws in "[ \t\r\n]*") {
            prop_assert!(normalize_str(&ws).is_err());
        }
    }
}
