//! Allow-list projection of caller-supplied rows and criteria.

use crate::engine::Row;
use crate::error::RepositoryError;

/// Keep only keys present in `allowed` (all keys when `allowed` is `None`).
///
/// Absent keys are already "undefined" and never appear in the output. With
/// `strict`, any dropped key is reported as [`RepositoryError::InvalidColumns`].
pub fn pick_allowed(
    operation: &'static str,
    input: &Row,
    allowed: Option<&[String]>,
    strict: bool,
) -> Result<Row, RepositoryError> {
    let Some(allowed) = allowed else {
        return Ok(input.clone());
    };
    let mut picked = Row::new();
    let mut rejected = Vec::new();
    for (k, v) in input {
        if allowed.iter().any(|a| a == k) {
            picked.insert(k.clone(), v.clone());
        } else {
            rejected.push(k.clone());
        }
    }
    if strict && !rejected.is_empty() {
        return Err(RepositoryError::InvalidColumns {
            operation,
            columns: rejected,
        });
    }
    if !rejected.is_empty() {
        tracing::trace!(operation, dropped = ?rejected, "dropped columns outside allow-list");
    }
    Ok(picked)
}

/// Effective bulk chunk size; `None` means the default of 1000 rows.
pub fn chunk_size(size: Option<usize>) -> Result<usize, RepositoryError> {
    match size {
        None => Ok(super::DEFAULT_CHUNK_SIZE),
        Some(0) => Err(RepositoryError::InvalidChunkSize),
        Some(n) => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: serde_json::Value) -> Row {
        match v {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn cols(c: &[&str]) -> Vec<String> {
        c.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn drops_keys_outside_allow_list() {
        let input = row(json!({ "name": "x", "age": 11, "admin": true }));
        let allowed = cols(&["name", "age"]);
        let out = pick_allowed("create", &input, Some(&allowed), false).unwrap();
        assert_eq!(out, row(json!({ "name": "x", "age": 11 })));
    }

    #[test]
    fn keeps_explicit_null() {
        let input = row(json!({ "age": null }));
        let allowed = cols(&["age"]);
        let out = pick_allowed("update", &input, Some(&allowed), false).unwrap();
        assert_eq!(out.get("age"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn no_allow_list_passes_everything() {
        let input = row(json!({ "name": "x", "age": 11 }));
        assert_eq!(pick_allowed("update", &input, None, true).unwrap(), input);
    }

    #[test]
    fn only_disallowed_keys_yield_empty_row() {
        let input = row(json!({ "age": 30 }));
        let allowed = cols(&["name"]);
        assert!(pick_allowed("filter", &input, Some(&allowed), false).unwrap().is_empty());
    }

    #[test]
    fn strict_mode_reports_rejected_columns() {
        let input = row(json!({ "name": "x", "age": 11 }));
        let allowed = cols(&["age"]);
        match pick_allowed("update", &input, Some(&allowed), true) {
            Err(RepositoryError::InvalidColumns { operation, columns }) => {
                assert_eq!(operation, "update");
                assert_eq!(columns, vec!["name".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn chunk_size_defaults_and_rejects_zero() {
        assert_eq!(chunk_size(None).unwrap(), 1000);
        assert_eq!(chunk_size(Some(2)).unwrap(), 2);
        assert!(matches!(chunk_size(Some(0)), Err(RepositoryError::InvalidChunkSize)));
    }
}
