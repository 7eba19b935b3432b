//! Load repository configs from JSON (a single object or an array of objects).

use crate::config::resolved::{resolve, ResolvedConfig};
use crate::config::RepositoryConfig;
use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

pub fn from_json_value(value: Value) -> Result<Vec<RepositoryConfig>, ConfigError> {
    let configs = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<RepositoryConfig>, _>>(),
        other => serde_json::from_value(other).map(|c| vec![c]),
    };
    configs.map_err(|e| ConfigError::Load(e.to_string()))
}

pub fn from_json_str(s: &str) -> Result<Vec<RepositoryConfig>, ConfigError> {
    let value: Value = serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))?;
    from_json_value(value)
}

/// Read and validate every config in a JSON file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Vec<ResolvedConfig>, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let configs = from_json_str(&raw)?;
    tracing::debug!(path = %path.display(), count = configs.len(), "loaded repository configs");
    configs.iter().map(resolve).collect()
}
