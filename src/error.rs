//! Typed errors for configuration, the query engine, and repository contracts.

use crate::engine::Row;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("table name must not be empty")]
    EmptyTableName,
    #[error("id column must not be empty")]
    EmptyIdColumn,
    #[error("columnsToFetch must list at least one column")]
    NoColumnsToFetch,
    #[error("invalid identifier in {field}: '{name}'")]
    InvalidIdentifier { field: &'static str, name: String },
    #[error("duplicate column in {field}: '{name}'")]
    DuplicateColumn { field: &'static str, name: String },
    #[error("config load: {0}")]
    Load(String),
}

/// Failures surfaced by a [`QueryEngine`](crate::engine::QueryEngine). Never translated by the repository.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),
    #[error("transaction already committed or rolled back")]
    TransactionClosed,
    #[error("statement rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("non-unique result: {message}")]
    NonUniqueResult {
        message: String,
        filter_criteria: Row,
    },
    #[error("no entity exists: {message}")]
    NoEntityExists {
        message: String,
        filter_criteria: Row,
    },
    #[error("columns not allowed for {operation}: {columns:?}")]
    InvalidColumns {
        operation: &'static str,
        columns: Vec<String>,
    },
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("engine returned neither a row nor a generated key for inserted row {index}")]
    MissingInsertedRow { index: usize },
    #[error("engine reported {reported} generated keys for {expected} inserted rows")]
    InsertedIdsMismatch { expected: usize, reported: usize },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("row conversion: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RepositoryError {
    pub(crate) fn non_unique(message: impl Into<String>, filter_criteria: &Row) -> Self {
        RepositoryError::NonUniqueResult {
            message: message.into(),
            filter_criteria: filter_criteria.clone(),
        }
    }

    pub(crate) fn no_entity(message: impl Into<String>, filter_criteria: &Row) -> Self {
        RepositoryError::NoEntityExists {
            message: message.into(),
            filter_criteria: filter_criteria.clone(),
        }
    }

    /// Criteria that violated a single-result contract, if this is such an error.
    pub fn filter_criteria(&self) -> Option<&Row> {
        match self {
            RepositoryError::NonUniqueResult { filter_criteria, .. }
            | RepositoryError::NoEntityExists { filter_criteria, .. } => Some(filter_criteria),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RepositoryError::Engine(EngineError::Timeout(_)))
    }
}
