//! Raw repository config matching the JSON shape callers write (camelCase keys).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingParam {
    pub column: String,
    /// Missing order sorts ascending.
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl SortingParam {
    pub fn asc(column: &str) -> Self {
        SortingParam {
            column: column.to_string(),
            order: Some(SortOrder::Asc),
        }
    }

    pub fn desc(column: &str) -> Self {
        SortingParam {
            column: column.to_string(),
            order: Some(SortOrder::Desc),
        }
    }

    pub fn is_descending(&self) -> bool {
        self.order == Some(SortOrder::Desc)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub table_name: String,
    pub id_column: String,
    #[serde(default)]
    pub default_order_by: Option<Vec<SortingParam>>,
    /// Fields written by create operations. Unset writes every field the caller supplies.
    #[serde(default)]
    pub columns_for_create: Option<Vec<String>>,
    #[serde(default)]
    pub columns_for_update: Option<Vec<String>>,
    #[serde(default, alias = "columnsForGetFilters")]
    pub columns_for_filters: Option<Vec<String>>,
    pub columns_to_fetch: Vec<String>,
    #[serde(default)]
    pub columns_to_fetch_list: Option<Vec<String>>,
    #[serde(default)]
    pub columns_to_fetch_details: Option<Vec<String>>,
    /// Reject keys outside an allow-list instead of dropping them.
    #[serde(default)]
    pub throw_on_invalid_columns: bool,
}

impl RepositoryConfig {
    pub fn new(table_name: &str, id_column: &str, columns_to_fetch: &[&str]) -> Self {
        RepositoryConfig {
            table_name: table_name.to_string(),
            id_column: id_column.to_string(),
            columns_to_fetch: owned(columns_to_fetch),
            ..Default::default()
        }
    }

    pub fn default_order_by(mut self, sorting: Vec<SortingParam>) -> Self {
        self.default_order_by = Some(sorting);
        self
    }

    pub fn columns_for_create(mut self, columns: &[&str]) -> Self {
        self.columns_for_create = Some(owned(columns));
        self
    }

    pub fn columns_for_update(mut self, columns: &[&str]) -> Self {
        self.columns_for_update = Some(owned(columns));
        self
    }

    pub fn columns_for_filters(mut self, columns: &[&str]) -> Self {
        self.columns_for_filters = Some(owned(columns));
        self
    }

    pub fn columns_to_fetch_list(mut self, columns: &[&str]) -> Self {
        self.columns_to_fetch_list = Some(owned(columns));
        self
    }

    pub fn columns_to_fetch_details(mut self, columns: &[&str]) -> Self {
        self.columns_to_fetch_details = Some(owned(columns));
        self
    }

    pub fn throw_on_invalid_columns(mut self, strict: bool) -> Self {
        self.throw_on_invalid_columns = strict;
        self
    }
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Per-call options for `update_by_id`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateConfig {
    pub timeout: Option<Duration>,
}

impl UpdateConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        UpdateConfig {
            timeout: Some(timeout),
        }
    }
}
