//! Resolved repository config: validated, with list/detail defaults applied. Immutable after construction.

use crate::config::{validate, RepositoryConfig, SortingParam};
use crate::error::ConfigError;

#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub table_name: String,
    pub id_column: String,
    pub default_order_by: Option<Vec<SortingParam>>,
    /// `None` means every defined field is written.
    pub columns_for_create: Option<Vec<String>>,
    /// `None` means every defined field is written.
    pub columns_for_update: Option<Vec<String>>,
    /// `None` means every defined key becomes a predicate.
    pub columns_for_filters: Option<Vec<String>>,
    pub columns_to_fetch: Vec<String>,
    pub columns_to_fetch_list: Vec<String>,
    pub columns_to_fetch_details: Vec<String>,
    pub throw_on_invalid_columns: bool,
}

pub fn resolve(config: &RepositoryConfig) -> Result<ResolvedConfig, ConfigError> {
    validate(config)?;
    let fetch = &config.columns_to_fetch;
    Ok(ResolvedConfig {
        table_name: config.table_name.clone(),
        id_column: config.id_column.clone(),
        default_order_by: config.default_order_by.clone().filter(|s| !s.is_empty()),
        columns_for_create: config.columns_for_create.clone(),
        columns_for_update: config.columns_for_update.clone(),
        columns_for_filters: config.columns_for_filters.clone(),
        columns_to_fetch: fetch.clone(),
        columns_to_fetch_list: config.columns_to_fetch_list.clone().unwrap_or_else(|| fetch.clone()),
        columns_to_fetch_details: config
            .columns_to_fetch_details
            .clone()
            .unwrap_or_else(|| fetch.clone()),
        throw_on_invalid_columns: config.throw_on_invalid_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_and_details_default_to_columns_to_fetch() {
        let config = RepositoryConfig::new("users", "userId", &["userId", "name"]);
        let resolved = resolve(&config).unwrap();
        assert_eq!(resolved.columns_to_fetch_list, vec!["userId", "name"]);
        assert_eq!(resolved.columns_to_fetch_details, vec!["userId", "name"]);
        assert!(resolved.columns_for_create.is_none());
    }

    #[test]
    fn explicit_list_and_details_are_kept() {
        let config = RepositoryConfig::new("users", "userId", &["userId", "name", "age"])
            .columns_to_fetch_list(&["userId"])
            .columns_to_fetch_details(&["userId", "name", "age"]);
        let resolved = resolve(&config).unwrap();
        assert_eq!(resolved.columns_to_fetch_list, vec!["userId"]);
        assert_eq!(resolved.columns_to_fetch_details, vec!["userId", "name", "age"]);
    }

    #[test]
    fn empty_default_order_is_dropped() {
        let config = RepositoryConfig::new("users", "userId", &["userId"]).default_order_by(vec![]);
        assert!(resolve(&config).unwrap().default_order_by.is_none());
    }
}
