//! Config validation: identifiers and column lists checked before a repository is built.

use crate::config::RepositoryConfig;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Identifier checks for table, column and sort names.
pub struct IdentifierRules {
    pattern: Regex,
}

impl IdentifierRules {
    pub fn new() -> Result<Self, ConfigError> {
        let pattern = Regex::new(IDENTIFIER_PATTERN).map_err(|e| ConfigError::Load(e.to_string()))?;
        Ok(IdentifierRules { pattern })
    }

    /// Plain column or table identifier.
    pub fn is_valid(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    /// Table identifier, optionally schema-qualified (`schema.table`).
    pub fn is_valid_table(&self, name: &str) -> bool {
        let mut parts = name.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(t), None, None) => self.is_valid(t),
            (Some(s), Some(t), None) => self.is_valid(s) && self.is_valid(t),
            _ => false,
        }
    }

    fn check_columns(&self, field: &'static str, columns: &[String]) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for c in columns {
            if !self.is_valid(c) {
                return Err(ConfigError::InvalidIdentifier {
                    field,
                    name: c.clone(),
                });
            }
            if !seen.insert(c.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    field,
                    name: c.clone(),
                });
            }
        }
        Ok(())
    }
}

pub fn validate(config: &RepositoryConfig) -> Result<(), ConfigError> {
    let rules = IdentifierRules::new()?;
    if config.table_name.is_empty() {
        return Err(ConfigError::EmptyTableName);
    }
    if !rules.is_valid_table(&config.table_name) {
        return Err(ConfigError::InvalidIdentifier {
            field: "tableName",
            name: config.table_name.clone(),
        });
    }
    if config.id_column.is_empty() {
        return Err(ConfigError::EmptyIdColumn);
    }
    if !rules.is_valid(&config.id_column) {
        return Err(ConfigError::InvalidIdentifier {
            field: "idColumn",
            name: config.id_column.clone(),
        });
    }
    if config.columns_to_fetch.is_empty() {
        return Err(ConfigError::NoColumnsToFetch);
    }
    rules.check_columns("columnsToFetch", &config.columns_to_fetch)?;

    let optional_lists = [
        ("columnsToFetchList", &config.columns_to_fetch_list),
        ("columnsToFetchDetails", &config.columns_to_fetch_details),
        ("columnsForCreate", &config.columns_for_create),
        ("columnsForUpdate", &config.columns_for_update),
        ("columnsForFilters", &config.columns_for_filters),
    ];
    for (field, list) in optional_lists {
        if let Some(columns) = list {
            rules.check_columns(field, columns)?;
        }
    }
    if matches!(&config.columns_to_fetch_list, Some(c) if c.is_empty())
        || matches!(&config.columns_to_fetch_details, Some(c) if c.is_empty())
    {
        return Err(ConfigError::NoColumnsToFetch);
    }

    if let Some(sorting) = &config.default_order_by {
        for s in sorting {
            if !rules.is_valid(&s.column) {
                return Err(ConfigError::InvalidIdentifier {
                    field: "defaultOrderBy",
                    name: s.column.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortingParam;

    fn users() -> RepositoryConfig {
        RepositoryConfig::new("users", "userId", &["userId", "name", "age"])
    }

    #[test]
    fn accepts_minimal_config() {
        assert!(validate(&users()).is_ok());
    }

    #[test]
    fn accepts_schema_qualified_table() {
        let mut config = users();
        config.table_name = "app.users".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_empty_table_and_id() {
        let mut config = users();
        config.table_name.clear();
        assert!(matches!(validate(&config), Err(ConfigError::EmptyTableName)));

        let mut config = users();
        config.id_column.clear();
        assert!(matches!(validate(&config), Err(ConfigError::EmptyIdColumn)));
    }

    #[test]
    fn rejects_missing_fetch_columns() {
        let config = RepositoryConfig::new("users", "userId", &[]);
        assert!(matches!(validate(&config), Err(ConfigError::NoColumnsToFetch)));

        let config = users().columns_to_fetch_list(&[]);
        assert!(matches!(validate(&config), Err(ConfigError::NoColumnsToFetch)));
    }

    #[test]
    fn rejects_injection_in_column_names() {
        let config = users().columns_for_filters(&["name; DROP TABLE users"]);
        match validate(&config) {
            Err(ConfigError::InvalidIdentifier { field, .. }) => assert_eq!(field, "columnsForFilters"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_duplicates() {
        let config = users().columns_for_create(&["name", "name"]);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::DuplicateColumn { field: "columnsForCreate", .. })
        ));
    }

    #[test]
    fn rejects_bad_sort_column() {
        let config = users().default_order_by(vec![SortingParam::asc("user id")]);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidIdentifier { field: "defaultOrderBy", .. })
        ));
    }
}
