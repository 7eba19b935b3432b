//! Renders engine statements into parameterized SQL for a given dialect.
//!
//! Identifiers come from repository config and caller column lists and are
//! always quoted; values are always bound as parameters.

use crate::config::SortingParam;
use crate::engine::{Criteria, Delete, Insert, Select, Statement, Update};
use crate::error::EngineError;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
    Mssql,
}

impl Dialect {
    /// Driver identifier used for capability lookups.
    pub fn driver_name(self) -> &'static str {
        match self {
            Dialect::Postgres => "pg",
            Dialect::MySql => "mysql2",
            Dialect::Sqlite => "sqlite3",
            Dialect::Mssql => "mssql",
        }
    }

    fn placeholder(self, n: u32) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
            Dialect::Mssql => format!("@p{}", n),
        }
    }

    fn quote_part(self, s: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", s.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", s.replace('`', "``")),
            Dialect::Mssql => format!("[{}]", s.replace(']', "]]")),
        }
    }

    /// Quote an identifier; `schema.table` is quoted per part.
    pub fn quoted(self, ident: &str) -> String {
        ident
            .split('.')
            .map(|part| self.quote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Column name to SQL type, for typed placeholders (`$n::timestamptz`). Postgres only.
pub type ColumnCasts = HashMap<String, String>;

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

struct Renderer<'a> {
    dialect: Dialect,
    casts: Option<&'a ColumnCasts>,
    buf: QueryBuf,
}

impl<'a> Renderer<'a> {
    fn new(dialect: Dialect, casts: Option<&'a ColumnCasts>) -> Self {
        Renderer {
            dialect,
            casts,
            buf: QueryBuf {
                sql: String::new(),
                params: Vec::new(),
            },
        }
    }

    fn q(&self, ident: &str) -> String {
        self.dialect.quoted(ident)
    }

    /// Bind `v` and return its placeholder, typed when the column has a cast.
    fn push_param(&mut self, column: &str, v: Value) -> String {
        self.buf.params.push(v);
        let ph = self.dialect.placeholder(self.buf.params.len() as u32);
        match (self.dialect, self.casts.and_then(|c| c.get(column))) {
            (Dialect::Postgres, Some(t)) => format!("{}::{}", ph, t),
            _ => ph,
        }
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns.iter().map(|c| self.q(c)).collect::<Vec<_>>().join(", ")
    }

    fn output_inserted(&self, columns: &[String]) -> String {
        let cols: Vec<String> = columns.iter().map(|c| format!("INSERTED.{}", self.q(c))).collect();
        format!(" OUTPUT {}", cols.join(", "))
    }

    fn where_clause(&mut self, criteria: &Criteria) -> String {
        let mut parts = Vec::new();
        for (col, val) in criteria {
            if val.is_null() {
                parts.push(format!("{} IS NULL", self.q(col)));
            } else {
                let ph = self.push_param(col, val.clone());
                parts.push(format!("{} = {}", self.q(col), ph));
            }
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    fn order_clause(&self, sorting: &[SortingParam]) -> String {
        if sorting.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = sorting
            .iter()
            .map(|s| format!("{} {}", self.q(&s.column), if s.is_descending() { "DESC" } else { "ASC" }))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    }

    fn returning_clause(&self, returning: Option<&Vec<String>>) -> String {
        match (self.dialect, returning) {
            (Dialect::Postgres | Dialect::Sqlite, Some(cols)) => format!(" RETURNING {}", self.column_list(cols)),
            _ => String::new(),
        }
    }

    fn insert(mut self, s: &Insert) -> Result<QueryBuf, EngineError> {
        if s.rows.is_empty() {
            return Err(EngineError::Rejected("insert without rows".into()));
        }
        let table = self.q(&s.table);
        let mut columns: Vec<String> = Vec::new();
        for row in &s.rows {
            for k in row.keys() {
                if !columns.contains(k) {
                    columns.push(k.clone());
                }
            }
        }
        let output = match (self.dialect, &s.returning) {
            (Dialect::Mssql, Some(cols)) => self.output_inserted(cols),
            _ => String::new(),
        };
        let returning = self.returning_clause(s.returning.as_ref());

        if columns.is_empty() {
            if s.rows.len() > 1 {
                return Err(EngineError::Rejected("multi-row insert without columns".into()));
            }
            let values = match self.dialect {
                Dialect::MySql => " () VALUES ()".to_string(),
                _ => format!("{} DEFAULT VALUES", output),
            };
            self.buf.sql = format!("INSERT INTO {}{}{}", table, values, returning);
            return Ok(self.buf);
        }

        let missing = match self.dialect {
            Dialect::Sqlite => "NULL",
            _ => "DEFAULT",
        };
        let mut tuples = Vec::with_capacity(s.rows.len());
        for row in &s.rows {
            let mut values = Vec::with_capacity(columns.len());
            for c in &columns {
                match row.get(c) {
                    Some(v) => values.push(self.push_param(c, v.clone())),
                    None => values.push(missing.to_string()),
                }
            }
            tuples.push(format!("({})", values.join(", ")));
        }
        self.buf.sql = format!(
            "INSERT INTO {} ({}){} VALUES {}{}",
            table,
            self.column_list(&columns),
            output,
            tuples.join(", "),
            returning
        );
        Ok(self.buf)
    }

    fn select(mut self, s: &Select) -> QueryBuf {
        let table = self.q(&s.table);
        let lock_hint = if s.for_update && self.dialect == Dialect::Mssql {
            " WITH (UPDLOCK, ROWLOCK)"
        } else {
            ""
        };
        let where_clause = self.where_clause(&s.criteria);
        let order_clause = self.order_clause(&s.order_by);
        let lock = match self.dialect {
            Dialect::Postgres | Dialect::MySql if s.for_update => " FOR UPDATE",
            _ => "",
        };
        self.buf.sql = format!(
            "SELECT {} FROM {}{}{}{}{}",
            self.column_list(&s.columns),
            table,
            lock_hint,
            where_clause,
            order_clause,
            lock
        );
        self.buf
    }

    fn update(mut self, s: &Update) -> Result<QueryBuf, EngineError> {
        if s.set.is_empty() {
            return Err(EngineError::Rejected("update without columns".into()));
        }
        let table = self.q(&s.table);
        let mut sets = Vec::with_capacity(s.set.len());
        for (col, val) in &s.set {
            let ph = self.push_param(col, val.clone());
            sets.push(format!("{} = {}", self.q(col), ph));
        }
        let output = match (self.dialect, &s.returning) {
            (Dialect::Mssql, Some(cols)) => self.output_inserted(cols),
            _ => String::new(),
        };
        let where_clause = self.where_clause(&s.criteria);
        let order_clause = self.order_clause(&s.order_by);
        let base = format!("UPDATE {} SET {}{}{}", table, sets.join(", "), output, where_clause);

        self.buf.sql = match (self.dialect, &s.returning) {
            (Dialect::MySql, _) => format!("{}{}", base, order_clause),
            (Dialect::Postgres, Some(cols)) if !order_clause.is_empty() => {
                // Sort columns outside the returned set are returned inside the CTE only.
                let mut inner = cols.clone();
                for sort in &s.order_by {
                    if !inner.contains(&sort.column) {
                        inner.push(sort.column.clone());
                    }
                }
                format!(
                    "WITH updated AS ({} RETURNING {}) SELECT {} FROM updated{}",
                    base,
                    self.column_list(&inner),
                    self.column_list(cols),
                    order_clause
                )
            }
            _ => format!("{}{}", base, self.returning_clause(s.returning.as_ref())),
        };
        Ok(self.buf)
    }

    fn delete(mut self, s: &Delete) -> QueryBuf {
        let table = self.q(&s.table);
        let where_clause = self.where_clause(&s.criteria);
        self.buf.sql = format!("DELETE FROM {}{}", table, where_clause);
        self.buf
    }
}

/// Render `statement` for `dialect`. `casts` types placeholders of matching columns.
pub fn render(statement: &Statement, dialect: Dialect, casts: Option<&ColumnCasts>) -> Result<QueryBuf, EngineError> {
    let r = Renderer::new(dialect, casts);
    match statement {
        Statement::Insert(s) => r.insert(s),
        Statement::Select(s) => Ok(r.select(s)),
        Statement::Update(s) => r.update(s),
        Statement::Delete(s) => Ok(r.delete(s)),
    }
}
