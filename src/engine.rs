//! The query engine seam: structured statements in, rows out.
//!
//! The repository never produces SQL text. It describes each statement as an
//! [`Insert`], [`Select`], [`Update`] or [`Delete`] and hands it to a
//! [`QueryEngine`] (or to an open [`EngineTransaction`]).

use crate::config::SortingParam;
use crate::error::EngineError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// One record: column name to scalar value. A missing key is "undefined".
pub type Row = Map<String, Value>;

/// Equality predicate: every entry must match, `Null` matches `IS NULL`. Empty matches all rows.
pub type Criteria = Row;

#[derive(Clone, Debug, PartialEq)]
pub struct Insert {
    pub table: String,
    pub rows: Vec<Row>,
    pub returning: Option<Vec<String>>,
}

impl Insert {
    pub fn new(table: &str, rows: Vec<Row>) -> Self {
        Insert {
            table: table.to_string(),
            rows,
            returning: None,
        }
    }

    pub fn returning(mut self, columns: &[String]) -> Self {
        self.returning = Some(columns.to_vec());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub criteria: Criteria,
    pub order_by: Vec<SortingParam>,
    pub for_update: bool,
}

impl Select {
    pub fn new(table: &str, columns: &[String]) -> Self {
        Select {
            table: table.to_string(),
            columns: columns.to_vec(),
            criteria: Criteria::new(),
            order_by: Vec::new(),
            for_update: false,
        }
    }

    pub fn filter(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn order_by(mut self, sorting: &[SortingParam]) -> Self {
        self.order_by = sorting.to_vec();
        self
    }

    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub table: String,
    pub set: Row,
    pub criteria: Criteria,
    pub returning: Option<Vec<String>>,
    /// Shapes the returned set only; never narrows which rows are updated.
    pub order_by: Vec<SortingParam>,
    pub timeout: Option<Duration>,
}

impl Update {
    pub fn new(table: &str, set: Row) -> Self {
        Update {
            table: table.to_string(),
            set,
            criteria: Criteria::new(),
            returning: None,
            order_by: Vec::new(),
            timeout: None,
        }
    }

    pub fn filter(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn returning(mut self, columns: &[String]) -> Self {
        self.returning = Some(columns.to_vec());
        self
    }

    pub fn order_by(mut self, sorting: &[SortingParam]) -> Self {
        self.order_by = sorting.to_vec();
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Delete {
    pub table: String,
    pub criteria: Criteria,
}

impl Delete {
    pub fn new(table: &str, criteria: Criteria) -> Self {
        Delete {
            table: table.to_string(),
            criteria,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Insert(Insert),
    Select(Select),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Statement::Insert(s) => &s.table,
            Statement::Select(s) => &s.table,
            Statement::Update(s) => &s.table,
            Statement::Delete(s) => &s.table,
        }
    }

    /// Per-statement timeout, currently only carried by updates.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Statement::Update(u) => u.timeout,
            _ => None,
        }
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Statement::Insert(s)
    }
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Statement::Select(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Statement::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Statement::Delete(s)
    }
}

/// What a statement produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOutput {
    /// Selected rows, or returned rows for writes when the dialect returns them.
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    /// Generated keys of inserted rows, in insert order: either one per inserted
    /// row or none at all. Drivers that only report the first key of a
    /// multi-row insert must leave this empty.
    pub inserted_ids: Vec<Value>,
}

impl QueryOutput {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        QueryOutput {
            rows,
            rows_affected,
            inserted_ids: Vec::new(),
        }
    }
}

/// Executes statements against a database and opens transactions.
#[async_trait]
pub trait QueryEngine: Send + Sync + 'static {
    type Transaction: EngineTransaction;

    /// Driver identifier (e.g. "pg", "mysql2", "sqlite3", "mssql") used for capability lookups.
    fn driver_name(&self) -> &str;

    async fn execute(&self, statement: &Statement) -> Result<QueryOutput, EngineError>;

    async fn begin(&self) -> Result<Self::Transaction, EngineError>;
}

#[async_trait]
pub trait EngineTransaction: Send + 'static {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryOutput, EngineError>;

    async fn commit(self) -> Result<(), EngineError>;

    async fn rollback(self) -> Result<(), EngineError>;
}

/// Runs `fut` under the statement timeout, if any.
pub(crate) async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T, EngineError>
where
    F: std::future::Future<Output = Result<T, EngineError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| EngineError::Timeout(limit))?,
        None => fut.await,
    }
}
