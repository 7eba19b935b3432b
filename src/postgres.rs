//! PostgreSQL query engine over an sqlx pool.

use crate::engine::{with_timeout, EngineTransaction, QueryEngine, QueryOutput, Row, Statement};
use crate::error::EngineError;
use crate::sql::{render, ColumnCasts, Dialect, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::sync::Arc;

/// Runs repository statements on a [`PgPool`]; transactions hold one pooled connection.
#[derive(Clone)]
pub struct PgEngine {
    pool: PgPool,
    casts: Arc<HashMap<String, ColumnCasts>>,
}

impl PgEngine {
    pub fn new(pool: PgPool) -> Self {
        PgEngine {
            pool,
            casts: Arc::new(HashMap::new()),
        }
    }

    /// Declare SQL types for columns of `table` whose values are bound as text (timestamps, uuids, enums).
    pub fn with_casts<I, K, V>(mut self, table: &str, casts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table_casts: ColumnCasts = casts.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Arc::make_mut(&mut self.casts).insert(table.to_string(), table_casts);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn render(&self, statement: &Statement) -> Result<QueryBuf, EngineError> {
        render(statement, Dialect::Postgres, self.casts.get(statement.table()))
    }
}

#[async_trait]
impl QueryEngine for PgEngine {
    type Transaction = PgEngineTransaction;

    fn driver_name(&self) -> &str {
        Dialect::Postgres.driver_name()
    }

    async fn execute(&self, statement: &Statement) -> Result<QueryOutput, EngineError> {
        let q = self.render(statement)?;
        let mut conn = self.pool.acquire().await?;
        with_timeout(statement.timeout(), run(&mut conn, statement, &q)).await
    }

    async fn begin(&self) -> Result<PgEngineTransaction, EngineError> {
        let tx = self.pool.begin().await?;
        Ok(PgEngineTransaction {
            tx,
            casts: self.casts.clone(),
        })
    }
}

pub struct PgEngineTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    casts: Arc<HashMap<String, ColumnCasts>>,
}

#[async_trait]
impl EngineTransaction for PgEngineTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryOutput, EngineError> {
        let q = render(statement, Dialect::Postgres, self.casts.get(statement.table()))?;
        with_timeout(statement.timeout(), run(&mut self.tx, statement, &q)).await
    }

    async fn commit(self) -> Result<(), EngineError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), EngineError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn produces_rows(statement: &Statement) -> bool {
    match statement {
        Statement::Select(_) => true,
        Statement::Insert(s) => s.returning.is_some(),
        Statement::Update(s) => s.returning.is_some(),
        Statement::Delete(_) => false,
    }
}

async fn run(conn: &mut PgConnection, statement: &Statement, q: &QueryBuf) -> Result<QueryOutput, EngineError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    if produces_rows(statement) {
        let rows = query.fetch_all(&mut *conn).await?;
        Ok(QueryOutput::from_rows(rows.iter().map(row_to_json).collect()))
    } else {
        let done = query.execute(&mut *conn).await?;
        Ok(QueryOutput {
            rows: Vec::new(),
            rows_affected: done.rows_affected(),
            inserted_ids: Vec::new(),
        })
    }
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
