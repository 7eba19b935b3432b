//! In-process query engine: tables held in memory, transactions replayed on commit.
//!
//! Emulates a driver's capabilities by name (`with_driver("mysql")` returns no
//! rows from writes, `with_driver("mssql")` rejects ordered updates), so the
//! repository's fallback paths can be exercised without a database server.
//! Row locks are not modelled. A transaction works on a copy taken at begin and
//! records its writes; commit replays them onto the current committed rows, so
//! writes made outside the transaction in the meantime are kept. Generated ids
//! come from a per-table sequence shared by all transactions, as database
//! sequences are not rolled back.

use crate::capability::{capabilities, Capabilities};
use crate::config::SortingParam;
use crate::engine::{
    with_timeout, Criteria, Delete, EngineTransaction, Insert, QueryEngine, QueryOutput, Row, Select, Statement,
    Update,
};
use crate::error::EngineError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct TableSchema {
    pub columns: Vec<String>,
    pub auto_increment: Option<String>,
    /// Filled with the insert time when not supplied.
    pub timestamps: Vec<String>,
    pub unique: Vec<String>,
}

impl TableSchema {
    pub fn new(columns: &[&str]) -> Self {
        TableSchema {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn auto_increment(mut self, column: &str) -> Self {
        self.auto_increment = Some(column.to_string());
        self
    }

    pub fn timestamps(mut self, columns: &[&str]) -> Self {
        self.timestamps = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn unique(mut self, column: &str) -> Self {
        self.unique.push(column.to_string());
        self
    }
}

#[derive(Clone, Debug, Default)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

#[derive(Clone, Debug, Default)]
struct Database {
    tables: HashMap<String, MemoryTable>,
}

#[derive(Clone)]
pub struct MemoryEngine {
    driver: String,
    capabilities: Capabilities,
    latency: Option<Duration>,
    db: Arc<Mutex<Database>>,
    sequences: Arc<Mutex<HashMap<String, i64>>>,
    log: Arc<Mutex<Vec<Statement>>>,
}

/// A write applied inside a transaction, replayed onto committed rows at commit.
#[derive(Clone, Debug)]
enum Effect {
    Insert { table: String, rows: Vec<Row> },
    Update(Update),
    Delete(Delete),
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_driver("memory")
    }

    /// Engine reporting `driver` as its driver name and emulating that driver's capabilities.
    pub fn with_driver(driver: &str) -> Self {
        MemoryEngine {
            driver: driver.to_string(),
            capabilities: capabilities(driver),
            latency: None,
            db: Arc::new(Mutex::new(Database::default())),
            sequences: Arc::new(Mutex::new(HashMap::new())),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Delay every statement by `latency`, so statement timeouts can fire.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn create_table(&self, name: &str, schema: TableSchema) {
        lock(&self.sequences).insert(name.to_string(), 0);
        lock(&self.db).tables.insert(
            name.to_string(),
            MemoryTable {
                schema,
                ..Default::default()
            },
        );
    }

    pub fn drop_table(&self, name: &str) {
        lock(&self.db).tables.remove(name);
    }

    /// Committed rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.db)
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every statement executed so far, inside or outside transactions.
    pub fn statements(&self) -> Vec<Statement> {
        lock(&self.log).clone()
    }

    pub fn clear_statements(&self) {
        lock(&self.log).clear();
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl QueryEngine for MemoryEngine {
    type Transaction = MemoryTransaction;

    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn execute(&self, statement: &Statement) -> Result<QueryOutput, EngineError> {
        lock(&self.log).push(statement.clone());
        with_timeout(statement.timeout(), async {
            self.delay().await;
            let mut db = lock(&self.db);
            let mut sequences = lock(&self.sequences);
            apply(&mut db, &mut sequences, statement, self.capabilities).map(|(out, _)| out)
        })
        .await
    }

    async fn begin(&self) -> Result<MemoryTransaction, EngineError> {
        let snapshot = lock(&self.db).clone();
        Ok(MemoryTransaction {
            engine: self.clone(),
            snapshot,
            effects: Vec::new(),
        })
    }
}

pub struct MemoryTransaction {
    engine: MemoryEngine,
    snapshot: Database,
    effects: Vec<Effect>,
}

#[async_trait]
impl EngineTransaction for MemoryTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryOutput, EngineError> {
        lock(&self.engine.log).push(statement.clone());
        let engine = &self.engine;
        let snapshot = &mut self.snapshot;
        let (out, effect) = with_timeout(statement.timeout(), async move {
            engine.delay().await;
            let mut sequences = lock(&engine.sequences);
            apply(snapshot, &mut sequences, statement, engine.capabilities)
        })
        .await?;
        self.effects.extend(effect);
        Ok(out)
    }

    /// Replays the recorded writes onto the current committed rows; all or nothing.
    async fn commit(self) -> Result<(), EngineError> {
        let mut db = lock(&self.engine.db);
        let mut next = db.clone();
        for effect in &self.effects {
            replay(&mut next, effect, self.engine.capabilities)?;
        }
        *db = next;
        Ok(())
    }

    async fn rollback(self) -> Result<(), EngineError> {
        Ok(())
    }
}

fn table_mut<'a>(db: &'a mut Database, name: &str) -> Result<&'a mut MemoryTable, EngineError> {
    db.tables
        .get_mut(name)
        .ok_or_else(|| EngineError::Rejected(format!("relation \"{}\" does not exist", name)))
}

fn apply(
    db: &mut Database,
    sequences: &mut HashMap<String, i64>,
    statement: &Statement,
    caps: Capabilities,
) -> Result<(QueryOutput, Option<Effect>), EngineError> {
    let table = table_mut(db, statement.table())?;
    Ok(match statement {
        Statement::Insert(s) => {
            let sequence = sequences.entry(s.table.clone()).or_insert(0);
            let (out, rows) = insert(table, sequence, s, caps)?;
            let effect = Effect::Insert {
                table: s.table.clone(),
                rows,
            };
            (out, Some(effect))
        }
        Statement::Select(s) => (select(table, s)?, None),
        Statement::Update(s) => (update(table, s, caps)?, Some(Effect::Update(s.clone()))),
        Statement::Delete(s) => (delete(table, s)?, Some(Effect::Delete(s.clone()))),
    })
}

fn replay(db: &mut Database, effect: &Effect, caps: Capabilities) -> Result<(), EngineError> {
    match effect {
        Effect::Insert { table, rows } => {
            let table = table_mut(db, table)?;
            let mut all = table.rows.clone();
            all.extend(rows.iter().cloned());
            check_unique(&table.schema, &all)?;
            table.rows = all;
        }
        Effect::Update(s) => {
            let unordered = Update {
                order_by: Vec::new(),
                returning: None,
                ..s.clone()
            };
            update(table_mut(db, &s.table)?, &unordered, caps)?;
        }
        Effect::Delete(s) => {
            delete(table_mut(db, &s.table)?, s)?;
        }
    }
    Ok(())
}

fn check_columns<'a>(schema: &TableSchema, columns: impl IntoIterator<Item = &'a String>) -> Result<(), EngineError> {
    for c in columns {
        if !schema.columns.contains(c) {
            return Err(EngineError::Rejected(format!("column \"{}\" does not exist", c)));
        }
    }
    Ok(())
}

fn check_unique(schema: &TableSchema, rows: &[Row]) -> Result<(), EngineError> {
    for column in &schema.unique {
        let mut seen: Vec<&Value> = Vec::new();
        for row in rows {
            match row.get(column) {
                Some(v) if !v.is_null() => {
                    if seen.iter().any(|s| values_equal(s, v)) {
                        return Err(EngineError::Rejected(format!(
                            "duplicate key value violates unique constraint on \"{}\"",
                            column
                        )));
                    }
                    seen.push(v);
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn project(row: &Row, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

fn matches(row: &Row, criteria: &Criteria) -> bool {
    criteria.iter().all(|(col, expected)| match row.get(col) {
        Some(actual) => values_equal(actual, expected),
        None => expected.is_null(),
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn sort_rows(rows: &mut [Row], sorting: &[SortingParam]) {
    if sorting.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for s in sorting {
            let left = a.get(&s.column).unwrap_or(&Value::Null);
            let right = b.get(&s.column).unwrap_or(&Value::Null);
            let ord = compare_values(left, right);
            let ord = if s.is_descending() { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Returns the output and the stored rows.
fn insert(
    table: &mut MemoryTable,
    sequence: &mut i64,
    s: &Insert,
    caps: Capabilities,
) -> Result<(QueryOutput, Vec<Row>), EngineError> {
    if s.rows.is_empty() {
        return Err(EngineError::Rejected("insert without rows".into()));
    }
    if let Some(returning) = &s.returning {
        check_columns(&table.schema, returning)?;
    }
    let now = chrono::Utc::now().to_rfc3339();
    let mut last_id = *sequence;
    let mut new_rows = Vec::with_capacity(s.rows.len());
    let mut inserted_ids = Vec::new();
    for input in &s.rows {
        check_columns(&table.schema, input.keys())?;
        let mut row: Row = table
            .schema
            .columns
            .iter()
            .map(|c| (c.clone(), input.get(c).cloned().unwrap_or(Value::Null)))
            .collect();
        if let Some(id_col) = &table.schema.auto_increment {
            match row.get(id_col).and_then(Value::as_i64) {
                Some(explicit) => last_id = last_id.max(explicit),
                None => {
                    last_id += 1;
                    row.insert(id_col.clone(), Value::from(last_id));
                }
            }
            inserted_ids.push(row.get(id_col).cloned().unwrap_or(Value::Null));
        }
        for ts in &table.schema.timestamps {
            if !input.contains_key(ts) {
                row.insert(ts.clone(), Value::String(now.clone()));
            }
        }
        new_rows.push(row);
    }
    let mut all = table.rows.clone();
    all.extend(new_rows.iter().cloned());
    check_unique(&table.schema, &all)?;
    table.rows = all;
    *sequence = last_id;

    let rows = match (&s.returning, caps.write_returning) {
        (Some(cols), true) => new_rows.iter().map(|r| project(r, cols)).collect(),
        _ => Vec::new(),
    };
    let out = QueryOutput {
        rows,
        rows_affected: new_rows.len() as u64,
        inserted_ids,
    };
    Ok((out, new_rows))
}

fn select(table: &MemoryTable, s: &Select) -> Result<QueryOutput, EngineError> {
    check_columns(&table.schema, &s.columns)?;
    check_columns(&table.schema, s.criteria.keys())?;
    let mut rows: Vec<Row> = table.rows.iter().filter(|r| matches(r, &s.criteria)).cloned().collect();
    sort_rows(&mut rows, &s.order_by);
    Ok(QueryOutput::from_rows(rows.iter().map(|r| project(r, &s.columns)).collect()))
}

fn update(table: &mut MemoryTable, s: &Update, caps: Capabilities) -> Result<QueryOutput, EngineError> {
    if !s.order_by.is_empty() && !caps.ordered_update {
        return Err(EngineError::Rejected("ORDER BY is not allowed in UPDATE".into()));
    }
    if s.set.is_empty() {
        return Err(EngineError::Rejected("update without columns".into()));
    }
    check_columns(&table.schema, s.set.keys())?;
    check_columns(&table.schema, s.criteria.keys())?;
    if let Some(returning) = &s.returning {
        check_columns(&table.schema, returning)?;
    }
    let mut rows = table.rows.clone();
    let mut updated = Vec::new();
    for row in rows.iter_mut().filter(|r| matches(r, &s.criteria)) {
        for (k, v) in &s.set {
            row.insert(k.clone(), v.clone());
        }
        updated.push(row.clone());
    }
    check_unique(&table.schema, &rows)?;
    table.rows = rows;

    let rows_affected = updated.len() as u64;
    sort_rows(&mut updated, &s.order_by);
    let rows = match (&s.returning, caps.write_returning) {
        (Some(cols), true) => updated.iter().map(|r| project(r, cols)).collect(),
        _ => Vec::new(),
    };
    Ok(QueryOutput {
        rows,
        rows_affected,
        inserted_ids: Vec::new(),
    })
}

fn delete(table: &mut MemoryTable, s: &Delete) -> Result<QueryOutput, EngineError> {
    check_columns(&table.schema, s.criteria.keys())?;
    let before = table.rows.len();
    table.rows.retain(|r| !matches(r, &s.criteria));
    Ok(QueryOutput {
        rows: Vec::new(),
        rows_affected: (before - table.rows.len()) as u64,
        inserted_ids: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn engine(driver: &str) -> MemoryEngine {
        let engine = MemoryEngine::with_driver(driver);
        engine.create_table(
            "users",
            TableSchema::new(&["id", "name", "age"]).auto_increment("id").unique("name"),
        );
        engine
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_reports_them() {
        let e = engine("pg");
        let s = Insert::new("users", vec![row(json!({ "name": "a" })), row(json!({ "name": "b" }))])
            .returning(&["id".to_string()]);
        let out = e.execute(&s.into()).await.unwrap();
        assert_eq!(out.inserted_ids, vec![json!(1), json!(2)]);
        assert_eq!(out.rows, vec![row(json!({ "id": 1 })), row(json!({ "id": 2 }))]);
        assert_eq!(e.rows("users")[1].get("age"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn mysql_driver_returns_no_rows_from_writes() {
        let e = engine("mysql");
        let s = Insert::new("users", vec![row(json!({ "name": "a" }))]).returning(&["id".to_string()]);
        let out = e.execute(&s.into()).await.unwrap();
        assert!(out.rows.is_empty());
        assert_eq!(out.inserted_ids, vec![json!(1)]);
    }

    #[tokio::test]
    async fn unique_violation_leaves_table_untouched() {
        let e = engine("pg");
        let s = Insert::new("users", vec![row(json!({ "name": "a" })), row(json!({ "name": "a" }))]);
        let err = e.execute(&s.into()).await.unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
        assert!(e.rows("users").is_empty());
    }

    #[tokio::test]
    async fn unknown_column_is_rejected() {
        let e = engine("pg");
        let s = Insert::new("users", vec![row(json!({ "nickname": "a" }))]);
        assert!(e.execute(&s.into()).await.is_err());
    }

    #[tokio::test]
    async fn mssql_driver_rejects_ordered_update() {
        let e = engine("mssql");
        let s = Update::new("users", row(json!({ "age": 1 }))).order_by(&[SortingParam::asc("id")]);
        assert!(e.execute(&s.into()).await.is_err());
    }

    #[tokio::test]
    async fn transaction_writes_stay_private_until_commit() {
        let e = engine("pg");
        let mut tx = e.begin().await.unwrap();
        tx.execute(&Insert::new("users", vec![row(json!({ "name": "a" }))]).into())
            .await
            .unwrap();
        assert!(e.rows("users").is_empty());
        tx.commit().await.unwrap();
        assert_eq!(e.rows("users").len(), 1);
    }

    #[tokio::test]
    async fn commit_keeps_writes_made_outside_the_transaction() {
        let e = engine("pg");
        let mut tx = e.begin().await.unwrap();
        let inside = tx
            .execute(&Insert::new("users", vec![row(json!({ "name": "inside" }))]).into())
            .await
            .unwrap();
        let outside = e
            .execute(&Insert::new("users", vec![row(json!({ "name": "outside" }))]).into())
            .await
            .unwrap();
        tx.execute(&Update::new("users", row(json!({ "age": 9 }))).into())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(inside.inserted_ids, vec![json!(1)]);
        assert_eq!(outside.inserted_ids, vec![json!(2)]);
        let rows = e.rows("users");
        let names: Vec<&Value> = rows.iter().map(|r| &r["name"]).collect();
        assert_eq!(names, vec![&json!("outside"), &json!("inside")]);
        assert!(rows.iter().all(|r| r["age"] == json!(9)));
    }

    #[tokio::test]
    async fn conflicting_commit_changes_nothing() {
        let e = engine("pg");
        let mut tx = e.begin().await.unwrap();
        tx.execute(&Insert::new("users", vec![row(json!({ "name": "a" }))]).into())
            .await
            .unwrap();
        tx.execute(&Insert::new("users", vec![row(json!({ "name": "b" }))]).into())
            .await
            .unwrap();
        e.execute(&Insert::new("users", vec![row(json!({ "name": "b" }))]).into())
            .await
            .unwrap();

        assert!(matches!(tx.commit().await, Err(EngineError::Rejected(_))));
        let rows = e.rows("users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("b"));
    }

    #[test]
    fn sorts_mixed_values() {
        let mut rows = vec![
            row(json!({ "v": "b" })),
            row(json!({ "v": 2 })),
            row(json!({ "v": null })),
            row(json!({ "v": 10 })),
        ];
        sort_rows(&mut rows, &[SortingParam::asc("v")]);
        let order: Vec<Value> = rows.iter().map(|r| r["v"].clone()).collect();
        assert_eq!(order, vec![json!(null), json!(2), json!(10), json!("b")]);
    }
}
