#![allow(dead_code)]

use entity_repository::{EntityRepository, MemoryEngine, RepositoryConfig, Row, SortingParam, TableSchema};
use serde_json::Value;
use std::sync::Arc;

pub const FETCH: &[&str] = &["userId", "name", "age", "createdAt", "updatedAt"];

pub fn row(v: Value) -> Row {
    match v {
        Value::Object(m) => m,
        other => panic!("expected object, got {}", other),
    }
}

pub fn users_table() -> TableSchema {
    TableSchema::new(FETCH)
        .auto_increment("userId")
        .timestamps(&["createdAt", "updatedAt"])
}

/// Route repository logs to the test harness; `RUST_LOG=entity_repository=debug` shows statements.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn engine(driver: &str) -> Arc<MemoryEngine> {
    init_tracing();
    let engine = MemoryEngine::with_driver(driver);
    engine.create_table("users", users_table());
    Arc::new(engine)
}

pub fn users_config() -> RepositoryConfig {
    RepositoryConfig::new("users", "userId", FETCH)
        .default_order_by(vec![SortingParam::asc("userId")])
        .columns_for_create(&["name", "age"])
        .columns_for_update(&["age"])
        .columns_for_filters(&["name"])
}

pub fn users_repository(engine: &Arc<MemoryEngine>) -> EntityRepository<MemoryEngine> {
    EntityRepository::new(engine.clone(), &users_config()).unwrap()
}

pub fn names(rows: &[Row]) -> Vec<&str> {
    rows.iter().map(|r| r["name"].as_str().unwrap_or("")).collect()
}
