//! Example consumer: a separate Rust project that uses entity-repository as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use entity_repository::{load_from_path, EntityRepository, PgEngine, Row, SortingParam, UpdateConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CREATE_USERS: &str = r#"CREATE TABLE IF NOT EXISTS users (
    "userId" BIGSERIAL PRIMARY KEY,
    "name" TEXT NOT NULL,
    "age" BIGINT,
    "createdAt" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "updatedAt" TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("entity_repository=info,example_consumer=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/entity_repository".into());
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "repositories.json".into());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    sqlx::query(CREATE_USERS).execute(&pool).await?;

    let configs = load_from_path(&config_path).await?;
    let users_config = configs
        .into_iter()
        .find(|c| c.table_name == "users")
        .ok_or("no repository config for table \"users\"")?;

    let engine = Arc::new(PgEngine::new(pool));
    let users = EntityRepository::from_resolved(engine, users_config);

    let created = users
        .create_bulk(
            &[row(json!({ "name": "ann", "age": 30 })), row(json!({ "name": "bob", "age": 41 }))],
            None,
            None,
        )
        .await?;
    tracing::info!(count = created.len(), "created users");

    let tx = users.create_transaction_provider();
    let ann_id = created[0]["userId"].clone();
    if let Some(ann) = users.get_by_id_for_update(ann_id.clone(), &tx, None).await? {
        let age = ann["age"].as_i64().unwrap_or_default();
        users
            .update_by_id(
                ann_id.clone(),
                &row(json!({ "age": age + 1 })),
                Some(&tx),
                UpdateConfig::with_timeout(Duration::from_secs(5)),
            )
            .await?;
    }
    users.commit_transaction(&tx).await?;

    let newest_first = [SortingParam::desc("userId")];
    let listed = users.get_by_criteria(None, Some(&newest_first[..]), None, None).await?;
    for user in &listed {
        tracing::info!(user = %serde_json::Value::Object(user.clone()), "listed");
    }

    match users.get_single_by_criteria(&row(json!({ "name": "bob" })), None).await {
        Ok(bob) => tracing::info!(found = bob.is_some(), "single lookup"),
        Err(e) => tracing::warn!(error = %e, "single lookup failed"),
    }

    for user in &created {
        users.delete_by_id(user["userId"].clone(), None).await?;
    }
    Ok(())
}
