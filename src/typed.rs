//! Serde-typed facade over [`EntityRepository`].
//!
//! `New`, `Full`, `Updated` and `Filters` are the row shapes for inserts, reads,
//! updates and criteria. They are converted to and from [`Row`] with serde, so
//! an `Option` field left `None` must use
//! `#[serde(skip_serializing_if = "Option::is_none")]` to stay "undefined"
//! instead of being written as NULL. The config allow-lists still apply.

use crate::config::{RepositoryConfig, SortingParam, UpdateConfig};
use crate::engine::{QueryEngine, Row};
use crate::error::{ConfigError, RepositoryError};
use crate::repository::EntityRepository;
use crate::transaction::TransactionProvider;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct TypedRepository<E, New, Full, Updated = New, Filters = Full>
where
    E: QueryEngine,
{
    inner: EntityRepository<E>,
    _rows: PhantomData<fn() -> (New, Full, Updated, Filters)>,
}

impl<E, New, Full, Updated, Filters> Clone for TypedRepository<E, New, Full, Updated, Filters>
where
    E: QueryEngine,
{
    fn clone(&self) -> Self {
        TypedRepository {
            inner: self.inner.clone(),
            _rows: PhantomData,
        }
    }
}

fn to_row<T: Serialize>(value: &T) -> Result<Row, RepositoryError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Row::new()),
        other => Err(RepositoryError::Serde(serde::de::Error::custom(format!(
            "expected a struct or map, got {}",
            other
        )))),
    }
}

fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, RepositoryError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, RepositoryError> {
    rows.into_iter().map(from_row).collect()
}

impl<E, New, Full, Updated, Filters> TypedRepository<E, New, Full, Updated, Filters>
where
    E: QueryEngine,
    New: Serialize + Sync,
    Full: DeserializeOwned,
    Updated: Serialize + Sync,
    Filters: Serialize + Sync,
{
    pub fn new(engine: Arc<E>, config: &RepositoryConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_untyped(EntityRepository::new(engine, config)?))
    }

    pub fn from_untyped(inner: EntityRepository<E>) -> Self {
        TypedRepository {
            inner,
            _rows: PhantomData,
        }
    }

    /// The row-map repository underneath.
    pub fn untyped(&self) -> &EntityRepository<E> {
        &self.inner
    }

    pub async fn create(&self, new_row: &New, transaction: Option<&TransactionProvider<E>>) -> Result<Full, RepositoryError> {
        let row = to_row(new_row)?;
        from_row(self.inner.create(&row, transaction).await?)
    }

    pub async fn create_bulk(
        &self,
        new_rows: &[New],
        transaction: Option<&TransactionProvider<E>>,
        chunk_size: Option<usize>,
    ) -> Result<Vec<Full>, RepositoryError> {
        let rows = new_rows.iter().map(to_row).collect::<Result<Vec<_>, _>>()?;
        from_rows(self.inner.create_bulk(&rows, transaction, chunk_size).await?)
    }

    pub async fn create_bulk_no_returning(
        &self,
        new_rows: &[New],
        transaction: Option<&TransactionProvider<E>>,
        chunk_size: Option<usize>,
    ) -> Result<(), RepositoryError> {
        let rows = new_rows.iter().map(to_row).collect::<Result<Vec<_>, _>>()?;
        self.inner.create_bulk_no_returning(&rows, transaction, chunk_size).await
    }

    pub async fn update_by_id(
        &self,
        id: impl Into<Value>,
        updated_fields: &Updated,
        transaction: Option<&TransactionProvider<E>>,
        update_config: UpdateConfig,
    ) -> Result<Option<Full>, RepositoryError> {
        let row = to_row(updated_fields)?;
        self.inner
            .update_by_id(id, &row, transaction, update_config)
            .await?
            .map(from_row)
            .transpose()
    }

    pub async fn update_by_criteria(
        &self,
        filter_criteria: &Filters,
        updated_fields: &Updated,
        transaction: Option<&TransactionProvider<E>>,
        sorting: Option<&[SortingParam]>,
    ) -> Result<Vec<Full>, RepositoryError> {
        let criteria = to_row(filter_criteria)?;
        let row = to_row(updated_fields)?;
        from_rows(self.inner.update_by_criteria(&criteria, &row, transaction, sorting).await?)
    }

    pub async fn update_single_by_criteria(
        &self,
        filter_criteria: &Filters,
        updated_fields: &Updated,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<Full, RepositoryError> {
        let criteria = to_row(filter_criteria)?;
        let row = to_row(updated_fields)?;
        from_row(self.inner.update_single_by_criteria(&criteria, &row, transaction).await?)
    }

    pub async fn delete_by_id(&self, id: impl Into<Value>, transaction: Option<&TransactionProvider<E>>) -> Result<(), RepositoryError> {
        self.inner.delete_by_id(id, transaction).await
    }

    pub async fn delete_by_criteria(
        &self,
        filter_criteria: &Filters,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<(), RepositoryError> {
        let criteria = to_row(filter_criteria)?;
        self.inner.delete_by_criteria(&criteria, transaction).await
    }

    pub async fn get_by_id(
        &self,
        id: impl Into<Value>,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<Option<Full>, RepositoryError> {
        self.inner.get_by_id(id, None, transaction).await?.map(from_row).transpose()
    }

    pub async fn get_by_id_for_update(
        &self,
        id: impl Into<Value>,
        transaction: &TransactionProvider<E>,
    ) -> Result<Option<Full>, RepositoryError> {
        self.inner
            .get_by_id_for_update(id, transaction, None)
            .await?
            .map(from_row)
            .transpose()
    }

    pub async fn get_by_criteria(
        &self,
        filter_criteria: Option<&Filters>,
        sorting: Option<&[SortingParam]>,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<Vec<Full>, RepositoryError> {
        let criteria = filter_criteria.map(to_row).transpose()?;
        from_rows(
            self.inner
                .get_by_criteria(criteria.as_ref(), sorting, None, transaction)
                .await?,
        )
    }

    pub async fn get_single_by_criteria(&self, filter_criteria: &Filters) -> Result<Option<Full>, RepositoryError> {
        let criteria = to_row(filter_criteria)?;
        self.inner
            .get_single_by_criteria(&criteria, None)
            .await?
            .map(from_row)
            .transpose()
    }

    pub fn create_transaction_provider(&self) -> TransactionProvider<E> {
        self.inner.create_transaction_provider()
    }

    pub async fn commit_transaction(&self, transaction: &TransactionProvider<E>) -> Result<(), RepositoryError> {
        self.inner.commit_transaction(transaction).await
    }

    pub async fn rollback_transaction(&self, transaction: &TransactionProvider<E>) -> Result<(), RepositoryError> {
        self.inner.rollback_transaction(transaction).await
    }
}
