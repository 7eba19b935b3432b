//! EntityRepository: the uniform CRUD contract for one configured table.

use super::projection::{chunk_size, pick_allowed};
use crate::capability::{capabilities, Capabilities};
use crate::config::{resolve, RepositoryConfig, ResolvedConfig, SortingParam, UpdateConfig};
use crate::engine::{Criteria, Delete, Insert, QueryEngine, Row, Select, Statement, Update};
use crate::error::{ConfigError, RepositoryError};
use crate::transaction::{Executor, TransactionProvider};
use serde_json::Value;
use std::sync::Arc;

/// CRUD operations over one table, driven by a [`RepositoryConfig`].
///
/// Stateless apart from the fixed config: every read goes to the engine, and
/// nothing is retried or rolled back on failure. Each operation takes an
/// optional [`TransactionProvider`]; when given, the statement runs inside that
/// transaction instead of on the engine's default connection.
pub struct EntityRepository<E: QueryEngine> {
    engine: Arc<E>,
    config: ResolvedConfig,
    capabilities: Capabilities,
}

impl<E: QueryEngine> Clone for EntityRepository<E> {
    fn clone(&self) -> Self {
        EntityRepository {
            engine: self.engine.clone(),
            config: self.config.clone(),
            capabilities: self.capabilities,
        }
    }
}

impl<E: QueryEngine> EntityRepository<E> {
    pub fn new(engine: Arc<E>, config: &RepositoryConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_resolved(engine, resolve(config)?))
    }

    pub fn from_resolved(engine: Arc<E>, config: ResolvedConfig) -> Self {
        let capabilities = capabilities(engine.driver_name());
        tracing::debug!(
            table = %config.table_name,
            driver = %engine.driver_name(),
            write_returning = capabilities.write_returning,
            ordered_update = capabilities.ordered_update,
            "repository created"
        );
        EntityRepository {
            engine,
            config,
            capabilities,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn table(&self) -> &str {
        &self.config.table_name
    }

    fn id_criteria(&self, id: Value) -> Criteria {
        let mut criteria = Criteria::new();
        criteria.insert(self.config.id_column.clone(), id);
        criteria
    }

    fn project_create(&self, row: &Row) -> Result<Row, RepositoryError> {
        pick_allowed(
            "create",
            row,
            self.config.columns_for_create.as_deref(),
            self.config.throw_on_invalid_columns,
        )
    }

    fn project_update(&self, row: &Row) -> Result<Row, RepositoryError> {
        pick_allowed(
            "update",
            row,
            self.config.columns_for_update.as_deref(),
            self.config.throw_on_invalid_columns,
        )
    }

    fn project_filters(&self, criteria: &Criteria) -> Result<Criteria, RepositoryError> {
        pick_allowed(
            "filter",
            criteria,
            self.config.columns_for_filters.as_deref(),
            self.config.throw_on_invalid_columns,
        )
    }

    fn sorting_or_default<'s>(&'s self, sorting: Option<&'s [SortingParam]>) -> Option<&'s [SortingParam]> {
        sorting.or(self.config.default_order_by.as_deref())
    }

    /// The default connection, or the given transaction.
    pub fn get_executor<'a>(&'a self, transaction: Option<&'a TransactionProvider<E>>) -> Executor<'a, E> {
        Executor::resolve(&self.engine, transaction)
    }

    async fn select(
        &self,
        executor: &Executor<'_, E>,
        criteria: Criteria,
        sorting: Option<&[SortingParam]>,
        columns: &[String],
    ) -> Result<Vec<Row>, RepositoryError> {
        let mut select = Select::new(self.table(), columns).filter(criteria);
        if let Some(sorting) = sorting {
            select = select.order_by(sorting);
        }
        let out = executor.execute(&Statement::Select(select)).await?;
        Ok(out.rows)
    }

    async fn fetch_by_id(
        &self,
        executor: &Executor<'_, E>,
        id: Value,
        columns: &[String],
    ) -> Result<Option<Row>, RepositoryError> {
        let rows = self.select(executor, self.id_criteria(id), None, columns).await?;
        Ok(rows.into_iter().next())
    }

    /// Re-read inserted rows by generated key, in insert order, for dialects without RETURNING.
    async fn refetch_inserted(
        &self,
        executor: &Executor<'_, E>,
        rows: &[Row],
        inserted_ids: Vec<Value>,
        first_index: usize,
    ) -> Result<Vec<Row>, RepositoryError> {
        if !inserted_ids.is_empty() && inserted_ids.len() != rows.len() {
            return Err(RepositoryError::InsertedIdsMismatch {
                expected: rows.len(),
                reported: inserted_ids.len(),
            });
        }
        let mut ids = inserted_ids.into_iter();
        let mut fetched = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let index = first_index + i;
            let id = ids
                .next()
                .or_else(|| row.get(&self.config.id_column).cloned())
                .ok_or(RepositoryError::MissingInsertedRow { index })?;
            let row = self
                .fetch_by_id(executor, id, &self.config.columns_to_fetch)
                .await?
                .ok_or(RepositoryError::MissingInsertedRow { index })?;
            fetched.push(row);
        }
        Ok(fetched)
    }

    pub async fn create(
        &self,
        new_row: &Row,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<Row, RepositoryError> {
        let executor = self.get_executor(transaction);
        let insert_row = self.project_create(new_row)?;

        if self.capabilities.write_returning {
            let insert = Insert::new(self.table(), vec![insert_row]).returning(&self.config.columns_to_fetch);
            let out = executor.execute(&Statement::Insert(insert)).await?;
            return out
                .rows
                .into_iter()
                .next()
                .ok_or(RepositoryError::MissingInsertedRow { index: 0 });
        }

        let rows = vec![insert_row];
        let out = executor
            .execute(&Statement::Insert(Insert::new(self.table(), rows.clone())))
            .await?;
        tracing::debug!(table = %self.table(), "write returning unsupported; re-fetching inserted row");
        let mut fetched = self.refetch_inserted(&executor, &rows, out.inserted_ids, 0).await?;
        fetched.pop().ok_or(RepositoryError::MissingInsertedRow { index: 0 })
    }

    /// Insert `rows` in chunks of `chunk_size` (default 1000), returning created rows in input order.
    ///
    /// Chunks run sequentially; a failure leaves earlier chunks written unless
    /// the caller rolls back an enclosing transaction.
    pub async fn create_bulk(
        &self,
        rows: &[Row],
        transaction: Option<&TransactionProvider<E>>,
        chunk_size_opt: Option<usize>,
    ) -> Result<Vec<Row>, RepositoryError> {
        let size = chunk_size(chunk_size_opt)?;
        let executor = self.get_executor(transaction);
        let insert_rows = rows
            .iter()
            .map(|r| self.project_create(r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut inserted = Vec::with_capacity(insert_rows.len());
        for (n, chunk) in insert_rows.chunks(size).enumerate() {
            tracing::debug!(table = %self.table(), chunk = n, rows = chunk.len(), "bulk insert chunk");
            if self.capabilities.write_returning {
                let insert = Insert::new(self.table(), chunk.to_vec()).returning(&self.config.columns_to_fetch);
                let out = executor.execute(&Statement::Insert(insert)).await?;
                inserted.extend(out.rows);
            } else {
                let out = executor
                    .execute(&Statement::Insert(Insert::new(self.table(), chunk.to_vec())))
                    .await?;
                let fetched = self
                    .refetch_inserted(&executor, chunk, out.inserted_ids, n * size)
                    .await?;
                inserted.extend(fetched);
            }
        }
        Ok(inserted)
    }

    /// Chunked insert that discards results; no returning and no re-fetch.
    pub async fn create_bulk_no_returning(
        &self,
        rows: &[Row],
        transaction: Option<&TransactionProvider<E>>,
        chunk_size_opt: Option<usize>,
    ) -> Result<(), RepositoryError> {
        let size = chunk_size(chunk_size_opt)?;
        let executor = self.get_executor(transaction);
        let insert_rows = rows
            .iter()
            .map(|r| self.project_create(r))
            .collect::<Result<Vec<_>, _>>()?;
        for (n, chunk) in insert_rows.chunks(size).enumerate() {
            tracing::debug!(table = %self.table(), chunk = n, rows = chunk.len(), "bulk insert chunk (no returning)");
            executor
                .execute(&Statement::Insert(Insert::new(self.table(), chunk.to_vec())))
                .await?;
        }
        Ok(())
    }

    /// Update the row with key `id`. Returns `None` when no row matched.
    ///
    /// A configured timeout aborts the statement with a timeout error; it is not retried.
    pub async fn update_by_id(
        &self,
        id: impl Into<Value>,
        updated_fields: &Row,
        transaction: Option<&TransactionProvider<E>>,
        update_config: UpdateConfig,
    ) -> Result<Option<Row>, RepositoryError> {
        let id = id.into();
        let executor = self.get_executor(transaction);
        let set = self.project_update(updated_fields)?;
        if set.is_empty() {
            return self.fetch_by_id(&executor, id, &self.config.columns_to_fetch).await;
        }

        let mut update = Update::new(self.table(), set)
            .filter(self.id_criteria(id.clone()))
            .timeout(update_config.timeout);
        if self.capabilities.write_returning {
            update = update.returning(&self.config.columns_to_fetch);
        }
        let out = executor.execute(&Statement::Update(update)).await?;

        if self.capabilities.write_returning {
            return Ok(out.rows.into_iter().next());
        }
        if out.rows_affected == 0 {
            return Ok(None);
        }
        tracing::debug!(table = %self.table(), "write returning unsupported; re-fetching updated row");
        self.fetch_by_id(&executor, id, &self.config.columns_to_fetch).await
    }

    /// Runs the criteria update. `None` means the dialect returned nothing and the caller must re-read.
    async fn update_matching(
        &self,
        executor: &Executor<'_, E>,
        filter_criteria: &Criteria,
        updated_fields: &Row,
        sorting: Option<&[SortingParam]>,
    ) -> Result<Option<Vec<Row>>, RepositoryError> {
        let set = self.project_update(updated_fields)?;
        let criteria = self.project_filters(filter_criteria)?;
        let sorting = self.sorting_or_default(sorting);
        if set.is_empty() {
            let rows = self
                .select(executor, criteria, sorting, &self.config.columns_to_fetch)
                .await?;
            return Ok(Some(rows));
        }

        let mut update = Update::new(self.table(), set).filter(criteria);
        if self.capabilities.ordered_update {
            if let Some(sorting) = sorting {
                update = update.order_by(sorting);
            }
        }
        if !self.capabilities.write_returning {
            executor.execute(&Statement::Update(update)).await?;
            return Ok(None);
        }
        update = update.returning(&self.config.columns_to_fetch);
        let out = executor.execute(&Statement::Update(update)).await?;
        Ok(Some(out.rows))
    }

    /// Update every row matching the filters, returning the updated rows.
    ///
    /// `sorting` (or the default order) only shapes the returned list, and only
    /// on dialects that accept ORDER BY on UPDATE. Without RETURNING support the
    /// rows are re-read by the same criteria, which can miss rows whose update
    /// changed a filtered column or include rows changed concurrently.
    pub async fn update_by_criteria(
        &self,
        filter_criteria: &Criteria,
        updated_fields: &Row,
        transaction: Option<&TransactionProvider<E>>,
        sorting: Option<&[SortingParam]>,
    ) -> Result<Vec<Row>, RepositoryError> {
        let executor = self.get_executor(transaction);
        if let Some(rows) = self
            .update_matching(&executor, filter_criteria, updated_fields, sorting)
            .await?
        {
            return Ok(rows);
        }
        tracing::debug!(table = %self.table(), "write returning unsupported; re-fetching updated rows");
        let criteria = self.project_filters(filter_criteria)?;
        self.select(
            &executor,
            criteria,
            self.sorting_or_default(sorting),
            &self.config.columns_to_fetch,
        )
        .await
    }

    /// Update exactly one row: fails with `NonUniqueResult` for several matches and `NoEntityExists` for none.
    ///
    /// Without RETURNING support, cardinality is checked on a detail fetch by the
    /// same criteria after the update, not on the update itself.
    pub async fn update_single_by_criteria(
        &self,
        filter_criteria: &Criteria,
        updated_fields: &Row,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<Row, RepositoryError> {
        let executor = self.get_executor(transaction);
        let rows = match self
            .update_matching(&executor, filter_criteria, updated_fields, None)
            .await?
        {
            Some(rows) => rows,
            None => {
                let criteria = self.project_filters(filter_criteria)?;
                self.select(&executor, criteria, None, &self.config.columns_to_fetch_details)
                    .await?
            }
        };
        if rows.len() > 1 {
            return Err(RepositoryError::non_unique("Query updated more than one row", filter_criteria));
        }
        rows.into_iter()
            .next()
            .ok_or_else(|| RepositoryError::no_entity("Query updated no rows", filter_criteria))
    }

    /// Deleting a missing row is not an error.
    pub async fn delete_by_id(
        &self,
        id: impl Into<Value>,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<(), RepositoryError> {
        let delete = Delete::new(self.table(), self.id_criteria(id.into()));
        self.get_executor(transaction)
            .execute(&Statement::Delete(delete))
            .await?;
        Ok(())
    }

    /// Filters outside the allow-list are ignored, so disallowed-only criteria delete every row.
    pub async fn delete_by_criteria(
        &self,
        filter_criteria: &Criteria,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<(), RepositoryError> {
        let criteria = self.project_filters(filter_criteria)?;
        let delete = Delete::new(self.table(), criteria);
        self.get_executor(transaction)
            .execute(&Statement::Delete(delete))
            .await?;
        Ok(())
    }

    pub async fn get_by_id(
        &self,
        id: impl Into<Value>,
        columns_to_fetch: Option<&[&str]>,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<Option<Row>, RepositoryError> {
        let columns = columns_or(columns_to_fetch, &self.config.columns_to_fetch_details);
        let executor = self.get_executor(transaction);
        self.fetch_by_id(&executor, id.into(), &columns).await
    }

    /// Read a row and lock it for update until `transaction` ends.
    pub async fn get_by_id_for_update(
        &self,
        id: impl Into<Value>,
        transaction: &TransactionProvider<E>,
        columns_to_fetch: Option<&[&str]>,
    ) -> Result<Option<Row>, RepositoryError> {
        let columns = columns_or(columns_to_fetch, &self.config.columns_to_fetch_details);
        let select = Select::new(self.table(), &columns)
            .filter(self.id_criteria(id.into()))
            .for_update();
        let out = transaction.execute(&Statement::Select(select)).await?;
        Ok(out.rows.into_iter().next())
    }

    /// Rows matching the allowed filters; no filters means all rows.
    pub async fn get_by_criteria(
        &self,
        filter_criteria: Option<&Criteria>,
        sorting: Option<&[SortingParam]>,
        columns_to_fetch: Option<&[&str]>,
        transaction: Option<&TransactionProvider<E>>,
    ) -> Result<Vec<Row>, RepositoryError> {
        let criteria = match filter_criteria {
            Some(c) => self.project_filters(c)?,
            None => Criteria::new(),
        };
        let columns = columns_or(columns_to_fetch, &self.config.columns_to_fetch_list);
        let executor = self.get_executor(transaction);
        self.select(&executor, criteria, self.sorting_or_default(sorting), &columns)
            .await
    }

    /// At most one matching row; `NonUniqueResult` when several match.
    pub async fn get_single_by_criteria(
        &self,
        filter_criteria: &Criteria,
        columns_to_fetch: Option<&[&str]>,
    ) -> Result<Option<Row>, RepositoryError> {
        let criteria = self.project_filters(filter_criteria)?;
        let columns = columns_or(columns_to_fetch, &self.config.columns_to_fetch_details);
        let executor = self.get_executor(None);
        let rows = self.select(&executor, criteria, None, &columns).await?;
        if rows.len() > 1 {
            return Err(RepositoryError::non_unique(
                "Query resulted in more than a single result",
                filter_criteria,
            ));
        }
        Ok(rows.into_iter().next())
    }

    pub fn create_transaction_provider(&self) -> TransactionProvider<E> {
        TransactionProvider::new(self.engine.clone())
    }

    pub async fn commit_transaction(&self, transaction: &TransactionProvider<E>) -> Result<(), RepositoryError> {
        transaction.commit().await?;
        Ok(())
    }

    pub async fn rollback_transaction(&self, transaction: &TransactionProvider<E>) -> Result<(), RepositoryError> {
        transaction.rollback().await?;
        Ok(())
    }
}

fn columns_or(columns: Option<&[&str]>, default: &[String]) -> Vec<String> {
    match columns {
        Some(c) => c.iter().map(|s| s.to_string()).collect(),
        None => default.to_vec(),
    }
}
