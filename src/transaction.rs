//! Lazily opened, memoized transaction handle and the connection-or-transaction executor.

use crate::engine::{EngineTransaction, QueryEngine, QueryOutput, Statement};
use crate::error::EngineError;
use std::sync::Arc;
use tokio::sync::Mutex;

enum TxState<T> {
    Pending,
    Open(T),
    Finalized,
}

/// Scopes the operations it is passed to one transaction.
///
/// The underlying transaction is opened by the first statement that uses the
/// handle; every later use reuses it. The caller must finish it with
/// [`commit`](Self::commit) or [`rollback`](Self::rollback); after that any use
/// fails with [`EngineError::TransactionClosed`].
///
/// Statements through one handle run one at a time, in the order they acquire it.
pub struct TransactionProvider<E: QueryEngine> {
    engine: Arc<E>,
    state: Mutex<TxState<E::Transaction>>,
}

impl<E: QueryEngine> TransactionProvider<E> {
    pub fn new(engine: Arc<E>) -> Self {
        TransactionProvider {
            engine,
            state: Mutex::new(TxState::Pending),
        }
    }

    /// Whether the underlying transaction has been opened and not yet finalized.
    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, TxState::Open(_))
    }

    pub async fn is_finalized(&self) -> bool {
        matches!(*self.state.lock().await, TxState::Finalized)
    }

    async fn open(&self, state: &mut TxState<E::Transaction>) -> Result<(), EngineError> {
        match state {
            TxState::Open(_) => Ok(()),
            TxState::Finalized => Err(EngineError::TransactionClosed),
            TxState::Pending => {
                let tx = self.engine.begin().await?;
                tracing::debug!(driver = %self.engine.driver_name(), "transaction opened");
                *state = TxState::Open(tx);
                Ok(())
            }
        }
    }

    pub async fn execute(&self, statement: &Statement) -> Result<QueryOutput, EngineError> {
        let mut state = self.state.lock().await;
        self.open(&mut state).await?;
        match &mut *state {
            TxState::Open(tx) => tx.execute(statement).await,
            _ => Err(EngineError::TransactionClosed),
        }
    }

    /// Take the open transaction out, opening it first if nothing used the handle yet.
    async fn take(&self) -> Result<E::Transaction, EngineError> {
        let mut state = self.state.lock().await;
        self.open(&mut state).await?;
        match std::mem::replace(&mut *state, TxState::Finalized) {
            TxState::Open(tx) => Ok(tx),
            _ => Err(EngineError::TransactionClosed),
        }
    }

    pub async fn commit(&self) -> Result<(), EngineError> {
        let tx = self.take().await?;
        tx.commit().await?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), EngineError> {
        let tx = self.take().await?;
        tx.rollback().await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

/// Where a statement runs: the engine's default connection or an active transaction.
pub enum Executor<'a, E: QueryEngine> {
    Engine(&'a E),
    Transaction(&'a TransactionProvider<E>),
}

impl<'a, E: QueryEngine> Executor<'a, E> {
    pub fn resolve(engine: &'a E, transaction: Option<&'a TransactionProvider<E>>) -> Self {
        match transaction {
            Some(tx) => Executor::Transaction(tx),
            None => Executor::Engine(engine),
        }
    }

    pub async fn execute(&self, statement: &Statement) -> Result<QueryOutput, EngineError> {
        tracing::debug!(table = %statement.table(), statement = ?statement, in_transaction = self.is_transaction(), "execute");
        match self {
            Executor::Engine(engine) => engine.execute(statement).await,
            Executor::Transaction(tx) => tx.execute(statement).await,
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Executor::Transaction(_))
    }
}
