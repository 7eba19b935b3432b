//! Entity repository: a uniform, configuration-driven CRUD contract over a pluggable query engine.

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod sql;
pub mod transaction;
pub mod typed;

pub use capability::{supports_ordered_update, supports_write_returning, Capabilities};
pub use config::{load_from_path, RepositoryConfig, ResolvedConfig, SortOrder, SortingParam, UpdateConfig};
pub use engine::{Criteria, EngineTransaction, QueryEngine, QueryOutput, Row, Statement};
pub use error::{ConfigError, EngineError, RepositoryError};
pub use memory::{MemoryEngine, TableSchema};
pub use postgres::PgEngine;
pub use repository::{EntityRepository, DEFAULT_CHUNK_SIZE};
pub use transaction::{Executor, TransactionProvider};
pub use typed::TypedRepository;
