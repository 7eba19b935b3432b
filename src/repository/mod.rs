//! Generic repository over a configured table.

mod entity;
pub mod projection;
pub use entity::EntityRepository;

/// Rows per INSERT statement in bulk operations unless the caller says otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
