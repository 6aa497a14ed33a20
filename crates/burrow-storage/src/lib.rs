//! Storage adapters and the link store facade.
//!
//! Three adapters implement the [`Repository`] contract from `burrow_core`:
//!
//! - [`InMemoryRepository`]: plain in-process maps.
//! - [`SnapshotRepository`]: the in-memory maps, loaded from and flushed to a
//!   CSV snapshot file.
//! - [`PostgresRepository`]: a relational table with a unique index on live
//!   URLs.
//!
//! Callers use [`Store`], which picks one adapter from a [`StorageConfig`].

pub mod config;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use burrow_core::{
    LinkRecord, ReadRepository, Repository, Result, StorageError, ANONYMOUS_USER,
};
pub use config::StorageConfig;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use snapshot::SnapshotRepository;
pub use store::{Backend, Store};
