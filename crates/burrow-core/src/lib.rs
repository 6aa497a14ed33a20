//! Core types and traits for the Burrow URL shortener.
//!
//! This crate provides the link record model, the storage error taxonomy and
//! the repository capability traits implemented by every storage adapter.

pub mod error;
pub mod record;
pub mod repository;

pub use error::{Result, StorageError};
pub use record::{LinkRecord, ANONYMOUS_USER};
pub use repository::{ReadRepository, Repository};
