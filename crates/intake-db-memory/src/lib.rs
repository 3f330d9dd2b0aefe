//! In-memory storage backend for the intake server.
//!
//! This crate provides an in-memory implementation of the `IntakeStorage` trait
//! from `intake-storage`, using papaya lock-free HashMaps for concurrent access.
//! It backs the test suites and local development without a database.
//!
//! # Example
//!
//! ```ignore
//! use intake_db_memory::InMemoryStorage;
//! use intake_storage::IntakeStorage;
//!
//! let storage = InMemoryStorage::new();
//! let tx = storage.begin_transaction().await?;
//! let app = tx.create_application(&attributes).await?;
//! tx.commit().await?;
//! ```

pub mod storage;
pub mod transaction;

pub use intake_storage::{IntakeStorage, StorageError, Transaction};

pub use storage::InMemoryStorage;
pub use transaction::InMemoryTransaction;

/// Creates a new in-memory storage instance behind the shared trait object.
pub fn create_storage() -> intake_storage::DynStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
