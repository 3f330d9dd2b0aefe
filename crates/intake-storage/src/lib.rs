//! # intake-storage
//!
//! Persistence store contract for the intake backend.
//!
//! This crate defines the traits and types that all storage backends must implement.
//! It does not contain any implementations - those are provided by separate crates
//! (`intake-db-memory`, `intake-db-postgres`).
//!
//! ## Overview
//!
//! - [`IntakeStorage`]: read access to application trees and phone numbers, and
//!   the entry point for transactions
//! - [`Transaction`]: create/update/destroy for applications, members and vehicles
//!
//! ## Example
//!
//! ```ignore
//! use intake_storage::{IntakeStorage, StorageError};
//!
//! async fn rename_city(
//!     storage: &dyn IntakeStorage,
//!     id: RecordId,
//!     city: &str,
//! ) -> Result<(), StorageError> {
//!     let patch = ApplicationPatch {
//!         city: Some(Some(city.to_string())),
//!         ..Default::default()
//!     };
//!     let tx = storage.begin_transaction().await?;
//!     tx.update_application(id, &patch).await?;
//!     tx.commit().await
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{IntakeStorage, Transaction};
pub use types::{ApplicationTree, ApplicationView};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStorage = std::sync::Arc<dyn IntakeStorage>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use intake_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{IntakeStorage, Transaction};
    pub use crate::types::{ApplicationTree, ApplicationView};
    pub use crate::{DynStorage, StorageResult};
}
