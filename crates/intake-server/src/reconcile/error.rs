//! Errors raised by a reconciliation pass.

use intake_core::{EntityKind, RecordId};
use intake_storage::StorageError;
use thiserror::Error;

/// Why a submission could not be reconciled.
///
/// Any of these aborts the pass and rolls back every write it made.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The submission is malformed.
    #[error("{0}")]
    Validation(String),

    /// An update or delete targeted a record that does not exist in this application.
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: RecordId },

    /// A vehicle's owner is not a live member of the application.
    #[error("Vehicle {vehicle} references owner {owner}, which is not a member of this application")]
    DanglingReference { vehicle: String, owner: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ReconcileError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: EntityKind, id: RecordId) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn dangling(vehicle: impl ToString, owner: impl ToString) -> Self {
        Self::DanglingReference {
            vehicle: vehicle.to_string(),
            owner: owner.to_string(),
        }
    }

    /// Returns `true` when the submission itself is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
