//! Storage traits for the persistence store contract.
//!
//! Reads that serve clients go through [`IntakeStorage`]; every write goes
//! through a [`Transaction`] so a reconciliation pass either lands completely
//! or not at all.

use async_trait::async_trait;

use intake_core::{
    Application, ApplicationAttributes, ApplicationPatch, Member, MemberAttributes, MemberPatch,
    PhoneNumber, RecordId, Vehicle, VehicleAttributes, VehiclePatch,
};

use crate::error::StorageError;
use crate::types::ApplicationTree;

/// The main storage trait that all intake storage backends must implement.
///
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use intake_storage::{IntakeStorage, StorageError, ApplicationTree};
///
/// async fn load(storage: &dyn IntakeStorage, id: RecordId) -> Result<ApplicationTree, StorageError> {
///     storage
///         .find_application(id)
///         .await?
///         .ok_or_else(|| StorageError::not_found(EntityKind::Application, id))
/// }
/// ```
#[async_trait]
pub trait IntakeStorage: Send + Sync {
    // ==================== Transactions ====================

    /// Begins a new transaction.
    ///
    /// The returned transaction must be committed for its writes to persist.
    /// Dropping it, or calling `rollback`, discards them.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if a transaction cannot be started.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError>;

    // ==================== Applications ====================

    /// Reads an application with its live members and vehicles.
    ///
    /// Returns `None` if the application does not exist.
    async fn find_application(&self, id: RecordId)
    -> Result<Option<ApplicationTree>, StorageError>;

    /// Reads every application with its members and vehicles, ordered by id.
    async fn find_all_applications(&self) -> Result<Vec<ApplicationTree>, StorageError>;

    /// Reads the first application (lowest id) registered for a phone number.
    async fn find_application_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<ApplicationTree>, StorageError>;

    // ==================== Phone numbers ====================

    /// Looks up a phone number record.
    async fn find_phone_number(&self, number: &str) -> Result<Option<PhoneNumber>, StorageError>;

    /// Looks up a phone number record, creating it when absent.
    ///
    /// The boolean is `true` when the record was created by this call.
    async fn find_or_create_phone_number(
        &self,
        number: &str,
    ) -> Result<(PhoneNumber, bool), StorageError>;

    /// Stores a confirmation code for a phone number. Returns the affected row count.
    async fn set_confirmation_code(&self, number: &str, code: i32) -> Result<u64, StorageError>;

    // ==================== Metadata ====================

    /// Checks that the backend can serve requests.
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A transaction for performing atomic writes.
///
/// Record methods take `&self` so that independent writes can be issued
/// concurrently and joined; backends whose driver needs exclusive access
/// serialize them internally.
///
/// Updates and destroys are keyed by `(application_id, id)` and report the
/// number of affected rows: a record owned by another application counts as
/// zero rows, the same as a missing one.
///
/// Updates write only the keys present in the patch. An empty patch writes
/// nothing but still reports the row as affected when it exists.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits all operations in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if the commit fails.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Rolls back all operations in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if the rollback fails.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;

    /// Creates an application and assigns its id.
    async fn create_application(
        &self,
        attributes: &ApplicationAttributes,
    ) -> Result<Application, StorageError>;

    /// Merges a patch into an application.
    async fn update_application(
        &self,
        id: RecordId,
        patch: &ApplicationPatch,
    ) -> Result<u64, StorageError>;

    /// Creates a member under an application.
    async fn create_member(
        &self,
        application_id: RecordId,
        attributes: &MemberAttributes,
    ) -> Result<Member, StorageError>;

    /// Merges a patch into a member.
    async fn update_member(
        &self,
        application_id: RecordId,
        id: RecordId,
        patch: &MemberPatch,
    ) -> Result<u64, StorageError>;

    /// Deletes a member.
    async fn destroy_member(&self, application_id: RecordId, id: RecordId)
    -> Result<u64, StorageError>;

    /// Creates a vehicle under an application, owned by `owner_id`.
    async fn create_vehicle(
        &self,
        application_id: RecordId,
        owner_id: RecordId,
        attributes: &VehicleAttributes,
    ) -> Result<Vehicle, StorageError>;

    /// Sets the owner of a vehicle and merges a patch into it.
    async fn update_vehicle(
        &self,
        application_id: RecordId,
        id: RecordId,
        owner_id: RecordId,
        patch: &VehiclePatch,
    ) -> Result<u64, StorageError>;

    /// Deletes a vehicle.
    async fn destroy_vehicle(
        &self,
        application_id: RecordId,
        id: RecordId,
    ) -> Result<u64, StorageError>;

    /// Reads an application tree, seeing this transaction's uncommitted writes.
    async fn find_application(&self, id: RecordId)
    -> Result<Option<ApplicationTree>, StorageError>;
}
