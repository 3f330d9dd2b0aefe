//! PostgreSQL transaction implementation.
//!
//! Wraps an sqlx transaction so a reconciliation pass is applied atomically.
//! Record methods take `&self` and serialize on an internal mutex, since sqlx
//! needs exclusive access to the connection for every statement.

use async_trait::async_trait;
use sqlx_postgres::PgTransaction;
use tokio::sync::Mutex;

use intake_core::{
    Application, ApplicationAttributes, ApplicationPatch, Member, MemberAttributes, MemberPatch,
    RecordId, Vehicle, VehicleAttributes, VehiclePatch,
};
use intake_storage::{ApplicationTree, StorageError, Transaction};

use crate::error::map_sqlx_error;
use crate::queries;

const COMPLETED: &str = "Transaction already completed (committed or rolled back)";

/// PostgreSQL transaction wrapper.
///
/// The transaction automatically rolls back on drop if not explicitly committed.
pub struct PostgresTransaction {
    /// Wrapped in Option so commit/rollback can take ownership.
    /// Box allows us to work without lifetime parameters.
    tx: Mutex<Option<Box<PgTransaction<'static>>>>,
}

impl PostgresTransaction {
    /// Creates a new PostgreSQL transaction.
    pub fn new(tx: PgTransaction<'static>) -> Self {
        Self {
            tx: Mutex::new(Some(Box::new(tx))),
        }
    }
}

/// Locks the transaction and yields its connection, or fails if it already finished.
macro_rules! with_conn {
    ($self:ident, |$conn:ident| $body:expr) => {{
        let mut tx_guard = $self.tx.lock().await;
        let tx = tx_guard
            .as_deref_mut()
            .ok_or_else(|| StorageError::transaction_error(COMPLETED))?;
        let $conn = &mut **tx;
        $body.await
    }};
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error(e, "Failed to commit transaction"))?;
            tracing::debug!("Transaction committed successfully");
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback().await.map_err(|e| {
                StorageError::transaction_error(format!("Failed to rollback transaction: {e}"))
            })?;
            tracing::debug!("Transaction rolled back successfully");
        }
        Ok(())
    }

    async fn create_application(
        &self,
        attributes: &ApplicationAttributes,
    ) -> Result<Application, StorageError> {
        with_conn!(self, |conn| queries::application::create(conn, attributes))
    }

    async fn update_application(
        &self,
        id: RecordId,
        patch: &ApplicationPatch,
    ) -> Result<u64, StorageError> {
        with_conn!(self, |conn| queries::application::update(conn, id, patch))
    }

    async fn create_member(
        &self,
        application_id: RecordId,
        attributes: &MemberAttributes,
    ) -> Result<Member, StorageError> {
        with_conn!(self, |conn| queries::member::create(
            conn,
            application_id,
            attributes
        ))
    }

    async fn update_member(
        &self,
        application_id: RecordId,
        id: RecordId,
        patch: &MemberPatch,
    ) -> Result<u64, StorageError> {
        with_conn!(self, |conn| queries::member::update(
            conn,
            application_id,
            id,
            patch
        ))
    }

    async fn destroy_member(
        &self,
        application_id: RecordId,
        id: RecordId,
    ) -> Result<u64, StorageError> {
        with_conn!(self, |conn| queries::member::destroy(
            conn,
            application_id,
            id
        ))
    }

    async fn create_vehicle(
        &self,
        application_id: RecordId,
        owner_id: RecordId,
        attributes: &VehicleAttributes,
    ) -> Result<Vehicle, StorageError> {
        with_conn!(self, |conn| queries::vehicle::create(
            conn,
            application_id,
            owner_id,
            attributes
        ))
    }

    async fn update_vehicle(
        &self,
        application_id: RecordId,
        id: RecordId,
        owner_id: RecordId,
        patch: &VehiclePatch,
    ) -> Result<u64, StorageError> {
        with_conn!(self, |conn| queries::vehicle::update(
            conn,
            application_id,
            id,
            owner_id,
            patch
        ))
    }

    async fn destroy_vehicle(
        &self,
        application_id: RecordId,
        id: RecordId,
    ) -> Result<u64, StorageError> {
        with_conn!(self, |conn| queries::vehicle::destroy(
            conn,
            application_id,
            id
        ))
    }

    async fn find_application(
        &self,
        id: RecordId,
    ) -> Result<Option<ApplicationTree>, StorageError> {
        // Sees uncommitted changes within this transaction
        with_conn!(self, |conn| queries::application::find_tree(conn, id))
    }
}

impl Drop for PostgresTransaction {
    /// sqlx's Transaction Drop implementation issues the ROLLBACK; this only
    /// reports that it happened.
    fn drop(&mut self) {
        if self.tx.get_mut().is_some() {
            tracing::warn!(
                "PostgresTransaction dropped without explicit commit/rollback - will auto-rollback"
            );
        }
    }
}
