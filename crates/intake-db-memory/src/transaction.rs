//! In-memory transaction with an undo journal.
//!
//! Writes are applied to the shared tables immediately and the inverse of each
//! write is journaled. Commit checks vehicle owner references (the in-memory
//! counterpart of a deferred foreign key) and discards the journal; rollback,
//! or dropping the transaction without committing, replays it in reverse.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::OwnedRwLockWriteGuard;

use intake_core::{
    Application, ApplicationAttributes, ApplicationPatch, EntityKind, Member, MemberAttributes,
    MemberPatch, RecordId, Vehicle, VehicleAttributes, VehiclePatch, now_utc,
};
use intake_storage::{ApplicationTree, StorageError, Transaction};

use crate::storage::Tables;

/// Inverse of a journaled write.
#[derive(Debug)]
enum UndoOp {
    RemoveApplication(RecordId),
    RestoreApplication(Application),
    RemoveMember(RecordId),
    RestoreMember(Member),
    RemoveVehicle(RecordId),
    RestoreVehicle(Vehicle),
}

/// Transaction over [`InMemoryStorage`](crate::InMemoryStorage).
pub struct InMemoryTransaction {
    tables: Arc<Tables>,
    journal: Mutex<Vec<UndoOp>>,
    finished: bool,
    _gate: OwnedRwLockWriteGuard<()>,
}

impl InMemoryTransaction {
    pub(crate) fn new(tables: Arc<Tables>, gate: OwnedRwLockWriteGuard<()>) -> Self {
        Self {
            tables,
            journal: Mutex::new(Vec::new()),
            finished: false,
            _gate: gate,
        }
    }

    fn record(&self, op: UndoOp) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }

    fn take_journal(&self) -> Vec<UndoOp> {
        std::mem::take(&mut *self.journal.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replays the journal in reverse, restoring the tables to their state at begin.
    fn undo(&self) -> usize {
        let journal = self.take_journal();
        let undone = journal.len();
        for op in journal.into_iter().rev() {
            match op {
                UndoOp::RemoveApplication(id) => {
                    self.tables.applications.pin().remove(&id);
                }
                UndoOp::RestoreApplication(app) => {
                    self.tables.applications.pin().insert(app.id, app);
                }
                UndoOp::RemoveMember(id) => {
                    self.tables.members.pin().remove(&id);
                }
                UndoOp::RestoreMember(member) => {
                    self.tables.members.pin().insert(member.id, member);
                }
                UndoOp::RemoveVehicle(id) => {
                    self.tables.vehicles.pin().remove(&id);
                }
                UndoOp::RestoreVehicle(vehicle) => {
                    self.tables.vehicles.pin().insert(vehicle.id, vehicle);
                }
            }
        }
        undone
    }

    fn ensure_application(&self, id: RecordId) -> Result<(), StorageError> {
        if self.tables.applications.pin().contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::constraint_violation(format!(
                "application {id} does not exist"
            )))
        }
    }

    /// Every vehicle must point at an existing member.
    fn check_owner_references(&self) -> Result<(), StorageError> {
        let members = self.tables.members.pin();
        let vehicles = self.tables.vehicles.pin();
        for vehicle in vehicles.values() {
            if !members.contains_key(&vehicle.owner_id) {
                return Err(StorageError::constraint_violation(format!(
                    "vehicle {} references missing owner {}",
                    vehicle.id, vehicle.owner_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Err(e) = self.check_owner_references() {
            self.undo();
            self.finished = true;
            return Err(e);
        }
        let writes = self.take_journal().len();
        self.finished = true;
        tracing::debug!(writes, "In-memory transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        let undone = self.undo();
        self.finished = true;
        tracing::debug!(undone, "In-memory transaction rolled back");
        Ok(())
    }

    async fn create_application(
        &self,
        attributes: &ApplicationAttributes,
    ) -> Result<Application, StorageError> {
        let now = now_utc();
        let app = Application {
            id: self.tables.next_id(EntityKind::Application)?,
            attributes: attributes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.tables.applications.pin().insert(app.id, app.clone());
        self.record(UndoOp::RemoveApplication(app.id));
        Ok(app)
    }

    async fn update_application(
        &self,
        id: RecordId,
        patch: &ApplicationPatch,
    ) -> Result<u64, StorageError> {
        let guard = self.tables.applications.pin();
        let Some(previous) = guard.get(&id).cloned() else {
            return Ok(0);
        };
        if patch.is_empty() {
            return Ok(1);
        }
        let mut updated = previous.clone();
        patch.apply(&mut updated.attributes);
        updated.updated_at = now_utc();
        guard.insert(id, updated);
        self.record(UndoOp::RestoreApplication(previous));
        Ok(1)
    }

    async fn create_member(
        &self,
        application_id: RecordId,
        attributes: &MemberAttributes,
    ) -> Result<Member, StorageError> {
        self.ensure_application(application_id)?;
        let now = now_utc();
        let member = Member {
            id: self.tables.next_id(EntityKind::Member)?,
            application_id,
            attributes: attributes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.tables.members.pin().insert(member.id, member.clone());
        self.record(UndoOp::RemoveMember(member.id));
        Ok(member)
    }

    async fn update_member(
        &self,
        application_id: RecordId,
        id: RecordId,
        patch: &MemberPatch,
    ) -> Result<u64, StorageError> {
        let guard = self.tables.members.pin();
        let previous = match guard.get(&id) {
            Some(member) if member.application_id == application_id => member.clone(),
            _ => return Ok(0),
        };
        if patch.is_empty() {
            return Ok(1);
        }
        let mut updated = previous.clone();
        patch.apply(&mut updated.attributes);
        updated.updated_at = now_utc();
        guard.insert(id, updated);
        self.record(UndoOp::RestoreMember(previous));
        Ok(1)
    }

    async fn destroy_member(
        &self,
        application_id: RecordId,
        id: RecordId,
    ) -> Result<u64, StorageError> {
        let guard = self.tables.members.pin();
        match guard.get(&id) {
            Some(member) if member.application_id == application_id => {}
            _ => return Ok(0),
        }
        match guard.remove(&id) {
            Some(removed) => {
                self.record(UndoOp::RestoreMember(removed.clone()));
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn create_vehicle(
        &self,
        application_id: RecordId,
        owner_id: RecordId,
        attributes: &VehicleAttributes,
    ) -> Result<Vehicle, StorageError> {
        self.ensure_application(application_id)?;
        let now = now_utc();
        let vehicle = Vehicle {
            id: self.tables.next_id(EntityKind::Vehicle)?,
            application_id,
            owner_id,
            attributes: attributes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.tables.vehicles.pin().insert(vehicle.id, vehicle.clone());
        self.record(UndoOp::RemoveVehicle(vehicle.id));
        Ok(vehicle)
    }

    async fn update_vehicle(
        &self,
        application_id: RecordId,
        id: RecordId,
        owner_id: RecordId,
        patch: &VehiclePatch,
    ) -> Result<u64, StorageError> {
        let guard = self.tables.vehicles.pin();
        let previous = match guard.get(&id) {
            Some(vehicle) if vehicle.application_id == application_id => vehicle.clone(),
            _ => return Ok(0),
        };
        if patch.is_empty() && previous.owner_id == owner_id {
            return Ok(1);
        }
        let mut updated = previous.clone();
        patch.apply(&mut updated.attributes);
        updated.owner_id = owner_id;
        updated.updated_at = now_utc();
        guard.insert(id, updated);
        self.record(UndoOp::RestoreVehicle(previous));
        Ok(1)
    }

    async fn destroy_vehicle(
        &self,
        application_id: RecordId,
        id: RecordId,
    ) -> Result<u64, StorageError> {
        let guard = self.tables.vehicles.pin();
        match guard.get(&id) {
            Some(vehicle) if vehicle.application_id == application_id => {}
            _ => return Ok(0),
        }
        match guard.remove(&id) {
            Some(removed) => {
                self.record(UndoOp::RestoreVehicle(removed.clone()));
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_application(
        &self,
        id: RecordId,
    ) -> Result<Option<ApplicationTree>, StorageError> {
        Ok(self.tables.tree(id))
    }
}

impl Drop for InMemoryTransaction {
    /// Rolls back writes that were neither committed nor explicitly rolled back.
    fn drop(&mut self) {
        if !self.finished {
            let undone = self.undo();
            if undone > 0 {
                tracing::warn!(
                    undone,
                    "InMemoryTransaction dropped without commit/rollback - rolled back"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;
    use intake_storage::IntakeStorage;

    fn member_named(first: &str) -> MemberAttributes {
        MemberAttributes {
            first: Some(first.to_string()),
            ..Default::default()
        }
    }

    async fn seeded() -> (InMemoryStorage, RecordId, RecordId) {
        let storage = InMemoryStorage::new();
        let tx = storage.begin_transaction().await.unwrap();
        let app = tx
            .create_application(&ApplicationAttributes::default())
            .await
            .unwrap();
        let member = tx.create_member(app.id, &member_named("Jo")).await.unwrap();
        tx.commit().await.unwrap();
        (storage, app.id, member.id)
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_state() {
        let (storage, app_id, member_id) = seeded().await;

        let tx = storage.begin_transaction().await.unwrap();
        tx.update_member(app_id, member_id, &MemberPatch::from(member_named("Sam")))
            .await
            .unwrap();
        tx.create_member(app_id, &member_named("Lee")).await.unwrap();
        tx.rollback().await.unwrap();

        let tree = storage.find_application(app_id).await.unwrap().unwrap();
        assert_eq!(tree.members.len(), 1);
        assert_eq!(tree.members[0].attributes.first.as_deref(), Some("Jo"));
    }

    #[tokio::test]
    async fn test_update_merges_present_keys_only() {
        let storage = InMemoryStorage::new();
        let tx = storage.begin_transaction().await.unwrap();
        let app = tx
            .create_application(&ApplicationAttributes {
                address: Some("1 Main St".into()),
                city: Some("Springfield".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let member = tx
            .create_member(
                app.id,
                &MemberAttributes {
                    age: Some(40),
                    email: Some("jo@example.com".into()),
                    first: Some("Jo".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let vehicle = tx
            .create_vehicle(
                app.id,
                member.id,
                &VehicleAttributes {
                    make: Some("Toyota".into()),
                    year: Some(2009),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let tx = storage.begin_transaction().await.unwrap();
        let affected = tx
            .update_application(app.id, &ApplicationPatch::default())
            .await
            .unwrap();
        assert_eq!(affected, 1);
        let first = MemberPatch {
            first: Some(Some("Joanna".into())),
            email: Some(None),
            ..Default::default()
        };
        tx.update_member(app.id, member.id, &first).await.unwrap();
        let make = VehiclePatch {
            make: Some(Some("Ford".into())),
            ..Default::default()
        };
        tx.update_vehicle(app.id, vehicle.id, member.id, &make)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let tree = storage.find_application(app.id).await.unwrap().unwrap();
        assert_eq!(tree.application.attributes.address.as_deref(), Some("1 Main St"));
        assert_eq!(tree.application.attributes.city.as_deref(), Some("Springfield"));
        let stored = &tree.members[0].attributes;
        assert_eq!(stored.first.as_deref(), Some("Joanna"));
        assert_eq!(stored.age, Some(40));
        assert!(stored.email.is_none());
        let stored = &tree.vehicles[0].attributes;
        assert_eq!(stored.make.as_deref(), Some("Ford"));
        assert_eq!(stored.year, Some(2009));
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let (storage, app_id, member_id) = seeded().await;

        {
            let tx = storage.begin_transaction().await.unwrap();
            assert_eq!(tx.destroy_member(app_id, member_id).await.unwrap(), 1);
        }

        let tree = storage.find_application(app_id).await.unwrap().unwrap();
        assert_eq!(tree.members.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_scoped_to_application() {
        let (storage, _app_id, member_id) = seeded().await;

        let tx = storage.begin_transaction().await.unwrap();
        let other = tx
            .create_application(&ApplicationAttributes::default())
            .await
            .unwrap();
        assert_eq!(
            tx.update_member(other.id, member_id, &MemberPatch::from(member_named("X")))
                .await
                .unwrap(),
            0
        );
        assert_eq!(tx.destroy_member(other.id, member_id).await.unwrap(), 0);
        tx.commit().await.unwrap();
        assert_eq!(storage.member_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_member_requires_application() {
        let storage = InMemoryStorage::new();
        let tx = storage.begin_transaction().await.unwrap();
        let missing = RecordId::new(99).unwrap();
        let err = tx
            .create_member(missing, &MemberAttributes::default())
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn test_commit_rejects_dangling_owner() {
        let (storage, app_id, member_id) = seeded().await;

        let tx = storage.begin_transaction().await.unwrap();
        tx.create_vehicle(app_id, member_id, &VehicleAttributes::default())
            .await
            .unwrap();
        tx.destroy_member(app_id, member_id).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_constraint_violation());

        let tree = storage.find_application(app_id).await.unwrap().unwrap();
        assert_eq!(tree.members.len(), 1);
        assert!(tree.vehicles.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writes_within_transaction() {
        let (storage, app_id, _) = seeded().await;

        let tx = storage.begin_transaction().await.unwrap();
        let names = ["A", "B", "C", "D"];
        let attrs: Vec<MemberAttributes> = names.iter().map(|n| member_named(n)).collect();
        let created =
            futures_util::future::try_join_all(attrs.iter().map(|a| tx.create_member(app_id, a)))
                .await
                .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(created.len(), 4);
        let tree = storage.find_application(app_id).await.unwrap().unwrap();
        assert_eq!(tree.members.len(), 5);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_rollback() {
        let (storage, app_id, member_id) = seeded().await;

        let tx = storage.begin_transaction().await.unwrap();
        let discarded = tx.create_member(app_id, &member_named("Tmp")).await.unwrap();
        tx.rollback().await.unwrap();

        let tx = storage.begin_transaction().await.unwrap();
        let kept = tx.create_member(app_id, &member_named("New")).await.unwrap();
        tx.commit().await.unwrap();

        assert!(discarded.id > member_id);
        assert!(kept.id > discarded.id);
    }
}
