use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use tokio::sync::RwLock;

use intake_core::{
    Application, EntityKind, Member, PhoneNumber, RecordId, Vehicle, now_utc,
};
use intake_storage::{ApplicationTree, IntakeStorage, StorageError, Transaction};

use crate::transaction::InMemoryTransaction;

/// The record tables shared by the storage handle and its transactions.
#[derive(Debug)]
pub(crate) struct Tables {
    pub(crate) applications: PapayaHashMap<RecordId, Application>,
    pub(crate) members: PapayaHashMap<RecordId, Member>,
    pub(crate) vehicles: PapayaHashMap<RecordId, Vehicle>,
    pub(crate) phone_numbers: PapayaHashMap<String, PhoneNumber>,
    application_seq: AtomicI64,
    member_seq: AtomicI64,
    vehicle_seq: AtomicI64,
    phone_number_seq: AtomicI64,
}

impl Tables {
    fn new() -> Self {
        Self {
            applications: PapayaHashMap::new(),
            members: PapayaHashMap::new(),
            vehicles: PapayaHashMap::new(),
            phone_numbers: PapayaHashMap::new(),
            application_seq: AtomicI64::new(0),
            member_seq: AtomicI64::new(0),
            vehicle_seq: AtomicI64::new(0),
            phone_number_seq: AtomicI64::new(0),
        }
    }

    /// Allocates the next id for an entity. Ids are never reused, even after rollback.
    pub(crate) fn next_id(&self, entity: EntityKind) -> Result<RecordId, StorageError> {
        let seq = match entity {
            EntityKind::Application => &self.application_seq,
            EntityKind::Member => &self.member_seq,
            EntityKind::Vehicle => &self.vehicle_seq,
            EntityKind::PhoneNumber => &self.phone_number_seq,
        };
        let value = seq.fetch_add(1, Ordering::SeqCst) + 1;
        RecordId::new(value).map_err(|e| StorageError::internal(e.to_string()))
    }

    /// Assembles an application with its members and vehicles, ordered by id.
    pub(crate) fn tree(&self, id: RecordId) -> Option<ApplicationTree> {
        let application = self.applications.pin().get(&id).cloned()?;

        let mut members: Vec<Member> = self
            .members
            .pin()
            .values()
            .filter(|m| m.application_id == id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.id);

        let mut vehicles: Vec<Vehicle> = self
            .vehicles
            .pin()
            .values()
            .filter(|v| v.application_id == id)
            .cloned()
            .collect();
        vehicles.sort_by_key(|v| v.id);

        Some(ApplicationTree {
            application,
            members,
            vehicles,
        })
    }

    fn application_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.applications.pin().keys().copied().collect();
        ids.sort();
        ids
    }
}

/// In-memory storage backend using papaya lock-free HashMaps.
///
/// This storage implementation provides:
/// - Lock-free concurrent reads via papaya::HashMap
/// - Per-entity id sequences starting at 1
/// - Transactions with an undo journal, rolled back on drop
///
/// A transaction holds the gate exclusively from `begin_transaction` until it
/// commits, rolls back or is dropped. Reads outside a transaction share the
/// gate, so they wait for an open transaction and never observe its
/// uncommitted writes.
#[derive(Debug)]
pub struct InMemoryStorage {
    pub(crate) tables: Arc<Tables>,
    gate: Arc<RwLock<()>>,
}

impl InMemoryStorage {
    /// Creates a new, empty in-memory storage.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Tables::new()),
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Number of committed members across all applications.
    pub async fn member_count(&self) -> usize {
        let _read = self.gate.read().await;
        self.tables.members.pin().len()
    }

    /// Number of committed vehicles across all applications.
    pub async fn vehicle_count(&self) -> usize {
        let _read = self.gate.read().await;
        self.tables.vehicles.pin().len()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntakeStorage for InMemoryStorage {
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let gate = self.gate.clone().write_owned().await;
        Ok(Box::new(InMemoryTransaction::new(self.tables.clone(), gate)))
    }

    async fn find_application(
        &self,
        id: RecordId,
    ) -> Result<Option<ApplicationTree>, StorageError> {
        let _read = self.gate.read().await;
        Ok(self.tables.tree(id))
    }

    async fn find_all_applications(&self) -> Result<Vec<ApplicationTree>, StorageError> {
        let _read = self.gate.read().await;
        Ok(self
            .tables
            .application_ids()
            .into_iter()
            .filter_map(|id| self.tables.tree(id))
            .collect())
    }

    async fn find_application_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<ApplicationTree>, StorageError> {
        let _read = self.gate.read().await;
        let id = {
            let guard = self.tables.applications.pin();
            guard
                .values()
                .filter(|a| a.attributes.phone_number.as_deref() == Some(phone_number))
                .map(|a| a.id)
                .min()
        };
        Ok(id.and_then(|id| self.tables.tree(id)))
    }

    async fn find_phone_number(&self, number: &str) -> Result<Option<PhoneNumber>, StorageError> {
        Ok(self.tables.phone_numbers.pin().get(number).cloned())
    }

    async fn find_or_create_phone_number(
        &self,
        number: &str,
    ) -> Result<(PhoneNumber, bool), StorageError> {
        let guard = self.tables.phone_numbers.pin();
        if let Some(existing) = guard.get(number) {
            return Ok((existing.clone(), false));
        }

        let now = now_utc();
        let candidate = PhoneNumber {
            id: self.tables.next_id(EntityKind::PhoneNumber)?,
            number: number.to_string(),
            confirmation_code: None,
            created_at: now,
            updated_at: now,
        };

        // Another caller may have won the race between get and insert
        match guard.try_insert(number.to_string(), candidate) {
            Ok(inserted) => Ok((inserted.clone(), true)),
            Err(occupied) => Ok((occupied.current.clone(), false)),
        }
    }

    async fn set_confirmation_code(&self, number: &str, code: i32) -> Result<u64, StorageError> {
        let now = now_utc();
        let guard = self.tables.phone_numbers.pin();
        let updated = guard.update(number.to_string(), |existing| PhoneNumber {
            confirmation_code: Some(code),
            updated_at: now,
            ..existing.clone()
        });
        Ok(u64::from(updated.is_some()))
    }

    fn backend_name(&self) -> &'static str {
        "in-memory-papaya"
    }
}
