//! The three-stage reconciliation pass.
//!
//! Application upsert, then members, then vehicles, all inside one store
//! transaction. Vehicle owners are resolved through the [`IdMapping`] built
//! by the member stage, and deletes run only after every create and update
//! has landed.

use futures_util::future::{try_join, try_join_all};
use tracing::instrument;

use intake_core::{
    ApplicationPatch, EntityKind, MemberAttributes, MemberPatch, RecordId, SubmissionKey,
    VehicleAttributes, VehiclePatch,
};
use intake_storage::{ApplicationView, IntakeStorage, Transaction};

use super::error::ReconcileError;
use super::mapping::IdMapping;
use super::submission::{ApplicationUpsert, Submission, SubmittedRecord, VehicleDraft};

/// Records touched by one pass, as `Entity/id` references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl ReconcileResult {
    fn created(&mut self, entity: EntityKind, id: RecordId) {
        self.created.push(format!("{entity}/{id}"));
    }

    fn updated(&mut self, entity: EntityKind, id: RecordId) {
        self.updated.push(format!("{entity}/{id}"));
    }

    fn deleted(&mut self, entity: EntityKind, id: RecordId) {
        self.deleted.push(format!("{entity}/{id}"));
    }
}

/// The outcome of a committed pass.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The application as stored after commit.
    pub view: ApplicationView,
    pub result: ReconcileResult,
}

/// Applies a submission to the store atomically.
///
/// On success the application is re-read after commit, so the returned view is
/// exactly what persisted. On any failure the transaction is rolled back and
/// nothing the pass wrote remains.
#[instrument(skip_all, fields(application_id = tracing::field::Empty))]
pub async fn reconcile(
    storage: &dyn IntakeStorage,
    submission: Submission,
) -> Result<Reconciled, ReconcileError> {
    let tx = storage.begin_transaction().await?;
    let mut result = ReconcileResult::default();

    let application_id = match apply(tx.as_ref(), submission, &mut result).await {
        Ok(id) => id,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to roll back reconciliation");
            }
            tracing::debug!(error = %err, "Reconciliation aborted");
            return Err(err);
        }
    };
    tx.commit().await?;

    tracing::Span::current().record("application_id", application_id.get());
    tracing::info!(
        application_id = %application_id,
        created = result.created.len(),
        updated = result.updated.len(),
        deleted = result.deleted.len(),
        "Application reconciled"
    );

    let view = storage
        .find_application(application_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(EntityKind::Application, application_id))?
        .into_view();

    Ok(Reconciled { view, result })
}

async fn apply(
    tx: &dyn Transaction,
    submission: Submission,
    result: &mut ReconcileResult,
) -> Result<RecordId, ReconcileError> {
    let application_id = upsert_application(tx, submission.application, result).await?;

    let members = MemberStage::partition(submission.members);
    let mapping = members.write(tx, application_id, result).await?;

    let vehicles = VehicleStage::resolve(submission.vehicles, &mapping)?;
    vehicles.write(tx, application_id, result).await?;

    delete_records(tx, application_id, &vehicles.delete, &members.delete, result).await?;
    verify_owner_references(tx, application_id).await?;

    Ok(application_id)
}

async fn upsert_application(
    tx: &dyn Transaction,
    upsert: ApplicationUpsert,
    result: &mut ReconcileResult,
) -> Result<RecordId, ReconcileError> {
    match upsert {
        ApplicationUpsert::Create(attributes) => {
            let application = tx.create_application(&attributes).await?;
            result.created(EntityKind::Application, application.id);
            Ok(application.id)
        }
        ApplicationUpsert::Update { id, patch } => {
            update_application(tx, id, &patch).await?;
            result.updated(EntityKind::Application, id);
            Ok(id)
        }
    }
}

async fn update_application(
    tx: &dyn Transaction,
    id: RecordId,
    patch: &ApplicationPatch,
) -> Result<(), ReconcileError> {
    let affected = tx.update_application(id, patch).await?;
    expect_affected(affected, EntityKind::Application, id)
}

// ==================== Members ====================

struct MemberStage {
    update: Vec<(RecordId, MemberPatch)>,
    create: Vec<(Option<SubmissionKey>, MemberAttributes)>,
    delete: Vec<RecordId>,
}

impl MemberStage {
    fn partition(records: Vec<SubmittedRecord<MemberPatch>>) -> Self {
        let mut stage = Self {
            update: Vec::new(),
            create: Vec::new(),
            delete: Vec::new(),
        };
        for record in records {
            match record {
                SubmittedRecord::Existing { id, attributes } => stage.update.push((id, attributes)),
                SubmittedRecord::New {
                    placeholder,
                    attributes,
                } => stage.create.push((placeholder, attributes.to_attributes())),
                SubmittedRecord::Deleted { id } => stage.delete.push(id),
            }
        }
        stage
    }

    /// Runs updates and creates concurrently and returns the finished mapping.
    async fn write(
        &self,
        tx: &dyn Transaction,
        application_id: RecordId,
        result: &mut ReconcileResult,
    ) -> Result<IdMapping, ReconcileError> {
        let updates = try_join_all(self.update.iter().map(|(id, patch)| async move {
            let affected = tx.update_member(application_id, *id, patch).await?;
            expect_affected(affected, EntityKind::Member, *id)?;
            Ok::<_, ReconcileError>(*id)
        }));
        let creates = try_join_all(self.create.iter().map(|(_, attributes)| async move {
            let member = tx.create_member(application_id, attributes).await?;
            Ok::<_, ReconcileError>(member.id)
        }));
        let (updated, created) = try_join(updates, creates).await?;

        let mut mapping = IdMapping::new();
        for id in updated {
            mapping.insert_existing(id);
            result.updated(EntityKind::Member, id);
        }
        // try_join_all yields results in input order
        for ((placeholder, _), id) in self.create.iter().zip(created) {
            if let Some(key) = placeholder {
                mapping.insert(key.clone(), id);
            }
            result.created(EntityKind::Member, id);
        }
        Ok(mapping)
    }
}

// ==================== Vehicles ====================

struct VehicleStage {
    update: Vec<(RecordId, RecordId, VehiclePatch)>,
    create: Vec<(RecordId, VehicleAttributes)>,
    delete: Vec<RecordId>,
}

impl VehicleStage {
    /// Rewrites every owner through the mapping before anything is written.
    fn resolve(
        records: Vec<SubmittedRecord<VehicleDraft>>,
        mapping: &IdMapping,
    ) -> Result<Self, ReconcileError> {
        let mut stage = Self {
            update: Vec::new(),
            create: Vec::new(),
            delete: Vec::new(),
        };
        for record in records {
            match record {
                SubmittedRecord::Existing { id, attributes } => {
                    let owner = resolve_owner(mapping, &attributes.owner, &id.to_string())?;
                    stage.update.push((id, owner, attributes.attributes));
                }
                SubmittedRecord::New {
                    placeholder,
                    attributes,
                } => {
                    let label = placeholder
                        .as_ref()
                        .map_or_else(|| "(new)".to_string(), ToString::to_string);
                    let owner = resolve_owner(mapping, &attributes.owner, &label)?;
                    stage.create.push((owner, attributes.attributes.to_attributes()));
                }
                SubmittedRecord::Deleted { id } => stage.delete.push(id),
            }
        }
        Ok(stage)
    }

    async fn write(
        &self,
        tx: &dyn Transaction,
        application_id: RecordId,
        result: &mut ReconcileResult,
    ) -> Result<(), ReconcileError> {
        let updates = try_join_all(self.update.iter().map(|(id, owner, patch)| async move {
            let affected = tx
                .update_vehicle(application_id, *id, *owner, patch)
                .await?;
            expect_affected(affected, EntityKind::Vehicle, *id)?;
            Ok::<_, ReconcileError>(*id)
        }));
        let creates = try_join_all(self.create.iter().map(|(owner, attributes)| async move {
            let vehicle = tx.create_vehicle(application_id, *owner, attributes).await?;
            Ok::<_, ReconcileError>(vehicle.id)
        }));
        let (updated, created) = try_join(updates, creates).await?;

        for id in updated {
            result.updated(EntityKind::Vehicle, id);
        }
        for id in created {
            result.created(EntityKind::Vehicle, id);
        }
        Ok(())
    }
}

fn resolve_owner(
    mapping: &IdMapping,
    owner: &SubmissionKey,
    vehicle: &str,
) -> Result<RecordId, ReconcileError> {
    mapping
        .resolve(owner)
        .ok_or_else(|| ReconcileError::dangling(vehicle, owner))
}

// ==================== Deletes ====================

/// Deletes the removed vehicles, then the removed members.
///
/// Each group runs concurrently; member deletes start only once every vehicle
/// delete has finished.
async fn delete_records(
    tx: &dyn Transaction,
    application_id: RecordId,
    vehicles: &[RecordId],
    members: &[RecordId],
    result: &mut ReconcileResult,
) -> Result<(), ReconcileError> {
    let vehicles = try_join_all(vehicles.iter().map(|id| async move {
        let affected = tx.destroy_vehicle(application_id, *id).await?;
        expect_affected(affected, EntityKind::Vehicle, *id)?;
        Ok::<_, ReconcileError>(*id)
    }))
    .await?;
    for id in vehicles {
        result.deleted(EntityKind::Vehicle, id);
    }

    let members = try_join_all(members.iter().map(|id| async move {
        let affected = tx.destroy_member(application_id, *id).await?;
        expect_affected(affected, EntityKind::Member, *id)?;
        Ok::<_, ReconcileError>(*id)
    }))
    .await?;
    for id in members {
        result.deleted(EntityKind::Member, id);
    }
    Ok(())
}

/// Every live vehicle must be owned by a live member of the same application.
async fn verify_owner_references(
    tx: &dyn Transaction,
    application_id: RecordId,
) -> Result<(), ReconcileError> {
    let tree = tx
        .find_application(application_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(EntityKind::Application, application_id))?;

    match tree.orphaned_vehicles().first() {
        Some(vehicle) => Err(ReconcileError::dangling(vehicle.id, vehicle.owner_id)),
        None => Ok(()),
    }
}

fn expect_affected(affected: u64, entity: EntityKind, id: RecordId) -> Result<(), ReconcileError> {
    if affected == 0 {
        Err(ReconcileError::not_found(entity, id))
    } else {
        Ok(())
    }
}
