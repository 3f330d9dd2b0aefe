//! The submission boundary.
//!
//! Clients send their offline copy of an application tree with `local` and
//! `removed` markers on members and vehicles. The wire form is parsed here
//! and resolved once into [`SubmittedRecord`] variants, so the engine never
//! looks at the markers.

use std::collections::HashSet;

use serde::Deserialize;

use intake_core::{
    ApplicationAttributes, ApplicationPatch, EntityKind, MemberPatch, RecordId, SubmissionKey,
    VehiclePatch,
};

use super::error::ReconcileError;

// ==================== Wire form ====================

/// The tree a client submits: `{ application, members, vehicles }`.
///
/// Attribute keys a record leaves out keep their stored value on update.
/// A revision without `application` leaves the application untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionPayload {
    #[serde(default)]
    pub application: ApplicationPayload,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
    #[serde(default)]
    pub vehicles: Vec<VehiclePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationPayload {
    #[serde(default)]
    pub id: Option<SubmissionKey>,
    #[serde(flatten)]
    pub attributes: ApplicationPatch,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberPayload {
    #[serde(default)]
    pub id: Option<SubmissionKey>,
    #[serde(default)]
    pub local: Option<bool>,
    #[serde(default)]
    pub removed: Option<bool>,
    #[serde(flatten)]
    pub attributes: MemberPatch,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePayload {
    #[serde(default)]
    pub id: Option<SubmissionKey>,
    #[serde(default)]
    pub owner_id: Option<SubmissionKey>,
    #[serde(default)]
    pub local: Option<bool>,
    #[serde(default)]
    pub removed: Option<bool>,
    #[serde(flatten)]
    pub attributes: VehiclePatch,
}

// ==================== Resolved form ====================

/// A member or vehicle as the client left it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmittedRecord<A> {
    /// Already persisted; the keys it carries overwrite the stored ones.
    Existing { id: RecordId, attributes: A },
    /// Created offline. The placeholder is how other records in the same
    /// submission refer to it.
    New {
        placeholder: Option<SubmissionKey>,
        attributes: A,
    },
    /// Deleted offline.
    Deleted { id: RecordId },
}

/// Vehicle attributes together with the submission-time key of the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleDraft {
    pub owner: SubmissionKey,
    pub attributes: VehiclePatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationUpsert {
    Create(ApplicationAttributes),
    Update { id: RecordId, patch: ApplicationPatch },
}

/// How the submitted tree relates to what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Nothing is stored yet; every record is new.
    Initial,
    /// The tree revises the stored application with this id.
    Revision(RecordId),
}

/// A submission ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub application: ApplicationUpsert,
    pub members: Vec<SubmittedRecord<MemberPatch>>,
    pub vehicles: Vec<SubmittedRecord<VehicleDraft>>,
}

impl SubmissionPayload {
    /// Resolves markers into record states and validates the tree.
    pub fn resolve(self, mode: SubmissionMode) -> Result<Submission, ReconcileError> {
        let application = resolve_application(self.application, mode)?;

        let mut members = Vec::with_capacity(self.members.len());
        let mut member_keys = HashSet::new();
        for (index, member) in self.members.into_iter().enumerate() {
            let state = classify(
                EntityKind::Member,
                index,
                member.id,
                member.local,
                member.removed,
                mode,
            )?;
            let record = match state {
                RecordState::Skip => continue,
                RecordState::Existing(id) => SubmittedRecord::Existing {
                    id,
                    attributes: member.attributes,
                },
                RecordState::New(placeholder) => SubmittedRecord::New {
                    placeholder,
                    attributes: member.attributes,
                },
                RecordState::Deleted(id) => SubmittedRecord::Deleted { id },
            };
            if let Some(key) = record_key(&record) {
                if !member_keys.insert(key.clone()) {
                    return Err(ReconcileError::validation(format!(
                        "Member id {key} appears more than once in the submission"
                    )));
                }
            }
            members.push(record);
        }

        let mut vehicles = Vec::with_capacity(self.vehicles.len());
        let mut vehicle_keys = HashSet::new();
        for (index, vehicle) in self.vehicles.into_iter().enumerate() {
            let state = classify(
                EntityKind::Vehicle,
                index,
                vehicle.id,
                vehicle.local,
                vehicle.removed,
                mode,
            )?;
            let record = match state {
                RecordState::Skip => continue,
                RecordState::Deleted(id) => SubmittedRecord::Deleted { id },
                RecordState::Existing(id) => SubmittedRecord::Existing {
                    id,
                    attributes: draft(index, vehicle.owner_id, vehicle.attributes)?,
                },
                RecordState::New(placeholder) => SubmittedRecord::New {
                    placeholder,
                    attributes: draft(index, vehicle.owner_id, vehicle.attributes)?,
                },
            };
            if let Some(key) = record_key(&record) {
                if !vehicle_keys.insert(key.clone()) {
                    return Err(ReconcileError::validation(format!(
                        "Vehicle id {key} appears more than once in the submission"
                    )));
                }
            }
            vehicles.push(record);
        }

        Ok(Submission {
            application,
            members,
            vehicles,
        })
    }
}

fn resolve_application(
    payload: ApplicationPayload,
    mode: SubmissionMode,
) -> Result<ApplicationUpsert, ReconcileError> {
    match mode {
        SubmissionMode::Initial => {
            if let Some(id) = payload.id {
                return Err(ReconcileError::validation(format!(
                    "Application id {id} must not be set when creating an application"
                )));
            }
            Ok(ApplicationUpsert::Create(payload.attributes.to_attributes()))
        }
        SubmissionMode::Revision(id) => {
            if let Some(body_id) = payload.id {
                if body_id.to_record_id() != Some(id) {
                    return Err(ReconcileError::validation(format!(
                        "Application id {body_id} in body does not match {id} in path"
                    )));
                }
            }
            Ok(ApplicationUpsert::Update {
                id,
                patch: payload.attributes,
            })
        }
    }
}

/// The state a record's markers put it in, before attributes are attached.
enum RecordState {
    Existing(RecordId),
    New(Option<SubmissionKey>),
    Deleted(RecordId),
    /// Removed before it was ever stored.
    Skip,
}

fn classify(
    kind: EntityKind,
    index: usize,
    id: Option<SubmissionKey>,
    local: Option<bool>,
    removed: Option<bool>,
    mode: SubmissionMode,
) -> Result<RecordState, ReconcileError> {
    let local = local.unwrap_or(false);
    let removed = removed.unwrap_or(false);

    if local && removed {
        return Err(ReconcileError::validation(format!(
            "{kind} at index {index} is marked both local and removed"
        )));
    }

    if mode == SubmissionMode::Initial {
        return Ok(if removed {
            RecordState::Skip
        } else {
            RecordState::New(id)
        });
    }

    if local {
        return match id {
            Some(placeholder) => Ok(RecordState::New(Some(placeholder))),
            None => Err(ReconcileError::validation(format!(
                "{kind} at index {index} is marked local but has no id"
            ))),
        };
    }

    let persisted = id.as_ref().and_then(SubmissionKey::to_record_id);
    match (persisted, removed) {
        (Some(id), true) => Ok(RecordState::Deleted(id)),
        (Some(id), false) => Ok(RecordState::Existing(id)),
        (None, true) => Err(ReconcileError::validation(format!(
            "{kind} at index {index} is marked removed but has no valid id"
        ))),
        (None, false) => Err(ReconcileError::validation(match id {
            Some(key) => format!(
                "{kind} at index {index} has id {key}, which is not a stored id; mark it local to create it"
            ),
            None => format!("{kind} at index {index} has no id and is not marked local"),
        })),
    }
}

fn draft(
    index: usize,
    owner: Option<SubmissionKey>,
    attributes: VehiclePatch,
) -> Result<VehicleDraft, ReconcileError> {
    let owner = owner.ok_or_else(|| {
        ReconcileError::validation(format!("Vehicle at index {index} has no ownerId"))
    })?;
    Ok(VehicleDraft { owner, attributes })
}

fn record_key<A>(record: &SubmittedRecord<A>) -> Option<SubmissionKey> {
    match record {
        SubmittedRecord::Existing { id, .. } | SubmittedRecord::Deleted { id } => {
            Some(SubmissionKey::from(*id))
        }
        SubmittedRecord::New { placeholder, .. } => placeholder.clone(),
    }
}
