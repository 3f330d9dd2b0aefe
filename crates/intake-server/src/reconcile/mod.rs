//! Reconciliation of client-submitted application trees.
//!
//! A submission is resolved at the boundary ([`submission`]) and then applied
//! in three ordered stages ([`engine`]):
//! - application upsert
//! - members, producing the [`IdMapping`] from submission keys to stored ids
//! - vehicles, whose owners are rewritten through that mapping

mod engine;
mod error;
mod mapping;
mod submission;

pub use engine::{ReconcileResult, Reconciled, reconcile};
pub use error::ReconcileError;
pub use mapping::IdMapping;
pub use submission::{
    ApplicationPayload, ApplicationUpsert, MemberPayload, Submission, SubmissionMode,
    SubmissionPayload, SubmittedRecord, VehicleDraft, VehiclePayload,
};
