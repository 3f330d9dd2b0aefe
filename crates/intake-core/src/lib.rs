pub mod error;
pub mod id;
pub mod model;
pub mod patch;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use id::{RecordId, SubmissionKey};
pub use model::{
    Application, ApplicationAttributes, EntityKind, Member, MemberAttributes, PhoneNumber,
    Vehicle, VehicleAttributes,
};
pub use patch::{ApplicationPatch, MemberPatch, VehiclePatch};
pub use time::{Timestamp, now_utc};
