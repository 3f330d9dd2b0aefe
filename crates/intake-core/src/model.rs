//! Persisted record shapes.
//!
//! Attribute sets are kept separate from the persisted records that wrap them:
//! the attribute set is what a client may write, the record adds the
//! store-owned fields (id, foreign keys, timestamps). Field names on the wire
//! follow the mobile client's existing contract, which mixes camelCase
//! attributes with a snake_case `application_id` foreign key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::RecordId;
use crate::time::Timestamp;

/// The entity types managed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Application,
    Member,
    Vehicle,
    PhoneNumber,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Member => "Member",
            Self::Vehicle => "Vehicle",
            Self::PhoneNumber => "PhoneNumber",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationAttributes {
    pub address: Option<String>,
    pub city: Option<String>,
    pub confirmation_code: Option<i32>,
    pub number_of_bedrooms: Option<i32>,
    pub phone_number: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

/// The root record of one housing/benefits application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: RecordId,
    #[serde(flatten)]
    pub attributes: ApplicationAttributes,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberAttributes {
    pub age: Option<i32>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

/// A person attached to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: RecordId,
    #[serde(rename = "application_id")]
    pub application_id: RecordId,
    #[serde(flatten)]
    pub attributes: MemberAttributes,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleAttributes {
    pub license_plate: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
}

/// A vehicle attached to an application and owned by one of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: RecordId,
    #[serde(rename = "application_id")]
    pub application_id: RecordId,
    pub owner_id: RecordId,
    #[serde(flatten)]
    pub attributes: VehicleAttributes,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A phone number awaiting or holding a confirmation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub id: RecordId,
    pub number: String,
    pub confirmation_code: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
