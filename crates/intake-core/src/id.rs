//! Identifier types.
//!
//! Persisted records are keyed by [`RecordId`], a positive integer assigned by
//! the store. Submissions from offline clients refer to records through a
//! [`SubmissionKey`], which is either the decimal form of a real id or a
//! client-chosen placeholder that is only meaningful inside one submission.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// A persisted record id. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RecordId(i64);

impl RecordId {
    pub fn new(value: i64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(CoreError::invalid_id(value.to_string()))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for RecordId {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl FromStr for RecordId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s.trim().parse().map_err(|_| CoreError::invalid_id(s))?;
        Self::new(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identifier a record carries inside a submission.
///
/// JSON numbers and strings are both accepted and normalized to their string
/// form, so `5` and `"5"` name the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionKey(String);

impl SubmissionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets the key as a real persisted id, if it is one.
    pub fn to_record_id(&self) -> Option<RecordId> {
        self.0.parse().ok()
    }
}

impl From<RecordId> for SubmissionKey {
    fn from(id: RecordId) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for SubmissionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SubmissionKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

struct SubmissionKeyVisitor;

impl Visitor<'_> for SubmissionKeyVisitor {
    type Value = SubmissionKey;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or integer identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(SubmissionKey(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
        Ok(SubmissionKey(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(SubmissionKey(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(SubmissionKey(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
        // Clients built on JS number types may send integral floats like 3.0
        if v.fract() == 0.0 && v.is_finite() {
            Ok(SubmissionKey(format!("{}", v as i64)))
        } else {
            Ok(SubmissionKey(v.to_string()))
        }
    }
}

impl<'de> Deserialize<'de> for SubmissionKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SubmissionKeyVisitor)
    }
}
