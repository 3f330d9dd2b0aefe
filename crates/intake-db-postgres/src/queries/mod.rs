//! SQL query modules for the PostgreSQL storage backend.
//!
//! Every query takes a `&mut PgConnection`, so the same code serves pooled
//! connections and open transactions (`&mut **tx`).

use chrono::{DateTime, Utc};
use time::OffsetDateTime;

use intake_core::{RecordId, Timestamp};
use intake_storage::StorageError;

pub mod application;
pub mod member;
pub mod phone_number;
pub mod vehicle;

/// Converts chrono DateTime to the core timestamp type.
pub(crate) fn chrono_to_time(dt: DateTime<Utc>) -> Timestamp {
    let odt = OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        + time::Duration::nanoseconds(i64::from(dt.timestamp_subsec_nanos()));
    Timestamp::new(odt)
}

/// Converts a database key into a record id.
pub(crate) fn record_id(value: i64) -> Result<RecordId, StorageError> {
    RecordId::new(value).map_err(|e| StorageError::internal(format!("Invalid stored id: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn chrono_to_time_keeps_subseconds() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap()
            + chrono::Duration::nanoseconds(250_000_000);
        let ts = chrono_to_time(dt);
        assert_eq!(ts.unix_timestamp(), dt.timestamp());
        assert_eq!(ts.inner().nanosecond(), 250_000_000);
    }

    #[test]
    fn record_id_rejects_non_positive() {
        assert!(record_id(0).is_err());
        assert_eq!(record_id(7).unwrap().get(), 7);
    }
}
