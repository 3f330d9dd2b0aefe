//! Phone number queries used by the confirmation flow.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgConnection;

use intake_core::PhoneNumber;
use intake_storage::StorageError;

use super::{chrono_to_time, record_id};
use crate::error::map_sqlx_error;

const COLUMNS: &str = "id, number, confirmation_code, created_at, updated_at";

type PhoneNumberRow = (i64, String, Option<i32>, DateTime<Utc>, DateTime<Utc>);

fn from_row(row: PhoneNumberRow) -> Result<PhoneNumber, StorageError> {
    let (id, number, confirmation_code, created_at, updated_at) = row;
    Ok(PhoneNumber {
        id: record_id(id)?,
        number,
        confirmation_code,
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    })
}

pub async fn find(
    conn: &mut PgConnection,
    number: &str,
) -> Result<Option<PhoneNumber>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM phone_numbers WHERE number = $1");
    let row: Option<PhoneNumberRow> = query_as(&sql)
        .bind(number)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to read phone number"))?;
    row.map(from_row).transpose()
}

/// Inserts the number unless present, then reads it back.
///
/// The boolean is `true` when this call inserted the row.
pub async fn find_or_create(
    conn: &mut PgConnection,
    number: &str,
) -> Result<(PhoneNumber, bool), StorageError> {
    let sql = format!(
        "INSERT INTO phone_numbers (number) VALUES ($1) \
         ON CONFLICT (number) DO NOTHING RETURNING {COLUMNS}"
    );
    let inserted: Option<PhoneNumberRow> = query_as(&sql)
        .bind(number)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to create phone number"))?;

    if let Some(row) = inserted {
        return Ok((from_row(row)?, true));
    }

    let existing = find(conn, number).await?.ok_or_else(|| {
        StorageError::internal(format!("Phone number {number} vanished after insert conflict"))
    })?;
    Ok((existing, false))
}

pub async fn set_confirmation_code(
    conn: &mut PgConnection,
    number: &str,
    code: i32,
) -> Result<u64, StorageError> {
    let result = query(
        "UPDATE phone_numbers SET confirmation_code = $2, updated_at = now() WHERE number = $1",
    )
    .bind(number)
    .bind(code)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(e, "Failed to store confirmation code"))?;
    Ok(result.rows_affected())
}
