//! Member queries.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgConnection;

use intake_core::{Member, MemberAttributes, MemberPatch, RecordId};
use intake_storage::StorageError;

use super::{chrono_to_time, record_id};
use crate::error::map_sqlx_error;

const COLUMNS: &str =
    r#"id, application_id, age, email, gender, "first", "last", created_at, updated_at"#;

type MemberRow = (
    i64,
    i64,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn from_row(row: MemberRow) -> Result<Member, StorageError> {
    let (id, application_id, age, email, gender, first, last, created_at, updated_at) = row;
    Ok(Member {
        id: record_id(id)?,
        application_id: record_id(application_id)?,
        attributes: MemberAttributes {
            age,
            email,
            gender,
            first,
            last,
        },
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    })
}

pub async fn create(
    conn: &mut PgConnection,
    application_id: RecordId,
    attributes: &MemberAttributes,
) -> Result<Member, StorageError> {
    let sql = format!(
        r#"INSERT INTO members (application_id, age, email, gender, "first", "last")
           VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"#
    );
    let row: MemberRow = query_as(&sql)
        .bind(application_id.get())
        .bind(attributes.age)
        .bind(attributes.email.as_deref())
        .bind(attributes.gender.as_deref())
        .bind(attributes.first.as_deref())
        .bind(attributes.last.as_deref())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to create member"))?;
    from_row(row)
}

/// Merges `patch` into a member of the application. Returns the affected row count.
pub async fn update(
    conn: &mut PgConnection,
    application_id: RecordId,
    id: RecordId,
    patch: &MemberPatch,
) -> Result<u64, StorageError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM members WHERE application_id = $1 AND id = $2 FOR UPDATE"
    );
    let row: Option<MemberRow> = query_as(&sql)
        .bind(application_id.get())
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to lock member"))?;
    let Some(row) = row else {
        return Ok(0);
    };
    if patch.is_empty() {
        return Ok(1);
    }
    let mut attributes = from_row(row)?.attributes;
    patch.apply(&mut attributes);
    write(conn, application_id, id, &attributes).await
}

async fn write(
    conn: &mut PgConnection,
    application_id: RecordId,
    id: RecordId,
    attributes: &MemberAttributes,
) -> Result<u64, StorageError> {
    let result = query(
        r#"UPDATE members SET age = $3, email = $4, gender = $5, "first" = $6, "last" = $7,
           updated_at = now()
           WHERE application_id = $1 AND id = $2"#,
    )
    .bind(application_id.get())
    .bind(id.get())
    .bind(attributes.age)
    .bind(attributes.email.as_deref())
    .bind(attributes.gender.as_deref())
    .bind(attributes.first.as_deref())
    .bind(attributes.last.as_deref())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(e, "Failed to update member"))?;
    Ok(result.rows_affected())
}

pub async fn destroy(
    conn: &mut PgConnection,
    application_id: RecordId,
    id: RecordId,
) -> Result<u64, StorageError> {
    let result = query("DELETE FROM members WHERE application_id = $1 AND id = $2")
        .bind(application_id.get())
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to delete member"))?;
    Ok(result.rows_affected())
}

pub async fn find_by_application(
    conn: &mut PgConnection,
    application_id: RecordId,
) -> Result<Vec<Member>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM members WHERE application_id = $1 ORDER BY id");
    let rows: Vec<MemberRow> = query_as(&sql)
        .bind(application_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to read members"))?;
    rows.into_iter().map(from_row).collect()
}
