//! Application queries, including the tree read that joins members and vehicles.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgConnection;

use intake_core::{Application, ApplicationAttributes, ApplicationPatch, RecordId};
use intake_storage::{ApplicationTree, StorageError};

use super::{chrono_to_time, member, record_id, vehicle};
use crate::error::map_sqlx_error;

const COLUMNS: &str = "id, address, city, confirmation_code, number_of_bedrooms, phone_number, \
                       state, zip, created_at, updated_at";

type ApplicationRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn from_row(row: ApplicationRow) -> Result<Application, StorageError> {
    let (
        id,
        address,
        city,
        confirmation_code,
        number_of_bedrooms,
        phone_number,
        state,
        zip,
        created_at,
        updated_at,
    ) = row;
    Ok(Application {
        id: record_id(id)?,
        attributes: ApplicationAttributes {
            address,
            city,
            confirmation_code,
            number_of_bedrooms,
            phone_number,
            state,
            zip,
        },
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    })
}

/// Inserts an application and returns the stored row.
pub async fn create(
    conn: &mut PgConnection,
    attributes: &ApplicationAttributes,
) -> Result<Application, StorageError> {
    let sql = format!(
        "INSERT INTO applications \
         (address, city, confirmation_code, number_of_bedrooms, phone_number, state, zip) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
    );
    let row: ApplicationRow = query_as(&sql)
        .bind(attributes.address.as_deref())
        .bind(attributes.city.as_deref())
        .bind(attributes.confirmation_code)
        .bind(attributes.number_of_bedrooms)
        .bind(attributes.phone_number.as_deref())
        .bind(attributes.state.as_deref())
        .bind(attributes.zip.as_deref())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to create application"))?;
    from_row(row)
}

/// Writes the keys present in `patch` over the stored row.
///
/// The row is locked and merged in place. Returns the affected row count; an
/// empty patch reports 1 for an existing row without writing.
pub async fn update(
    conn: &mut PgConnection,
    id: RecordId,
    patch: &ApplicationPatch,
) -> Result<u64, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM applications WHERE id = $1 FOR UPDATE");
    let row: Option<ApplicationRow> = query_as(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to lock application"))?;
    let Some(row) = row else {
        return Ok(0);
    };
    if patch.is_empty() {
        return Ok(1);
    }
    let mut attributes = from_row(row)?.attributes;
    patch.apply(&mut attributes);
    write(conn, id, &attributes).await
}

async fn write(
    conn: &mut PgConnection,
    id: RecordId,
    attributes: &ApplicationAttributes,
) -> Result<u64, StorageError> {
    let result = query(
        "UPDATE applications SET address = $2, city = $3, confirmation_code = $4, \
         number_of_bedrooms = $5, phone_number = $6, state = $7, zip = $8, updated_at = now() \
         WHERE id = $1",
    )
    .bind(id.get())
    .bind(attributes.address.as_deref())
    .bind(attributes.city.as_deref())
    .bind(attributes.confirmation_code)
    .bind(attributes.number_of_bedrooms)
    .bind(attributes.phone_number.as_deref())
    .bind(attributes.state.as_deref())
    .bind(attributes.zip.as_deref())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(e, "Failed to update application"))?;
    Ok(result.rows_affected())
}

/// Reads one application row.
pub async fn find(
    conn: &mut PgConnection,
    id: RecordId,
) -> Result<Option<Application>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM applications WHERE id = $1");
    let row: Option<ApplicationRow> = query_as(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to read application"))?;
    row.map(from_row).transpose()
}

/// Reads an application with its members and vehicles, ordered by id.
pub async fn find_tree(
    conn: &mut PgConnection,
    id: RecordId,
) -> Result<Option<ApplicationTree>, StorageError> {
    let Some(application) = find(conn, id).await? else {
        return Ok(None);
    };
    let members = member::find_by_application(conn, id).await?;
    let vehicles = vehicle::find_by_application(conn, id).await?;
    Ok(Some(ApplicationTree {
        application,
        members,
        vehicles,
    }))
}

/// Lists every application id in ascending order.
pub async fn list_ids(conn: &mut PgConnection) -> Result<Vec<RecordId>, StorageError> {
    let ids: Vec<i64> = query_scalar("SELECT id FROM applications ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to list applications"))?;
    ids.into_iter().map(record_id).collect()
}

/// Finds the lowest application id registered for a phone number.
pub async fn find_id_by_phone(
    conn: &mut PgConnection,
    phone_number: &str,
) -> Result<Option<RecordId>, StorageError> {
    let id: Option<i64> = query_scalar(
        "SELECT id FROM applications WHERE phone_number = $1 ORDER BY id LIMIT 1",
    )
    .bind(phone_number)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(e, "Failed to look up application by phone number"))?;
    id.map(record_id).transpose()
}
