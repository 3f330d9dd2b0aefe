//! Vehicle queries.
//!
//! The owner reference is checked by a deferred foreign key, so a dangling
//! `owner_id` surfaces as a constraint violation at commit rather than here.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgConnection;

use intake_core::{RecordId, Vehicle, VehicleAttributes, VehiclePatch};
use intake_storage::StorageError;

use super::{chrono_to_time, record_id};
use crate::error::map_sqlx_error;

const COLUMNS: &str = "id, application_id, owner_id, license_plate, make, model, year, \
                       created_at, updated_at";

type VehicleRow = (
    i64,
    i64,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i32>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn from_row(row: VehicleRow) -> Result<Vehicle, StorageError> {
    let (id, application_id, owner_id, license_plate, make, model, year, created_at, updated_at) =
        row;
    Ok(Vehicle {
        id: record_id(id)?,
        application_id: record_id(application_id)?,
        owner_id: record_id(owner_id)?,
        attributes: VehicleAttributes {
            license_plate,
            make,
            model,
            year,
        },
        created_at: chrono_to_time(created_at),
        updated_at: chrono_to_time(updated_at),
    })
}

pub async fn create(
    conn: &mut PgConnection,
    application_id: RecordId,
    owner_id: RecordId,
    attributes: &VehicleAttributes,
) -> Result<Vehicle, StorageError> {
    let sql = format!(
        "INSERT INTO vehicles (application_id, owner_id, license_plate, make, model, year) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
    );
    let row: VehicleRow = query_as(&sql)
        .bind(application_id.get())
        .bind(owner_id.get())
        .bind(attributes.license_plate.as_deref())
        .bind(attributes.make.as_deref())
        .bind(attributes.model.as_deref())
        .bind(attributes.year)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to create vehicle"))?;
    from_row(row)
}

/// Moves a vehicle to `owner_id` and merges `patch` into it.
pub async fn update(
    conn: &mut PgConnection,
    application_id: RecordId,
    id: RecordId,
    owner_id: RecordId,
    patch: &VehiclePatch,
) -> Result<u64, StorageError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM vehicles WHERE application_id = $1 AND id = $2 FOR UPDATE"
    );
    let row: Option<VehicleRow> = query_as(&sql)
        .bind(application_id.get())
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to lock vehicle"))?;
    let Some(row) = row else {
        return Ok(0);
    };
    let stored = from_row(row)?;
    if patch.is_empty() && stored.owner_id == owner_id {
        return Ok(1);
    }
    let mut attributes = stored.attributes;
    patch.apply(&mut attributes);
    write(conn, application_id, id, owner_id, &attributes).await
}

async fn write(
    conn: &mut PgConnection,
    application_id: RecordId,
    id: RecordId,
    owner_id: RecordId,
    attributes: &VehicleAttributes,
) -> Result<u64, StorageError> {
    let result = query(
        "UPDATE vehicles SET owner_id = $3, license_plate = $4, make = $5, model = $6, \
         year = $7, updated_at = now() \
         WHERE application_id = $1 AND id = $2",
    )
    .bind(application_id.get())
    .bind(id.get())
    .bind(owner_id.get())
    .bind(attributes.license_plate.as_deref())
    .bind(attributes.make.as_deref())
    .bind(attributes.model.as_deref())
    .bind(attributes.year)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(e, "Failed to update vehicle"))?;
    Ok(result.rows_affected())
}

pub async fn destroy(
    conn: &mut PgConnection,
    application_id: RecordId,
    id: RecordId,
) -> Result<u64, StorageError> {
    let result = query("DELETE FROM vehicles WHERE application_id = $1 AND id = $2")
        .bind(application_id.get())
        .bind(id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to delete vehicle"))?;
    Ok(result.rows_affected())
}

pub async fn find_by_application(
    conn: &mut PgConnection,
    application_id: RecordId,
) -> Result<Vec<Vehicle>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM vehicles WHERE application_id = $1 ORDER BY id");
    let rows: Vec<VehicleRow> = query_as(&sql)
        .bind(application_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to read vehicles"))?;
    rows.into_iter().map(from_row).collect()
}
