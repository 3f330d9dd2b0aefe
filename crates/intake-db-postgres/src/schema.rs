//! Table bootstrap for the PostgreSQL storage backend.
//!
//! Tables are created when missing and left untouched otherwise. Vehicle owner
//! references are checked at commit (`DEFERRABLE INITIALLY DEFERRED`) so a
//! reconciliation pass may create members and the vehicles pointing at them in
//! any order within one transaction.

use sqlx_core::query::query;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{PostgresError, Result};

/// Statements executed in order by [`ensure_schema`].
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS applications (
        id BIGSERIAL PRIMARY KEY,
        address TEXT,
        city TEXT,
        confirmation_code INTEGER,
        number_of_bedrooms INTEGER,
        phone_number TEXT,
        state TEXT,
        zip TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS applications_phone_number_idx
        ON applications (phone_number)"#,
    r#"CREATE TABLE IF NOT EXISTS members (
        id BIGSERIAL PRIMARY KEY,
        application_id BIGINT NOT NULL REFERENCES applications (id) ON DELETE CASCADE,
        age INTEGER,
        email TEXT,
        gender TEXT,
        "first" TEXT,
        "last" TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS members_application_id_idx
        ON members (application_id)"#,
    r#"CREATE TABLE IF NOT EXISTS vehicles (
        id BIGSERIAL PRIMARY KEY,
        application_id BIGINT NOT NULL REFERENCES applications (id) ON DELETE CASCADE,
        owner_id BIGINT NOT NULL REFERENCES members (id) DEFERRABLE INITIALLY DEFERRED,
        license_plate TEXT,
        make TEXT,
        model TEXT,
        year INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS vehicles_application_id_idx
        ON vehicles (application_id)"#,
    r#"CREATE TABLE IF NOT EXISTS phone_numbers (
        id BIGSERIAL PRIMARY KEY,
        number TEXT NOT NULL UNIQUE,
        confirmation_code INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
];

/// Creates any missing tables and indexes.
///
/// Idempotent: existing tables are not altered.
///
/// # Errors
///
/// Returns `PostgresError::Schema` if a statement fails.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    info!(
        statements = SCHEMA_STATEMENTS.len(),
        "Ensuring intake schema"
    );

    for statement in SCHEMA_STATEMENTS {
        query(statement)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::Schema(e.to_string()))?;
    }

    debug!("Intake schema ready");
    Ok(())
}
