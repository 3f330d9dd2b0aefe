//! PostgreSQL implementation of the IntakeStorage trait.

use async_trait::async_trait;
use sqlx_core::pool::PoolConnection;
use sqlx_postgres::{PgConnection, PgPool, Postgres};
use tracing::instrument;

use intake_core::{PhoneNumber, RecordId};
use intake_storage::{ApplicationTree, IntakeStorage, StorageError, Transaction};

use crate::config::PostgresConfig;
use crate::error::map_sqlx_error;
use crate::pool;
use crate::queries;
use crate::schema;
use crate::transaction::PostgresTransaction;

/// PostgreSQL storage backend for applications, members, vehicles and phone numbers.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new `PostgresStorage` with the given configuration.
    ///
    /// This will:
    /// 1. Create a connection pool
    /// 2. Create missing tables (if configured)
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if the schema bootstrap fails.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;

        if config.ensure_schema {
            schema::ensure_schema(&pool).await?;
        }

        Ok(Self { pool })
    }

    async fn acquire(&self) -> Result<PoolConnection<Postgres>, StorageError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error(e, "Failed to acquire connection"))
    }
}

#[async_trait]
impl IntakeStorage for PostgresStorage {
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let tx = self.pool.begin().await.map_err(|e| {
            StorageError::transaction_error(format!("Failed to begin transaction: {e}"))
        })?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    #[instrument(skip(self), fields(application_id = %id))]
    async fn find_application(
        &self,
        id: RecordId,
    ) -> Result<Option<ApplicationTree>, StorageError> {
        let mut conn = self.acquire().await?;
        queries::application::find_tree(&mut conn, id).await
    }

    #[instrument(skip(self))]
    async fn find_all_applications(&self) -> Result<Vec<ApplicationTree>, StorageError> {
        let mut conn = self.acquire().await?;
        let conn: &mut PgConnection = &mut conn;
        let ids = queries::application::list_ids(conn).await?;
        let mut trees = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tree) = queries::application::find_tree(conn, id).await? {
                trees.push(tree);
            }
        }
        Ok(trees)
    }

    #[instrument(skip(self, phone_number))]
    async fn find_application_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<ApplicationTree>, StorageError> {
        let mut conn = self.acquire().await?;
        match queries::application::find_id_by_phone(&mut conn, phone_number).await? {
            Some(id) => queries::application::find_tree(&mut conn, id).await,
            None => Ok(None),
        }
    }

    async fn find_phone_number(&self, number: &str) -> Result<Option<PhoneNumber>, StorageError> {
        let mut conn = self.acquire().await?;
        queries::phone_number::find(&mut conn, number).await
    }

    async fn find_or_create_phone_number(
        &self,
        number: &str,
    ) -> Result<(PhoneNumber, bool), StorageError> {
        let mut conn = self.acquire().await?;
        queries::phone_number::find_or_create(&mut conn, number).await
    }

    async fn set_confirmation_code(&self, number: &str, code: i32) -> Result<u64, StorageError> {
        let mut conn = self.acquire().await?;
        queries::phone_number::set_confirmation_code(&mut conn, number, code).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        pool::ping(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
