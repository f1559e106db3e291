//! PostgreSQL party store.

use std::sync::Arc;

use async_trait::async_trait;
use common::EntityId;
use sqlx::{PgPool, Postgres, Row, Transaction, error::ErrorKind, postgres::PgRow};
use tokio::sync::Mutex;
use unit_of_work::{BoxError, CancellationToken, Participant, ParticipantFactory, ServiceRegistry, ServiceTypes};
use uuid::Uuid;

use crate::model::{Party, PartyDetails};
use crate::repository::PartyRepository;
use crate::{PartyStoreError, Result};

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// Begins one database transaction per unit of work.
#[derive(Clone)]
pub struct PostgresPartyParticipantFactory {
    pool: PgPool,
}

impl PostgresPartyParticipantFactory {
    /// Creates a factory drawing connections from `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ParticipantFactory for PostgresPartyParticipantFactory {
    type Participant = PostgresPartyParticipant;

    fn service_types(&self, services: &mut ServiceTypes<Self::Participant>) {
        services.provide(|p: &PostgresPartyParticipant| -> Arc<dyn PartyRepository> {
            p.repository.clone()
        });
    }

    async fn create(
        &self,
        _ambient: &ServiceRegistry,
        _cancellation: &CancellationToken,
    ) -> std::result::Result<Self::Participant, BoxError> {
        let transaction: SharedTransaction = Arc::new(Mutex::new(Some(self.pool.begin().await?)));
        Ok(PostgresPartyParticipant {
            repository: Arc::new(TransactionRepository {
                transaction: transaction.clone(),
            }),
            transaction,
        })
    }
}

struct TransactionRepository {
    transaction: SharedTransaction,
}

fn row_to_party(row: PgRow) -> Result<Party> {
    let details: PartyDetails = serde_json::from_value(row.try_get("details")?)?;

    Ok(Party {
        id: EntityId::from_uuid(row.try_get::<Uuid, _>("id")?),
        display_name: Some(row.try_get("display_name")?),
        created_at: Some(row.try_get("created_at")?),
        imported_at: row.try_get("imported_at")?,
        details,
    })
}

#[async_trait]
impl PartyRepository for TransactionRepository {
    async fn upsert(&self, party: &Party) -> Result<()> {
        let details = serde_json::to_value(&party.details)?;

        let mut guard = self.transaction.lock().await;
        let tx = guard.as_mut().ok_or(PartyStoreError::TransactionClosed)?;

        sqlx::query(
            r#"
            INSERT INTO parties (id, kind, display_name, created_at, details, imported_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                kind = EXCLUDED.kind,
                display_name = EXCLUDED.display_name,
                created_at = EXCLUDED.created_at,
                details = EXCLUDED.details,
                imported_at = EXCLUDED.imported_at
            "#,
        )
        .bind(party.id.as_uuid())
        .bind(party.kind().as_str())
        .bind(&party.display_name)
        .bind(party.created_at)
        .bind(details)
        .bind(party.imported_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && matches!(
                    db_err.kind(),
                    ErrorKind::CheckViolation | ErrorKind::NotNullViolation
                )
            {
                return PartyStoreError::ConstraintViolation {
                    id: party.id,
                    reason: db_err.message().to_string(),
                };
            }
            PartyStoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get(&self, id: EntityId) -> Result<Option<Party>> {
        let mut guard = self.transaction.lock().await;
        let tx = guard.as_mut().ok_or(PartyStoreError::TransactionClosed)?;

        let row = sqlx::query(
            r#"
            SELECT id, display_name, created_at, details, imported_at
            FROM parties
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(row_to_party).transpose()
    }
}

/// Per-unit-of-work participant owning one PostgreSQL transaction.
///
/// Uninstructed disposal drops the transaction, which rolls it back.
pub struct PostgresPartyParticipant {
    transaction: SharedTransaction,
    repository: Arc<TransactionRepository>,
}

impl PostgresPartyParticipant {
    async fn take(&self) -> Result<Transaction<'static, Postgres>> {
        self.transaction
            .lock()
            .await
            .take()
            .ok_or(PartyStoreError::TransactionClosed)
    }
}

#[async_trait]
impl Participant for PostgresPartyParticipant {
    async fn commit(&self) -> std::result::Result<(), BoxError> {
        self.take().await?.commit().await?;
        Ok(())
    }

    async fn rollback(&self) -> std::result::Result<(), BoxError> {
        self.take().await?.rollback().await?;
        Ok(())
    }

    async fn dispose(&self) -> std::result::Result<(), BoxError> {
        if self.transaction.lock().await.take().is_some() {
            tracing::debug!("open party transaction dropped on dispose");
        }
        Ok(())
    }
}
