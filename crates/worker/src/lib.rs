//! Party import worker.
//!
//! Reads newline-delimited upsert messages, validates them, groups the
//! valid ones into batches and imports each batch in one unit of work.

pub mod batcher;
pub mod config;
pub mod error;
pub mod publisher;
pub mod source;

use std::sync::Arc;

use party::{
    Clock, InMemoryPartyDatabase, PartyImportServiceFactory, PostgresPartyParticipantFactory,
    SystemClock,
};
use sqlx::postgres::PgPoolOptions;
use unit_of_work::{ServiceRegistry, UnitOfWorkError, UnitOfWorkManager};

pub use batcher::{Batcher, BatcherStats};
pub use config::{Config, LogFormat};
pub use error::WorkerError;
pub use publisher::NdjsonPublisher;
pub use source::{SourceStats, read_messages};

/// Where imported parties are persisted.
#[derive(Clone)]
pub enum PartyStore {
    InMemory(InMemoryPartyDatabase),
    Postgres(PostgresPartyParticipantFactory),
}

/// Connects to PostgreSQL when `DATABASE_URL` is set, else uses memory.
pub async fn connect_store(config: &Config) -> Result<PartyStore, WorkerError> {
    let Some(url) = &config.database_url else {
        tracing::info!("no DATABASE_URL set, using in-memory party store");
        return Ok(PartyStore::InMemory(InMemoryPartyDatabase::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;
    let factory = PostgresPartyParticipantFactory::new(pool);
    factory.run_migrations().await?;
    tracing::info!("connected to PostgreSQL party store");

    Ok(PartyStore::Postgres(factory))
}

/// Builds the unit-of-work manager for batch imports.
///
/// The store's participant publishes the party repository, the import
/// service is scoped per unit of work and the clock is ambient.
pub fn build_manager(store: &PartyStore) -> Result<UnitOfWorkManager, UnitOfWorkError> {
    let ambient = ServiceRegistry::new().with::<dyn Clock>(Arc::new(SystemClock));
    let builder = UnitOfWorkManager::builder(Arc::new(ambient)).service(PartyImportServiceFactory);

    let builder = match store {
        PartyStore::InMemory(database) => builder.participant(database.participant_factory()),
        PartyStore::Postgres(factory) => builder.participant(factory.clone()),
    };
    builder.build()
}
