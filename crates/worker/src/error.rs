//! Worker error types.

use import::BusError;
use metrics_exporter_prometheus::BuildError;
use party::PartyStoreError;
use thiserror::Error;
use unit_of_work::UnitOfWorkError;

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Party store error: {0}")]
    Store(#[from] PartyStoreError),

    #[error("Unit of work error: {0}")]
    UnitOfWork(#[from] UnitOfWorkError),

    #[error("Metrics exporter error: {0}")]
    Metrics(#[from] BuildError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Batcher task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
