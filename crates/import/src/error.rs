//! Import error types.

use common::EntityId;
use party::{PartyError, PartyStoreError, ValidationError};
use thiserror::Error;
use unit_of_work::UnitOfWorkError;

/// Errors raised by the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The receiving side is gone.
    #[error("Bus channel closed")]
    Closed,

    /// The bus refused the message.
    #[error("Bus rejected message: {0}")]
    Rejected(String),
}

/// Errors raised by the job tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("Job tracker unavailable: {0}")]
    Unavailable(String),
}

/// One message of a batch that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    /// Position of the message in the batch.
    pub index: usize,
    pub entity_id: EntityId,
    pub error: ValidationError,
}

/// Errors that can occur while importing parties.
#[derive(Debug, Error)]
pub enum ImportError {
    /// A message is missing required fields.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Some messages of a batch failed validation.
    #[error("{} message(s) failed validation", .failures.len())]
    InvalidBatch { failures: Vec<MessageFailure> },

    /// The unit of work could not be created or completed.
    #[error("Unit of work error: {0}")]
    UnitOfWork(#[from] UnitOfWorkError),

    /// The party store rejected a write.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PartyStoreError),

    /// More distinct jobs than the watermark buffer holds.
    #[error("Watermark buffer capacity {capacity} exceeded")]
    WatermarkCapacity { capacity: usize },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Job tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

impl From<PartyError> for ImportError {
    fn from(error: PartyError) -> Self {
        match error {
            PartyError::Validation(error) => Self::Validation(error),
            PartyError::Store(error) => Self::Persistence(error),
        }
    }
}

/// Convenience type alias for import results.
pub type Result<T> = std::result::Result<T, ImportError>;
