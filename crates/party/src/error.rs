//! Party error types.

use common::EntityId;
use thiserror::Error;

use crate::validation::ValidationError;

/// Errors raised by a party store.
#[derive(Debug, Error)]
pub enum PartyStoreError {
    /// The store refused the write.
    #[error("Constraint violation for party {id}: {reason}")]
    ConstraintViolation { id: EntityId, reason: String },

    /// The participant's transaction already ended.
    #[error("Transaction already closed")]
    TransactionClosed,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Party details could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while importing a party.
#[derive(Debug, Error)]
pub enum PartyError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] PartyStoreError),
}

/// Result type for party store operations.
pub type Result<T> = std::result::Result<T, PartyStoreError>;
