use std::panic::Location;

use thiserror::Error;
use uuid::Uuid;

use crate::UnitOfWorkStatus;

/// Boxed error returned by participants and service factories.
///
/// Participants own heterogeneous resources (database transactions, caches),
/// so their failures are carried opaquely and surfaced through
/// [`UnitOfWorkError::Participant`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when creating or driving a unit of work.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// The requested lifecycle transition is not legal from the current status.
    #[error("Invalid unit of work transition from {from} to {to}")]
    InvalidTransition {
        from: UnitOfWorkStatus,
        to: UnitOfWorkStatus,
    },

    /// The unit of work was used after it was disposed.
    #[error("Unit of work {id} used after disposal")]
    UsedAfterDisposal { id: Uuid },

    /// The unit of work was used after commit or rollback.
    ///
    /// Only raised by debug builds.
    #[error(
        "Unit of work {id} used after it was {status} (created at {created_site}, completed at {completed_site})"
    )]
    UsedAfterCompletion {
        id: Uuid,
        status: UnitOfWorkStatus,
        created_site: &'static Location<'static>,
        completed_site: &'static Location<'static>,
    },

    /// No participant, service factory or ambient registration provides the type.
    #[error("Service not found: {type_name}")]
    ServiceNotFound { type_name: &'static str },

    /// Two registrations publish the same service type.
    #[error("Service type {type_name} is registered more than once")]
    DuplicateService { type_name: &'static str },

    /// The caller cancelled while participants were being created.
    #[error("Unit of work creation was cancelled")]
    Cancelled,

    /// A participant failed to be created, commit, roll back or dispose.
    #[error("Participant error: {0}")]
    Participant(#[source] BoxError),

    /// A service factory failed to build its service.
    #[error("Service factory for {type_name} failed: {source}")]
    ServiceFactory {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },
}

impl UnitOfWorkError {
    /// Returns true for programmer errors (protocol misuse or misconfiguration).
    ///
    /// These indicate a logic defect and must not be retried.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            UnitOfWorkError::InvalidTransition { .. }
                | UnitOfWorkError::UsedAfterDisposal { .. }
                | UnitOfWorkError::UsedAfterCompletion { .. }
                | UnitOfWorkError::DuplicateService { .. }
        )
    }
}

/// Result type for unit-of-work operations.
pub type Result<T> = std::result::Result<T, UnitOfWorkError>;
