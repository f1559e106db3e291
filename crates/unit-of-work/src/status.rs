//! Unit-of-work lifecycle state machine.

use crate::error::{Result, UnitOfWorkError};

/// The status of a unit of work in its lifecycle.
///
/// State transitions:
/// ```text
/// Active ──┬──► Committed ──┬──► Disposed
///          ├──► RolledBack ─┘
///          └───────────────────► Disposed (uninstructed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitOfWorkStatus {
    /// Participants are live and services may be resolved.
    #[default]
    Active,

    /// Every participant was asked to commit (terminal business outcome).
    Committed,

    /// Every participant was asked to roll back (terminal business outcome).
    RolledBack,

    /// Resources were released.
    Disposed,
}

impl UnitOfWorkStatus {
    /// Returns true if commit or rollback may still be called.
    pub fn can_complete(&self) -> bool {
        matches!(self, UnitOfWorkStatus::Active)
    }

    /// Returns true once a business outcome has been decided.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitOfWorkStatus::Committed | UnitOfWorkStatus::RolledBack
        )
    }

    /// Returns true after resources have been released.
    pub fn is_disposed(&self) -> bool {
        matches!(self, UnitOfWorkStatus::Disposed)
    }

    /// Validates a transition and returns the new status.
    pub fn transition(self, to: UnitOfWorkStatus) -> Result<UnitOfWorkStatus> {
        use UnitOfWorkStatus::*;

        match (self, to) {
            (Active, Committed) | (Active, RolledBack) => Ok(to),
            (Active, Disposed) | (Committed, Disposed) | (RolledBack, Disposed) => Ok(to),
            (from, to) => Err(UnitOfWorkError::InvalidTransition { from, to }),
        }
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfWorkStatus::Active => "Active",
            UnitOfWorkStatus::Committed => "Committed",
            UnitOfWorkStatus::RolledBack => "RolledBack",
            UnitOfWorkStatus::Disposed => "Disposed",
        }
    }
}

impl std::fmt::Display for UnitOfWorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
