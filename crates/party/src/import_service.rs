//! Scoped import service composed per unit of work.

use std::sync::Arc;

use common::EntityId;
use unit_of_work::{BoxError, ServiceFactory, UnitOfWork};

use crate::clock::Clock;
use crate::error::PartyError;
use crate::repository::PartyRepository;
use crate::validation::ValidatedParty;

/// Writes validated parties through the unit of work's repository.
pub struct PartyImportService {
    repository: Arc<dyn PartyRepository>,
    clock: Arc<dyn Clock>,
}

impl PartyImportService {
    pub fn new(repository: Arc<dyn PartyRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Re-checks the party, stamps its import time and upserts it.
    #[tracing::instrument(skip(self, party), fields(party_id = %party.id()))]
    pub async fn import(&self, party: &ValidatedParty) -> Result<EntityId, PartyError> {
        party.party().validate()?;

        let mut stamped = party.party().clone();
        stamped.imported_at = Some(self.clock.now());
        self.repository.upsert(&stamped).await?;

        tracing::debug!(kind = %stamped.kind(), "party imported");
        Ok(stamped.id)
    }
}

/// Builds a [`PartyImportService`] from the repository a participant
/// publishes and the ambient [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PartyImportServiceFactory;

impl ServiceFactory for PartyImportServiceFactory {
    type Service = PartyImportService;

    fn create(&self, uow: &UnitOfWork) -> Result<Arc<Self::Service>, BoxError> {
        Ok(Arc::new(PartyImportService::new(
            uow.get_required_service::<dyn PartyRepository>()?,
            uow.get_required_service::<dyn Clock>()?,
        )))
    }
}
