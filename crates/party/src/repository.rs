//! The party persistence service.

use async_trait::async_trait;
use common::EntityId;

use crate::Result;
use crate::model::Party;

/// Reads and writes parties inside a unit of work.
///
/// Published by persistence participants. Writes become durable only when
/// the owning unit of work commits.
#[async_trait]
pub trait PartyRepository: Send + Sync {
    /// Inserts the party or replaces the stored row with the same id.
    async fn upsert(&self, party: &Party) -> Result<()>;

    /// Returns the party as seen by this unit of work.
    async fn get(&self, id: EntityId) -> Result<Option<Party>>;
}
