//! Bus messages of the import pipeline.

use common::EntityId;
use party::{Party, ValidatedParty, ValidationError};
use serde::{Deserialize, Serialize};

use crate::tracking::Tracking;

/// Inbound request to create or replace a party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertPartyMessage {
    pub entity: Party,
    pub tracking: Tracking,
}

impl UpsertPartyMessage {
    pub fn new(entity: Party, tracking: Tracking) -> Self {
        Self { entity, tracking }
    }

    /// Checks required fields and converts into the validated command.
    pub fn validate(self) -> Result<ValidatedUpsertParty, ValidationError> {
        Ok(ValidatedUpsertParty {
            entity: self.entity.into_validated()?,
            tracking: self.tracking,
        })
    }
}

/// An upsert whose entity passed validation.
///
/// Deserializing one validates the entity again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedUpsertParty {
    entity: ValidatedParty,
    tracking: Tracking,
}

impl ValidatedUpsertParty {
    pub fn entity(&self) -> &ValidatedParty {
        &self.entity
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn tracking(&self) -> &Tracking {
        &self.tracking
    }
}

/// Confirmation published once a party upsert has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyUpserted {
    pub entity_id: EntityId,
}
