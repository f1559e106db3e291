//! In-memory party store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::EntityId;
use tokio::sync::{Mutex, RwLock};
use unit_of_work::{BoxError, CancellationToken, Participant, ParticipantFactory, ServiceRegistry, ServiceTypes};

use crate::model::Party;
use crate::repository::PartyRepository;
use crate::{PartyStoreError, Result};

#[derive(Default)]
struct DatabaseState {
    parties: HashMap<EntityId, Party>,
    fail_on_upsert: HashSet<EntityId>,
    commits: usize,
    rollbacks: usize,
}

/// Shared durable map of parties.
///
/// Each unit of work gets its own [`InMemoryPartyParticipant`] that stages
/// writes and applies them here only on commit.
#[derive(Clone, Default)]
pub struct InMemoryPartyDatabase {
    state: Arc<RwLock<DatabaseState>>,
}

impl InMemoryPartyDatabase {
    /// Creates a new empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a participant factory writing to this database.
    pub fn participant_factory(&self) -> InMemoryPartyParticipantFactory {
        InMemoryPartyParticipantFactory {
            database: self.clone(),
        }
    }

    /// Makes every upsert of `id` fail with a constraint violation.
    pub async fn fail_on_upsert(&self, id: EntityId) {
        self.state.write().await.fail_on_upsert.insert(id);
    }

    /// Removes every injected failure.
    pub async fn clear_failures(&self) {
        self.state.write().await.fail_on_upsert.clear();
    }

    /// Returns the committed party with the given id.
    pub async fn get(&self, id: EntityId) -> Option<Party> {
        self.state.read().await.parties.get(&id).cloned()
    }

    /// Returns the number of committed parties.
    pub async fn party_count(&self) -> usize {
        self.state.read().await.parties.len()
    }

    /// Returns the number of committed units of work.
    pub async fn commit_count(&self) -> usize {
        self.state.read().await.commits
    }

    /// Returns the number of rolled back units of work.
    pub async fn rollback_count(&self) -> usize {
        self.state.read().await.rollbacks
    }
}

/// Creates one staging participant per unit of work.
#[derive(Clone)]
pub struct InMemoryPartyParticipantFactory {
    database: InMemoryPartyDatabase,
}

#[async_trait]
impl ParticipantFactory for InMemoryPartyParticipantFactory {
    type Participant = InMemoryPartyParticipant;

    fn service_types(&self, services: &mut ServiceTypes<Self::Participant>) {
        services.provide(|p: &InMemoryPartyParticipant| -> Arc<dyn PartyRepository> {
            p.session.clone()
        });
    }

    async fn create(
        &self,
        _ambient: &ServiceRegistry,
        _cancellation: &CancellationToken,
    ) -> std::result::Result<Self::Participant, BoxError> {
        Ok(InMemoryPartyParticipant {
            session: Arc::new(StagingSession {
                database: self.database.clone(),
                staged: Mutex::new(Some(HashMap::new())),
            }),
        })
    }
}

/// Writes staged by one unit of work. `None` once the work has ended.
struct StagingSession {
    database: InMemoryPartyDatabase,
    staged: Mutex<Option<HashMap<EntityId, Party>>>,
}

#[async_trait]
impl PartyRepository for StagingSession {
    async fn upsert(&self, party: &Party) -> Result<()> {
        if self
            .database
            .state
            .read()
            .await
            .fail_on_upsert
            .contains(&party.id)
        {
            return Err(PartyStoreError::ConstraintViolation {
                id: party.id,
                reason: "injected upsert failure".to_string(),
            });
        }

        let mut staged = self.staged.lock().await;
        let staged = staged.as_mut().ok_or(PartyStoreError::TransactionClosed)?;
        staged.insert(party.id, party.clone());
        Ok(())
    }

    async fn get(&self, id: EntityId) -> Result<Option<Party>> {
        {
            let staged = self.staged.lock().await;
            let staged = staged.as_ref().ok_or(PartyStoreError::TransactionClosed)?;
            if let Some(party) = staged.get(&id) {
                return Ok(Some(party.clone()));
            }
        }
        Ok(self.database.get(id).await)
    }
}

/// Per-unit-of-work participant over an [`InMemoryPartyDatabase`].
///
/// Uninstructed disposal discards staged writes.
pub struct InMemoryPartyParticipant {
    session: Arc<StagingSession>,
}

impl InMemoryPartyParticipant {
    async fn take_staged(&self) -> Result<HashMap<EntityId, Party>> {
        self.session
            .staged
            .lock()
            .await
            .take()
            .ok_or(PartyStoreError::TransactionClosed)
    }
}

#[async_trait]
impl Participant for InMemoryPartyParticipant {
    async fn commit(&self) -> std::result::Result<(), BoxError> {
        let staged = self.take_staged().await?;
        let mut state = self.session.database.state.write().await;
        let written = staged.len();
        state.parties.extend(staged);
        state.commits += 1;
        tracing::debug!(written, "in-memory party writes committed");
        Ok(())
    }

    async fn rollback(&self) -> std::result::Result<(), BoxError> {
        let staged = self.take_staged().await?;
        self.session.database.state.write().await.rollbacks += 1;
        tracing::debug!(discarded = staged.len(), "in-memory party writes rolled back");
        Ok(())
    }

    async fn dispose(&self) -> std::result::Result<(), BoxError> {
        if let Some(staged) = self.session.staged.lock().await.take()
            && !staged.is_empty()
        {
            tracing::debug!(discarded = staged.len(), "in-memory party writes discarded on dispose");
        }
        Ok(())
    }
}
