//! The unit-of-work instance and its lifecycle.

use std::any::{TypeId, type_name};
use std::future::Future;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Result, UnitOfWorkError};
use crate::manager::{Resolver, Shared, UnitOfWorkOptions};
use crate::participant::Participant;
use crate::registry::downcast;
use crate::service::ServiceSlots;
use crate::UnitOfWorkStatus;

#[cfg(any(test, feature = "leak-tracking"))]
use crate::live::LiveInstance;

#[derive(Debug)]
struct Lifecycle {
    status: UnitOfWorkStatus,
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    completed_site: Option<&'static Location<'static>>,
}

/// A set of participants and scoped services behind one commit/rollback boundary.
///
/// The owner must end it with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) and then release it with
/// [`dispose`](Self::dispose). Disposal alone never rolls back; each
/// participant decides what an uninstructed disposal means for its resource.
pub struct UnitOfWork {
    id: Uuid,
    options: UnitOfWorkOptions,
    participants: Vec<Box<dyn Participant>>,
    slots: ServiceSlots,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    cancellation: CancellationToken,
    completion: CancellationToken,
    created_site: &'static Location<'static>,
    span: tracing::Span,
}

impl UnitOfWork {
    pub(crate) fn new(
        options: UnitOfWorkOptions,
        participants: Vec<Box<dyn Participant>>,
        shared: Arc<Shared>,
        cancellation: CancellationToken,
        created_site: &'static Location<'static>,
    ) -> Self {
        let id = Uuid::new_v4();
        let span = tracing::info_span!(
            "unit_of_work",
            %id,
            activity = %options.activity_name,
            participants = participants.len(),
        );
        span.in_scope(|| {
            tracing::debug!(tags = ?options.tags, links = ?options.links, %created_site, "unit of work created");
        });

        #[cfg(any(test, feature = "leak-tracking"))]
        shared.live.register(LiveInstance {
            id,
            activity: options.activity_name.clone(),
            created_site,
        });

        Self {
            id,
            slots: ServiceSlots::new(shared.slot_count),
            options,
            participants,
            shared,
            lifecycle: Mutex::new(Lifecycle {
                status: UnitOfWorkStatus::Active,
                completed_site: None,
            }),
            cancellation,
            completion: CancellationToken::new(),
            created_site,
            span,
        }
    }

    /// Returns the unique id of this unit of work.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the activity name it was created for.
    pub fn activity(&self) -> &str {
        &self.options.activity_name
    }

    /// Returns the tags it was created with.
    pub fn tags(&self) -> &[(String, String)] {
        &self.options.tags
    }

    /// Returns the correlation links it was created with.
    pub fn links(&self) -> &[String] {
        &self.options.links
    }

    /// Returns the current status.
    pub fn status(&self) -> UnitOfWorkStatus {
        self.lifecycle().status
    }

    /// Returns where the unit of work was created.
    pub fn created_site(&self) -> &'static Location<'static> {
        self.created_site
    }

    /// The caller's cancellation token, passed through for participants and services.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// A token cancelled once commit or rollback has run.
    ///
    /// Independent of the caller's token. Observers such as a held lease can
    /// wait on it to learn when the business transaction is over.
    pub fn completion_token(&self) -> CancellationToken {
        self.completion.clone()
    }

    /// Returns the number of service-factory slots populated so far.
    pub fn created_service_count(&self) -> usize {
        self.slots.populated()
    }

    /// Resolves a service: participants first, then service factories, then
    /// the ambient registry.
    ///
    /// Returns `Ok(None)` when nothing provides `T`.
    pub fn get_service<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.ensure_usable()?;

        match self.shared.resolvers.get(&TypeId::of::<T>()) {
            Some(Resolver::Participant { index, accessor }) => Ok(self
                .participants
                .get(*index)
                .and_then(|participant| accessor(participant.as_ref()))
                .as_ref()
                .and_then(downcast::<T>)),
            Some(Resolver::Service { slot, factory }) => {
                let service = self
                    .slots
                    .get_or_create::<T>(*slot, || factory.create_handle(self))
                    .map_err(|source| UnitOfWorkError::ServiceFactory {
                        type_name: factory.service_name(),
                        source,
                    })?;
                // A concurrent dispose may have released the slots after the status check.
                if service.is_none() && self.slots.is_released() {
                    return Err(UnitOfWorkError::UsedAfterDisposal { id: self.id });
                }
                Ok(service)
            }
            None => Ok(self.shared.ambient.get::<T>()),
        }
    }

    /// Like [`get_service`](Self::get_service), but fails when nothing provides `T`.
    pub fn get_required_service<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_service::<T>()?
            .ok_or(UnitOfWorkError::ServiceNotFound {
                type_name: type_name::<T>(),
            })
    }

    /// Commits every participant, sequentially in registration order.
    ///
    /// The status moves to `Committed` before any participant runs, so a
    /// second commit or a rollback fails even if a participant fails here.
    /// The first participant failure stops the sequence and is returned.
    #[track_caller]
    pub fn commit(&self) -> impl Future<Output = Result<()>> + Send + '_ {
        let site = Location::caller();
        async move {
            self.begin_completion(UnitOfWorkStatus::Committed, site)?;
            let result = self.complete_participants(UnitOfWorkStatus::Committed).await;
            self.completion.cancel();

            match &result {
                Ok(()) => {
                    metrics::counter!("uow_committed_total").increment(1);
                    tracing::debug!("unit of work committed");
                }
                Err(error) => tracing::error!(%error, "unit of work commit failed"),
            }
            result
        }
        .instrument(self.span.clone())
    }

    /// Rolls back every participant, sequentially in registration order.
    #[track_caller]
    pub fn rollback(&self) -> impl Future<Output = Result<()>> + Send + '_ {
        let site = Location::caller();
        async move {
            self.begin_completion(UnitOfWorkStatus::RolledBack, site)?;
            let result = self.complete_participants(UnitOfWorkStatus::RolledBack).await;
            self.completion.cancel();

            match &result {
                Ok(()) => {
                    metrics::counter!("uow_rolled_back_total").increment(1);
                    tracing::debug!("unit of work rolled back");
                }
                Err(error) => tracing::error!(%error, "unit of work rollback failed"),
            }
            result
        }
        .instrument(self.span.clone())
    }

    /// Releases every participant and created service.
    ///
    /// Idempotent: only the first call does any work. Participants are
    /// disposed in registration order; every one is attempted and the first
    /// failure is returned.
    pub async fn dispose(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.status.is_disposed() {
                return Ok(());
            }
            lifecycle.status = lifecycle.status.transition(UnitOfWorkStatus::Disposed)?;
        }

        let mut first_error = None;
        for participant in &self.participants {
            if let Err(error) = participant.dispose().instrument(self.span.clone()).await {
                tracing::warn!(parent: &self.span, %error, "participant dispose failed");
                first_error.get_or_insert(error);
            }
        }
        self.slots.release();

        #[cfg(any(test, feature = "leak-tracking"))]
        self.shared.live.release(self.id);

        tracing::debug!(parent: &self.span, "unit of work disposed");

        match first_error {
            Some(error) => Err(UnitOfWorkError::Participant(error)),
            None => Ok(()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_usable(&self) -> Result<()> {
        let lifecycle = self.lifecycle();
        match lifecycle.status {
            UnitOfWorkStatus::Disposed => Err(UnitOfWorkError::UsedAfterDisposal { id: self.id }),
            #[cfg(debug_assertions)]
            status @ (UnitOfWorkStatus::Committed | UnitOfWorkStatus::RolledBack) => {
                Err(UnitOfWorkError::UsedAfterCompletion {
                    id: self.id,
                    status,
                    created_site: self.created_site,
                    completed_site: lifecycle.completed_site.unwrap_or(self.created_site),
                })
            }
            _ => Ok(()),
        }
    }

    fn begin_completion(
        &self,
        to: UnitOfWorkStatus,
        site: &'static Location<'static>,
    ) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.status.is_disposed() {
            return Err(UnitOfWorkError::UsedAfterDisposal { id: self.id });
        }
        lifecycle.status = lifecycle.status.transition(to)?;
        lifecycle.completed_site = Some(site);
        Ok(())
    }

    async fn complete_participants(&self, outcome: UnitOfWorkStatus) -> Result<()> {
        for participant in &self.participants {
            let result = if outcome == UnitOfWorkStatus::Committed {
                participant.commit().await
            } else {
                participant.rollback().await
            };
            result.map_err(UnitOfWorkError::Participant)?;
        }
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let lifecycle = self
                .lifecycle
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner);
            if !lifecycle.status.is_disposed() {
                tracing::warn!(
                    id = %self.id,
                    status = %lifecycle.status,
                    created_site = %self.created_site,
                    "unit of work dropped without dispose"
                );
            }
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("activity", &self.options.activity_name)
            .field("status", &self.status())
            .field("participants", &self.participants.len())
            .finish()
    }
}
