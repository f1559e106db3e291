//! Builds the static type table once and creates units of work on demand.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, UnitOfWorkError};
use crate::participant::{Accessor, DynParticipantFactory, Participant, ParticipantFactory};
use crate::registry::ServiceRegistry;
use crate::service::{DynServiceFactory, ServiceFactory};
use crate::UnitOfWork;

#[cfg(any(test, feature = "leak-tracking"))]
use crate::live::LiveInstances;

/// How a service type is resolved inside a unit of work.
pub(crate) enum Resolver {
    /// Ask the participant at `index` for its service.
    Participant { index: usize, accessor: Accessor },
    /// Lazily invoke `factory` and cache the result in `slot`.
    Service {
        slot: usize,
        factory: Arc<dyn DynServiceFactory>,
    },
}

/// State shared by the manager and every unit of work it creates.
pub(crate) struct Shared {
    pub(crate) resolvers: HashMap<TypeId, Resolver>,
    pub(crate) slot_count: usize,
    pub(crate) ambient: Arc<ServiceRegistry>,
    #[cfg(any(test, feature = "leak-tracking"))]
    pub(crate) live: Arc<LiveInstances>,
}

/// Per-call options for [`UnitOfWorkManager::create`].
#[derive(Debug, Clone)]
pub struct UnitOfWorkOptions {
    /// Name of the logical operation, used for the tracing span.
    pub activity_name: String,
    /// Key/value tags recorded on the span.
    pub tags: Vec<(String, String)>,
    /// Correlation ids of related operations (e.g. inbound message ids).
    pub links: Vec<String>,
}

impl UnitOfWorkOptions {
    /// Creates options for the named activity.
    pub fn new(activity_name: impl Into<String>) -> Self {
        Self {
            activity_name: activity_name.into(),
            tags: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Adds a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.tags.push((key.into(), value.to_string()));
        self
    }

    /// Adds a link to a related operation.
    pub fn link(mut self, id: impl Into<String>) -> Self {
        self.links.push(id.into());
        self
    }
}

impl Default for UnitOfWorkOptions {
    fn default() -> Self {
        Self::new("unit-of-work")
    }
}

/// Collects participant and service factories for a [`UnitOfWorkManager`].
pub struct UnitOfWorkManagerBuilder {
    participants: Vec<Arc<dyn DynParticipantFactory>>,
    services: Vec<Arc<dyn DynServiceFactory>>,
    ambient: Arc<ServiceRegistry>,
}

impl UnitOfWorkManagerBuilder {
    /// Starts a builder that falls back to `ambient` for unknown types.
    pub fn new(ambient: Arc<ServiceRegistry>) -> Self {
        Self {
            participants: Vec::new(),
            services: Vec::new(),
            ambient,
        }
    }

    /// Registers a participant factory.
    ///
    /// Registration order is the order participants commit, roll back and
    /// dispose in.
    pub fn participant<F: ParticipantFactory>(mut self, factory: F) -> Self {
        self.participants.push(Arc::new(factory));
        self
    }

    /// Registers a service factory.
    pub fn service<F: ServiceFactory>(mut self, factory: F) -> Self {
        self.services.push(Arc::new(factory));
        self
    }

    /// Builds the type table.
    ///
    /// Fails if two registrations publish the same service type.
    pub fn build(self) -> Result<UnitOfWorkManager> {
        let mut resolvers = HashMap::new();

        for (index, factory) in self.participants.iter().enumerate() {
            for provided in factory.provided_services() {
                let resolver = Resolver::Participant {
                    index,
                    accessor: provided.accessor,
                };
                if resolvers.insert(provided.type_id, resolver).is_some() {
                    return Err(UnitOfWorkError::DuplicateService {
                        type_name: provided.type_name,
                    });
                }
            }
        }

        for (slot, factory) in self.services.iter().enumerate() {
            let resolver = Resolver::Service {
                slot,
                factory: Arc::clone(factory),
            };
            if resolvers.insert(factory.service_type(), resolver).is_some() {
                return Err(UnitOfWorkError::DuplicateService {
                    type_name: factory.service_name(),
                });
            }
        }

        tracing::debug!(
            participants = self.participants.len(),
            services = self.services.len(),
            types = resolvers.len(),
            "unit of work manager built"
        );

        Ok(UnitOfWorkManager {
            factories: self.participants,
            shared: Arc::new(Shared {
                resolvers,
                slot_count: self.services.len(),
                ambient: self.ambient,
                #[cfg(any(test, feature = "leak-tracking"))]
                live: Arc::new(LiveInstances::default()),
            }),
        })
    }
}

/// Creates units of work from a fixed set of registered factories.
///
/// ```ignore
/// let manager = UnitOfWorkManager::builder(ambient)
///     .participant(PostgresPartyParticipantFactory::new(pool))
///     .service(PartyImportServiceFactory)
///     .build()?;
///
/// let uow = manager.create(UnitOfWorkOptions::new("import"), token).await?;
/// let repository = uow.get_required_service::<dyn PartyRepository>()?;
/// repository.upsert(&party).await?;
/// uow.commit().await?;
/// uow.dispose().await?;
/// ```
#[derive(Clone)]
pub struct UnitOfWorkManager {
    factories: Vec<Arc<dyn DynParticipantFactory>>,
    shared: Arc<Shared>,
}

impl UnitOfWorkManager {
    /// Starts a builder.
    pub fn builder(ambient: Arc<ServiceRegistry>) -> UnitOfWorkManagerBuilder {
        UnitOfWorkManagerBuilder::new(ambient)
    }

    /// Returns the ambient registry.
    pub fn ambient(&self) -> &Arc<ServiceRegistry> {
        &self.shared.ambient
    }

    /// Returns the number of participant factories.
    pub fn participant_count(&self) -> usize {
        self.factories.len()
    }

    /// Returns the arena of units of work that were never disposed.
    #[cfg(any(test, feature = "leak-tracking"))]
    pub fn live_instances(&self) -> &LiveInstances {
        &self.shared.live
    }

    /// Creates a unit of work with every participant materialized.
    ///
    /// Participants are created concurrently, so latency is bounded by the
    /// slowest one. If any creation fails, the participants that were created
    /// are disposed in registration order and the first error is returned.
    /// Cancelling `cancellation` while creations are pending abandons the
    /// rest, disposes the finished ones and returns
    /// [`UnitOfWorkError::Cancelled`].
    #[track_caller]
    pub fn create(
        &self,
        options: UnitOfWorkOptions,
        cancellation: CancellationToken,
    ) -> impl Future<Output = Result<UnitOfWork>> + Send + '_ {
        let created_site = Location::caller();

        async move {
            let ambient = self.shared.ambient.as_ref();
            let token = &cancellation;
            let mut pending: FuturesUnordered<_> = self
                .factories
                .iter()
                .enumerate()
                .map(|(index, factory)| async move {
                    (index, factory.create_boxed(ambient, token).await)
                })
                .collect();

            let mut created: Vec<Option<Box<dyn Participant>>> =
                self.factories.iter().map(|_| None).collect();
            let mut failure = None;
            let mut cancelled = false;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = pending.next() => next,
                };
                match next {
                    Some((index, Ok(participant))) => created[index] = Some(participant),
                    Some((index, Err(error))) => {
                        tracing::warn!(participant = self.factories[index].name(), %error, "participant creation failed");
                        failure.get_or_insert(error);
                    }
                    None => break,
                }
            }
            drop(pending);

            let participants: Vec<Box<dyn Participant>> = created.into_iter().flatten().collect();

            if cancelled || failure.is_some() {
                for participant in &participants {
                    if let Err(dispose_error) = participant.dispose().await {
                        tracing::warn!(error = %dispose_error, "failed to dispose participant after aborted creation");
                    }
                }
                return Err(match failure {
                    Some(error) if !cancelled => UnitOfWorkError::Participant(error),
                    _ => UnitOfWorkError::Cancelled,
                });
            }

            metrics::counter!("uow_created_total").increment(1);

            Ok(UnitOfWork::new(
                options,
                participants,
                Arc::clone(&self.shared),
                cancellation,
                created_site,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, ServiceTypes};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Connection {
        name: &'static str,
    }

    struct TestParticipant {
        name: &'static str,
        journal: Journal,
        connection: Arc<Connection>,
    }

    impl TestParticipant {
        fn record(&self, what: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{what}", self.name));
        }
    }

    #[async_trait]
    impl Participant for TestParticipant {
        async fn commit(&self) -> std::result::Result<(), BoxError> {
            self.record("commit");
            Ok(())
        }

        async fn rollback(&self) -> std::result::Result<(), BoxError> {
            self.record("rollback");
            Ok(())
        }

        async fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.record("dispose");
            Ok(())
        }
    }

    struct TestFactory {
        name: &'static str,
        journal: Journal,
        delay: Duration,
        fail: bool,
        publish: bool,
    }

    impl TestFactory {
        fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                journal: Arc::clone(journal),
                delay: Duration::ZERO,
                fail: false,
                publish: false,
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn publishing(mut self) -> Self {
            self.publish = true;
            self
        }
    }

    #[async_trait]
    impl ParticipantFactory for TestFactory {
        type Participant = TestParticipant;

        fn service_types(&self, services: &mut ServiceTypes<TestParticipant>) {
            if self.publish {
                services.provide(|p: &TestParticipant| Arc::clone(&p.connection));
            }
        }

        async fn create(
            &self,
            _ambient: &ServiceRegistry,
            _cancellation: &CancellationToken,
        ) -> std::result::Result<TestParticipant, BoxError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(format!("{} unavailable", self.name).into());
            }
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:created", self.name));
            Ok(TestParticipant {
                name: self.name,
                journal: Arc::clone(&self.journal),
                connection: Arc::new(Connection { name: self.name }),
            })
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn ambient() -> Arc<ServiceRegistry> {
        Arc::new(ServiceRegistry::new())
    }

    #[tokio::test]
    async fn create_waits_for_slowest_participant() {
        let journal = journal();
        let manager = UnitOfWorkManager::builder(ambient())
            .participant(TestFactory::new("sync", &journal))
            .participant(TestFactory::new("slow", &journal).delayed(Duration::from_millis(60)))
            .participant(TestFactory::new("medium", &journal).delayed(Duration::from_millis(20)))
            .build()
            .unwrap();

        let started = Instant::now();
        let uow = manager
            .create(UnitOfWorkOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(60));
        let created: Vec<String> = journal.lock().unwrap().clone();
        assert_eq!(created.len(), 3);
        assert!(created.contains(&"slow:created".to_string()));

        uow.dispose().await.unwrap();
        manager.live_instances().assert_empty();
    }

    #[tokio::test]
    async fn participants_are_created_concurrently() {
        let journal = journal();
        let delay = Duration::from_millis(100);
        let manager = UnitOfWorkManager::builder(ambient())
            .participant(TestFactory::new("a", &journal).delayed(delay))
            .participant(TestFactory::new("b", &journal).delayed(delay))
            .participant(TestFactory::new("c", &journal).delayed(delay))
            .build()
            .unwrap();

        let started = Instant::now();
        let uow = manager
            .create(UnitOfWorkOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(250));
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn create_with_no_participants() {
        let manager = UnitOfWorkManager::builder(ambient()).build().unwrap();
        assert_eq!(manager.participant_count(), 0);

        let uow = manager
            .create(UnitOfWorkOptions::new("empty"), CancellationToken::new())
            .await
            .unwrap();
        uow.commit().await.unwrap();
        uow.dispose().await.unwrap();
        manager.live_instances().assert_empty();
    }

    #[tokio::test]
    async fn failed_creation_disposes_created_participants() {
        let journal = journal();
        let manager = UnitOfWorkManager::builder(ambient())
            .participant(TestFactory::new("db", &journal))
            .participant(TestFactory::new("cache", &journal).failing())
            .build()
            .unwrap();

        let result = manager
            .create(UnitOfWorkOptions::default(), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(UnitOfWorkError::Participant(_))));
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["db:created".to_string(), "db:dispose".to_string()]
        );
        assert_eq!(manager.live_instances().count(), 0);
    }

    #[tokio::test]
    async fn cancelled_creation_returns_cancelled() {
        let journal = journal();
        let manager = UnitOfWorkManager::builder(ambient())
            .participant(TestFactory::new("slow", &journal).delayed(Duration::from_secs(5)))
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = manager.create(UnitOfWorkOptions::default(), token).await;
        assert!(matches!(result, Err(UnitOfWorkError::Cancelled)));
        assert_eq!(manager.live_instances().count(), 0);
    }

    #[tokio::test]
    async fn cancelled_creation_disposes_finished_participants() {
        let journal = journal();
        let manager = UnitOfWorkManager::builder(ambient())
            .participant(TestFactory::new("fast", &journal))
            .participant(TestFactory::new("slow", &journal).delayed(Duration::from_secs(5)))
            .participant(TestFactory::new("quick", &journal).delayed(Duration::from_millis(5)))
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = manager.create(UnitOfWorkOptions::default(), token).await;

        assert!(matches!(result, Err(UnitOfWorkError::Cancelled)));
        let entries = journal.lock().unwrap().clone();
        assert_eq!(
            entries[entries.len() - 2..],
            ["fast:dispose".to_string(), "quick:dispose".to_string()]
        );
        assert!(entries.contains(&"fast:created".to_string()));
        assert!(entries.contains(&"quick:created".to_string()));
        assert!(!entries.iter().any(|entry| entry.starts_with("slow:")));
        assert_eq!(manager.live_instances().count(), 0);
    }

    #[tokio::test]
    async fn duplicate_service_type_fails_build() {
        let journal = journal();
        let result = UnitOfWorkManager::builder(ambient())
            .participant(TestFactory::new("primary", &journal).publishing())
            .participant(TestFactory::new("replica", &journal).publishing())
            .build();

        match result {
            Err(UnitOfWorkError::DuplicateService { type_name }) => {
                assert!(type_name.ends_with("Connection"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("duplicate registration was accepted"),
        }
    }

    #[tokio::test]
    async fn participant_service_is_resolved_by_index() {
        let journal = journal();
        let manager = UnitOfWorkManager::builder(ambient())
            .participant(TestFactory::new("silent", &journal))
            .participant(TestFactory::new("db", &journal).publishing())
            .build()
            .unwrap();

        let uow = manager
            .create(UnitOfWorkOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        let connection = uow.get_required_service::<Connection>().unwrap();
        assert_eq!(connection.name, "db");

        uow.rollback().await.unwrap();
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn undisposed_instance_stays_in_arena() {
        let manager = UnitOfWorkManager::builder(ambient()).build().unwrap();

        let leaked = manager
            .create(UnitOfWorkOptions::new("forgotten"), CancellationToken::new())
            .await
            .unwrap();
        leaked.commit().await.unwrap();
        drop(leaked);

        let live = manager.live_instances().snapshot();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].activity, "forgotten");
        assert!(live[0].created_site.file().ends_with("manager.rs"));
    }
}
