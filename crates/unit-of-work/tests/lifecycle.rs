//! Integration tests for the unit-of-work lifecycle.
//!
//! These tests drive the public API only: commit/rollback ordering, the
//! single-use state machine, service resolution and completion signalling.
//! Every harness asserts on drop that each unit of work it opened was disposed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use unit_of_work::{
    BoxError, CancellationToken, Participant, ParticipantFactory, ServiceFactory,
    ServiceRegistry, ServiceTypes, UnitOfWork, UnitOfWorkError, UnitOfWorkManager,
    UnitOfWorkOptions, UnitOfWorkStatus,
};

type Journal = Arc<Mutex<Vec<String>>>;

/// Service published by the ledger participant.
trait Ledger: Send + Sync {
    fn owner(&self) -> &'static str;
}

struct LedgerHandle {
    owner: &'static str,
}

impl Ledger for LedgerHandle {
    fn owner(&self) -> &'static str {
        self.owner
    }
}

struct LedgerParticipant {
    name: &'static str,
    journal: Journal,
    fail_commit: bool,
    ledger: Arc<LedgerHandle>,
}

impl LedgerParticipant {
    fn record(&self, what: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{what}", self.name));
    }
}

#[async_trait]
impl Participant for LedgerParticipant {
    async fn commit(&self) -> Result<(), BoxError> {
        if self.fail_commit {
            return Err(format!("{} refused to commit", self.name).into());
        }
        self.record("commit");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), BoxError> {
        self.record("rollback");
        Ok(())
    }

    async fn dispose(&self) -> Result<(), BoxError> {
        self.record("dispose");
        Ok(())
    }
}

struct LedgerFactory {
    name: &'static str,
    journal: Journal,
    fail_commit: bool,
    publish: bool,
}

#[async_trait]
impl ParticipantFactory for LedgerFactory {
    type Participant = LedgerParticipant;

    fn service_types(&self, services: &mut ServiceTypes<LedgerParticipant>) {
        if self.publish {
            services.provide(|p: &LedgerParticipant| -> Arc<dyn Ledger> { p.ledger.clone() });
        }
    }

    async fn create(
        &self,
        _ambient: &ServiceRegistry,
        _cancellation: &CancellationToken,
    ) -> Result<LedgerParticipant, BoxError> {
        Ok(LedgerParticipant {
            name: self.name,
            journal: self.journal.clone(),
            fail_commit: self.fail_commit,
            ledger: Arc::new(LedgerHandle { owner: self.name }),
        })
    }
}

/// Scoped service composed over the participant's ledger and an ambient greeting.
struct Report {
    ledger_owner: &'static str,
    greeting: Arc<String>,
}

struct ReportFactory {
    invocations: Arc<AtomicUsize>,
}

impl ServiceFactory for ReportFactory {
    type Service = Report;

    fn create(&self, unit_of_work: &UnitOfWork) -> Result<Arc<Report>, BoxError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let ledger = unit_of_work.get_required_service::<dyn Ledger>()?;
        let greeting = unit_of_work.get_required_service::<String>()?;
        Ok(Arc::new(Report {
            ledger_owner: ledger.owner(),
            greeting,
        }))
    }
}

struct Harness {
    manager: UnitOfWorkManager,
    journal: Journal,
    report_invocations: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self::with_failing_commit(None)
    }

    fn with_failing_commit(failing: Option<&'static str>) -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let report_invocations = Arc::new(AtomicUsize::new(0));
        let ambient = ServiceRegistry::new().with(Arc::new("hello".to_string()));

        let factory = |name: &'static str, publish: bool| LedgerFactory {
            name,
            journal: journal.clone(),
            fail_commit: failing == Some(name),
            publish,
        };

        let manager = UnitOfWorkManager::builder(Arc::new(ambient))
            .participant(factory("database", true))
            .participant(factory("cache", false))
            .participant(factory("outbox", false))
            .service(ReportFactory {
                invocations: report_invocations.clone(),
            })
            .build()
            .unwrap();

        Self {
            manager,
            journal,
            report_invocations,
        }
    }

    async fn begin(&self) -> UnitOfWork {
        self.manager
            .create(UnitOfWorkOptions::new("test"), CancellationToken::new())
            .await
            .unwrap()
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.manager.live_instances().assert_empty();
        }
    }
}

mod ordering {
    use super::*;

    #[tokio::test]
    async fn commit_runs_in_registration_order() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.commit().await.unwrap();
        uow.dispose().await.unwrap();

        assert_eq!(
            harness.journal(),
            vec![
                "database:commit",
                "cache:commit",
                "outbox:commit",
                "database:dispose",
                "cache:dispose",
                "outbox:dispose",
            ]
        );
    }

    #[tokio::test]
    async fn rollback_runs_in_registration_order() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.rollback().await.unwrap();

        assert_eq!(
            harness.journal(),
            vec!["database:rollback", "cache:rollback", "outbox:rollback"]
        );
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn dispose_without_outcome_does_not_roll_back() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.dispose().await.unwrap();

        assert_eq!(
            harness.journal(),
            vec!["database:dispose", "cache:dispose", "outbox:dispose"]
        );
        assert_eq!(uow.status(), UnitOfWorkStatus::Disposed);
    }

    #[tokio::test]
    async fn failed_commit_stops_the_sequence() {
        let harness = Harness::with_failing_commit(Some("cache"));
        let uow = harness.begin().await;
        let completion = uow.completion_token();

        let result = uow.commit().await;

        assert!(matches!(result, Err(UnitOfWorkError::Participant(_))));
        assert_eq!(harness.journal(), vec!["database:commit"]);
        assert_eq!(uow.status(), UnitOfWorkStatus::Committed);
        assert!(completion.is_cancelled());
        uow.dispose().await.unwrap();
    }
}

mod state_machine {
    use super::*;

    #[tokio::test]
    async fn commit_twice_is_a_usage_error() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.commit().await.unwrap();
        let second = uow.commit().await;

        match second {
            Err(error @ UnitOfWorkError::InvalidTransition { .. }) => {
                assert!(error.is_usage_error())
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn rollback_after_commit_is_a_usage_error() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.commit().await.unwrap();
        assert!(matches!(
            uow.rollback().await,
            Err(UnitOfWorkError::InvalidTransition {
                from: UnitOfWorkStatus::Committed,
                to: UnitOfWorkStatus::RolledBack,
            })
        ));
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn commit_after_rollback_is_a_usage_error() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.rollback().await.unwrap();
        assert!(matches!(
            uow.commit().await,
            Err(UnitOfWorkError::InvalidTransition {
                from: UnitOfWorkStatus::RolledBack,
                to: UnitOfWorkStatus::Committed,
            })
        ));
        assert_eq!(harness.journal().len(), 3);
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.commit().await.unwrap();
        uow.dispose().await.unwrap();
        uow.dispose().await.unwrap();

        let disposals = harness
            .journal()
            .iter()
            .filter(|entry| entry.ends_with(":dispose"))
            .count();
        assert_eq!(disposals, 3);
    }

    #[tokio::test]
    async fn services_are_unavailable_after_dispose() {
        let harness = Harness::new();
        let uow = harness.begin().await;
        uow.dispose().await.unwrap();

        assert!(matches!(
            uow.get_service::<dyn Ledger>(),
            Err(UnitOfWorkError::UsedAfterDisposal { .. })
        ));
        assert!(matches!(
            uow.get_required_service::<Report>(),
            Err(UnitOfWorkError::UsedAfterDisposal { .. })
        ));
    }

    #[tokio::test]
    async fn commit_after_dispose_is_rejected() {
        let harness = Harness::new();
        let uow = harness.begin().await;
        uow.dispose().await.unwrap();

        assert!(matches!(
            uow.commit().await,
            Err(UnitOfWorkError::UsedAfterDisposal { .. })
        ));
        assert!(matches!(
            uow.rollback().await,
            Err(UnitOfWorkError::UsedAfterDisposal { .. })
        ));
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    async fn services_are_unavailable_after_completion_in_debug_builds() {
        let harness = Harness::new();
        let uow = harness.begin().await;
        uow.commit().await.unwrap();

        match uow.get_service::<dyn Ledger>() {
            Err(UnitOfWorkError::UsedAfterCompletion {
                status,
                created_site,
                completed_site,
                ..
            }) => {
                assert_eq!(status, UnitOfWorkStatus::Committed);
                assert!(created_site.file().ends_with("lifecycle.rs"));
                assert!(completed_site.file().ends_with("lifecycle.rs"));
                assert!(completed_site.line() > created_site.line());
            }
            other => panic!("expected used-after-completion, got {:?}", other.map(|_| ())),
        }
        uow.dispose().await.unwrap();
    }
}

mod services {
    use super::*;

    #[tokio::test]
    async fn participant_service_resolves() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        let ledger = uow.get_required_service::<dyn Ledger>().unwrap();
        assert_eq!(ledger.owner(), "database");

        uow.rollback().await.unwrap();
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn service_factory_runs_once_per_instance() {
        let harness = Harness::new();
        let first = harness.begin().await;
        let second = harness.begin().await;

        let a = first.get_required_service::<Report>().unwrap();
        let b = first.get_required_service::<Report>().unwrap();
        let c = second.get_required_service::<Report>().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(harness.report_invocations.load(Ordering::SeqCst), 2);
        assert_eq!(first.created_service_count(), 1);

        for uow in [first, second] {
            uow.rollback().await.unwrap();
            uow.dispose().await.unwrap();
            assert_eq!(uow.created_service_count(), 0);
        }
    }

    #[tokio::test]
    async fn service_factory_composes_participant_and_ambient_services() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        let report = uow.get_required_service::<Report>().unwrap();
        assert_eq!(report.ledger_owner, "database");
        assert_eq!(report.greeting.as_str(), "hello");

        uow.rollback().await.unwrap();
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_type_falls_back_to_ambient_then_fails() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        assert_eq!(
            uow.get_service::<String>().unwrap().as_deref().map(String::as_str),
            Some("hello")
        );
        assert!(uow.get_service::<u64>().unwrap().is_none());
        assert!(matches!(
            uow.get_required_service::<u64>(),
            Err(UnitOfWorkError::ServiceNotFound { type_name: "u64" })
        ));

        uow.rollback().await.unwrap();
        uow.dispose().await.unwrap();
    }
}

mod signalling {
    use super::*;

    #[tokio::test]
    async fn completion_token_fires_only_after_commit() {
        let harness = Harness::new();
        let uow = harness.begin().await;
        let completion = uow.completion_token();

        assert!(!completion.is_cancelled());
        let _ = uow.get_required_service::<dyn Ledger>().unwrap();
        assert!(!completion.is_cancelled());

        let observer = tokio::spawn({
            let completion = completion.clone();
            async move { completion.cancelled().await }
        });

        uow.commit().await.unwrap();
        observer.await.unwrap();
        assert!(completion.is_cancelled());
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn completion_token_fires_after_rollback() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.rollback().await.unwrap();
        assert!(uow.completion_token().is_cancelled());
        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn completion_is_independent_of_caller_cancellation() {
        let harness = Harness::new();
        let caller = CancellationToken::new();
        let uow = harness
            .manager
            .create(UnitOfWorkOptions::new("independent"), caller.clone())
            .await
            .unwrap();

        uow.commit().await.unwrap();
        assert!(uow.completion_token().is_cancelled());
        assert!(!caller.is_cancelled());
        assert!(!uow.cancellation_token().is_cancelled());

        uow.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn dispose_alone_does_not_signal_completion() {
        let harness = Harness::new();
        let uow = harness.begin().await;

        uow.dispose().await.unwrap();
        assert!(!uow.completion_token().is_cancelled());
    }
}

#[tokio::test]
async fn options_are_exposed_on_the_instance() {
    let harness = Harness::new();
    let uow = harness
        .manager
        .create(
            UnitOfWorkOptions::new("import")
                .tag("batch_size", 6)
                .link("msg-1"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(uow.activity(), "import");
    assert_eq!(uow.tags(), &[("batch_size".to_string(), "6".to_string())]);
    assert_eq!(uow.links(), &["msg-1".to_string()]);
    assert_eq!(uow.status(), UnitOfWorkStatus::Active);

    uow.rollback().await.unwrap();
    uow.dispose().await.unwrap();
}

#[tokio::test]
async fn undisposed_unit_of_work_is_reported() {
    let harness = Harness::new();
    let uow = harness.begin().await;
    uow.commit().await.unwrap();

    let live = harness.manager.live_instances().snapshot();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].activity, "test");
    assert!(live[0].created_site.file().ends_with("lifecycle.rs"));

    uow.dispose().await.unwrap();
    assert_eq!(harness.manager.live_instances().count(), 0);
}
