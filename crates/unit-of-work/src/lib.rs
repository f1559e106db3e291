//! Transactional resource orchestration.
//!
//! A [`UnitOfWork`] aggregates independently owned resources into one
//! commit/rollback boundary:
//!
//! - [`Participant`]s each own one resource (a database transaction, a cache
//!   session) and publish typed services over it.
//! - [`ServiceFactory`]s build scoped services lazily, composing what the
//!   participants and the ambient registry provide.
//! - The [`ServiceRegistry`] is the application-wide fallback for types no
//!   participant or factory provides.
//!
//! The [`UnitOfWorkManager`] is built once at startup from every registered
//! factory, with typed registration producing a static type table, and then
//! creates one unit of work per logical operation.
//!
//! Lifecycle:
//! ```text
//! create ──► Active ──┬──► commit ───┬──► dispose
//!                     └──► rollback ─┘
//! ```

pub mod error;
pub mod instance;
#[cfg(any(test, feature = "leak-tracking"))]
pub mod live;
pub mod manager;
pub mod participant;
pub mod registry;
pub mod service;
pub mod status;

pub use error::{BoxError, Result, UnitOfWorkError};
pub use instance::UnitOfWork;
#[cfg(any(test, feature = "leak-tracking"))]
pub use live::{LiveInstance, LiveInstances};
pub use manager::{UnitOfWorkManager, UnitOfWorkManagerBuilder, UnitOfWorkOptions};
pub use participant::{Participant, ParticipantFactory, ServiceTypes};
pub use registry::ServiceRegistry;
pub use service::ServiceFactory;
pub use status::UnitOfWorkStatus;
pub use tokio_util::sync::CancellationToken;
