//! Batched import of party upserts.
//!
//! Inbound [`UpsertPartyMessage`]s pass through the [`ValidationConsumer`],
//! which forwards [`ValidatedUpsertParty`] commands to the bus. The bus
//! groups them, and the [`BatchImportConsumer`] writes each group inside a
//! single unit of work, publishes one [`PartyUpserted`] per message and
//! advances the per-job watermarks in the [`JobTracker`].

pub mod batch_consumer;
pub mod bus;
pub mod error;
pub mod messages;
pub mod scratch;
pub mod tracker;
pub mod tracking;
pub mod validation_consumer;
pub mod watermark;

pub use batch_consumer::{BATCH_ACTIVITY, BatchImportConsumer, BatchOutcome};
pub use bus::{ChannelSender, CommandSender, EventPublisher, RecordingBus};
pub use error::{BusError, ImportError, MessageFailure, Result, TrackerError};
pub use messages::{PartyUpserted, UpsertPartyMessage, ValidatedUpsertParty};
pub use scratch::{ScratchBuffer, ScratchPool};
pub use tracker::{InMemoryJobTracker, JobStatus, JobTracker, QueueStatus};
pub use tracking::{Tracking, TrackingError};
pub use validation_consumer::ValidationConsumer;
pub use watermark::{Watermark, WatermarkBuffer};
