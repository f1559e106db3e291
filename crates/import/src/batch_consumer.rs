//! Batched, atomic import of validated upserts.

use std::time::Instant;

use party::PartyImportService;
use unit_of_work::{CancellationToken, UnitOfWork, UnitOfWorkManager, UnitOfWorkOptions};

use crate::bus::EventPublisher;
use crate::error::Result;
use crate::messages::{PartyUpserted, ValidatedUpsertParty};
use crate::scratch::ScratchPool;
use crate::tracker::JobTracker;
use crate::watermark::{Watermark, WatermarkBuffer};

/// Activity name of the unit of work opened per batch.
pub const BATCH_ACTIVITY: &str = "party-import-batch";

/// Summary of a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of parties upserted and confirmed.
    pub upserted: usize,
    /// Maximum progress per job, in order of first appearance.
    pub watermarks: Vec<Watermark>,
}

/// Writes each batch inside one unit of work.
///
/// The manager must resolve [`PartyImportService`], which in turn needs a
/// party repository participant and an ambient clock. Either the whole
/// batch commits or none of it does; events and watermarks are only
/// emitted after the commit.
pub struct BatchImportConsumer<P, T> {
    manager: UnitOfWorkManager,
    publisher: P,
    tracker: T,
    events: ScratchPool<PartyUpserted>,
    watermarks: ScratchPool<Watermark>,
}

impl<P, T> BatchImportConsumer<P, T>
where
    P: EventPublisher<PartyUpserted>,
    T: JobTracker,
{
    /// Creates a new batch consumer.
    pub fn new(manager: UnitOfWorkManager, publisher: P, tracker: T) -> Self {
        Self {
            manager,
            publisher,
            tracker,
            events: ScratchPool::new(),
            watermarks: ScratchPool::new(),
        }
    }

    /// Returns the unit-of-work manager batches run against.
    pub fn manager(&self) -> &UnitOfWorkManager {
        &self.manager
    }

    /// Returns the number of idle scratch buffers as (events, watermarks).
    pub fn idle_scratch_buffers(&self) -> (usize, usize) {
        (self.events.available(), self.watermarks.available())
    }

    /// Imports a batch atomically.
    ///
    /// The first failing message rolls back the whole batch; nothing is
    /// published and no watermark moves. Redelivering the same batch is
    /// safe since persistence upserts and watermarks only grow.
    #[tracing::instrument(skip_all, fields(batch_size = batch.len()))]
    pub async fn consume(
        &self,
        batch: &[ValidatedUpsertParty],
        cancellation: CancellationToken,
    ) -> Result<BatchOutcome> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }

        metrics::counter!("import_batches_total").increment(1);
        let start = Instant::now();

        let result = self.import_batch(batch, cancellation).await;

        metrics::histogram!("import_batch_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => tracing::info!(
                upserted = outcome.upserted,
                jobs = outcome.watermarks.len(),
                "batch imported"
            ),
            Err(error) => {
                metrics::counter!("import_batch_failures_total").increment(1);
                tracing::error!(%error, "batch import failed");
            }
        }
        result
    }

    async fn import_batch(
        &self,
        batch: &[ValidatedUpsertParty],
        cancellation: CancellationToken,
    ) -> Result<BatchOutcome> {
        let mut events = self.events.checkout(batch.len());
        let mut watermark_storage = self.watermarks.checkout(batch.len());

        let options = UnitOfWorkOptions::new(BATCH_ACTIVITY).tag("batch.size", batch.len());
        let uow = self.manager.create(options, cancellation).await?;

        let written = Self::write_batch(&uow, batch, &mut events, &mut watermark_storage).await;
        let completed = match written {
            Ok(()) => uow.commit().await.map_err(Into::into),
            Err(error) => {
                if let Err(rollback_error) = uow.rollback().await {
                    tracing::error!(error = %rollback_error, "batch rollback failed");
                }
                Err(error)
            }
        };
        if let Err(error) = uow.dispose().await {
            tracing::warn!(%error, "batch unit of work dispose failed");
        }
        completed?;

        for event in events.iter() {
            self.publisher.publish(*event).await?;
        }
        for watermark in watermark_storage.iter() {
            self.tracker
                .track_processed_status(&watermark.job_name, watermark.progress)
                .await?;
        }

        Ok(BatchOutcome {
            upserted: events.len(),
            watermarks: watermark_storage.to_vec(),
        })
    }

    async fn write_batch(
        uow: &UnitOfWork,
        batch: &[ValidatedUpsertParty],
        events: &mut Vec<PartyUpserted>,
        watermark_storage: &mut Vec<Watermark>,
    ) -> Result<()> {
        let service = uow.get_required_service::<PartyImportService>()?;
        let mut watermarks = WatermarkBuffer::new(watermark_storage, batch.len());

        for message in batch {
            let entity_id = service.import(message.entity()).await?;
            events.push(PartyUpserted { entity_id });

            let tracking = message.tracking();
            if let Some(job_name) = tracking.job_name() {
                watermarks.record(job_name, tracking.progress())?;
            }
        }
        Ok(())
    }
}
