//! In-process batching between the validation consumer and the batch consumer.

use std::time::Duration;

use import::{BatchImportConsumer, EventPublisher, JobTracker, PartyUpserted, ValidatedUpsertParty};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use unit_of_work::CancellationToken;

/// Counters reported when the batcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherStats {
    pub batches: usize,
    pub failed_batches: usize,
    pub messages: usize,
}

/// Groups validated commands into batches.
///
/// A batch is dispatched once it holds `batch_size` commands or `window`
/// has passed since its first command arrived. Failed batches are logged
/// and dropped; redelivery belongs to the bus. The batcher stops after the
/// channel closes and the last partial batch is dispatched.
pub struct Batcher<P, T> {
    receiver: mpsc::Receiver<ValidatedUpsertParty>,
    consumer: BatchImportConsumer<P, T>,
    batch_size: usize,
    window: Duration,
    cancellation: CancellationToken,
}

impl<P, T> Batcher<P, T>
where
    P: EventPublisher<PartyUpserted>,
    T: JobTracker,
{
    pub fn new(
        receiver: mpsc::Receiver<ValidatedUpsertParty>,
        consumer: BatchImportConsumer<P, T>,
        batch_size: usize,
        window: Duration,
    ) -> Self {
        Self {
            receiver,
            consumer,
            batch_size: batch_size.max(1),
            window,
            cancellation: CancellationToken::new(),
        }
    }

    /// Token passed to every batch; cancelling it aborts pending unit-of-work creation.
    ///
    /// Batches dispatched after cancellation fail without writing anything.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs until the sending side of the channel is dropped.
    pub async fn run(mut self) -> BatcherStats {
        let mut stats = BatcherStats::default();
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(first) = self.receiver.recv().await {
            batch.push(first);
            let deadline = Instant::now() + self.window;

            while batch.len() < self.batch_size {
                match timeout_at(deadline, self.receiver.recv()).await {
                    Ok(Some(message)) => batch.push(message),
                    Ok(None) | Err(_) => break,
                }
            }

            self.dispatch(&batch, &mut stats).await;
            batch.clear();
        }

        tracing::info!(
            batches = stats.batches,
            failed = stats.failed_batches,
            messages = stats.messages,
            "batcher stopped"
        );
        stats
    }

    async fn dispatch(&self, batch: &[ValidatedUpsertParty], stats: &mut BatcherStats) {
        stats.batches += 1;
        match self.consumer.consume(batch, self.cancellation.clone()).await {
            Ok(outcome) => stats.messages += outcome.upserted,
            Err(error) => {
                stats.failed_batches += 1;
                tracing::warn!(%error, size = batch.len(), "batch dropped after failure");
            }
        }
    }
}
