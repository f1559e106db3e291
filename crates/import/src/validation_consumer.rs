//! Validation of inbound upsert messages.

use crate::bus::CommandSender;
use crate::error::{ImportError, MessageFailure, Result};
use crate::messages::{UpsertPartyMessage, ValidatedUpsertParty};

/// Validates inbound messages and forwards the valid ones as commands.
pub struct ValidationConsumer<S> {
    sender: S,
}

impl<S: CommandSender<ValidatedUpsertParty>> ValidationConsumer<S> {
    pub fn new(sender: S) -> Self {
        Self { sender }
    }

    /// Validates one message and forwards it.
    ///
    /// A failure lists every missing field path and forwards nothing.
    #[tracing::instrument(skip_all, fields(entity_id = %message.entity.id))]
    pub async fn consume(&self, message: UpsertPartyMessage) -> Result<()> {
        let validated = message.validate().inspect_err(|error| {
            metrics::counter!("import_validation_failures_total").increment(1);
            tracing::warn!(missing = ?error.missing, "upsert message failed validation");
        })?;

        self.sender.send(validated).await?;
        Ok(())
    }

    /// Validates every message and forwards the valid ones in one call.
    ///
    /// Returns the number forwarded. If any message failed, the valid ones
    /// are still forwarded and the failures come back as
    /// [`ImportError::InvalidBatch`], indexed by position.
    #[tracing::instrument(skip_all, fields(messages = messages.len()))]
    pub async fn consume_all(&self, messages: Vec<UpsertPartyMessage>) -> Result<usize> {
        let mut valid = Vec::with_capacity(messages.len());
        let mut failures = Vec::new();

        for (index, message) in messages.into_iter().enumerate() {
            let entity_id = message.entity.id;
            match message.validate() {
                Ok(validated) => valid.push(validated),
                Err(error) => failures.push(MessageFailure {
                    index,
                    entity_id,
                    error,
                }),
            }
        }

        let forwarded = valid.len();
        if !valid.is_empty() {
            self.sender.send_batch(valid).await?;
        }

        if failures.is_empty() {
            return Ok(forwarded);
        }

        metrics::counter!("import_validation_failures_total").increment(failures.len() as u64);
        tracing::warn!(
            forwarded,
            failed = failures.len(),
            "upsert messages failed validation"
        );
        Err(ImportError::InvalidBatch { failures })
    }
}
