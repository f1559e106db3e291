//! Newline-delimited JSON message source.

use import::{CommandSender, ImportError, UpsertPartyMessage, ValidatedUpsertParty, ValidationConsumer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::WorkerError;

/// Counters reported when the source is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: usize,
    pub forwarded: usize,
    pub rejected: usize,
}

/// Reads one [`UpsertPartyMessage`] per line and passes it to `validation`.
///
/// Blank lines are skipped. Lines that fail to decode or validate are
/// logged and counted; a closed bus stops the source.
pub async fn read_messages<R, S>(
    reader: R,
    validation: &ValidationConsumer<S>,
) -> Result<SourceStats, WorkerError>
where
    R: AsyncBufRead + Unpin,
    S: CommandSender<ValidatedUpsertParty>,
{
    let mut stats = SourceStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let message: UpsertPartyMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(error) => {
                stats.rejected += 1;
                tracing::warn!(line = stats.lines, %error, "undecodable upsert message");
                continue;
            }
        };

        match validation.consume(message).await {
            Ok(()) => stats.forwarded += 1,
            Err(ImportError::Validation(_)) => stats.rejected += 1,
            Err(ImportError::Bus(error)) => return Err(error.into()),
            Err(error) => {
                stats.rejected += 1;
                tracing::warn!(line = stats.lines, %error, "upsert message rejected");
            }
        }
    }

    tracing::info!(
        lines = stats.lines,
        forwarded = stats.forwarded,
        rejected = stats.rejected,
        "message source exhausted"
    );
    Ok(stats)
}
