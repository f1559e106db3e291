//! Event output as newline-delimited JSON.

use async_trait::async_trait;
use import::{BusError, EventPublisher};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Publishes each event as one JSON line on `writer`.
pub struct NdjsonPublisher<W> {
    writer: Mutex<W>,
}

impl<W> NdjsonPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<E, W> EventPublisher<E> for NdjsonPublisher<W>
where
    E: Serialize + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&self, event: E) -> Result<(), BusError> {
        let mut line =
            serde_json::to_vec(&event).map_err(|e| BusError::Rejected(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|_| BusError::Closed)?;
        writer.flush().await.map_err(|_| BusError::Closed)
    }
}
