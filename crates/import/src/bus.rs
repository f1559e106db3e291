//! Message bus seams.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::error::BusError;

/// Sends commands to their consumer.
#[async_trait]
pub trait CommandSender<M: Send + 'static>: Send + Sync {
    async fn send(&self, message: M) -> Result<(), BusError>;

    /// Sends every message, in order.
    async fn send_batch(&self, messages: Vec<M>) -> Result<(), BusError> {
        for message in messages {
            self.send(message).await?;
        }
        Ok(())
    }
}

/// Publishes events to every subscriber.
#[async_trait]
pub trait EventPublisher<E: Send + 'static>: Send + Sync {
    async fn publish(&self, event: E) -> Result<(), BusError>;
}

/// Forwards messages into a tokio channel.
#[derive(Debug)]
pub struct ChannelSender<T> {
    sender: mpsc::Sender<T>,
}

impl<T> ChannelSender<T> {
    pub fn new(sender: mpsc::Sender<T>) -> Self {
        Self { sender }
    }
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> CommandSender<T> for ChannelSender<T> {
    async fn send(&self, message: T) -> Result<(), BusError> {
        self.sender.send(message).await.map_err(|_| BusError::Closed)
    }
}

#[async_trait]
impl<T: Send + 'static> EventPublisher<T> for ChannelSender<T> {
    async fn publish(&self, event: T) -> Result<(), BusError> {
        self.sender.send(event).await.map_err(|_| BusError::Closed)
    }
}

#[derive(Debug)]
struct RecordingState<T> {
    messages: Vec<T>,
    batch_calls: usize,
    fail_on_send: bool,
}

/// In-memory bus that records everything sent or published, for testing.
#[derive(Debug)]
pub struct RecordingBus<T> {
    state: Arc<RwLock<RecordingState<T>>>,
}

impl<T> Default for RecordingBus<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(RecordingState {
                messages: Vec::new(),
                batch_calls: 0,
                fail_on_send: false,
            })),
        }
    }
}

impl<T> Clone for RecordingBus<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> RecordingBus<T> {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to reject every message.
    pub async fn set_fail_on_send(&self, fail: bool) {
        self.state.write().await.fail_on_send = fail;
    }

    /// Returns every recorded message, in order.
    pub async fn messages(&self) -> Vec<T> {
        self.state.read().await.messages.clone()
    }

    /// Returns the number of recorded messages.
    pub async fn len(&self) -> usize {
        self.state.read().await.messages.len()
    }

    /// Returns true if nothing was recorded.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.messages.is_empty()
    }

    /// Returns how many times `send_batch` was called.
    pub async fn batch_calls(&self) -> usize {
        self.state.read().await.batch_calls
    }

    /// Forgets every recorded message.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.messages.clear();
        state.batch_calls = 0;
    }

    async fn record(&self, messages: impl IntoIterator<Item = T>) -> Result<(), BusError> {
        let mut state = self.state.write().await;
        if state.fail_on_send {
            return Err(BusError::Rejected("bus configured to reject".to_string()));
        }
        state.messages.extend(messages);
        Ok(())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> CommandSender<T> for RecordingBus<T> {
    async fn send(&self, message: T) -> Result<(), BusError> {
        self.record([message]).await
    }

    async fn send_batch(&self, messages: Vec<T>) -> Result<(), BusError> {
        self.record(messages).await?;
        self.state.write().await.batch_calls += 1;
        Ok(())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> EventPublisher<T> for RecordingBus<T> {
    async fn publish(&self, event: T) -> Result<(), BusError> {
        self.record([event]).await
    }
}
