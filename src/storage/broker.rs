//! In-memory message broker with per-queue FIFO channels
//!
//! Each queue is an unbounded tokio channel created on first use. Publishing
//! preserves order per queue; a consumer takes the queue's receiver and owns
//! it, mirroring the single-consumer-per-queue deployment shape.

use crate::core::traits::MessageBroker;
use crate::types::BrokerError;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// In-memory broker backed by unbounded channels
#[derive(Debug, Default)]
pub struct MemoryBroker {
    senders: DashMap<String, UnboundedSender<String>>,
    receivers: DashMap<String, UnboundedReceiver<String>>,
}

impl MemoryBroker {
    /// Create a broker with no queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a queue's receiving end
    ///
    /// Creates the queue if it does not exist yet. Returns `None` if the
    /// receiver was already taken; a queue has exactly one consumer.
    pub fn take_receiver(&self, queue: &str) -> Option<UnboundedReceiver<String>> {
        self.ensure_queue(queue);
        self.receivers.remove(queue).map(|(_, rx)| rx)
    }

    /// Close every queue
    ///
    /// Dropping the senders ends the consumers' receive loops once they
    /// drain what was already published.
    pub fn close(&self) {
        debug!(queues = self.senders.len(), "closing broker queues");
        self.senders.clear();
    }

    fn ensure_queue(&self, queue: &str) {
        self.senders.entry(queue.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            self.receivers.insert(queue.to_string(), rx);
            tx
        });
    }
}

impl MessageBroker for MemoryBroker {
    fn publish(&self, message: &str, queue: &str) -> Result<(), BrokerError> {
        self.ensure_queue(queue);

        let Some(sender) = self.senders.get(queue) else {
            return Err(BrokerError::Closed {
                queue: queue.to_string(),
            });
        };

        sender
            .send(message.to_string())
            .map_err(|_| BrokerError::Closed {
                queue: queue.to_string(),
            })?;

        debug!(queue, bytes = message.len(), "message published");
        Ok(())
    }
}
