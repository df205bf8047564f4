//! Bounded FIFO between the feed and one writer.
//!
//! Producers hold a [`QueueSender`]. The writer drains everything available
//! at once; dropping every sender closes the queue.

use k4_core::types::Record;
use tokio::sync::mpsc;

pub type QueueSender = mpsc::Sender<Record>;

/// Receiving half, owned by a writer.
pub struct EventQueue {
    rx: mpsc::Receiver<Record>,
    capacity: usize,
}

/// Create a queue holding at most `capacity` records.
pub fn queue(capacity: usize) -> (QueueSender, EventQueue) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (tx, EventQueue { rx, capacity })
}

impl EventQueue {
    /// Wait for at least one record, then take every record already queued.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn next_batch(&mut self) -> Option<Vec<Record>> {
        let mut batch = Vec::with_capacity(self.capacity.min(256));
        match self.rx.recv_many(&mut batch, self.capacity).await {
            0 => None,
            _ => Some(batch),
        }
    }
}
