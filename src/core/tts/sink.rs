//! Audio sink shared between transports and the consumer.
//!
//! Producers run on foreign execution contexts (the websocket task, REST
//! tasks) and push synchronously. The consumer awaits chunks in FIFO order.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Unbounded FIFO of synthesized audio chunks.
#[derive(Debug, Default)]
pub struct AudioSink {
    queue: Mutex<VecDeque<Bytes>>,
    notify: Notify,
}

impl AudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Safe to call from any thread.
    pub fn push(&self, chunk: Bytes) {
        self.queue.lock().push_back(chunk);
        // notify_one stores a permit when nobody is waiting yet
        self.notify.notify_one();
    }

    /// Remove the oldest chunk, suspending until one is available.
    pub async fn read(&self) -> Bytes {
        loop {
            if let Some(chunk) = self.try_read() {
                return chunk;
            }
            self.notify.notified().await;
        }
    }

    /// Remove the oldest chunk without waiting.
    pub fn try_read(&self) -> Option<Bytes> {
        self.queue.lock().pop_front()
    }

    /// Like [`read`](Self::read) but gives up after `timeout`.
    ///
    /// Returns `None` when no chunk arrived in time. Nothing is removed in
    /// that case.
    pub async fn read_timeout(&self, timeout: Duration) -> Option<Bytes> {
        tokio::time::timeout(timeout, self.read()).await.ok()
    }

    /// Number of buffered chunks.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
