//! Callback adapter that forwards streaming transport events into the sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use super::base::SynthesisCallback;
use super::sink::AudioSink;

/// One adapter per streaming session.
///
/// Holds the sink weakly so an orphaned transport task cannot keep the
/// bridge's buffer alive.
#[derive(Debug)]
pub struct SinkCallback {
    closed: AtomicBool,
    sink: Weak<AudioSink>,
}

impl SinkCallback {
    pub fn new(sink: &Arc<AudioSink>) -> Self {
        Self {
            closed: AtomicBool::new(false),
            sink: Arc::downgrade(sink),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl SynthesisCallback for SinkCallback {
    fn on_open(&self) {
        info!("websocket is open.");
    }

    fn on_complete(&self) {
        info!("speech synthesis task complete successfully.");
    }

    fn on_error(&self, message: &str) {
        error!("speech synthesis task failed, {}", message);
    }

    fn on_close(&self) {
        info!("websocket is closed.");
        self.close();
    }

    fn on_event(&self, message: &str) {
        debug!("received event: {}", message);
    }

    fn on_data(&self, data: Bytes) {
        if self.is_closed() {
            warn!(
                "received data: {} bytes but connection was closed",
                data.len()
            );
            return;
        }

        debug!("received data: {} bytes", data.len());
        match self.sink.upgrade() {
            Some(sink) => sink.push(data),
            None => debug!("audio sink dropped, discarding {} bytes", data.len()),
        }
    }
}
