//! Session handle for streaming mode.
//!
//! Owns at most one live [`SynthesisSession`]. A session is opened by the
//! first fragment of a segment and released when the segment ends, when the
//! transport fails, or when the caller cancels. Every release path empties
//! the slot, so a released session can never be fed again.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::base::{SessionFactory, SynthesisSession, TTSError, TTSResult};
use super::callback::SinkCallback;
use super::sink::AudioSink;

#[derive(Default)]
enum SessionSlot {
    #[default]
    None,
    Live(LiveSession),
}

struct LiveSession {
    id: u64,
    session: Box<dyn SynthesisSession>,
}

pub struct SessionHandle {
    factory: Arc<dyn SessionFactory>,
    sink: Arc<AudioSink>,
    slot: SessionSlot,
    opened: u64,
}

impl SessionHandle {
    pub fn new(factory: Arc<dyn SessionFactory>, sink: Arc<AudioSink>) -> Self {
        Self {
            factory,
            sink,
            slot: SessionSlot::None,
            opened: 0,
        }
    }

    /// Feed one fragment, opening a session first when none is live.
    ///
    /// With `end_of_segment` the session is finalized and released after the
    /// fragment is fed. Failures are logged and release the session.
    pub fn submit(&mut self, text: &str, end_of_segment: bool) {
        let live = match self.live_or_open() {
            Ok(live) => live,
            Err(e) => {
                log_stream_error(&e);
                return;
            }
        };

        let id = live.id;
        if let Err(e) = live.session.streaming_call(text) {
            log_stream_error(&e);
            self.release(id);
            return;
        }
        debug!(session = id, "fed {} bytes of text", text.len());

        if end_of_segment {
            info!("Streaming complete");
            if let Err(e) = live.session.streaming_complete() {
                log_stream_error(&e);
            }
            self.release(id);
        }
    }

    /// Abort the live session, if any. The slot is emptied whatever the
    /// provider answers.
    pub fn cancel(&mut self) {
        let SessionSlot::Live(mut live) = std::mem::take(&mut self.slot) else {
            return;
        };

        match live.session.streaming_cancel() {
            Ok(()) => debug!(session = live.id, "streaming session cancelled"),
            Err(TTSError::TransportClosed(e)) => error!("WebSocket connection closed, {}", e),
            Err(e) => error!("Error cancelling streaming, {}", e),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.slot, SessionSlot::Live(_))
    }

    /// Total sessions opened over the lifetime of this handle.
    pub fn sessions_opened(&self) -> u64 {
        self.opened
    }

    fn live_or_open(&mut self) -> TTSResult<&mut LiveSession> {
        if let SessionSlot::None = self.slot {
            info!("Creating new synthesizer");
            let callback = Arc::new(SinkCallback::new(&self.sink));
            let session = self.factory.open(callback)?;
            self.opened += 1;
            self.slot = SessionSlot::Live(LiveSession {
                id: self.opened,
                session,
            });
        }

        match &mut self.slot {
            SessionSlot::Live(live) => Ok(live),
            SessionSlot::None => Err(TTSError::InternalError(
                "session slot empty after open".to_string(),
            )),
        }
    }

    fn release(&mut self, id: u64) {
        debug!(session = id, "releasing streaming session");
        self.slot = SessionSlot::None;
    }
}

fn log_stream_error(e: &TTSError) {
    match e {
        TTSError::TransportClosed(msg) => error!("WebSocket connection closed, {}", msg),
        other => error!("Error streaming text, {}", other),
    }
}
