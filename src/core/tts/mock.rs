//! In-process session factory for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use super::base::{SessionFactory, SynthesisCallback, SynthesisSession, TTSError, TTSResult};

/// Counters and switches shared by a [`MockFactory`] and its sessions.
#[derive(Default)]
pub struct MockState {
    pub opens: AtomicUsize,
    pub feeds: AtomicUsize,
    pub completes: AtomicUsize,
    pub cancels: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_feed: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub fed_text: Mutex<Vec<String>>,
}

impl MockState {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn feeds(&self) -> usize {
        self.feeds.load(Ordering::SeqCst)
    }

    pub fn completes(&self) -> usize {
        self.completes.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

/// Factory whose sessions echo every fed fragment back as audio.
#[derive(Default)]
pub struct MockFactory {
    pub state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> (Arc<Self>, Arc<MockState>) {
        let factory = Arc::new(Self::default());
        let state = factory.state.clone();
        (factory, state)
    }
}

impl SessionFactory for MockFactory {
    fn open(&self, callback: Arc<dyn SynthesisCallback>) -> TTSResult<Box<dyn SynthesisSession>> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(TTSError::ConnectionFailed("mock refused".to_string()));
        }

        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live.fetch_max(live, Ordering::SeqCst);

        callback.on_open();
        Ok(Box::new(MockSession {
            state: self.state.clone(),
            callback,
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
    callback: Arc<dyn SynthesisCallback>,
}

impl SynthesisSession for MockSession {
    fn streaming_call(&mut self, text: &str) -> TTSResult<()> {
        if self.state.fail_feed.load(Ordering::SeqCst) {
            return Err(TTSError::TransportClosed("mock socket closed".to_string()));
        }
        self.state.feeds.fetch_add(1, Ordering::SeqCst);
        self.state.fed_text.lock().push(text.to_string());
        self.callback
            .on_data(Bytes::from(format!("audio:{text}").into_bytes()));
        Ok(())
    }

    fn streaming_complete(&mut self) -> TTSResult<()> {
        self.state.completes.fetch_add(1, Ordering::SeqCst);
        self.callback.on_complete();
        self.callback.on_close();
        Ok(())
    }

    fn streaming_cancel(&mut self) -> TTSResult<()> {
        self.state.cancels.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_cancel.load(Ordering::SeqCst) {
            return Err(TTSError::ProviderError("mock cancel rejected".to_string()));
        }
        self.callback.on_close();
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}
