//! The TTS bridge.
//!
//! [`CosyTTS`] accepts text fragments grouped into segments and exposes a
//! single ordered stream of raw audio chunks. The transport is chosen once
//! from configuration:
//!
//! - **Streaming**: one CosyVoice session per segment, audio delivered by
//!   the session's callback.
//! - **REST**: one chunked HTTP request per submission when `base_url` is set.
//!
//! Transport failures never reach the caller. They are logged and the
//! consumer simply sees no audio for the affected text.
//!
//! # Example
//!
//! ```rust,ignore
//! use cosy_tts_bridge::core::tts::{CosyTTS, TTSConfig};
//!
//! let mut tts = CosyTTS::new(TTSConfig {
//!     api_key: "sk-...".to_string(),
//!     ..Default::default()
//! })?;
//!
//! tts.submit("Hello", false);
//! tts.submit(" world", true);
//! let chunk = tts.read_audio_chunk().await;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::base::{SessionFactory, TTSConfig, TTSError, TTSResult, TransportMode};
use super::cosyvoice::CosyVoiceSessionFactory;
use super::rest::RestStreamer;
use super::session::SessionHandle;
use super::sink::AudioSink;

enum Transport {
    Streaming(SessionHandle),
    Rest {
        streamer: RestStreamer,
        tasks: Vec<JoinHandle<()>>,
    },
}

/// Streaming TTS bridge over CosyVoice with REST fallback.
pub struct CosyTTS {
    config: TTSConfig,
    mode: TransportMode,
    sink: Arc<AudioSink>,
    transport: Transport,
}

impl CosyTTS {
    /// Create a bridge using the DashScope CosyVoice transport in streaming mode.
    ///
    /// Fails with [`TTSError::InvalidConfiguration`] when the configuration is
    /// rejected. This is the only error the bridge ever returns.
    pub fn new(config: TTSConfig) -> TTSResult<Self> {
        config.validate().map_err(TTSError::InvalidConfiguration)?;

        match config.transport_mode() {
            TransportMode::Streaming => {
                let factory = Arc::new(CosyVoiceSessionFactory::new(&config)?);
                Self::build(config, factory)
            }
            TransportMode::Rest => {
                let sink = Arc::new(AudioSink::new());
                let transport = Self::rest_transport(&config, sink.clone())?;
                Ok(Self::assemble(config, sink, transport))
            }
        }
    }

    /// Create a bridge whose streaming sessions come from `factory`.
    ///
    /// The factory is unused when the configuration selects REST mode.
    pub fn with_session_factory(
        config: TTSConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> TTSResult<Self> {
        config.validate().map_err(TTSError::InvalidConfiguration)?;
        Self::build(config, factory)
    }

    fn build(config: TTSConfig, factory: Arc<dyn SessionFactory>) -> TTSResult<Self> {
        let sink = Arc::new(AudioSink::new());
        let transport = match config.transport_mode() {
            TransportMode::Streaming => {
                Transport::Streaming(SessionHandle::new(factory, sink.clone()))
            }
            TransportMode::Rest => {
                debug!("session factory ignored in REST mode");
                Self::rest_transport(&config, sink.clone())?
            }
        };
        Ok(Self::assemble(config, sink, transport))
    }

    fn rest_transport(config: &TTSConfig, sink: Arc<AudioSink>) -> TTSResult<Transport> {
        let url = config.fallback_url().ok_or_else(|| {
            TTSError::InvalidConfiguration("base_url is required for REST mode".to_string())
        })?;

        Ok(Transport::Rest {
            streamer: RestStreamer::new(url, &config.voice, sink)?,
            tasks: Vec::new(),
        })
    }

    fn assemble(config: TTSConfig, sink: Arc<AudioSink>, transport: Transport) -> Self {
        let mode = config.transport_mode();
        info!(
            mode = %mode,
            voice = %config.voice,
            model = %config.model,
            sample_rate = config.sample_rate,
            "CosyVoice TTS bridge ready"
        );

        Self {
            config,
            mode,
            sink,
            transport,
        }
    }

    pub fn config(&self) -> &TTSConfig {
        &self.config
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Shared handle to the audio buffer.
    pub fn sink(&self) -> Arc<AudioSink> {
        self.sink.clone()
    }

    /// Submit one text fragment.
    ///
    /// In streaming mode the fragment feeds the live session, opening one
    /// first when needed; `end_of_segment` finalizes that session. In REST
    /// mode a background request is started and this returns immediately.
    ///
    /// Never fails: problems are logged and produce no audio.
    pub fn submit(&mut self, text: &str, end_of_segment: bool) {
        match &mut self.transport {
            Transport::Streaming(handle) => handle.submit(text, end_of_segment),
            Transport::Rest { streamer, tasks } => {
                tasks.retain(|task| !task.is_finished());
                match streamer.spawn(text, end_of_segment) {
                    Ok(task) => tasks.push(task),
                    Err(e) => error!("REST TTS error: {}", e),
                }
            }
        }
    }

    /// Next audio chunk in arrival order. Waits while none is buffered.
    pub async fn read_audio_chunk(&self) -> Bytes {
        self.sink.read().await
    }

    /// Abort the live streaming session, if any.
    ///
    /// Buffered audio is kept. In-flight REST requests are not affected.
    pub fn cancel(&mut self) {
        match &mut self.transport {
            Transport::Streaming(handle) => handle.cancel(),
            Transport::Rest { .. } => debug!("cancel ignored in REST mode"),
        }
    }

    pub fn has_live_session(&self) -> bool {
        match &self.transport {
            Transport::Streaming(handle) => handle.is_live(),
            Transport::Rest { .. } => false,
        }
    }

    /// Streaming sessions opened so far. Always zero in REST mode.
    pub fn sessions_opened(&self) -> u64 {
        match &self.transport {
            Transport::Streaming(handle) => handle.sessions_opened(),
            Transport::Rest { .. } => 0,
        }
    }

    /// REST requests that have not completed yet.
    pub fn pending_rest_tasks(&self) -> usize {
        match &self.transport {
            Transport::Rest { tasks, .. } => tasks.iter().filter(|t| !t.is_finished()).count(),
            Transport::Streaming(_) => 0,
        }
    }
}
