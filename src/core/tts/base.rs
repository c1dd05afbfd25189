//! Base types and traits shared by both TTS transports.
//!
//! The bridge talks to the streaming provider only through the
//! [`SessionFactory`] / [`SynthesisSession`] / [`SynthesisCallback`] seam,
//! so the provider protocol never leaks into session lifecycle handling.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::url_validation::{HTTP_SCHEMES, WS_SCHEMES, validate_endpoint_url};

// =============================================================================
// Defaults
// =============================================================================

/// DashScope inference websocket used for duplex CosyVoice sessions.
pub const DEFAULT_WS_URL: &str = "wss://dashscope.aliyuncs.com/api-ws/v1/inference/";

/// Default CosyVoice voice.
pub const DEFAULT_VOICE: &str = "longxiaochun";

/// Default CosyVoice model.
pub const DEFAULT_MODEL: &str = "cosyvoice-v1";

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Output sample rates accepted by the provider for mono 16-bit PCM.
pub const SUPPORTED_SAMPLE_RATES: [u32; 6] = [8000, 16000, 22050, 24000, 44100, 48000];

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised inside the TTS bridge.
///
/// Only [`TTSError::InvalidConfiguration`] ever reaches a caller (from
/// construction). Everything else is absorbed and logged by the component
/// that detected it.
#[derive(Debug, Error)]
pub enum TTSError {
    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The streaming connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The streaming connection is gone
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// Provider-side failure (invalid state, quota, malformed request)
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// HTTP transport failure in fallback mode
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for TTS operations.
pub type TTSResult<T> = Result<T, TTSError>;

// =============================================================================
// Configuration
// =============================================================================

/// Immutable bridge configuration.
///
/// A non-empty `base_url` selects the REST fallback; otherwise the bridge
/// opens streaming sessions against `ws_url` using `api_key`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TTSConfig {
    /// DashScope API key (streaming mode only)
    pub api_key: String,

    /// Fallback REST endpoint. Presence toggles REST mode.
    pub base_url: Option<String>,

    /// Streaming websocket endpoint
    pub ws_url: String,

    /// Voice identifier (`voice` for streaming, `spk_id` for REST)
    pub voice: String,

    /// Model identifier
    pub model: String,

    /// Output sample rate in Hz
    pub sample_rate: u32,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            ws_url: DEFAULT_WS_URL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

// api_key stays out of logs
impl fmt::Debug for TTSConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TTSConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("base_url", &self.base_url)
            .field("ws_url", &self.ws_url)
            .field("voice", &self.voice)
            .field("model", &self.model)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl TTSConfig {
    /// Fallback endpoint with surrounding whitespace and trailing slashes removed.
    ///
    /// Returns `None` when no usable endpoint is configured.
    pub fn fallback_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    /// Transport selected by this configuration.
    #[inline]
    pub fn transport_mode(&self) -> TransportMode {
        TransportMode::from_config(self)
    }

    /// Validate the configuration.
    ///
    /// The API key is checked by the streaming session factory, since a
    /// custom factory may authenticate differently.
    pub fn validate(&self) -> Result<(), String> {
        if self.voice.trim().is_empty() {
            return Err("voice must not be empty".to_string());
        }

        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }

        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(format!(
                "Unsupported sample rate {} Hz. Supported rates: {:?}",
                self.sample_rate, SUPPORTED_SAMPLE_RATES
            ));
        }

        match self.fallback_url() {
            Some(url) => {
                validate_endpoint_url(url, HTTP_SCHEMES)
                    .map_err(|e| format!("invalid base_url '{url}': {e}"))?;
            }
            None => {
                validate_endpoint_url(&self.ws_url, WS_SCHEMES)
                    .map_err(|e| format!("invalid ws_url '{}': {e}", self.ws_url))?;
            }
        }

        Ok(())
    }
}

/// Transport strategy, fixed for the lifetime of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Duplex streaming sessions, one per segment
    Streaming,
    /// One chunked HTTP request per submission
    Rest,
}

impl TransportMode {
    /// Pure function of configuration: fallback endpoint present selects REST.
    pub fn from_config(config: &TTSConfig) -> Self {
        if config.fallback_url().is_some() {
            Self::Rest
        } else {
            Self::Streaming
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming => write!(f, "streaming"),
            Self::Rest => write!(f, "rest"),
        }
    }
}

// =============================================================================
// Streaming Session Seam
// =============================================================================

/// Events delivered by a streaming transport, possibly from another task or thread.
///
/// Implementations must not block: they run on the transport's own
/// execution context.
pub trait SynthesisCallback: Send + Sync {
    /// Connection to the provider is open
    fn on_open(&self);

    /// Provider finished the synthesis task successfully
    fn on_complete(&self);

    /// Provider or transport failure
    fn on_error(&self, message: &str);

    /// Connection is closed; no further events follow
    fn on_close(&self);

    /// Diagnostic event from the provider
    fn on_event(&self, message: &str);

    /// One chunk of synthesized audio
    fn on_data(&self, data: Bytes);
}

/// One live streaming synthesis session.
pub trait SynthesisSession: Send {
    /// Feed one text fragment.
    fn streaming_call(&mut self, text: &str) -> TTSResult<()>;

    /// Signal that no more text follows for this session.
    fn streaming_complete(&mut self) -> TTSResult<()>;

    /// Ask the provider to abort the session.
    fn streaming_cancel(&mut self) -> TTSResult<()>;
}

/// Opens streaming sessions wired to a callback.
pub trait SessionFactory: Send + Sync {
    /// Open a new session that reports its events to `callback`.
    fn open(&self, callback: Arc<dyn SynthesisCallback>) -> TTSResult<Box<dyn SynthesisSession>>;
}
