mod base;
mod bridge;
mod callback;
pub mod cosyvoice;
#[cfg(test)]
mod mock;
pub mod rest;
mod session;
mod sink;

pub use base::{
    DEFAULT_MODEL, DEFAULT_SAMPLE_RATE, DEFAULT_VOICE, DEFAULT_WS_URL, SUPPORTED_SAMPLE_RATES,
    SessionFactory, SynthesisCallback, SynthesisSession, TTSConfig, TTSError, TTSResult,
    TransportMode,
};
pub use bridge::CosyTTS;
pub use callback::SinkCallback;
pub use cosyvoice::{CosyVoiceSession, CosyVoiceSessionFactory};
pub use rest::{REST_CHUNK_SIZE, RestStreamer};
pub use session::SessionHandle;
pub use sink::AudioSink;
