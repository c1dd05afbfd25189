pub mod tts;

// Re-export commonly used types for convenience
pub use tts::{AudioSink, CosyTTS, TTSConfig, TTSError, TTSResult, TransportMode};
