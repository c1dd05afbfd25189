//! CosyVoice streaming synthesis over the DashScope duplex websocket.
//!
//! Each session is one DashScope task on its own websocket connection:
//! `run-task`, any number of `continue-task` frames, then `finish-task`.
//! Audio comes back as binary frames and is handed to the session's
//! [`SynthesisCallback`](crate::core::tts::SynthesisCallback).

mod client;
pub mod messages;

use std::time::Duration;

pub use client::{CosyVoiceSession, CosyVoiceSessionFactory};

/// Idle timeout on the websocket. The timer restarts each time the
/// connection task handles anything, including outgoing commands.
pub const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the websocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header enabling DashScope data inspection on the connection.
pub const DATA_INSPECTION_HEADER: &str = "x-dashscope-datainspection";
