//! REST fallback streamer.
//!
//! One POST per submission against a self-hosted CosyVoice endpoint. The
//! response body is raw PCM which is re-chunked into fixed-size pieces and
//! pushed to the sink as it arrives. Each submission runs on its own task
//! and is not tied to any streaming session.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::base::{TTSError, TTSResult};
use super::sink::AudioSink;

/// Maximum size of one chunk pushed to the sink in fallback mode.
pub const REST_CHUNK_SIZE: usize = 2048;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct RestStreamer {
    client: Client,
    url: Arc<str>,
    voice: Arc<str>,
    sink: Arc<AudioSink>,
}

impl RestStreamer {
    /// Create a streamer posting to `url` (trailing `/` already trimmed).
    pub fn new(url: &str, voice: &str, sink: Arc<AudioSink>) -> TTSResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| {
                TTSError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            url: Arc::from(url.trim_end_matches('/')),
            voice: Arc::from(voice),
            sink,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start one request on a detached task of the current tokio runtime.
    pub fn spawn(&self, text: &str, end_of_segment: bool) -> TTSResult<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TTSError::InternalError(format!("REST requests need a tokio runtime: {e}"))
        })?;

        let streamer = self.clone();
        let text = text.to_string();
        Ok(runtime.spawn(async move { streamer.stream(&text, end_of_segment).await }))
    }

    /// Run one request to completion, logging any failure.
    pub async fn stream(&self, text: &str, end_of_segment: bool) {
        debug!(end_of_segment, "REST TTS request for {} chars", text.chars().count());

        match self.try_stream(text).await {
            Ok(chunks) => debug!("REST TTS finished, {} chunks", chunks),
            Err(TTSError::ProviderError(detail)) => error!("REST TTS failed, {}", detail),
            Err(e) => error!("REST TTS error: {}", e),
        }
    }

    /// Run one request and return the number of chunks pushed to the sink.
    ///
    /// Chunks pushed before a mid-body failure stay in the sink, and bytes
    /// received but not yet chunked are pushed before the error returns.
    pub async fn try_stream(&self, text: &str) -> TTSResult<usize> {
        let params = [("tts_text", text), ("spk_id", &*self.voice)];

        let response = self
            .client
            .post(&*self.url)
            .form(&params)
            .send()
            .await
            .map_err(|e| TTSError::NetworkError(format!("request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let detail = response.text().await.unwrap_or_default();
            return Err(TTSError::ProviderError(format!(
                "status: {}, detail: {}",
                status.as_u16(),
                detail
            )));
        }

        let mut body = response.bytes_stream();
        let mut pending = BytesMut::with_capacity(REST_CHUNK_SIZE);
        let mut pushed = 0usize;

        while let Some(item) = body.next().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(e) => {
                    if !pending.is_empty() {
                        self.sink.push(pending.freeze());
                    }
                    return Err(TTSError::NetworkError(format!("body read failed: {}", e)));
                }
            };
            pending.extend_from_slice(&bytes);

            while pending.len() >= REST_CHUNK_SIZE {
                self.sink.push(pending.split_to(REST_CHUNK_SIZE).freeze());
                pushed += 1;
            }
        }

        if !pending.is_empty() {
            self.sink.push(pending.freeze());
            pushed += 1;
        }

        Ok(pushed)
    }
}
