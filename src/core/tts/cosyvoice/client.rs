//! DashScope websocket session and its connection task.
//!
//! [`CosyVoiceSession`] is the synchronous handle the bridge holds; the
//! connection itself runs on a spawned tokio task that owns the websocket
//! and invokes the callback. The two sides talk over an unbounded command
//! channel, so feeding text never blocks the caller.
//!
//! Sessions opened by one factory are chained: a connection holds its audio
//! back until the connection opened before it has closed, so segments reach
//! the sink in submission order even though finalized sessions finish in
//! the background.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{self, EventKind, ServerEvent};
use super::{CONNECT_TIMEOUT, DATA_INSPECTION_HEADER, WS_MESSAGE_TIMEOUT};
use crate::core::tts::base::{
    SessionFactory, SynthesisCallback, SynthesisSession, TTSConfig, TTSError, TTSResult,
};
use crate::utils::url_validation::{WS_SCHEMES, validate_endpoint_url};

// =============================================================================
// Session Factory
// =============================================================================

/// Opens one DashScope websocket per session.
#[derive(Clone)]
pub struct CosyVoiceSessionFactory {
    ws_url: String,
    api_key: String,
    model: String,
    voice: String,
    sample_rate: u32,
    /// Fires when the most recently opened connection has closed
    last_closed: Arc<Mutex<CancellationToken>>,
}

impl std::fmt::Debug for CosyVoiceSessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosyVoiceSessionFactory")
            .field("ws_url", &self.ws_url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl CosyVoiceSessionFactory {
    pub fn new(config: &TTSConfig) -> TTSResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "api_key is required for streaming synthesis".to_string(),
            ));
        }

        validate_endpoint_url(&config.ws_url, WS_SCHEMES)
            .map_err(|e| TTSError::InvalidConfiguration(format!("invalid ws_url: {e}")))?;

        Ok(Self {
            ws_url: config.ws_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            sample_rate: config.sample_rate,
            last_closed: Arc::new(Mutex::new(closed_token())),
        })
    }

    pub(crate) fn build_request(&self) -> TTSResult<Request> {
        let mut request = self.ws_url.as_str().into_client_request().map_err(|e| {
            TTSError::ConnectionFailed(format!("Failed to create WebSocket request: {e}"))
        })?;

        let authorization = HeaderValue::from_str(&format!("bearer {}", self.api_key))
            .map_err(|e| TTSError::InvalidConfiguration(format!("invalid api_key: {e}")))?;

        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(DATA_INSPECTION_HEADER, HeaderValue::from_static("enable"));

        Ok(request)
    }
}

impl SessionFactory for CosyVoiceSessionFactory {
    fn open(&self, callback: Arc<dyn SynthesisCallback>) -> TTSResult<Box<dyn SynthesisSession>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TTSError::InternalError(format!("streaming sessions need a tokio runtime: {e}"))
        })?;

        let request = self.build_request()?;
        let task_id = Uuid::new_v4().simple().to_string();
        let run_task = messages::run_task(&task_id, &self.model, &self.voice, self.sample_rate)
            .map_err(|e| TTSError::SerializationError(e.to_string()))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let closed = CancellationToken::new();
        let predecessor = std::mem::replace(&mut *self.last_closed.lock(), closed.clone());

        runtime.spawn(run_connection(Connection {
            request,
            task_id: task_id.clone(),
            run_task,
            commands: command_rx,
            cancel: cancel.clone(),
            closed,
            predecessor,
            callback,
        }));

        debug!(task_id = %task_id, "CosyVoice session opened");
        Ok(Box::new(CosyVoiceSession {
            task_id,
            commands,
            cancel,
            finished: false,
        }))
    }
}

// =============================================================================
// Session Handle
// =============================================================================

#[derive(Debug)]
enum Command {
    Text(String),
    Finish,
}

/// Caller side of one DashScope task.
///
/// Dropping the session before [`streaming_complete`] closes the connection.
/// After completion the connection task keeps running until the provider
/// reports the task finished.
///
/// [`streaming_complete`]: SynthesisSession::streaming_complete
pub struct CosyVoiceSession {
    task_id: String,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    finished: bool,
}

impl CosyVoiceSession {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    fn send(&self, command: Command) -> TTSResult<()> {
        self.commands
            .send(command)
            .map_err(|_| TTSError::TransportClosed("synthesis connection is closed".to_string()))
    }
}

impl SynthesisSession for CosyVoiceSession {
    fn streaming_call(&mut self, text: &str) -> TTSResult<()> {
        if self.finished {
            return Err(TTSError::ProviderError(
                "task already finished, no more text accepted".to_string(),
            ));
        }
        self.send(Command::Text(text.to_string()))
    }

    fn streaming_complete(&mut self) -> TTSResult<()> {
        if self.finished {
            return Ok(());
        }
        self.send(Command::Finish)?;
        self.finished = true;
        Ok(())
    }

    fn streaming_cancel(&mut self) -> TTSResult<()> {
        self.finished = true;
        let already_closed = self.commands.is_closed();
        self.cancel.cancel();

        if already_closed {
            return Err(TTSError::TransportClosed(
                "synthesis connection is closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for CosyVoiceSession {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}

// =============================================================================
// Connection Task
// =============================================================================

struct Connection {
    request: Request,
    task_id: String,
    run_task: String,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    closed: CancellationToken,
    predecessor: CancellationToken,
    callback: Arc<dyn SynthesisCallback>,
}

async fn run_connection(connection: Connection) {
    let _closed = connection.closed.clone().drop_guard();
    let callback = connection.callback.clone();
    let task_id = connection.task_id.clone();
    let cancel = connection.cancel.clone();
    let mut gate = AudioGate::new(connection.predecessor.clone());

    let result = drive_connection(connection, &mut gate).await;
    if cancel.is_cancelled() {
        gate.discard();
    }
    if gate.is_waiting() {
        debug!(task_id = %task_id, "waiting for the previous session to close");
    }
    gate.release(&*callback).await;

    if let Err(e) = result {
        callback.on_error(&e.to_string());
    }

    debug!(task_id = %task_id, "CosyVoice connection task exiting");
    callback.on_close();
}

/// Runs one task to completion. Returns `Ok` when the task finished, was
/// cancelled, or the server closed the socket.
async fn drive_connection(connection: Connection, gate: &mut AudioGate) -> TTSResult<()> {
    let Connection {
        request,
        task_id,
        run_task,
        mut commands,
        cancel,
        callback,
        ..
    } = connection;
    let predecessor = gate.predecessor.clone();

    let connect = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(task_id = %task_id, "CosyVoice session cancelled before connecting");
            return Ok(());
        }
        result = timeout(CONNECT_TIMEOUT, connect_async(request)) => result,
    };

    let (ws_stream, _response) = match connect {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            return Err(TTSError::ConnectionFailed(format!(
                "Failed to connect to DashScope: {e}"
            )));
        }
        Err(_) => {
            return Err(TTSError::ConnectionFailed(
                "DashScope connection timeout".to_string(),
            ));
        }
    };

    callback.on_open();
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    ws_sink
        .send(Message::Text(run_task.into()))
        .await
        .map_err(|e| TTSError::TransportClosed(format!("Failed to send run-task: {e}")))?;

    let mut started = false;
    let mut commands_open = true;
    let mut pending: VecDeque<Command> = VecDeque::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(task_id = %task_id, "CosyVoice session cancelled");
                let _ = ws_sink.send(Message::Close(None)).await;
                return Ok(());
            }

            _ = predecessor.cancelled(), if gate.is_waiting() => {
                gate.open(&*callback);
            }

            command = commands.recv(), if commands_open => {
                match command {
                    Some(command) if started => {
                        let frame = encode_command(&task_id, &command)?;
                        ws_sink.send(Message::Text(frame.into())).await.map_err(|e| {
                            TTSError::TransportClosed(format!("Failed to send text: {e}"))
                        })?;
                    }
                    Some(command) => pending.push_back(command),
                    None => commands_open = false,
                }
            }

            message = timeout(WS_MESSAGE_TIMEOUT, ws_stream.next()) => {
                match message {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        callback.on_event(text.as_str());

                        let event = match ServerEvent::parse(text.as_str()) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(task_id = %task_id, "Unparseable DashScope event: {}", e);
                                continue;
                            }
                        };

                        match event.header.event {
                            EventKind::TaskStarted => {
                                debug!(task_id = %task_id, "DashScope task started, flushing {} commands", pending.len());
                                started = true;
                                while let Some(command) = pending.pop_front() {
                                    let frame = encode_command(&task_id, &command)?;
                                    ws_sink.send(Message::Text(frame.into())).await.map_err(|e| {
                                        TTSError::TransportClosed(format!("Failed to send text: {e}"))
                                    })?;
                                }
                            }
                            EventKind::ResultGenerated => {}
                            EventKind::TaskFinished => {
                                gate.release(&*callback).await;
                                callback.on_complete();
                                let _ = ws_sink.send(Message::Close(None)).await;
                                return Ok(());
                            }
                            EventKind::TaskFailed => {
                                let _ = ws_sink.send(Message::Close(None)).await;
                                return Err(TTSError::ProviderError(event.failure_description()));
                            }
                            EventKind::Unknown => {
                                debug!(task_id = %task_id, "Ignoring unknown DashScope event");
                            }
                        }
                    }
                    Ok(Some(Ok(Message::Binary(audio)))) => {
                        gate.deliver(audio, &*callback);
                    }
                    Ok(Some(Ok(Message::Close(frame)))) => {
                        info!(task_id = %task_id, "DashScope closed the connection: {:?}", frame);
                        return Ok(());
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) => {
                        return Err(TTSError::TransportClosed(format!("WebSocket error: {e}")));
                    }
                    Ok(None) => {
                        info!(task_id = %task_id, "DashScope WebSocket stream ended");
                        return Ok(());
                    }
                    Err(_elapsed) => {
                        return Err(TTSError::TransportClosed(format!(
                            "WebSocket idle timeout - no message for {} seconds",
                            WS_MESSAGE_TIMEOUT.as_secs()
                        )));
                    }
                }
            }
        }
    }
}

/// Orders audio behind the previously opened connection.
///
/// Until `predecessor` fires, audio is queued in arrival order; afterwards it
/// is forwarded straight to the callback.
struct AudioGate {
    predecessor: CancellationToken,
    held: VecDeque<Bytes>,
    waiting: bool,
}

impl AudioGate {
    fn new(predecessor: CancellationToken) -> Self {
        let waiting = !predecessor.is_cancelled();
        Self {
            predecessor,
            held: VecDeque::new(),
            waiting,
        }
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn deliver(&mut self, data: Bytes, callback: &dyn SynthesisCallback) {
        if self.waiting {
            self.held.push_back(data);
        } else {
            callback.on_data(data);
        }
    }

    /// Forward everything held so far and stop holding.
    fn open(&mut self, callback: &dyn SynthesisCallback) {
        self.waiting = false;
        for chunk in self.held.drain(..) {
            callback.on_data(chunk);
        }
    }

    /// Drop held audio. Later audio is still held until the predecessor closes.
    fn discard(&mut self) {
        if !self.held.is_empty() {
            debug!("discarding {} held audio chunks", self.held.len());
            self.held.clear();
        }
    }

    /// Wait for the previous connection to close, then forward held audio.
    async fn release(&mut self, callback: &dyn SynthesisCallback) {
        if self.waiting {
            self.predecessor.cancelled().await;
        }
        self.open(callback);
    }
}

fn closed_token() -> CancellationToken {
    let token = CancellationToken::new();
    token.cancel();
    token
}

fn encode_command(task_id: &str, command: &Command) -> TTSResult<String> {
    match command {
        Command::Text(text) => messages::continue_task(task_id, text),
        Command::Finish => messages::finish_task(task_id),
    }
    .map_err(|e| TTSError::SerializationError(e.to_string()))
}
