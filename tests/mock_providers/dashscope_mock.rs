//! DashScope WebSocket mock server
//!
//! Speaks enough of the duplex inference protocol for CosyVoice sessions:
//! acknowledges `run-task` with `task-started`, answers every
//! `continue-task` with one binary frame `audio:<text>`, and answers
//! `finish-task` with `task-finished`.
//!
//! [`MockBehavior::SynthesizeOnFinish`] instead holds the text until
//! `finish-task` and then streams several frames `<text>-<n>`.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// How the mock reacts to `run-task`
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Acknowledge immediately and synthesize everything
    Normal,
    /// Acknowledge after a delay; text sent early would arrive before the ack
    DelayedStart(Duration),
    /// Reply with `task-failed`
    FailTask { code: String, message: String },
    /// Synthesize the whole segment after `finish-task` as `frames` chunks.
    /// The first connection spaces its chunks by `interval`, later ones
    /// answer at once.
    SynthesizeOnFinish { frames: usize, interval: Duration },
}

/// One client frame as seen by the server
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedFrame {
    pub connection: u64,
    pub action: String,
    pub task_id: String,
    pub text: Option<String>,
    /// Whether `task-started` had been sent on this connection
    pub after_start: bool,
}

#[derive(Debug, Default)]
pub struct DashScopeMockState {
    pub connections: AtomicU64,
    pub frames: Mutex<Vec<RecordedFrame>>,
    pub authorization: Mutex<Vec<String>>,
    pub data_inspection: Mutex<Vec<String>>,
    pub closed_connections: AtomicU64,
}

impl DashScopeMockState {
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn closed_connections(&self) -> u64 {
        self.closed_connections.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.frames.lock().clone()
    }

    pub fn actions(&self, connection: u64) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter(|f| f.connection == connection)
            .map(|f| f.action.clone())
            .collect()
    }

    pub fn texts(&self, connection: u64) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter(|f| f.connection == connection)
            .filter_map(|f| f.text.clone())
            .collect()
    }
}

pub struct MockDashScope {
    pub url: String,
    pub state: Arc<DashScopeMockState>,
}

impl MockDashScope {
    /// Start a mock server on an ephemeral local port
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(DashScopeMockState::default());

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = server_state.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state, behavior).await {
                        eprintln!("DashScope mock connection error: {}", e);
                    }
                });
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{}/api-ws/v1/inference/", port),
            state,
        }
    }
}

fn event(name: &str, task_id: &str) -> Message {
    Message::Text(
        json!({
            "header": { "task_id": task_id, "event": name, "attributes": {} },
            "payload": {}
        })
        .to_string()
        .into(),
    )
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<DashScopeMockState>,
    behavior: MockBehavior,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_state = state.clone();
    let ws_stream = accept_hdr_async(stream, move |request: &Request, response: Response| {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        header_state.authorization.lock().push(header("authorization"));
        header_state
            .data_inspection
            .lock()
            .push(header("x-dashscope-datainspection"));
        Ok::<Response, ErrorResponse>(response)
    })
    .await?;

    let connection = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let (write, mut read) = ws_stream.split();
    let write = Arc::new(tokio::sync::Mutex::new(write));
    let started = Arc::new(AtomicBool::new(false));
    let mut segment = String::new();

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };

        let frame: Value = serde_json::from_str(text.as_str())?;
        let action = frame["header"]["action"].as_str().unwrap_or_default().to_string();
        let task_id = frame["header"]["task_id"].as_str().unwrap_or_default().to_string();
        let fragment = frame["payload"]["input"]["text"].as_str().map(str::to_string);

        state.frames.lock().push(RecordedFrame {
            connection,
            action: action.clone(),
            task_id: task_id.clone(),
            text: fragment.clone(),
            after_start: started.load(Ordering::SeqCst),
        });

        match action.as_str() {
            "run-task" => match &behavior {
                MockBehavior::Normal | MockBehavior::SynthesizeOnFinish { .. } => {
                    started.store(true, Ordering::SeqCst);
                    write.lock().await.send(event("task-started", &task_id)).await?;
                }
                MockBehavior::DelayedStart(delay) => {
                    let write = write.clone();
                    let started = started.clone();
                    let delay = *delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        started.store(true, Ordering::SeqCst);
                        let _ = write.lock().await.send(event("task-started", &task_id)).await;
                    });
                }
                MockBehavior::FailTask { code, message } => {
                    let failed = json!({
                        "header": {
                            "task_id": task_id,
                            "event": "task-failed",
                            "error_code": code,
                            "error_message": message,
                        },
                        "payload": {}
                    });
                    write
                        .lock()
                        .await
                        .send(Message::Text(failed.to_string().into()))
                        .await?;
                }
            },
            "continue-task" if matches!(behavior, MockBehavior::SynthesizeOnFinish { .. }) => {
                segment.push_str(&fragment.unwrap_or_default());
                write.lock().await.send(event("result-generated", &task_id)).await?;
            }
            "continue-task" => {
                let mut write = write.lock().await;
                write.send(event("result-generated", &task_id)).await?;
                let audio = format!("audio:{}", fragment.unwrap_or_default());
                write.send(Message::Binary(audio.into_bytes().into())).await?;
            }
            "finish-task" => {
                if let MockBehavior::SynthesizeOnFinish { frames, interval } = &behavior {
                    let write = write.clone();
                    let text = std::mem::take(&mut segment);
                    let frames = *frames;
                    let delay = if connection == 1 { *interval } else { Duration::ZERO };
                    tokio::spawn(async move {
                        for n in 0..frames {
                            tokio::time::sleep(delay).await;
                            let audio = format!("{}-{}", text, n);
                            let _ = write
                                .lock()
                                .await
                                .send(Message::Binary(audio.into_bytes().into()))
                                .await;
                        }
                        let _ = write.lock().await.send(event("task-finished", &task_id)).await;
                    });
                    continue;
                }
                write.lock().await.send(event("task-finished", &task_id)).await?;
            }
            _ => {}
        }
    }

    state.closed_connections.fetch_add(1, Ordering::SeqCst);
    Ok(())
}
