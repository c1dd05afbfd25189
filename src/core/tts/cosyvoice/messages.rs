//! WebSocket message types for the DashScope duplex inference API.
//!
//! - **Outgoing messages** (client to server), all JSON text frames:
//!   - `run-task`: opens the synthesis task with model, voice and format
//!   - `continue-task`: one text fragment
//!   - `finish-task`: no more text follows
//!
//! - **Incoming messages** (server to client):
//!   - JSON text frames carrying a [`ServerEvent`]
//!   - Binary frames carrying raw PCM audio

use serde::{Deserialize, Serialize};

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientAction {
    RunTask,
    ContinueTask,
    FinishTask,
}

#[derive(Debug, Serialize)]
pub struct ClientHeader<'a> {
    pub action: ClientAction,
    pub task_id: &'a str,
    pub streaming: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ClientMessage<'a, P> {
    pub header: ClientHeader<'a>,
    pub payload: P,
}

#[derive(Debug, Default, Serialize)]
pub struct EmptyInput {}

#[derive(Debug, Serialize)]
pub struct TextInput<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SynthesisParameters<'a> {
    pub text_type: &'static str,
    pub voice: &'a str,
    pub format: &'static str,
    pub sample_rate: u32,
}

#[derive(Debug, Serialize)]
pub struct RunTaskPayload<'a> {
    pub task_group: &'static str,
    pub task: &'static str,
    pub function: &'static str,
    pub model: &'a str,
    pub parameters: SynthesisParameters<'a>,
    pub input: EmptyInput,
}

#[derive(Debug, Serialize)]
pub struct ContinueTaskPayload<'a> {
    pub input: TextInput<'a>,
}

#[derive(Debug, Serialize)]
pub struct FinishTaskPayload {
    pub input: EmptyInput,
}

fn header(action: ClientAction, task_id: &str) -> ClientHeader<'_> {
    ClientHeader {
        action,
        task_id,
        streaming: "duplex",
    }
}

/// `run-task` requesting mono 16-bit PCM at `sample_rate`.
pub fn run_task(
    task_id: &str,
    model: &str,
    voice: &str,
    sample_rate: u32,
) -> serde_json::Result<String> {
    serde_json::to_string(&ClientMessage {
        header: header(ClientAction::RunTask, task_id),
        payload: RunTaskPayload {
            task_group: "audio",
            task: "tts",
            function: "SpeechSynthesizer",
            model,
            parameters: SynthesisParameters {
                text_type: "PlainText",
                voice,
                format: "pcm",
                sample_rate,
            },
            input: EmptyInput {},
        },
    })
}

pub fn continue_task(task_id: &str, text: &str) -> serde_json::Result<String> {
    serde_json::to_string(&ClientMessage {
        header: header(ClientAction::ContinueTask, task_id),
        payload: ContinueTaskPayload {
            input: TextInput { text },
        },
    })
}

pub fn finish_task(task_id: &str) -> serde_json::Result<String> {
    serde_json::to_string(&ClientMessage {
        header: header(ClientAction::FinishTask, task_id),
        payload: FinishTaskPayload {
            input: EmptyInput {},
        },
    })
}

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TaskStarted,
    ResultGenerated,
    TaskFinished,
    TaskFailed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerHeader {
    pub event: EventKind,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Event frame from the server. The payload is kept opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEvent {
    pub header: ServerHeader,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ServerEvent {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// `"<code>: <message>"` for a failed task.
    pub fn failure_description(&self) -> String {
        let code = self.header.error_code.as_deref().unwrap_or("UnknownError");
        let message = self
            .header
            .error_message
            .as_deref()
            .unwrap_or("no error message");
        format!("{code}: {message}")
    }
}
