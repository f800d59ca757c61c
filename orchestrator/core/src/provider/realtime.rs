//! Realtime-Speech Provider Adapter
//!
//! Adapter for the realtime speech-to-speech provider family. The protocol
//! runs over a persistent duplex socket: JSON control events as text frames,
//! base64 audio inside events.
//!
//! # Connection Flow
//!
//! 1. Mint an ephemeral client secret over the HTTP control plane
//! 2. Open the duplex socket with the secret
//! 3. Wait for `session.created`, send `session.update` with the directives
//! 4. Translate server events into [`ProviderEvent`]s until the socket closes

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::traits::{ProviderAdapter, ProviderKind, SessionDirectives, UserInput};
use crate::error::ConnectionError;
use crate::events::{AudioFormat, ProviderEvent};
use crate::tools::{ToolCall, ToolCallId, ToolOutcome, ToolResult};
use crate::transport::{
    DuplexSocket, HttpChannel, TransportChannel, TransportError, TransportFrame,
};

/// Deadline for the session.created handshake
const SESSION_CREATED_TIMEOUT: Duration = Duration::from_secs(5);

/// Depth of the translated event queue handed to the orchestrator
const EVENT_QUEUE: usize = 256;

// ============================================================================
// Wire Protocol
// ============================================================================

/// Client-to-provider protocol messages
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Configure the session after creation
    SessionUpdate { session: SessionSettings },
    /// Append user text and ask for a response
    UserText { text: String },
    /// Append a chunk of input audio (base64)
    InputAudioAppend { audio: String },
    /// Commit the buffered input audio as one utterance
    InputAudioCommit,
    /// Cancel the in-flight response
    ResponseCancel,
    /// Return a tool call's output
    ToolOutput { call_id: String, output: String },
}

#[derive(Debug, Serialize)]
struct SessionSettings {
    instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<String>,
    input_audio_format: String,
    output_audio_format: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Provider-to-client protocol messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    SessionCreated {
        #[serde(default)]
        session_id: Option<String>,
    },
    SessionUpdated,
    /// Incremental transcription of buffered input audio
    InputTranscriptDelta {
        delta: String,
    },
    /// Final transcription of one utterance
    InputTranscriptCompleted {
        transcript: String,
        #[serde(default)]
        confidence: Option<f32>,
    },
    ResponseCreated,
    ResponseTextDelta {
        delta: String,
    },
    ResponseAudioDelta {
        /// Base64 audio payload
        audio: String,
    },
    ResponseCompleted {
        #[serde(default)]
        text: Option<String>,
    },
    /// The model requests a tool invocation
    ToolCallCreated {
        call_id: String,
        name: String,
        /// JSON-encoded arguments object
        arguments: String,
    },
    /// Voice activity: the user started speaking (barge-in)
    SpeechStarted,
    Error {
        message: String,
        #[serde(default)]
        fatal: bool,
    },
    /// Unknown event types are ignored, not errors
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Adapter
// ============================================================================

/// Endpoints and credentials for the realtime-speech provider
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// Control-plane base URL (token minting)
    pub control_url: String,
    /// Duplex socket URL
    pub socket_url: String,
    /// Model identifier appended to the socket URL
    pub model: String,
    /// Long-lived API key; only the minted ephemeral secret goes on the socket
    pub api_key: String,
}

impl RealtimeConfig {
    fn socket_url_with_model(&self) -> String {
        format!("{}?model={}", self.socket_url, self.model)
    }
}

struct LiveSession {
    socket: DuplexSocket,
    translate_task: tokio::task::JoinHandle<()>,
}

/// Adapter speaking the realtime speech-to-speech protocol
pub struct RealtimeVoiceAdapter {
    config: RealtimeConfig,
    control: HttpChannel,
    live: Option<LiveSession>,
}

impl RealtimeVoiceAdapter {
    /// Create an unconnected adapter
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the control-plane channel cannot be built.
    pub fn new(config: RealtimeConfig) -> Result<Self, ConnectionError> {
        let control = HttpChannel::new(config.control_url.clone(), Some(config.api_key.clone()))
            .map_err(ConnectionError::Transport)?;
        Ok(Self {
            config,
            control,
            live: None,
        })
    }

    /// Mint the ephemeral client secret used on the socket
    async fn mint_client_secret(&self) -> Result<String, ConnectionError> {
        let response = self
            .control
            .post_json(
                "realtime/sessions",
                &serde_json::json!({ "model": self.config.model }),
            )
            .await?;

        response
            .pointer("/client_secret/value")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ConnectionError::Rejected("token response had no client secret".into())
            })
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<(), ConnectionError> {
        let live = self.live.as_ref().ok_or(ConnectionError::NotConnected)?;
        let frame = TransportFrame::json(message).map_err(ConnectionError::Transport)?;
        live.socket
            .send(frame)
            .await
            .map_err(ConnectionError::Transport)
    }

    fn audio_format_tag(format: AudioFormat) -> String {
        match format {
            AudioFormat::Pcm16 { .. } => "pcm16".to_string(),
            AudioFormat::Ulaw8k => "g711_ulaw".to_string(),
        }
    }

    fn settings_from(directives: &SessionDirectives) -> SessionSettings {
        let mut instructions = directives.system_prompt.clone();
        if let Some(context) = &directives.context {
            instructions.push_str("\n\n");
            instructions.push_str(context);
        }

        SessionSettings {
            instructions,
            voice: directives.voice.clone(),
            input_audio_format: Self::audio_format_tag(directives.audio_format),
            output_audio_format: Self::audio_format_tag(directives.audio_format),
            tools: directives
                .tools
                .iter()
                .map(|t| WireTool {
                    tool_type: "function",
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }
    }

    fn translate(message: ServerMessage, format: AudioFormat) -> Option<ProviderEvent> {
        match message {
            ServerMessage::SessionCreated { session_id } => Some(ProviderEvent::Ready {
                provider_session: session_id,
            }),
            ServerMessage::SessionUpdated | ServerMessage::Unknown => None,
            ServerMessage::InputTranscriptDelta { delta } => {
                Some(ProviderEvent::UserTranscriptDelta {
                    text: delta,
                    is_final: false,
                    confidence: None,
                })
            }
            ServerMessage::InputTranscriptCompleted {
                transcript,
                confidence,
            } => Some(ProviderEvent::UserTranscriptDelta {
                text: transcript,
                is_final: true,
                confidence,
            }),
            ServerMessage::ResponseCreated => Some(ProviderEvent::ResponseStarted),
            ServerMessage::ResponseTextDelta { delta } => {
                Some(ProviderEvent::ResponseDelta { text: delta })
            }
            ServerMessage::ResponseAudioDelta { audio } => match BASE64.decode(audio) {
                Ok(data) => Some(ProviderEvent::AudioChunk { data, format }),
                Err(e) => {
                    warn!(error = %e, "dropping undecodable audio delta");
                    None
                }
            },
            ServerMessage::ResponseCompleted { text } => {
                Some(ProviderEvent::ResponseCompleted { full_text: text })
            }
            ServerMessage::ToolCallCreated {
                call_id,
                name,
                arguments,
            } => {
                let arguments =
                    serde_json::from_str(&arguments).unwrap_or(serde_json::Value::Null);
                Some(ProviderEvent::ToolCallRequested {
                    call: ToolCall::new(ToolCallId(call_id), name, arguments),
                })
            }
            ServerMessage::SpeechStarted => Some(ProviderEvent::Interrupted),
            ServerMessage::Error { message, fatal } => {
                Some(ProviderEvent::Error { message, fatal })
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for RealtimeVoiceAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RealtimeVoice
    }

    fn name(&self) -> &str {
        "realtime-voice"
    }

    async fn connect(
        &mut self,
        directives: SessionDirectives,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError> {
        if self.live.is_some() {
            return Err(ConnectionError::AlreadyConnected(self.name().to_string()));
        }

        let secret = self.mint_client_secret().await?;
        let mut socket = DuplexSocket::new(self.config.socket_url_with_model(), Some(secret));
        socket.open().await.map_err(ConnectionError::Transport)?;

        let mut frames = socket.take_inbound().ok_or_else(|| {
            ConnectionError::Transport(TransportError::InvalidState(
                "inbound queue unavailable".into(),
            ))
        })?;

        // The session.created event must arrive before configuration.
        let first = tokio::time::timeout(SESSION_CREATED_TIMEOUT, frames.recv())
            .await
            .map_err(|_| {
                ConnectionError::Transport(TransportError::Timeout("session.created".into()))
            })?
            .ok_or_else(|| ConnectionError::Transport(TransportError::Closed))?;

        let ready = first
            .as_text()
            .and_then(|text| serde_json::from_str::<ServerMessage>(text).ok())
            .and_then(|msg| Self::translate(msg, directives.audio_format));
        let Some(ready @ ProviderEvent::Ready { .. }) = ready else {
            socket.close().await.ok();
            return Err(ConnectionError::Rejected(
                "expected session.created as first event".into(),
            ));
        };

        let update = ClientMessage::SessionUpdate {
            session: Self::settings_from(&directives),
        };
        socket
            .send(TransportFrame::json(&update).map_err(ConnectionError::Transport)?)
            .await
            .map_err(ConnectionError::Transport)?;

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        tx.send(ready).await.ok();

        let format = directives.audio_format;
        let translate_task = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let Some(text) = frame.as_text() else {
                    trace!("ignoring binary frame on control socket");
                    continue;
                };
                let Ok(message) = serde_json::from_str::<ServerMessage>(text) else {
                    trace!(payload = text, "unparseable provider event");
                    continue;
                };
                if let Some(event) = Self::translate(message, format) {
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() || terminal {
                        break;
                    }
                }
            }
            tx.send(ProviderEvent::Closed { reason: None }).await.ok();
            debug!("realtime event translation ended");
        });

        self.live = Some(LiveSession {
            socket,
            translate_task,
        });
        debug!(model = %self.config.model, "realtime session established");
        Ok(rx)
    }

    async fn send_input(&self, input: UserInput) -> Result<(), ConnectionError> {
        let message = match input {
            UserInput::Text(text) => ClientMessage::UserText { text },
            UserInput::AudioChunk(data) => ClientMessage::InputAudioAppend {
                audio: BASE64.encode(data),
            },
            UserInput::AudioCommit => ClientMessage::InputAudioCommit,
        };
        self.send_message(&message).await
    }

    async fn send_tool_result(&self, result: &ToolResult) -> Result<(), ConnectionError> {
        let output = match &result.outcome {
            ToolOutcome::Success(value) => value.to_string(),
            ToolOutcome::Error { kind, message } => {
                serde_json::json!({ "error": { "kind": kind, "message": message } }).to_string()
            }
        };
        self.send_message(&ClientMessage::ToolOutput {
            call_id: result.id.0.clone(),
            output,
        })
        .await
    }

    async fn interrupt(&self) -> Result<(), ConnectionError> {
        self.send_message(&ClientMessage::ResponseCancel).await
    }

    async fn disconnect(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.translate_task.abort();
            live.socket.close().await.ok();
        }
    }

    fn is_connected(&self) -> bool {
        self.live.as_ref().is_some_and(|l| l.socket.is_open())
    }
}
