//! Agent-Platform Provider Adapter
//!
//! Adapter for the hosted conversational-agent platform family. The agent's
//! behavior (prompt, voice, turn taking) lives in the vendor's dashboard; this
//! adapter negotiates a media stream, overrides per-session settings, and
//! translates the platform's event protocol.
//!
//! Unlike the realtime-speech family, this platform runs voice activity
//! detection server side and sends whole utterances, not deltas. Audio commits
//! are therefore a no-op here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use super::traits::{ProviderAdapter, ProviderKind, SessionDirectives, UserInput};
use crate::error::ConnectionError;
use crate::events::{AudioFormat, ProviderEvent};
use crate::tools::{ToolCall, ToolCallId, ToolOutcome, ToolResult};
use crate::transport::{
    HttpChannel, MediaChannel, TransportChannel, TransportError, TransportFrame,
};

/// Deadline for the conversation-initiation handshake
const INITIATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Depth of the translated event queue handed to the orchestrator
const EVENT_QUEUE: usize = 256;

// ============================================================================
// Wire Protocol
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// First message on the stream: per-session overrides
    ConversationInitiation {
        conversation_config_override: ConfigOverride,
        #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
        dynamic_variables: serde_json::Map<String, serde_json::Value>,
    },
    /// Typed user turn
    UserMessage { text: String },
    /// Base64 chunk of user audio
    UserAudioChunk { audio: String },
    /// Explicit barge-in on the current agent turn
    UserActivity,
    /// Liveness reply, echoing the ping's event id
    Pong { event_id: u64 },
    /// Output of a client-side tool call
    ClientToolResult {
        tool_call_id: String,
        result: String,
        is_error: bool,
    },
}

#[derive(Debug, Default, Serialize)]
struct ConfigOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<PromptOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct PromptOverride {
    prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    /// First event on the stream; carries the conversation id
    ConversationInitiationMetadata {
        #[serde(default)]
        conversation_id: Option<String>,
    },
    /// Final transcription of one user utterance
    UserTranscript {
        transcript: String,
        #[serde(default)]
        confidence: Option<f32>,
    },
    /// A complete agent utterance (the platform does not stream text deltas)
    AgentResponse {
        text: String,
    },
    /// Base64 chunk of agent audio
    Audio {
        audio: String,
    },
    /// The user spoke over the agent
    Interruption,
    /// Liveness probe; must be answered with a pong
    Ping {
        event_id: u64,
    },
    /// The agent requests a client-side tool invocation
    ClientToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        parameters: serde_json::Value,
    },
    /// Orderly end of the conversation
    ConversationEnd {
        #[serde(default)]
        reason: Option<String>,
    },
    Error {
        message: String,
        #[serde(default)]
        fatal: bool,
    },
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Adapter
// ============================================================================

/// Endpoints and credentials for the agent-platform provider
#[derive(Clone, Debug)]
pub struct AgentPlatformConfig {
    /// Control-plane base URL (signed-URL minting)
    pub control_url: String,
    /// Dashboard-configured agent to converse with
    pub agent_id: String,
    /// Long-lived API key; only the signed stream URL leaves the control plane
    pub api_key: String,
}

struct LiveSession {
    /// Shared with the translate task, which answers pings on it
    channel: Arc<Mutex<MediaChannel>>,
    open: Arc<AtomicBool>,
    translate_task: tokio::task::JoinHandle<()>,
}

/// Adapter speaking the hosted agent-platform protocol
pub struct AgentPlatformAdapter {
    config: AgentPlatformConfig,
    live: Option<LiveSession>,
}

impl AgentPlatformAdapter {
    /// Create an unconnected adapter
    #[must_use]
    pub fn new(config: AgentPlatformConfig) -> Self {
        Self { config, live: None }
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<(), ConnectionError> {
        let live = self.live.as_ref().ok_or(ConnectionError::NotConnected)?;
        let frame = TransportFrame::json(message).map_err(ConnectionError::Transport)?;
        live.channel
            .lock()
            .await
            .send(frame)
            .await
            .map_err(ConnectionError::Transport)
    }

    fn overrides_from(directives: &SessionDirectives) -> ConfigOverride {
        let mut prompt = directives.system_prompt.clone();
        if let Some(context) = &directives.context {
            prompt.push_str("\n\n");
            prompt.push_str(context);
        }

        ConfigOverride {
            prompt: (!prompt.is_empty()).then_some(PromptOverride { prompt }),
            first_message: directives.first_message.clone(),
            language: directives.language.clone(),
        }
    }

    fn translate(message: ServerMessage, format: AudioFormat) -> Vec<ProviderEvent> {
        match message {
            ServerMessage::ConversationInitiationMetadata { conversation_id } => {
                vec![ProviderEvent::Ready {
                    provider_session: conversation_id,
                }]
            }
            ServerMessage::UserTranscript {
                transcript,
                confidence,
            } => vec![ProviderEvent::UserTranscriptDelta {
                text: transcript,
                is_final: true,
                confidence,
            }],
            // Whole utterances become a started/completed pair so downstream
            // turn handling sees the same shape as the streaming family.
            ServerMessage::AgentResponse { text } => vec![
                ProviderEvent::ResponseStarted,
                ProviderEvent::ResponseCompleted {
                    full_text: Some(text),
                },
            ],
            ServerMessage::Audio { audio } => match BASE64.decode(audio) {
                Ok(data) => vec![ProviderEvent::AudioChunk { data, format }],
                Err(e) => {
                    warn!(error = %e, "dropping undecodable audio chunk");
                    vec![]
                }
            },
            ServerMessage::Interruption => vec![ProviderEvent::Interrupted],
            ServerMessage::ClientToolCall {
                tool_call_id,
                tool_name,
                parameters,
            } => vec![ProviderEvent::ToolCallRequested {
                call: ToolCall::new(ToolCallId(tool_call_id), tool_name, parameters),
            }],
            ServerMessage::ConversationEnd { reason } => {
                vec![ProviderEvent::Closed { reason }]
            }
            ServerMessage::Error { message, fatal } => {
                vec![ProviderEvent::Error { message, fatal }]
            }
            // Pings are answered inside the translate task, not surfaced.
            ServerMessage::Ping { .. } | ServerMessage::Unknown => vec![],
        }
    }
}

#[async_trait]
impl ProviderAdapter for AgentPlatformAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AgentPlatform
    }

    fn name(&self) -> &str {
        "agent-platform"
    }

    async fn connect(
        &mut self,
        directives: SessionDirectives,
    ) -> Result<mpsc::Receiver<ProviderEvent>, ConnectionError> {
        if self.live.is_some() {
            return Err(ConnectionError::AlreadyConnected(self.name().to_string()));
        }

        let signaling = HttpChannel::new(
            self.config.control_url.clone(),
            Some(self.config.api_key.clone()),
        )
        .map_err(ConnectionError::Transport)?;

        let mut channel = MediaChannel::new(
            signaling,
            "agents/sessions",
            serde_json::json!({ "agent_id": self.config.agent_id }),
        );
        channel.open().await.map_err(ConnectionError::Transport)?;

        let mut frames = channel.take_inbound().ok_or_else(|| {
            ConnectionError::Transport(TransportError::InvalidState(
                "inbound queue unavailable".into(),
            ))
        })?;

        let mut dynamic_variables = serde_json::Map::new();
        if let Some(context) = &directives.context {
            dynamic_variables.insert(
                "visitor_context".to_string(),
                serde_json::Value::String(context.clone()),
            );
        }
        let initiation = ClientMessage::ConversationInitiation {
            conversation_config_override: Self::overrides_from(&directives),
            dynamic_variables,
        };
        channel
            .send(TransportFrame::json(&initiation).map_err(ConnectionError::Transport)?)
            .await
            .map_err(ConnectionError::Transport)?;

        // The platform acknowledges with initiation metadata before any
        // conversational traffic.
        let first = tokio::time::timeout(INITIATION_TIMEOUT, frames.recv())
            .await
            .map_err(|_| {
                ConnectionError::Transport(TransportError::Timeout(
                    "conversation initiation".into(),
                ))
            })?
            .ok_or_else(|| ConnectionError::Transport(TransportError::Closed))?;

        let ready = first
            .as_text()
            .and_then(|text| serde_json::from_str::<ServerMessage>(text).ok())
            .map(|msg| Self::translate(msg, directives.audio_format))
            .and_then(|mut events| (!events.is_empty()).then(|| events.remove(0)));
        let Some(ready @ ProviderEvent::Ready { .. }) = ready else {
            channel.close().await.ok();
            return Err(ConnectionError::Rejected(
                "expected initiation metadata as first event".into(),
            ));
        };

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        tx.send(ready).await.ok();

        let channel = Arc::new(Mutex::new(channel));
        let open = Arc::new(AtomicBool::new(true));
        let format = directives.audio_format;

        let pong_channel = Arc::clone(&channel);
        let open_flag = Arc::clone(&open);
        let translate_task = tokio::spawn(async move {
            'pump: while let Some(frame) = frames.recv().await {
                let Some(text) = frame.as_text() else {
                    trace!("ignoring binary frame on agent stream");
                    continue;
                };
                let Ok(message) = serde_json::from_str::<ServerMessage>(text) else {
                    trace!(payload = text, "unparseable platform event");
                    continue;
                };

                if let ServerMessage::Ping { event_id } = message {
                    let pong = ClientMessage::Pong { event_id };
                    if let Ok(frame) = TransportFrame::json(&pong) {
                        pong_channel.lock().await.send(frame).await.ok();
                    }
                    continue;
                }

                for event in Self::translate(message, format) {
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() || terminal {
                        break 'pump;
                    }
                }
            }
            open_flag.store(false, Ordering::Release);
            tx.send(ProviderEvent::Closed { reason: None }).await.ok();
            debug!("agent platform event translation ended");
        });

        self.live = Some(LiveSession {
            channel,
            open,
            translate_task,
        });
        debug!(agent_id = %self.config.agent_id, "agent platform session established");
        Ok(rx)
    }

    async fn send_input(&self, input: UserInput) -> Result<(), ConnectionError> {
        let message = match input {
            UserInput::Text(text) => ClientMessage::UserMessage { text },
            UserInput::AudioChunk(data) => ClientMessage::UserAudioChunk {
                audio: BASE64.encode(data),
            },
            // Turn boundaries are detected server side.
            UserInput::AudioCommit => return Ok(()),
        };
        self.send_message(&message).await
    }

    async fn send_tool_result(&self, result: &ToolResult) -> Result<(), ConnectionError> {
        let (payload, is_error) = match &result.outcome {
            ToolOutcome::Success(value) => (value.to_string(), false),
            ToolOutcome::Error { kind, message } => (
                serde_json::json!({ "kind": kind, "message": message }).to_string(),
                true,
            ),
        };
        self.send_message(&ClientMessage::ClientToolResult {
            tool_call_id: result.id.0.clone(),
            result: payload,
            is_error,
        })
        .await
    }

    async fn interrupt(&self) -> Result<(), ConnectionError> {
        self.send_message(&ClientMessage::UserActivity).await
    }

    async fn disconnect(&mut self) {
        if let Some(live) = self.live.take() {
            live.translate_task.abort();
            live.open.store(false, Ordering::Release);
            live.channel.lock().await.close().await.ok();
        }
    }

    fn is_connected(&self) -> bool {
        self.live.as_ref().is_some_and(|l| l.open.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_response_becomes_start_and_completion() {
        let events = AgentPlatformAdapter::translate(
            ServerMessage::AgentResponse {
                text: "The projects page is open.".into(),
            },
            AudioFormat::default(),
        );
        assert!(matches!(events[0], ProviderEvent::ResponseStarted));
        assert!(matches!(
            &events[1],
            ProviderEvent::ResponseCompleted { full_text: Some(t) } if t.contains("projects")
        ));
    }

    #[test]
    fn test_user_transcript_is_final() {
        let events = AgentPlatformAdapter::translate(
            ServerMessage::UserTranscript {
                transcript: "show me the contact form".into(),
                confidence: Some(0.93),
            },
            AudioFormat::default(),
        );
        match &events[..] {
            [ProviderEvent::UserTranscriptDelta {
                is_final,
                confidence,
                ..
            }] => {
                assert!(*is_final);
                assert_eq!(*confidence, Some(0.93));
            }
            other => panic!("unexpected translation: {other:?}"),
        }
    }

    #[test]
    fn test_ping_is_not_surfaced() {
        let events = AgentPlatformAdapter::translate(
            ServerMessage::Ping { event_id: 7 },
            AudioFormat::default(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_overrides_skip_empty_prompt() {
        let overrides =
            AgentPlatformAdapter::overrides_from(&SessionDirectives::default());
        assert!(overrides.prompt.is_none());

        let directives = SessionDirectives {
            system_prompt: "Portfolio guide.".into(),
            language: Some("en".into()),
            ..SessionDirectives::default()
        };
        let overrides = AgentPlatformAdapter::overrides_from(&directives);
        assert_eq!(overrides.prompt.unwrap().prompt, "Portfolio guide.");
        assert_eq!(overrides.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_audio_commit_is_noop_when_disconnected() {
        let adapter = AgentPlatformAdapter::new(AgentPlatformConfig {
            control_url: "https://api.example.com/v1".into(),
            agent_id: "agent_portfolio".into(),
            api_key: "xi-test".into(),
        });
        tokio_test::block_on(adapter.send_input(UserInput::AudioCommit)).unwrap();

        let err = tokio_test::block_on(adapter.send_input(UserInput::Text("hi".into())))
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected));
    }
}
