//! Gemini Live realtime model sessions.
//!
//! A session is one WebSocket to the `BidiGenerateContent` endpoint. Starting
//! sends the setup message (model, voice and persona) and waits for
//! `setupComplete`. A reader task then watches the socket: a close frame or
//! end of stream becomes [`SessionEvent::Closed`], a socket error becomes
//! [`SessionEvent::Error`].

use crate::backend::{
    ModelBackend, ModelSession, RoomInfo, DEFAULT_EVENT_CHANNEL_CAPACITY,
};
use crate::config::ModelServiceConfig;
use crate::error::SessionError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ong_types::{SessionConfig, SessionEvent};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: &'a str,
    generation_config: GenerationConfig<'a>,
    system_instruction: Content<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientContentMessage<'a> {
    client_content: ClientContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientContent<'a> {
    turns: Vec<Content<'a>>,
    turn_complete: bool,
}

/// The server message fields the agent reacts to. Everything else (audio,
/// transcripts, tool calls) belongs to the media pipeline and is ignored here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    go_away: Option<serde_json::Value>,
}

impl ServerMessage {
    fn parse(message: &Message) -> Option<Self> {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
            Message::Binary(data) => serde_json::from_slice(data).ok(),
            _ => None,
        }
    }
}

fn setup_message(model: &str, voice: &str, instructions: &str) -> String {
    let message = SetupMessage {
        setup: Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
                    },
                },
            },
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: instructions }],
            },
        },
    };
    serde_json::to_string(&message).unwrap_or_default()
}

fn user_turn_message(text: &str) -> String {
    let message = ClientContentMessage {
        client_content: ClientContent {
            turns: vec![Content {
                role: Some("user"),
                parts: vec![Part { text }],
            }],
            turn_complete: true,
        },
    };
    serde_json::to_string(&message).unwrap_or_default()
}

pub struct GeminiLiveBackend {
    config: ModelServiceConfig,
}

impl GeminiLiveBackend {
    pub fn new(config: ModelServiceConfig) -> Self {
        Self { config }
    }
}

impl ModelBackend for GeminiLiveBackend {
    fn create(&self, config: &SessionConfig) -> Box<dyn ModelSession> {
        Box::new(GeminiLiveSession::new(
            self.config.clone(),
            config.credentials().model_api_key.clone(),
            config.voice().to_string(),
            config.persona_prompt().to_string(),
        ))
    }
}

/// One realtime conversation with the model.
pub struct GeminiLiveSession {
    service: ModelServiceConfig,
    api_key: String,
    voice: String,
    instructions: String,
    events: broadcast::Sender<SessionEvent>,
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

impl GeminiLiveSession {
    pub fn new(
        service: ModelServiceConfig,
        api_key: String,
        voice: String,
        instructions: String,
    ) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        Self {
            service,
            api_key,
            voice,
            instructions,
            events,
            sink: None,
            reader: None,
        }
    }

    async fn send_text(&mut self, payload: String) -> Result<(), SessionError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| SessionError::Model("session is not started".to_string()))?;
        sink.send(Message::Text(payload.into()))
            .await
            .map_err(|e| SessionError::Model(format!("send failed: {}", e)))
    }
}

type SocketHalves = (SplitSink<WsStream, Message>, SplitStream<WsStream>);

/// Connects, sends the setup message and waits for its acknowledgement.
async fn open_socket(url: String, setup: String) -> Result<SocketHalves, SessionError> {
    let (socket, _) = connect_async(url.as_str())
        .await
        .map_err(|e| SessionError::Model(format!("connect failed: {}", e)))?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(setup.into()))
        .await
        .map_err(|e| SessionError::Model(format!("setup send failed: {}", e)))?;

    wait_for_setup(&mut stream).await?;
    Ok((sink, stream))
}

async fn wait_for_setup(stream: &mut SplitStream<WsStream>) -> Result<(), SessionError> {
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| SessionError::Model(format!("setup failed: {}", e)))?;
        if let Message::Close(frame) = &message {
            let reason = frame
                .as_ref()
                .map(|f| f.reason.to_string())
                .unwrap_or_default();
            return Err(SessionError::Model(format!(
                "server closed during setup: {}",
                reason
            )));
        }
        if ServerMessage::parse(&message).is_some_and(|m| m.setup_complete.is_some()) {
            return Ok(());
        }
    }
    Err(SessionError::Model(
        "connection ended before setup completed".to_string(),
    ))
}

async fn read_events(mut stream: SplitStream<WsStream>, events: broadcast::Sender<SessionEvent>) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(frame)) => {
                debug!(?frame, "model session closed by server");
                break;
            }
            Ok(message) => {
                if ServerMessage::parse(&message).is_some_and(|m| m.go_away.is_some()) {
                    warn!("model server announced disconnect");
                }
            }
            Err(e) => {
                let _ = events.send(SessionEvent::Error(e.to_string()));
                return;
            }
        }
    }
    let _ = events.send(SessionEvent::Closed);
}

#[async_trait]
impl ModelSession for GeminiLiveSession {
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn start(&mut self, room: &RoomInfo) -> Result<(), SessionError> {
        let url = format!("{}?key={}", self.service.url, self.api_key);
        let setup = setup_message(&self.service.model, &self.voice, &self.instructions);
        let opened = tokio::time::timeout(self.service.setup_timeout(), open_socket(url, setup))
            .await
            .map_err(|_| {
                SessionError::Model(format!(
                    "setup not completed within {} seconds",
                    self.service.setup_timeout_secs
                ))
            })?;
        let (sink, stream) = opened?;

        self.reader = Some(tokio::spawn(read_events(stream, self.events.clone())));
        self.sink = Some(sink);
        info!(
            room = %room.name,
            model = %self.service.model,
            voice = %self.voice,
            "model session started"
        );
        Ok(())
    }

    async fn generate_reply(&mut self, instructions: &str) -> Result<(), SessionError> {
        self.send_text(user_turn_message(instructions)).await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let result = match self.sink.take() {
            Some(mut sink) => sink
                .close()
                .await
                .map_err(|e| SessionError::Model(format!("close failed: {}", e))),
            None => Ok(()),
        };
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        result
    }
}

impl Drop for GeminiLiveSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn setup_message_carries_voice_and_persona() {
        let json: Value =
            serde_json::from_str(&setup_message("models/m", "Puck", "Be Ong.")).unwrap();
        let setup = &json["setup"];
        assert_eq!(setup["model"], "models/m");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "Be Ong.");
        assert!(setup["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn user_turn_completes_the_turn() {
        let json: Value = serde_json::from_str(&user_turn_message("Say hi")).unwrap();
        let content = &json["clientContent"];
        assert_eq!(content["turnComplete"], true);
        assert_eq!(content["turns"][0]["role"], "user");
        assert_eq!(content["turns"][0]["parts"][0]["text"], "Say hi");
    }

    #[test]
    fn server_message_detects_setup_complete() {
        let message = Message::Text(r#"{"setupComplete":{}}"#.to_string().into());
        assert!(ServerMessage::parse(&message)
            .unwrap()
            .setup_complete
            .is_some());

        let binary = Message::Binary(br#"{"goAway":{"timeLeft":"5s"}}"#.to_vec().into());
        let parsed = ServerMessage::parse(&binary).unwrap();
        assert!(parsed.go_away.is_some());
        assert!(parsed.setup_complete.is_none());
    }

    #[tokio::test]
    async fn close_before_start_is_noop() {
        let mut session = GeminiLiveSession::new(
            ModelServiceConfig::default(),
            "key".into(),
            "Charon".into(),
            "prompt".into(),
        );
        assert!(session.close().await.is_ok());
        assert!(session.generate_reply("hi").await.is_err());
    }
}
