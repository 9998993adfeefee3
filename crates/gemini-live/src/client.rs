use crate::types::{
    AudioTranscriptionConfig, ClientContentRequest, Content, GenerationConfig,
    PrebuiltVoiceConfig, ServerMessage, Setup, SetupRequest, SpeechConfig, TextPart, VoiceConfig,
};
use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

type WsWriter =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything needed to open one Live session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub url: String,
    pub api_key: SecretString,
    /// Model id without the `models/` prefix.
    pub model: String,
    pub voice: Option<String>,
    pub system_instruction: String,
}

impl LiveConfig {
    fn setup_request(&self) -> SetupRequest {
        let system_instruction = (!self.system_instruction.trim().is_empty()).then(|| Content {
            role: None,
            parts: vec![TextPart {
                text: self.system_instruction.clone(),
            }],
        });
        SetupRequest {
            setup: Setup {
                model: format!("models/{}", self.model.trim_start_matches("models/")),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: self.voice.as_ref().map(|voice| SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: voice.clone(),
                            },
                        },
                    }),
                },
                system_instruction,
                output_audio_transcription: AudioTranscriptionConfig::default(),
            },
        }
    }
}

/// A connected Gemini Live session.
pub struct GeminiClient {
    write: WsWriter,
    read: WsReader,
    closed: bool,
}

/// Connects, sends the setup message and waits for the server to acknowledge it.
pub async fn connect(config: &LiveConfig) -> Result<GeminiClient> {
    let url = format!("{}?key={}", config.url, config.api_key.expose_secret());
    let (ws_stream, _) = connect_async(url)
        .await
        .context("Failed to connect to Gemini Live WebSocket")?;
    tracing::info!("Connected to Gemini Live WebSocket.");

    let (write, read) = ws_stream.split();
    let mut client = GeminiClient {
        write,
        read,
        closed: false,
    };
    client.send_json(&config.setup_request()).await?;

    tokio::time::timeout(SETUP_TIMEOUT, client.await_setup_complete())
        .await
        .context("Timed out waiting for Gemini Live setup")??;
    tracing::info!(model = %config.model, "Gemini Live session ready.");
    Ok(client)
}

impl GeminiClient {
    async fn send_json<T: serde::Serialize>(&mut self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.write
            .send(Message::Text(json))
            .await
            .context("Failed to send message to Gemini Live")
    }

    async fn await_setup_complete(&mut self) -> Result<()> {
        loop {
            match self.next_message().await? {
                Some(msg) if msg.setup_complete.is_some() => return Ok(()),
                Some(_) => tracing::debug!("Ignoring message received before setupComplete"),
                None => bail!("Gemini Live closed the connection during setup"),
            }
        }
    }

    /// Sends one complete user text turn.
    pub async fn send_text_turn(&mut self, text: &str) -> Result<()> {
        self.send_json(&ClientContentRequest::user_text(text)).await
    }

    /// Reads the next server message. Returns `None` once the server has closed the stream.
    ///
    /// The server sends JSON in both text and binary frames.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(msg) = self.read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let message: ServerMessage = serde_json::from_str(&text)
                        .context("Failed to deserialize server message")?;
                    return Ok(Some(message));
                }
                Ok(Message::Binary(bytes)) => {
                    let message: ServerMessage = serde_json::from_slice(&bytes)
                        .context("Failed to deserialize binary server message")?;
                    return Ok(Some(message));
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!("Gemini Live connection closed: {:?}", frame);
                    return Ok(None);
                }
                Err(e) => {
                    tracing::error!("Error reading from Gemini Live WebSocket: {}", e);
                    return Err(e.into());
                }
                _ => { /* Ignore Ping/Pong */ }
            }
        }
        Ok(None)
    }

    /// Sends a close frame. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.write
            .close()
            .await
            .context("Failed to close Gemini Live WebSocket")
    }
}
