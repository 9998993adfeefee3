use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use gemini_live::{GeminiClient, LiveConfig, ServerMessage};
use std::collections::VecDeque;
use textbook_core::generic_types::{SpeechSessionConfig, SpeechUnit};
use textbook_core::realtime_api::{SpeechConnector, SpeechSession};

/// Opens `SpeechSession`s backed by `gemini_live::GeminiClient`.
pub struct GeminiSpeechConnector {
    base: LiveConfig,
}

impl GeminiSpeechConnector {
    /// `base.system_instruction` and `base.voice` are replaced per session when the session
    /// config provides them.
    pub fn new(base: LiveConfig) -> Self {
        Self { base }
    }
}

#[async_trait]
impl SpeechConnector for GeminiSpeechConnector {
    async fn open(&self, config: &SpeechSessionConfig) -> Result<Box<dyn SpeechSession>> {
        let mut live = self.base.clone();
        live.system_instruction = config.instructions.clone();
        if config.voice.is_some() {
            live.voice = config.voice.clone();
        }
        let client = gemini_live::connect(&live)
            .await
            .context("Failed to open Gemini Live session")?;
        Ok(Box::new(GeminiSpeechSession {
            client,
            pending: VecDeque::new(),
        }))
    }
}

/// Adapts the Live message stream into `SpeechUnit`s.
pub struct GeminiSpeechSession {
    client: GeminiClient,
    pending: VecDeque<SpeechUnit>,
}

#[async_trait]
impl SpeechSession for GeminiSpeechSession {
    async fn send_turn(&mut self, text: &str) -> Result<()> {
        self.client.send_text_turn(text).await
    }

    async fn next_unit(&mut self) -> Result<Option<SpeechUnit>> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                return Ok(Some(unit));
            }
            let Some(message) = self.client.next_message().await? else {
                return Ok(None);
            };
            if message.go_away.is_some() {
                tracing::warn!("Gemini Live announced it will close this session soon");
            }
            self.pending.extend(units_from_message(&message)?);
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await
    }
}

/// Translates one server message into speech units: decoded audio and text parts first, then
/// the transcript fragment, then `TurnComplete` if the turn ended.
pub fn units_from_message(message: &ServerMessage) -> Result<Vec<SpeechUnit>> {
    let mut units = Vec::new();
    let Some(content) = &message.server_content else {
        return Ok(units);
    };

    if let Some(turn) = &content.model_turn {
        for part in &turn.parts {
            if let Some(blob) = &part.inline_data {
                let audio = general_purpose::STANDARD
                    .decode(&blob.data)
                    .context("Gemini Live sent invalid base64 audio")?;
                units.push(SpeechUnit::Audio(audio));
            }
            if let Some(text) = part.text.as_ref().filter(|t| !t.is_empty()) {
                units.push(SpeechUnit::Text(text.clone()));
            }
        }
    }
    if let Some(transcription) = &content.output_transcription {
        if !transcription.text.is_empty() {
            units.push(SpeechUnit::Text(transcription.text.clone()));
        }
    }
    if content.interrupted {
        tracing::debug!("Gemini Live reported an interrupted turn");
    }
    if content.turn_complete {
        units.push(SpeechUnit::TurnComplete);
    }
    Ok(units)
}
