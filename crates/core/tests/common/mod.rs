#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use textbook_core::generic_types::{SpeechSessionConfig, SpeechUnit};
use textbook_core::realtime_api::{SpeechConnector, SpeechSession};
use textbook_core::services::{ImageGenerator, MediaStorage, Services, TextGenerator, VisionAnalyzer};
use textbook_core::{OutboundEvent, OutputReceiver, Pipeline, PipelineSettings};

/// A one-pixel PNG header, enough for MIME sniffing.
pub const PNG_B64: &str = "iVBORw0KGgo=";

pub const ANALYSIS_JSON: &str = r#"{"subject":"Biology","topic":"Photosynthesis","context":"A leaf diagram.","question":"How do plants eat?"}"#;

pub const SCRIPT_JSON: &str = r#"```json
{
  "title": "How Plants Make Food",
  "intro": "Let's look at leaves.",
  "sections": [
    {"id": 1, "narration": "Light hits the leaf.", "image_prompt": "sunlight on a leaf"},
    {"id": 2, "narration": "Water rises from the roots.", "image_prompt": "roots drinking water"},
    {"id": 3, "narration": "Sugar is made.", "image_prompt": "glucose molecule"}
  ],
  "outro": "Now you know!"
}
```"#;

/// Vision fake: answers each call from a queue of `(delay, reply)`, repeating the last entry.
pub struct ScriptedVision {
    replies: Vec<(Duration, String)>,
    calls: AtomicUsize,
}

impl ScriptedVision {
    pub fn new(reply: &str) -> Self {
        Self::sequence(vec![(Duration::ZERO, reply.to_string())])
    }

    pub fn sequence(replies: Vec<(Duration, String)>) -> Self {
        Self {
            replies,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VisionAnalyzer for ScriptedVision {
    async fn analyze(&self, _image: &[u8], _mime_type: &str, _prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, reply) = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .ok_or_else(|| anyhow!("no scripted reply"))?;
        tokio::time::sleep(delay).await;
        Ok(reply)
    }
}

pub struct ScriptedText(pub String);

#[async_trait]
impl TextGenerator for ScriptedText {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Image fake: fails for prompts containing any of `fail_on`, otherwise returns the prompt bytes.
#[derive(Default)]
pub struct ScriptedImages {
    pub fail_on: Vec<String>,
    pub delay: Duration,
}

#[async_trait]
impl ImageGenerator for ScriptedImages {
    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        tokio::time::sleep(self.delay).await;
        if self.fail_on.iter().any(|f| prompt.contains(f.as_str())) {
            return Err(anyhow!("quota exceeded"));
        }
        Ok(Some(prompt.as_bytes().to_vec()))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    stored: AtomicUsize,
}

#[async_trait]
impl MediaStorage for MemoryStorage {
    async fn store(&self, _bytes: Vec<u8>, suggested_name: &str) -> Result<String> {
        let n = self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mem://{n}/{suggested_name}"))
    }
}

/// Speech fake: every turn yields `chunks` audio units, `chunk_delay` apart, then a transcript
/// and `TurnComplete`.
#[derive(Default)]
pub struct ScriptedSpeech {
    pub chunks: usize,
    pub chunk_delay: Duration,
    pub fail_open: bool,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedSpeech {
    pub fn quick() -> Self {
        Self {
            chunks: 2,
            ..Default::default()
        }
    }
}

struct ScriptedSpeechSession {
    chunks: usize,
    chunk_delay: Duration,
    pending: VecDeque<SpeechUnit>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl SpeechConnector for ScriptedSpeech {
    async fn open(&self, _config: &SpeechSessionConfig) -> Result<Box<dyn SpeechSession>> {
        if self.fail_open {
            return Err(anyhow!("handshake refused"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSpeechSession {
            chunks: self.chunks,
            chunk_delay: self.chunk_delay,
            pending: VecDeque::new(),
            closed: self.closed.clone(),
        }))
    }
}

#[async_trait]
impl SpeechSession for ScriptedSpeechSession {
    async fn send_turn(&mut self, text: &str) -> Result<()> {
        for n in 0..self.chunks {
            self.pending.push_back(SpeechUnit::Audio(vec![n as u8; 4]));
        }
        self.pending.push_back(SpeechUnit::Text(text.to_string()));
        self.pending.push_back(SpeechUnit::TurnComplete);
        Ok(())
    }

    async fn next_unit(&mut self) -> Result<Option<SpeechUnit>> {
        tokio::time::sleep(self.chunk_delay).await;
        Ok(self.pending.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Fakes {
    pub vision: ScriptedVision,
    pub text: ScriptedText,
    pub images: ScriptedImages,
    pub speech: ScriptedSpeech,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            vision: ScriptedVision::new(ANALYSIS_JSON),
            text: ScriptedText(SCRIPT_JSON.to_string()),
            images: ScriptedImages::default(),
            speech: ScriptedSpeech::quick(),
        }
    }
}

impl Fakes {
    pub fn into_pipeline(self) -> Arc<Pipeline> {
        let services = Services {
            vision: Arc::new(self.vision),
            text: Arc::new(self.text),
            images: Arc::new(self.images),
            storage: Arc::new(MemoryStorage::default()),
            speech: Arc::new(self.speech),
        };
        Arc::new(Pipeline::new(services, PipelineSettings::default()))
    }
}

/// Reads events up to and including the next `done`.
pub async fn until_done(rx: &mut OutputReceiver) -> Vec<OutboundEvent> {
    let mut events = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for done");
        match next {
            Some(OutboundEvent::Done) => {
                events.push(OutboundEvent::Done);
                return events;
            }
            Some(event) => events.push(event),
            None => panic!("channel closed before done; got {events:?}"),
        }
    }
}

pub fn kinds(events: &[OutboundEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind()).collect()
}

/// Event kinds with section ids, dropping audio/text payloads and image URLs.
pub fn skeleton(events: &[OutboundEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            OutboundEvent::SectionStart { section_id }
            | OutboundEvent::SectionEnd { section_id }
            | OutboundEvent::Audio { section_id, .. }
            | OutboundEvent::Text { section_id, .. }
            | OutboundEvent::Image { section_id, .. } => format!("{}:{}", e.kind(), section_id),
            other => other.kind().to_string(),
        })
        .collect()
}

pub fn image_ids(events: &[OutboundEvent]) -> Vec<i32> {
    let mut ids: Vec<i32> = events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Image { section_id, .. } => Some(*section_id),
            _ => None,
        })
        .collect();
    ids.sort();
    ids
}

pub fn errors(events: &[OutboundEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
