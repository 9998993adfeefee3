use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;

/// Section id used for the narrated introduction.
pub const INTRO_SECTION_ID: i32 = 0;
/// Section id used for the narrated closing line.
pub const OUTRO_SECTION_ID: i32 = -1;

/// The visual capture submitted by the client, still in its transport encoding (base64).
///
/// Decoding is deferred to the Analysis Stage so that a bad payload fails the job
/// rather than the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    payload: String,
}

impl RawInput {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.payload.trim().is_empty()
    }

    /// Decodes the payload into image bytes. Accepts an optional `data:<mime>;base64,` prefix.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let data = self.payload.trim();
        let data = match data.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => data,
        };
        general_purpose::STANDARD.decode(data)
    }
}

/// Guesses an image MIME type from the leading magic bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Structured description of what the submitted image shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRecord {
    pub subject: String,
    pub topic: String,
    pub description: String,
    pub restated_question: String,
}

impl ContextRecord {
    /// Best-effort record used when the analysis output cannot be parsed.
    pub fn degraded(raw_text: &str, question: &str) -> Self {
        Self {
            subject: "General".to_string(),
            topic: "Unknown".to_string(),
            description: raw_text.trim().to_string(),
            restated_question: question.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: i32,
    pub narration_text: String,
    pub media_prompt: String,
}

/// The generated explainer. Shared read-only between Media and Narration once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub title: String,
    pub intro: String,
    pub sections: Vec<Section>,
    pub outro: String,
}

impl Script {
    /// Single-section script built from the context when the generated one is unusable.
    pub fn fallback(context: &ContextRecord) -> Self {
        let narration = if context.description.trim().is_empty() {
            "Let me walk you through this.".to_string()
        } else {
            context.description.clone()
        };
        Self {
            title: context.topic.clone(),
            intro: "Let me explain this for you.".to_string(),
            sections: vec![Section {
                id: 1,
                narration_text: narration,
                media_prompt: format!(
                    "Educational diagram about {}, clean white background, colorful, labeled",
                    context.topic
                ),
            }],
            outro: "I hope that helps!".to_string(),
        }
    }
}

// Wire shapes returned by the text-generation capability. Every field is optional so that
// partially filled output still yields something usable.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ContextWire {
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub context: Option<String>,
    pub question: Option<String>,
}

impl ContextWire {
    pub(crate) fn into_record(self, question: &str) -> ContextRecord {
        fn non_blank(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }
        ContextRecord {
            subject: non_blank(self.subject).unwrap_or_else(|| "General".to_string()),
            topic: non_blank(self.topic).unwrap_or_else(|| "Unknown".to_string()),
            description: self.context.unwrap_or_default(),
            restated_question: non_blank(self.question).unwrap_or_else(|| question.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ScriptWire {
    pub title: Option<String>,
    pub intro: Option<String>,
    pub sections: Option<Vec<SectionWire>>,
    pub outro: Option<String>,
}

/// Source ids are not read: sections are always numbered by position.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SectionWire {
    #[serde(alias = "narration_text")]
    pub narration: Option<String>,
    #[serde(alias = "media_prompt")]
    pub image_prompt: Option<String>,
}

impl ScriptWire {
    /// Converts the wire shape into a `Script`, or `None` when no usable section survives.
    ///
    /// Blank sections are dropped and the rest are numbered `1..=N` in declaration order.
    pub(crate) fn into_script(self, context: &ContextRecord) -> Option<Script> {
        let sections: Vec<Section> = self
            .sections
            .unwrap_or_default()
            .into_iter()
            .map(|s| {
                (
                    s.narration.unwrap_or_default(),
                    s.image_prompt.unwrap_or_default(),
                )
            })
            .filter(|(narration, prompt)| !(narration.trim().is_empty() && prompt.trim().is_empty()))
            .enumerate()
            .map(|(idx, (narration, prompt))| Section {
                id: idx as i32 + 1,
                narration_text: narration,
                media_prompt: if prompt.trim().is_empty() {
                    format!("Educational diagram about {}", context.topic)
                } else {
                    prompt
                },
            })
            .collect();
        if sections.is_empty() {
            return None;
        }

        Some(Script {
            title: self
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| context.topic.clone()),
            intro: self.intro.unwrap_or_default(),
            sections,
            outro: self.outro.unwrap_or_default(),
        })
    }
}
