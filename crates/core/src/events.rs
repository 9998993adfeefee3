use base64::{Engine as _, engine::general_purpose};
use serde::{Serialize, Serializer};

/// Events streamed to the client. The serialized field names follow the browser client's
/// protocol (`content`, `data`, `image_url`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Status {
        #[serde(rename = "content")]
        message: String,
    },
    Meta {
        subject: String,
        topic: String,
    },
    Title {
        #[serde(rename = "content")]
        text: String,
    },
    SectionStart {
        section_id: i32,
    },
    Audio {
        section_id: i32,
        #[serde(rename = "data", serialize_with = "as_base64")]
        chunk: Vec<u8>,
    },
    Text {
        section_id: i32,
        content: String,
    },
    #[serde(rename = "image_url")]
    Image {
        section_id: i32,
        url: String,
        caption: String,
    },
    SectionEnd {
        section_id: i32,
    },
    Error {
        #[serde(rename = "content")]
        message: String,
    },
    Done,
}

impl OutboundEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The wire tag of this event, handy for logs and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Meta { .. } => "meta",
            Self::Title { .. } => "title",
            Self::SectionStart { .. } => "section_start",
            Self::Audio { .. } => "audio",
            Self::Text { .. } => "text",
            Self::Image { .. } => "image_url",
            Self::SectionEnd { .. } => "section_end",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
}

/// Control messages received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Input { payload: String },
    Question { text: String },
    Stop,
    /// A well-formed message with a `type` this server does not handle.
    Unknown(String),
}

impl InboundMessage {
    /// Parses one JSON text frame. Fails only when the frame is not JSON; frames without a
    /// recognised `type` come back as `Unknown`.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let field = |name: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let kind = field("type");
        Ok(match kind.as_str() {
            "photo" | "input" => {
                let data = field("data");
                let payload = if data.is_empty() { field("payload") } else { data };
                Self::Input { payload }
            }
            "question" => Self::Question {
                text: field("text"),
            },
            "stop" => Self::Stop,
            _ => Self::Unknown(kind),
        })
    }
}
