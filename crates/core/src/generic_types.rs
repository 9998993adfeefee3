/// Provider-agnostic settings for opening a streaming speech session.
#[derive(Debug, Clone, Default)]
pub struct SpeechSessionConfig {
    /// System instruction given to the speech model.
    pub instructions: String,
    /// Prebuilt voice name, if the provider supports one.
    pub voice: Option<String>,
}

/// One response unit yielded by a speech session while it answers a text turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechUnit {
    /// A chunk of raw PCM audio.
    Audio(Vec<u8>),
    /// A transcript fragment.
    Text(String),
    /// The current turn is finished.
    TurnComplete,
}
