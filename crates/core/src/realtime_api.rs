use crate::generic_types::{SpeechSessionConfig, SpeechUnit};
use anyhow::Result;
use async_trait::async_trait;

/// Opens persistent streaming speech sessions with a real-time provider.
///
/// Implementations live next to the concrete provider client; the Narration Stage only
/// sees this trait, so tests can substitute a scripted fake.
#[async_trait]
pub trait SpeechConnector: Send + Sync {
    async fn open(&self, config: &SpeechSessionConfig) -> Result<Box<dyn SpeechSession>>;
}

/// A duplex speech session: submit a text turn, then read units until `TurnComplete`.
#[async_trait]
pub trait SpeechSession: Send {
    /// Submits one complete text turn to be spoken.
    async fn send_turn(&mut self, text: &str) -> Result<()>;

    /// Returns the next response unit, or `None` once the provider has closed the session.
    async fn next_unit(&mut self) -> Result<Option<SpeechUnit>>;

    /// Closes the session. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}
