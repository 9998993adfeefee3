//! A minimal client for the Gemini Live bidirectional WebSocket API.

pub mod client;
pub mod types;

pub use client::{DEFAULT_LIVE_URL, GeminiClient, LiveConfig, connect};
pub use types::ServerMessage;
