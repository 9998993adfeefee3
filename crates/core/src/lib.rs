pub mod channel;
pub mod error;
pub mod events;
pub mod gemini_rest;
pub mod generic_types;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod realtime_api;
pub mod services;
pub mod session;
pub mod stages;
pub mod storage;

pub use channel::{EventSink, OutputChannel, OutputReceiver};
pub use error::{NarrationError, PipelineError};
pub use events::{InboundMessage, OutboundEvent};
pub use model::{ContextRecord, RawInput, Script, Section};
pub use pipeline::{Job, JobState, Pipeline, PipelineSettings};
pub use services::Services;
pub use session::{SessionController, SessionState};
