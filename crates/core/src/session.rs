//! The per-connection Session Controller.

use crate::channel::{OutputChannel, OutputReceiver};
use crate::events::{InboundMessage, OutboundEvent};
use crate::model::RawInput;
use crate::parse::truncate_chars;
use crate::pipeline::{Job, JobState, Pipeline};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const INPUT_ACCEPTED: &str = "Photo received. Ask your question!";
pub const EMPTY_INPUT: &str = "Empty photo data.";
pub const EMPTY_QUESTION: &str = "Question text is empty.";
pub const MISSING_INPUT: &str = "Please capture a photo first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    AwaitingQuestion,
    Running,
    Closed,
}

struct ActiveJob {
    id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<JobState>,
}

/// Owns one Output Channel and at most one in-flight job.
///
/// Only the controller touches the active-job slot, and it always cancels and awaits the old
/// job before a new one starts, so two jobs never produce events at the same time.
pub struct SessionController {
    pipeline: Arc<Pipeline>,
    output: OutputChannel,
    input: Option<RawInput>,
    active: Option<ActiveJob>,
    state: SessionState,
}

impl SessionController {
    /// Creates a controller and the receiver its drain loop should consume.
    pub fn new(pipeline: Arc<Pipeline>) -> (Self, OutputReceiver) {
        let (output, receiver) = OutputChannel::new();
        (
            Self {
                pipeline,
                output,
                input: None,
                active: None,
                state: SessionState::AwaitingInput,
            },
            receiver,
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Dispatches one inbound control message and returns the resulting state.
    pub async fn handle(&mut self, message: InboundMessage) -> SessionState {
        if self.state == SessionState::Closed {
            tracing::debug!("Ignoring message on a closed session");
            return self.state;
        }
        match message {
            InboundMessage::Input { payload } => self.submit_input(payload),
            InboundMessage::Question { text } => self.submit_question(&text).await,
            InboundMessage::Stop => self.stop().await,
            InboundMessage::Unknown(kind) => {
                tracing::warn!("Unknown message type from client: {:?}", kind);
            }
        }
        self.state
    }

    /// Stores the input, replacing any earlier one. Does not disturb a running job.
    pub fn submit_input(&mut self, payload: String) {
        let input = RawInput::new(payload);
        if input.is_empty() {
            self.output.emit(OutboundEvent::error(EMPTY_INPUT));
            return;
        }
        tracing::info!("Photo received ({} chars)", input.payload().len());
        self.input = Some(input);
        if self.state == SessionState::AwaitingInput {
            self.state = SessionState::AwaitingQuestion;
        }
        self.output.emit(OutboundEvent::status(INPUT_ACCEPTED));
    }

    /// Replaces whatever job is running with a new one for the stored input.
    pub async fn submit_question(&mut self, text: &str) {
        let question = text.trim();
        if question.is_empty() {
            self.output.emit(OutboundEvent::error(EMPTY_QUESTION));
            return;
        }
        let Some(input) = self.input.clone() else {
            self.output.emit(OutboundEvent::error(MISSING_INPUT));
            return;
        };

        self.cancel_active().await;
        self.output.advance_epoch();

        let job = Job::new(input, question);
        tracing::info!(
            job_id = %job.id,
            "Starting pipeline for question: {}",
            truncate_chars(question, 80)
        );
        let sink = self.output.job_sink(job.cancel.clone());
        let id = job.id;
        let cancel = job.cancel.clone();
        let pipeline = self.pipeline.clone();
        let handle = tokio::spawn(async move { pipeline.run(job, sink).await });

        self.active = Some(ActiveJob { id, cancel, handle });
        self.state = SessionState::Running;
    }

    /// Explicit stop: cancel the job, send `done`, close the stream.
    pub async fn stop(&mut self) {
        tracing::info!("Client requested stop");
        self.cancel_active().await;
        self.output.advance_epoch();
        self.output.emit(OutboundEvent::Done);
        self.close();
    }

    /// Transport is gone: same teardown as `stop` without emitting anything.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        tracing::info!("Client disconnected");
        self.cancel_active().await;
        self.output.advance_epoch();
        self.close();
    }

    fn close(&mut self) {
        self.output.close();
        self.state = SessionState::Closed;
    }

    async fn cancel_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        match active.handle.await {
            Ok(state) => tracing::debug!(job_id = %active.id, "Previous job settled as {:?}", state),
            Err(e) => tracing::error!(job_id = %active.id, "Job task failed: {}", e),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}
