//! The Pipeline Orchestrator: Analysis → Scripting → (Media ‖ Narration) for one job.

use crate::channel::EventSink;
use crate::error::PipelineError;
use crate::events::OutboundEvent;
use crate::generic_types::SpeechSessionConfig;
use crate::model::RawInput;
use crate::prompts::Prompts;
use crate::services::Services;
use crate::stages::{AnalysisStage, MediaStage, NarrationStage, ScriptingStage};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const STATUS_ANALYZING: &str = "Analyzing your image...";
pub const STATUS_SCRIPTING: &str = "Preparing your explainer...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Analyzing,
    Scripting,
    Generating,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Forward-only transitions; any live state may fail or be cancelled.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Idle, Analyzing) | (Analyzing, Scripting) | (Scripting, Generating) => true,
            (Generating, Done) => true,
            (from, Failed | Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// One cancellable run of the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub input: RawInput,
    pub question: String,
    pub cancel: CancellationToken,
}

impl Job {
    pub fn new(input: RawInput, question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            question: question.into(),
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub prompts: Prompts,
    pub voice: Option<String>,
    /// Ceiling on simultaneous image generations per job.
    pub media_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            prompts: Prompts::default(),
            voice: None,
            media_concurrency: 4,
        }
    }
}

/// Composes the four stages. Shared by every session of the process.
pub struct Pipeline {
    analysis: AnalysisStage,
    scripting: ScriptingStage,
    media: MediaStage,
    narration: NarrationStage,
}

struct JobRun {
    id: Uuid,
    state: JobState,
}

impl JobRun {
    fn advance(&mut self, next: JobState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(job_id = %self.id, "Ignoring transition {:?} -> {:?}", self.state, next);
            return;
        }
        tracing::debug!(job_id = %self.id, "{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

impl Pipeline {
    pub fn new(services: Services, settings: PipelineSettings) -> Self {
        let PipelineSettings {
            prompts,
            voice,
            media_concurrency,
        } = settings;
        Self {
            analysis: AnalysisStage::new(services.vision, prompts.vision),
            scripting: ScriptingStage::new(services.text, prompts.script),
            media: MediaStage::new(services.images, services.storage, media_concurrency),
            narration: NarrationStage::new(
                services.speech,
                SpeechSessionConfig {
                    instructions: prompts.narrator,
                    voice,
                },
            ),
        }
    }

    /// Runs `job` to a terminal state, emitting through `sink`.
    ///
    /// `Done` and `Failed` both close the stream with `done`; a cancelled job emits nothing
    /// further and leaves closing the stream to whoever cancelled it.
    pub async fn run(&self, job: Job, sink: EventSink) -> JobState {
        let mut run = JobRun {
            id: job.id,
            state: JobState::Idle,
        };
        tracing::info!(job_id = %job.id, "Pipeline started");

        let outcome = self.execute(&job, &sink, &mut run).await;
        let terminal = match outcome {
            Ok(()) => {
                sink.emit(OutboundEvent::Done);
                JobState::Done
            }
            Err(PipelineError::Cancelled) => JobState::Cancelled,
            Err(e) => {
                tracing::error!(job_id = %job.id, "Pipeline error: {}", e);
                sink.emit(OutboundEvent::error(format!("Something went wrong: {e}")));
                sink.emit(OutboundEvent::Done);
                JobState::Failed
            }
        };
        run.advance(terminal);
        tracing::info!(job_id = %job.id, "Pipeline finished: {:?}", run.state);
        run.state
    }

    async fn execute(
        &self,
        job: &Job,
        sink: &EventSink,
        run: &mut JobRun,
    ) -> Result<(), PipelineError> {
        run.advance(JobState::Analyzing);
        sink.emit(OutboundEvent::status(STATUS_ANALYZING));
        let context = until_cancelled(
            &job.cancel,
            self.analysis.analyze(&job.input, &job.question, sink),
        )
        .await?;

        run.advance(JobState::Scripting);
        sink.emit(OutboundEvent::status(STATUS_SCRIPTING));
        let script = until_cancelled(&job.cancel, self.scripting.script(&context, sink)).await?;
        drop(context);

        // Both branches observe the token themselves so the speech session is always closed.
        run.advance(JobState::Generating);
        tokio::join!(
            self.media.render_all(&script, sink, &job.cancel),
            self.narration.narrate_all(&script, sink, &job.cancel),
        );

        if job.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// Abandons `fut` as soon as `cancel` fires.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = fut => result,
    }
}
