use crate::channel::EventSink;
use crate::error::PipelineError;
use crate::events::OutboundEvent;
use crate::model::{ContextRecord, ContextWire, RawInput, sniff_image_mime};
use crate::parse::parse_or_degrade;
use crate::prompts::render;
use crate::services::VisionAnalyzer;
use std::sync::Arc;

/// Turns the captured image and the question into a `ContextRecord`.
pub struct AnalysisStage {
    vision: Arc<dyn VisionAnalyzer>,
    prompt: String,
}

impl AnalysisStage {
    pub fn new(vision: Arc<dyn VisionAnalyzer>, prompt: impl Into<String>) -> Self {
        Self {
            vision,
            prompt: prompt.into(),
        }
    }

    /// Decodes the input, asks the vision capability about it and emits `meta`.
    ///
    /// An undecodable payload or an unreachable capability fails the job; unparseable output
    /// degrades to `ContextRecord::degraded`.
    pub async fn analyze(
        &self,
        input: &RawInput,
        question: &str,
        sink: &EventSink,
    ) -> Result<ContextRecord, PipelineError> {
        let image = input.decode()?;
        let mime_type = sniff_image_mime(&image);
        tracing::debug!("Analyzing {} bytes of {}", image.len(), mime_type);

        let prompt = render(&self.prompt, &[("question", question)]);
        let raw = self
            .vision
            .analyze(&image, mime_type, &prompt)
            .await
            .map_err(|e| PipelineError::upstream("analysis", e))?;

        let record = parse_or_degrade(
            &raw,
            "Analysis",
            |wire: ContextWire| Some(wire.into_record(question)),
            |text| ContextRecord::degraded(text, question),
        );
        tracing::info!(
            subject = %record.subject,
            topic = %record.topic,
            "Image analysis complete"
        );

        sink.emit(OutboundEvent::Meta {
            subject: record.subject.clone(),
            topic: record.topic.clone(),
        });
        Ok(record)
    }
}
