use crate::channel::EventSink;
use crate::events::OutboundEvent;
use crate::model::{Script, Section};
use crate::parse::truncate_chars;
use crate::services::{ImageGenerator, MediaStorage};
use anyhow::Context;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const STYLE_PREFIX: &str = "Educational illustration, clean white background, vibrant colors, \
clearly labeled, suitable for a student textbook, high detail: ";
const CAPTION_CHARS: usize = 80;

/// Produces one illustration per section, concurrently, and publishes each as an `image_url`.
pub struct MediaStage {
    images: Arc<dyn ImageGenerator>,
    storage: Arc<dyn MediaStorage>,
    max_concurrent: usize,
}

impl MediaStage {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        storage: Arc<dyn MediaStorage>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            images,
            storage,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Attempts every section and waits for all of them to settle. A failed or empty section is
    /// logged and skipped without affecting the others. Returns the number of images delivered.
    pub async fn render_all(
        &self,
        script: &Script,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> usize {
        if script.sections.is_empty() {
            return 0;
        }
        let limit = Semaphore::new(self.max_concurrent);
        let attempts = script
            .sections
            .iter()
            .map(|section| self.render_section(section, &limit, sink, cancel));
        let delivered = join_all(attempts)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        tracing::info!(
            "Section images processed: {}/{} delivered",
            delivered,
            script.sections.len()
        );
        delivered
    }

    async fn render_section(
        &self,
        section: &Section,
        limit: &Semaphore,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> bool {
        let attempt = async {
            let _permit = limit
                .acquire()
                .await
                .context("media concurrency limiter closed")?;
            let prompt = format!("{STYLE_PREFIX}{}", section.media_prompt);
            let bytes = match self.images.generate_image(&prompt).await? {
                Some(bytes) if !bytes.is_empty() => bytes,
                _ => return Ok(None),
            };
            let url = self
                .storage
                .store(bytes, &format!("section_{}.png", section.id))
                .await
                .context("failed to store section image")?;
            anyhow::Ok(Some(url))
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            outcome = attempt => outcome,
        };

        match outcome {
            Ok(Some(url)) => {
                tracing::info!("Image ready for section {}: {}", section.id, url);
                sink.emit(OutboundEvent::Image {
                    section_id: section.id,
                    url,
                    caption: truncate_chars(&section.media_prompt, CAPTION_CHARS).to_string(),
                });
                true
            }
            Ok(None) => {
                tracing::warn!("No image returned for section {}", section.id);
                false
            }
            Err(e) => {
                tracing::error!("Image generation failed for section {}: {:#}", section.id, e);
                false
            }
        }
    }
}
