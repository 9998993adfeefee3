//! Request/response collaborators consumed by the pipeline, and the bundle that carries them.

use crate::realtime_api::SpeechConnector;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

/// Turns an image plus an instruction prompt into (ideally JSON) text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String>;
}

/// Turns a prompt into (ideally JSON) text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Renders one illustration. `Ok(None)` means the provider produced nothing (e.g. filtered).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>>;
}

/// Stores a blob and returns a URL the client can fetch it from.
///
/// Every call must land on a distinct destination, even for a repeated `suggested_name`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String>;
}

/// Explicitly constructed service handles, owned by the process and shared by every session.
#[derive(Clone)]
pub struct Services {
    pub vision: Arc<dyn VisionAnalyzer>,
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub storage: Arc<dyn MediaStorage>,
    pub speech: Arc<dyn SpeechConnector>,
}
