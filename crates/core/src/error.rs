/// Failures that end a job in the `Failed` state, plus the cancellation signal.
///
/// Malformed upstream output never shows up here: the Analysis and Scripting stages degrade
/// to a fallback value instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("the submitted image could not be decoded: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("{stage} service unavailable: {source:#}")]
    UpstreamUnavailable {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("job cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn upstream(stage: &'static str, source: anyhow::Error) -> Self {
        Self::UpstreamUnavailable { stage, source }
    }
}

/// Failures inside the Narration Stage. They are reported to the client and never fail the job.
#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    #[error("could not open speech session: {0:#}")]
    Open(anyhow::Error),
    #[error("speech session failed: {0:#}")]
    Stream(anyhow::Error),
    #[error("speech session ended before section {0} finished")]
    EndedEarly(i32),
    #[error("narration cancelled")]
    Cancelled,
}
