use thiserror::Error;

/// Why a refresh invocation failed. Every variant is surfaced to the
/// scheduler unchanged; the job never retries.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The request never produced a response (DNS, connect, transport).
    #[error("Network error: {0:#}")]
    Network(#[source] anyhow::Error),

    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {status_text}")]
    Remote { status: u16, status_text: String },

    /// The service answered 2xx but not with a PNG.
    #[error("Unexpected content type: {}", content_type.as_deref().unwrap_or("null"))]
    ContentType { content_type: Option<String> },
}

impl RefreshError {
    /// Short machine-readable tag used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::Network(_) => "network",
            RefreshError::Remote { .. } => "remote",
            RefreshError::ContentType { .. } => "content_type",
        }
    }
}
