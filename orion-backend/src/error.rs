/// Errors surfaced by backend adapters.
///
/// Everything here is recoverable from the caller's point of view: the
/// reconciliation layer turns transport failures into backoff and never
/// lets them escape to the UI.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to decode backend payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Not an error path for the engine: a permanent session-level signal
    /// that this adapter cannot push status events.
    #[error("status streaming is not supported by this backend")]
    StreamUnsupported,

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// Whether retrying later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Transport(_)
                | BackendError::Timeout
                | BackendError::Http { .. }
                | BackendError::Stream(_)
        )
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Transport(err)
        }
    }
}
