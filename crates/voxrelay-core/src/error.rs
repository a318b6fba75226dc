use thiserror::Error;

/// Workspace-wide error taxonomy. This enum covers the *causes*; the
/// pipeline in `voxrelay-gateway` maps each cause to an apologetic filler
/// chunk or a silent cancellation, never surfacing a raw error to the voice
/// platform.
#[derive(Debug, Error)]
pub enum VoxRelayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream HTTP error ({status}): {message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VoxRelayError {
    /// Short error code, used only in structured log fields — never sent
    /// to the voice platform, which only ever sees `[DONE]`.
    pub fn code(&self) -> &'static str {
        match self {
            VoxRelayError::Config(_) => "CONFIG_ERROR",
            VoxRelayError::UpstreamHttp { .. } => "UPSTREAM_HTTP_ERROR",
            VoxRelayError::UpstreamTransport(_) => "UPSTREAM_TRANSPORT_ERROR",
            VoxRelayError::Cancelled => "CANCELLED",
            VoxRelayError::Timeout { .. } => "TIMEOUT",
            VoxRelayError::Serialization(_) => "SERIALIZATION_ERROR",
            VoxRelayError::Io(_) => "IO_ERROR",
            VoxRelayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for the two causes the turn pipeline treats as silent —
    /// a cancelled speculative turn is expected, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VoxRelayError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, VoxRelayError>;
