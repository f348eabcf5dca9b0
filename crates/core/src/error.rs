/// Errors returned by the remote test platform client.
///
/// Run-lookup errors are fatal to the request that triggered them; the
/// server maps each kind to its own HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The platform does not know the run id.
    #[error("run not found")]
    NotFound,

    /// The run exists but belongs to a different application than the suite.
    #[error("run belongs to application {actual}, suite expects {expected}")]
    SuiteMismatch { expected: String, actual: String },

    /// The suite token was rejected (401/403).
    #[error("authentication failed (status {status})")]
    AuthFailed { status: u16 },

    /// Connection failure, timeout, or a status other than 401/403/404.
    /// `status` is set when the platform answered at all.
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The rerun endpoint refused the request. `body` is the raw response text.
    #[error("rerun rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The response was not the JSON shape we expected.
    #[error("could not decode platform response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Map a non-success HTTP status from the run lookup endpoint.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            404 => PlatformError::NotFound,
            401 | 403 => PlatformError::AuthFailed { status },
            _ => PlatformError::Transport {
                status: Some(status),
                message: body.into(),
            },
        }
    }

    /// Connection-level failure with no HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        PlatformError::Transport {
            status: None,
            message: message.into(),
        }
    }
}

/// Reasons a failure could not be fully enriched.
///
/// These never escape the enricher: the `Display` text becomes the
/// `error_message` of a placeholder [`FailureRecord`](crate::FailureRecord).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    #[error("No test case UUID available")]
    NoTestCaseUuid,

    #[error("No execution data available")]
    NoExecutionData,

    #[error("No execution UUID available")]
    NoExecutionUuid,

    /// Enrichment itself broke (e.g. the task panicked).
    #[error("Error processing: {0}")]
    Internal(String),

    /// The worker pool gave up on the task (timeout, cancellation).
    #[error("Error fetching details: {0}")]
    Task(String),
}
