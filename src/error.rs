use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the review engine.
///
/// The orchestrator's retry policy depends on the distinction between
/// retryable and fatal failures, so every external-call site maps its
/// outcome onto one of these variants rather than bubbling a raw HTTP
/// error. Parsing of model output never produces an error at all; the
/// parser returns a best-effort result instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed credential/config material. Fatal at startup
    /// or first use; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Token exchange or provider auth rejection, after the single
    /// forced-refresh retry has been spent.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The requested resource does not exist or is not accessible to the
    /// app installation.
    #[error("{0} not found or inaccessible")]
    NotFound(String),

    /// Non-auth, non-404 HTTP failure from the source-control provider.
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    /// The provider could not be reached at all (connect failure,
    /// timeout, protocol error before a status line).
    #[error("provider request failed: {0}")]
    Network(String),

    /// Analysis backend unreachable, timed out, or returned a malformed
    /// envelope. Scoped to a single analysis task.
    #[error("analysis backend error: {0}")]
    Backend(String),

    /// `process_review` was invoked on a review that is not PENDING.
    #[error("review {id} is not pending (status: {status})")]
    InvalidState { id: u64, status: String },
}

impl Error {
    /// Whether an idempotent operation that failed this way may be
    /// reissued. Writes are never retried regardless of this answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        let err = Error::Provider {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(err.is_retryable());

        let err = Error::Network("connection refused".to_string());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = Error::Provider {
            status: 422,
            body: "unprocessable".to_string(),
        };
        assert!(!err.is_retryable());

        assert!(!Error::NotFound("acme/widgets#42".to_string()).is_retryable());
        assert!(!Error::Auth("bad credentials".to_string()).is_retryable());
        assert!(!Error::Configuration("missing key".to_string()).is_retryable());
    }
}
