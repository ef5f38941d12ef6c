use thiserror::Error;

/// Top-level error type for the `hikbot-api` crate.
///
/// Covers every failure mode of a camera firmware call: transport,
/// unexpected HTTP status codes and malformed ISAPI payloads.
/// `hikbot-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The camera's authentication challenge could not be answered.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// TLS or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Camera responses ────────────────────────────────────────────
    /// The camera answered with a non-success status code.
    #[error("Camera returned HTTP {status} for {url}")]
    BadStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// The camera answered 2xx but the payload could not be understood.
    #[error("Unexpected camera response: {message}")]
    UnexpectedResponse { message: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } => true,
            Self::BadStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the camera rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::BadStatus { status: 401 | 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::BadStatus {
            status: 503,
            url: "http://cam/ISAPI".into(),
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn auth_errors_are_not_transient() {
        let err = Error::BadStatus {
            status: 401,
            url: "http://cam/ISAPI".into(),
            body: String::new(),
        };
        assert!(!err.is_transient());
        assert!(err.is_unauthorized());
    }
}
