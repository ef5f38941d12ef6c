// ── Core error types ──
//
// Errors raised by services, dispatchers and cameras. Only the service
// and lookup variants are shown verbatim in chat; camera transport
// failures are folded into `Api`, `Timeout` and `ConnectionFailed`.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Service errors ───────────────────────────────────────────────
    #[error("Service configuration error: {message}")]
    ServiceConfig { message: String },

    #[error("{message}")]
    ServiceRuntime { message: String },

    // ── Camera errors ────────────────────────────────────────────────
    #[error("Cannot connect to camera: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Camera request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Camera API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Camera not found: {id}")]
    CameraNotFound { id: String },

    // ── Alert stream ─────────────────────────────────────────────────
    #[error("Unknown detection event '{event}' in alert stream")]
    UnknownDetection { event: String },

    /// The alert stream ended although nobody asked the service to stop.
    #[error("Alert stream ended unexpectedly")]
    ChunkLoopExhausted,

    // ── Subprocess ───────────────────────────────────────────────────
    #[error("ffmpeg error: {message}")]
    Subprocess { message: String },

    // ── Delivery ─────────────────────────────────────────────────────
    #[error("Message delivery failed: {message}")]
    Messenger { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::ServiceRuntime {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ServiceConfig {
            message: message.into(),
        }
    }

    /// Errors that are safe to show verbatim in a chat reply.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::ServiceConfig { .. } | Self::ServiceRuntime { .. } | Self::CameraNotFound { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hikbot_api::Error> for CoreError {
    fn from(err: hikbot_api::Error) -> Self {
        match err {
            hikbot_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            hikbot_api::Error::InvalidUrl(e) => CoreError::ServiceConfig {
                message: format!("Invalid camera URL: {e}"),
            },
            hikbot_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            hikbot_api::Error::Auth { message } => CoreError::Api {
                message,
                status: Some(401),
            },
            hikbot_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            hikbot_api::Error::BadStatus { status, url, .. } => CoreError::Api {
                message: format!("HTTP {status} from {url}"),
                status: Some(status),
            },
            hikbot_api::Error::UnexpectedResponse { message } => CoreError::Api {
                message,
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_status_maps_to_api_error() {
        let err: CoreError = hikbot_api::Error::BadStatus {
            status: 401,
            url: "http://cam/ISAPI/Smart/LineDetection/1".into(),
            body: String::new(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { status: Some(401), .. }));
        assert!(!err.is_user_facing());
    }

    #[test]
    fn runtime_errors_display_their_message() {
        let err = CoreError::runtime("Alarm service already started");
        assert_eq!(err.to_string(), "Alarm service already started");
        assert!(err.is_user_facing());
    }
}
