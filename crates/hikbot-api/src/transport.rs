// Shared transport configuration for building reqwest::Client instances.
//
// Holds the camera address, credentials, timeouts and the fixed-delay
// retry policy applied to short request/response calls.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// How credentials are presented to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// Answer the camera's `WWW-Authenticate: Digest` challenge.
    #[default]
    Digest,
    /// Send basic credentials up front (older firmware).
    Basic,
}

/// Connection settings for a single camera.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Camera base URL (e.g. `http://192.168.1.64`).
    pub host: Url,
    pub username: String,
    pub password: SecretString,
    pub auth: AuthScheme,
    /// Per-request timeout for short calls (snapshot, switch, IR-cut).
    pub timeout: Duration,
    /// Extra attempts after the first one on transient failures.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Accept self-signed certificates when the camera is on HTTPS.
    pub accept_invalid_certs: bool,
}

impl ClientConfig {
    pub fn new(host: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host,
            username: username.into(),
            password,
            auth: AuthScheme::default(),
            timeout: Duration::from_secs(10),
            retries: 2,
            retry_delay: Duration::from_millis(500),
            accept_invalid_certs: true,
        }
    }

    /// Build a `reqwest::Client` from this config.
    ///
    /// Only connecting is bounded client-wide: the alert stream is a
    /// long-lived response, so other timeouts are applied per request.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .user_agent(concat!("hikbot/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| crate::error::Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
