// ISAPI HTTP client
//
// Wraps `reqwest::Client` with camera URL construction, status checking,
// fixed-delay retry for short calls, and the XML read-modify-write cycle
// used to toggle detection triggers. The alert stream is the only
// long-lived request: it is never retried here, the caller reconnects.

use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use digest_auth::{AuthContext, HttpMethod};
use futures_util::stream::BoxStream;
use reqwest::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;
use crate::model::{Detection, IrcutFilter, Resolution};
use crate::transport::{AuthScheme, ClientConfig};

/// Infinite sequence of text chunks pushed by the camera.
pub type AlertStream = BoxStream<'static, Result<String, Error>>;

/// Operations the bot needs from a camera's firmware.
///
/// Implemented by [`HikvisionClient`]; tests substitute their own fakes.
#[async_trait]
pub trait CameraApi: Send + Sync {
    /// Grab a JPEG from `channel`, optionally scaled by the camera.
    async fn take_snapshot(&self, channel: u32, resize: Option<Resolution>)
    -> Result<Bytes, Error>;

    /// Open the camera's event notification stream.
    async fn alert_stream(&self) -> Result<AlertStream, Error>;

    /// Enable or disable a detection trigger.
    ///
    /// Returns `Some(status)` when the trigger was already in the requested
    /// state and nothing was changed.
    async fn switch(&self, detection: Detection, state: bool) -> Result<Option<String>, Error>;

    async fn set_ircut_filter(&self, filter: IrcutFilter) -> Result<(), Error>;
}

/// Raw HTTP client for a Hikvision camera.
#[derive(Clone)]
pub struct HikvisionClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HikvisionClient {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self { http, config })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self { http, config }
    }

    /// The camera base URL.
    pub fn host(&self) -> &Url {
        &self.config.host
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for an ISAPI resource path.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.config.host.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match self.config.auth {
            AuthScheme::Basic => builder
                .basic_auth(&self.config.username, Some(self.config.password.expose_secret())),
            AuthScheme::Digest => builder,
        }
    }

    /// Execute `builder`, answering a digest challenge with one resend.
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let request = builder.build()?;
        if self.config.auth == AuthScheme::Basic {
            return Ok(self.http.execute(request).await?);
        }

        let resend = request.try_clone();
        let resp = self.http.execute(request).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| value.trim_start().starts_with("Digest"));
        let (Some(mut resend), Some(challenge)) = (resend, challenge) else {
            return Ok(resp);
        };

        let authorization = self.digest_authorization(challenge, &resend)?;
        trace!(url = %resend.url(), "answering digest challenge");
        resend.headers_mut().insert(AUTHORIZATION, authorization);
        Ok(self.http.execute(resend).await?)
    }

    fn digest_authorization(
        &self,
        challenge: &str,
        request: &reqwest::Request,
    ) -> Result<HeaderValue, Error> {
        let auth_error = |e: &dyn std::fmt::Display| Error::Auth {
            message: format!("cannot answer digest challenge: {e}"),
        };
        let mut prompt = digest_auth::parse(challenge).map_err(|e| auth_error(&e))?;

        let url = request.url();
        let uri = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_owned(),
        };
        let context = AuthContext::new_with_method(
            self.config.username.as_str(),
            self.config.password.expose_secret(),
            uri,
            request.body().and_then(reqwest::Body::as_bytes),
            HttpMethod::from(request.method().as_str()),
        );
        let answer = prompt.respond(&context).map_err(|e| auth_error(&e))?;
        HeaderValue::from_str(&answer.to_header_string()).map_err(|e| auth_error(&e))
    }

    /// Send a short request with the per-request timeout and check its status.
    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<String>,
    ) -> Result<reqwest::Response, Error> {
        debug!("{method} {url}");

        let mut builder = self
            .request(method, url)
            .query(query)
            .timeout(self.config.timeout);
        if let Some(body) = body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body);
        }

        let resp = self.execute(builder).await.map_err(|e| match e {
            Error::Transport(e) if e.is_timeout() => Error::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            },
            other => other,
        })?;
        check_status(resp).await
    }

    /// Run `op` with fixed-delay retry on transient errors.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "{what} failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_text(&self, url: &Url) -> Result<String, Error> {
        self.with_retry("GET", || async move {
            let resp = self.send(Method::GET, url.clone(), &[], None).await?;
            Ok(resp.text().await?)
        })
        .await
    }

    async fn put_xml(&self, url: &Url, body: &str) -> Result<(), Error> {
        self.with_retry("PUT", || async move {
            let resp = self
                .send(Method::PUT, url.clone(), &[], Some(body.to_owned()))
                .await?;
            let text = resp.text().await?;
            check_response_status(&text)
        })
        .await
    }
}

#[async_trait]
impl CameraApi for HikvisionClient {
    async fn take_snapshot(
        &self,
        channel: u32,
        resize: Option<Resolution>,
    ) -> Result<Bytes, Error> {
        let url = self.api_url(&format!("ISAPI/Streaming/channels/{channel}/picture"))?;
        let query: Vec<(&str, String)> = resize
            .map(|r| {
                vec![
                    ("videoResolutionWidth", r.width.to_string()),
                    ("videoResolutionHeight", r.height.to_string()),
                ]
            })
            .unwrap_or_default();

        let (url, query) = (&url, query.as_slice());
        self.with_retry("snapshot", || async move {
            let resp = self.send(Method::GET, url.clone(), query, None).await?;
            Ok(resp.bytes().await?)
        })
        .await
    }

    async fn alert_stream(&self) -> Result<AlertStream, Error> {
        let url = self.api_url("ISAPI/Event/notification/alertStream")?;
        debug!("GET {url} (stream)");

        let resp = self.execute(self.request(Method::GET, url)).await?;
        let resp = check_status(resp).await?;
        Ok(Box::pin(crate::stream::lines(resp.bytes_stream())))
    }

    async fn switch(&self, detection: Detection, state: bool) -> Result<Option<String>, Error> {
        let url = self.api_url(detection.endpoint())?;
        let xml = self.get_text(&url).await?;

        let current = parse_enabled(&xml, detection)?;
        if current == state {
            let status = if state { "enabled" } else { "disabled" };
            return Ok(Some(format!("{} already {status}", detection.label())));
        }

        let updated = replace_enabled(&xml, state)?;
        trace!(%detection, state, "writing trigger configuration");
        self.put_xml(&url, &updated).await?;
        Ok(None)
    }

    async fn set_ircut_filter(&self, filter: IrcutFilter) -> Result<(), Error> {
        let url = self.api_url("ISAPI/Image/channels/1/IrcutFilter")?;
        let body = format!(
            r#"<IrcutFilter version="2.0" xmlns="http://www.hikvision.com/ver20/XMLSchema"><IrcutFilterType>{filter}</IrcutFilterType></IrcutFilter>"#
        );
        self.put_xml(&url, &body).await
    }
}

// ── Response parsing ─────────────────────────────────────────────────

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::BadStatus {
        status: status.as_u16(),
        url,
        body,
    })
}

/// Read the first `<enabled>` element of a trigger document.
fn parse_enabled(xml: &str, detection: Detection) -> Result<bool, Error> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::UnexpectedResponse {
        message: format!("invalid {} XML: {e}", detection.xml_method()),
    })?;
    let text = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "enabled")
        .and_then(|node| node.text())
        .map(str::trim)
        .ok_or_else(|| Error::UnexpectedResponse {
            message: format!("{} has no <enabled> element", detection.xml_method()),
        })?;
    match text {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::UnexpectedResponse {
            message: format!("unexpected <enabled> value '{other}'"),
        }),
    }
}

/// Rewrite the first `<enabled>` value, leaving the rest of the document as-is.
fn replace_enabled(xml: &str, state: bool) -> Result<String, Error> {
    const OPEN: &str = "<enabled>";
    const CLOSE: &str = "</enabled>";

    let missing = || Error::UnexpectedResponse {
        message: "no <enabled> element to update".into(),
    };
    let start = xml.find(OPEN).ok_or_else(missing)? + OPEN.len();
    let end = start + xml[start..].find(CLOSE).ok_or_else(missing)?;

    let mut out = String::with_capacity(xml.len());
    out.push_str(&xml[..start]);
    out.push_str(if state { "true" } else { "false" });
    out.push_str(&xml[end..]);
    Ok(out)
}

/// ISAPI write calls answer with a `<ResponseStatus>`; `statusCode` 1 is OK.
fn check_response_status(body: &str) -> Result<(), Error> {
    let Ok(doc) = roxmltree::Document::parse(body) else {
        // Some firmware answers PUT with an empty body.
        return Ok(());
    };
    let code = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "statusCode")
        .and_then(|node| node.text())
        .map(str::trim);
    match code {
        None | Some("1") => Ok(()),
        Some(code) => {
            let status = doc
                .descendants()
                .find(|node| node.is_element() && node.tag_name().name() == "statusString")
                .and_then(|node| node.text())
                .unwrap_or("unknown");
            Err(Error::UnexpectedResponse {
                message: format!("camera rejected request (statusCode {code}: {status})"),
            })
        }
    }
}
