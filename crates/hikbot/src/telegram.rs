// Telegram Bot API client
//
// Long-polls `getUpdates` for commands and implements `Messenger` for the
// outbound dispatcher. Every call goes through `call`, which unwraps the
// `{ ok, result, description }` envelope.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hikbot_core::{ChatAction, CoreError, Messenger, Recipient, VideoUpload};
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

/// Slack on top of the long-poll timeout before the request is abandoned.
const POLL_SLACK: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    video: Option<FileRef>,
    animation: Option<FileRef>,
    document: Option<FileRef>,
}

impl Message {
    /// Server-side id of an uploaded video, whatever Telegram filed it as.
    fn file_id(self) -> Option<String> {
        self.video
            .or(self.animation)
            .or(self.document)
            .map(|f| f.file_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileRef {
    file_id: String,
}

// ── Client ───────────────────────────────────────────────────────────

pub struct TelegramClient {
    http: reqwest::Client,
    api_url: Url,
    token: SecretString,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: Url, token: SecretString, poll_timeout: Duration) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hikbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::Messenger {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            api_url,
            token,
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}/bot{}/{method}", self.token.expose_secret())
    }

    /// Send a prepared request and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CoreError> {
        trace!(method, "telegram call");
        let resp = request
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;
        let status = resp.status();
        let envelope: Envelope<T> = resp.json().await.map_err(|e| CoreError::Messenger {
            message: format!("{method}: invalid response ({status}): {}", e.without_url()),
        })?;

        match envelope {
            Envelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            Envelope { description, .. } => Err(CoreError::Messenger {
                message: format!(
                    "{method} failed ({status}): {}",
                    description.unwrap_or_else(|| "no description".into())
                ),
            }),
        }
    }

    fn post_json(&self, method: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.http
            .post(self.method_url(method))
            .timeout(REQUEST_TIMEOUT)
            .json(body)
    }

    fn post_form(&self, method: &str, form: Form) -> reqwest::RequestBuilder {
        self.http
            .post(self.method_url(method))
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
    }

    /// The bot's own account; doubles as a token check at startup.
    pub async fn get_me(&self) -> Result<User, CoreError> {
        self.call("getMe", self.post_json("getMe", &json!({}))).await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, CoreError> {
        let mut body = json!({
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let request = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(self.poll_timeout + POLL_SLACK)
            .json(&body);
        self.call("getUpdates", request).await
    }
}

fn transport_error(method: &str, e: reqwest::Error) -> CoreError {
    if e.is_timeout() {
        return CoreError::Messenger {
            message: format!("{method}: request timed out"),
        };
    }
    CoreError::Messenger {
        message: format!("{method}: {}", e.without_url()),
    }
}

/// Base form shared by media uploads.
fn media_form(to: Recipient, caption: &str) -> Form {
    let mut form = Form::new()
        .text("chat_id", to.chat_id.to_string())
        .text("caption", caption.to_owned());
    if let Some(reply_to) = to.reply_to {
        form = form.text("reply_to_message_id", reply_to.to_string());
    }
    form
}

fn file_part(data: Vec<u8>, filename: &str, mime: &str) -> Result<Part, CoreError> {
    Part::bytes(data)
        .file_name(filename.to_owned())
        .mime_str(mime)
        .map_err(|e| CoreError::Internal(format!("invalid mime type {mime}: {e}")))
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), CoreError> {
        let mut body = json!({ "chat_id": to.chat_id, "text": text });
        if let Some(reply_to) = to.reply_to {
            body["reply_to_message_id"] = json!(reply_to);
        }
        let _: Message = self
            .call("sendMessage", self.post_json("sendMessage", &body))
            .await?;
        Ok(())
    }

    async fn send_photo(&self, to: Recipient, photo: Bytes, caption: &str) -> Result<(), CoreError> {
        let form = media_form(to, caption).part("photo", file_part(photo.to_vec(), "snapshot.jpg", "image/jpeg")?);
        let _: Message = self
            .call("sendPhoto", self.post_form("sendPhoto", form))
            .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        to: Recipient,
        document: Bytes,
        filename: &str,
        caption: &str,
    ) -> Result<(), CoreError> {
        let form = media_form(to, caption).part("document", file_part(document.to_vec(), filename, "image/jpeg")?);
        let _: Message = self
            .call("sendDocument", self.post_form("sendDocument", form))
            .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        to: Recipient,
        video: VideoUpload<'_>,
        caption: &str,
    ) -> Result<Option<String>, CoreError> {
        let form = media_form(to, caption).text("supports_streaming", "true");
        let form = match video {
            VideoUpload::File(path) => {
                let data = tokio::fs::read(path).await.map_err(|e| CoreError::Messenger {
                    message: format!("cannot read {}: {e}", path.display()),
                })?;
                let filename = path
                    .file_name()
                    .map_or_else(|| "video.mp4".into(), |n| n.to_string_lossy().into_owned());
                debug!(path = %path.display(), bytes = data.len(), "uploading video");
                form.part("video", file_part(data, &filename, "video/mp4")?)
            }
            VideoUpload::FileId(id) => form.text("video", id.to_owned()),
        };
        let sent: Message = self
            .call("sendVideo", self.post_form("sendVideo", form))
            .await?;
        Ok(sent.file_id())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), CoreError> {
        let body = json!({ "chat_id": chat_id, "action": action.to_string() });
        let _: bool = self
            .call("sendChatAction", self.post_json("sendChatAction", &body))
            .await?;
        Ok(())
    }
}
