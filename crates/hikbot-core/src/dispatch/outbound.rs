use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::events::{MessageRef, OutboundEvent, OutboundKind};
use crate::messenger::{ChatAction, Messenger, Recipient, VideoUpload};

/// Media uploads are attempted this many times before giving up.
pub const DEFAULT_SEND_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders outbound events to chat.
///
/// Events answering a message go to that chat; alert events go to every
/// alert subscriber. A recipient that fails does not stop delivery to
/// the others.
pub struct OutboundEventDispatcher {
    messenger: Arc<dyn Messenger>,
    alert_chat_ids: Vec<i64>,
    attempts: u32,
    retry_delay: Duration,
    /// Server-side ids of videos already uploaded once.
    video_ids: Mutex<HashMap<PathBuf, String>>,
}

impl OutboundEventDispatcher {
    pub fn new(messenger: Arc<dyn Messenger>, alert_chat_ids: Vec<i64>) -> Self {
        Self {
            messenger,
            alert_chat_ids,
            attempts: DEFAULT_SEND_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            video_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Override the media upload retry policy.
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub async fn dispatch(&self, event: OutboundEvent) -> Result<(), CoreError> {
        let OutboundEvent {
            cam_id,
            cam_description,
            message,
            kind,
        } = event;
        let recipients = self.recipients(message);
        if recipients.is_empty() {
            debug!(cam = %cam_id, "no recipients for outbound event");
            return Ok(());
        }

        match kind {
            OutboundKind::Snapshot {
                img,
                taken_at,
                resized,
                counter,
            } => {
                let caption = format!(
                    "{cam_description} ({cam_id})\nSnapshot #{counter} taken at {}",
                    taken_at.format(TIME_FORMAT)
                );
                let filename = snapshot_filename(&cam_id, taken_at);
                self.for_each(&recipients, |to| {
                    self.send_image(to, &img, resized, &filename, &caption)
                })
                .await
            }
            OutboundKind::AlertSnapshot {
                img,
                taken_at,
                detection,
                alert_count,
                resized,
            } => {
                let caption = format!(
                    "Alert #{alert_count}: {} on {cam_description} ({cam_id}) at {}",
                    detection.label(),
                    taken_at.format(TIME_FORMAT)
                );
                let filename = snapshot_filename(&cam_id, taken_at);
                self.for_each(&recipients, |to| {
                    self.send_image(to, &img, resized, &filename, &caption)
                })
                .await
            }
            OutboundKind::VideoGif { path, detection } => {
                let caption = match detection {
                    Some(detection) => {
                        format!("{} video from {cam_description} ({cam_id})", detection.label())
                    }
                    None => format!("Video from {cam_description} ({cam_id})"),
                };
                let result = self
                    .for_each(&recipients, |to| self.send_video(to, &path, &caption))
                    .await;
                self.forget_video(&path).await;
                result
            }
            OutboundKind::AlarmConfigured { text, .. }
            | OutboundKind::DetectionConfigured { text, .. }
            | OutboundKind::StreamConfigured { text, .. }
            | OutboundKind::IrcutConfigured { text, .. }
            | OutboundKind::SendText { text } => {
                self.for_each(&recipients, |to| self.messenger.send_text(to, &text))
                    .await
            }
        }
    }

    fn recipients(&self, message: Option<MessageRef>) -> Vec<Recipient> {
        match message {
            Some(message) => vec![Recipient {
                chat_id: message.chat_id,
                reply_to: Some(message.message_id),
            }],
            None => self
                .alert_chat_ids
                .iter()
                .map(|&chat_id| Recipient {
                    chat_id,
                    reply_to: None,
                })
                .collect(),
        }
    }

    /// Deliver to every recipient; report the last failure, if any.
    async fn for_each<F, Fut>(&self, recipients: &[Recipient], mut send: F) -> Result<(), CoreError>
    where
        F: FnMut(Recipient) -> Fut,
        Fut: Future<Output = Result<(), CoreError>>,
    {
        let mut failure = None;
        for &to in recipients {
            if let Err(e) = send(to).await {
                warn!(chat_id = to.chat_id, error = %e, "delivery failed");
                failure = Some(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    async fn chat_action(&self, to: Recipient, action: ChatAction) {
        if let Err(e) = self.messenger.send_chat_action(to.chat_id, action).await {
            debug!(chat_id = to.chat_id, %action, error = %e, "chat action failed");
        }
    }

    /// Run a media upload with bounded retry.
    async fn retry_upload<T, F, Fut>(&self, what: &str, to: Recipient, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    warn!(chat_id = to.chat_id, attempt, error = %e, "{what} failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(chat_id = to.chat_id, attempts = attempt, error = %e, "{what} failed permanently");
                    return Err(e);
                }
            }
        }
    }

    async fn send_image(
        &self,
        to: Recipient,
        img: &Bytes,
        resized: bool,
        filename: &str,
        caption: &str,
    ) -> Result<(), CoreError> {
        let messenger = &*self.messenger;
        if resized {
            self.chat_action(to, ChatAction::UploadPhoto).await;
            self.retry_upload("photo upload", to, move || {
                messenger.send_photo(to, img.clone(), caption)
            })
            .await
        } else {
            self.chat_action(to, ChatAction::UploadDocument).await;
            self.retry_upload("document upload", to, move || {
                messenger.send_document(to, img.clone(), filename, caption)
            })
            .await
        }
    }

    async fn send_video(&self, to: Recipient, path: &Path, caption: &str) -> Result<(), CoreError> {
        self.chat_action(to, ChatAction::UploadVideo).await;
        let mut attempt = 1;
        loop {
            let cached = self.video_ids.lock().await.get(path).cloned();
            let upload = match cached.as_deref() {
                Some(file_id) => VideoUpload::FileId(file_id),
                None => VideoUpload::File(path),
            };
            match self.messenger.send_video(to, upload, caption).await {
                Ok(file_id) => {
                    if let (None, Some(file_id)) = (cached, file_id) {
                        self.video_ids
                            .lock()
                            .await
                            .insert(path.to_path_buf(), file_id);
                    }
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    warn!(chat_id = to.chat_id, attempt, error = %e, "video upload failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(chat_id = to.chat_id, attempts = attempt, error = %e, "video upload failed permanently");
                    return Err(e);
                }
            }
        }
    }

    /// Drop the cached id and delete the delivered file.
    async fn forget_video(&self, path: &Path) {
        self.video_ids.lock().await.remove(path);
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove delivered video");
        }
    }
}

fn snapshot_filename(cam_id: &str, taken_at: DateTime<Local>) -> String {
    format!("{cam_id}_{}.jpg", taken_at.format("%Y-%m-%d_%H-%M-%S"))
}
