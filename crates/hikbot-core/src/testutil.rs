// Shared fakes for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hikbot_api::{AlertStream, CameraApi, ClientConfig, Detection, IrcutFilter, Resolution};
use secrecy::SecretString;
use url::Url;

use crate::config::{AlertConfig, CameraConfig, SnapshotConfig, VideoGifConfig};
use crate::error::CoreError;
use crate::events::MessageRef;
use crate::messenger::{ChatAction, Messenger, Recipient, VideoUpload};
use crate::notifier::AlarmNotifier;
use crate::queue::ResultQueue;
use crate::videogif::VideoGifRecorder;

pub(crate) fn camera_config() -> CameraConfig {
    CameraConfig {
        id: "cam_1".into(),
        description: "Front door".into(),
        api: ClientConfig::new(
            Url::parse("http://192.168.1.64").expect("url"),
            "admin",
            SecretString::from("secret".to_string()),
        ),
        rtsp_port: 554,
        stream_timeout: Duration::from_secs(300),
        snapshot: SnapshotConfig::default(),
        alert: AlertConfig::default(),
        video_gif: VideoGifConfig::default(),
        livestreams: Vec::new(),
    }
}

pub(crate) fn message() -> MessageRef {
    MessageRef {
        chat_id: 100,
        message_id: 42,
        user_id: 7,
    }
}

pub(crate) fn notifier(
    cam: &CameraConfig,
    api: Arc<dyn CameraApi>,
    queue: &ResultQueue,
) -> Arc<AlarmNotifier> {
    let recorder = Arc::new(VideoGifRecorder::new(cam, queue.clone()));
    Arc::new(AlarmNotifier::new(cam, api, queue.clone(), recorder))
}

/// Scripted camera.
///
/// Every alert stream replays `script` (delay before each chunk, chunk)
/// and then either stays open forever or ends, per `end_stream`.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub script: Vec<(Duration, String)>,
    pub end_stream: bool,
    /// Never answer `alert_stream`.
    pub hang_open: bool,
    pub fail_switch: bool,
    pub fail_snapshot: bool,
    pub already: Option<String>,
    pub alert_streams: AtomicUsize,
    pub snapshots: AtomicUsize,
    pub switches: Mutex<Vec<(Detection, bool)>>,
    pub resizes: Mutex<Vec<Option<Resolution>>>,
    pub ircut: Mutex<Vec<IrcutFilter>>,
}

impl FakeApi {
    pub(crate) fn with_script<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = (Duration, S)>,
        S: Into<String>,
    {
        Self {
            script: chunks.into_iter().map(|(d, c)| (d, c.into())).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing_snapshots() -> Self {
        Self {
            fail_snapshot: true,
            ..Self::default()
        }
    }

    pub(crate) fn switch_calls(&self) -> Vec<(Detection, bool)> {
        self.switches.lock().expect("lock").clone()
    }

    pub(crate) fn last_resize(&self) -> Option<Option<Resolution>> {
        self.resizes.lock().expect("lock").last().copied()
    }
}

fn camera_error(status: u16) -> hikbot_api::Error {
    hikbot_api::Error::BadStatus {
        status,
        url: "http://192.168.1.64/ISAPI".into(),
        body: String::new(),
    }
}

#[async_trait]
impl CameraApi for FakeApi {
    async fn take_snapshot(
        &self,
        _channel: u32,
        resize: Option<Resolution>,
    ) -> Result<Bytes, hikbot_api::Error> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.resizes.lock().expect("lock").push(resize);
        if self.fail_snapshot {
            return Err(camera_error(500));
        }
        Ok(Bytes::from_static(b"\xFF\xD8jpeg"))
    }

    async fn alert_stream(&self) -> Result<AlertStream, hikbot_api::Error> {
        self.alert_streams.fetch_add(1, Ordering::SeqCst);
        if self.hang_open {
            futures_util::future::pending::<()>().await;
        }
        let script = self.script.clone();
        let end_stream = self.end_stream;
        Ok(Box::pin(async_stream::stream! {
            for (delay, chunk) in script {
                tokio::time::sleep(delay).await;
                yield Ok::<_, hikbot_api::Error>(chunk);
            }
            if !end_stream {
                futures_util::future::pending::<()>().await;
            }
        }))
    }

    async fn switch(
        &self,
        detection: Detection,
        state: bool,
    ) -> Result<Option<String>, hikbot_api::Error> {
        self.switches.lock().expect("lock").push((detection, state));
        if self.fail_switch {
            return Err(camera_error(403));
        }
        Ok(self.already.clone())
    }

    async fn set_ircut_filter(&self, filter: IrcutFilter) -> Result<(), hikbot_api::Error> {
        self.ircut.lock().expect("lock").push(filter);
        Ok(())
    }
}

// ── Messenger ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Text {
        chat_id: i64,
        reply_to: Option<i64>,
        text: String,
    },
    Photo {
        chat_id: i64,
        caption: String,
    },
    Document {
        chat_id: i64,
        reply_to: Option<i64>,
    },
    Video {
        chat_id: i64,
        by_id: bool,
    },
}

/// Records successful deliveries; fails on request.
#[derive(Default)]
pub(crate) struct RecordingMessenger {
    /// Every call to this chat fails.
    pub fail_chat: Option<i64>,
    /// The first `n` media uploads fail.
    pub fail_media: u32,
    pub media_calls: std::sync::atomic::AtomicU32,
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingMessenger {
    pub(crate) fn failing_media(n: u32) -> Self {
        Self {
            fail_media: n,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("lock").clone()
    }

    pub(crate) fn media_attempts(&self) -> u32 {
        self.media_calls.load(Ordering::SeqCst)
    }

    fn check(&self, chat_id: i64, media: bool) -> Result<(), CoreError> {
        if self.fail_chat == Some(chat_id) {
            return Err(CoreError::Messenger {
                message: format!("chat {chat_id} blocked the bot"),
            });
        }
        if media && self.media_calls.fetch_add(1, Ordering::SeqCst) < self.fail_media {
            return Err(CoreError::Messenger {
                message: "upload failed".into(),
            });
        }
        Ok(())
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().expect("lock").push(sent);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), CoreError> {
        self.check(to.chat_id, false)?;
        self.record(Sent::Text {
            chat_id: to.chat_id,
            reply_to: to.reply_to,
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn send_photo(&self, to: Recipient, _photo: Bytes, caption: &str) -> Result<(), CoreError> {
        self.check(to.chat_id, true)?;
        self.record(Sent::Photo {
            chat_id: to.chat_id,
            caption: caption.to_owned(),
        });
        Ok(())
    }

    async fn send_document(
        &self,
        to: Recipient,
        _document: Bytes,
        _filename: &str,
        _caption: &str,
    ) -> Result<(), CoreError> {
        self.check(to.chat_id, true)?;
        self.record(Sent::Document {
            chat_id: to.chat_id,
            reply_to: to.reply_to,
        });
        Ok(())
    }

    async fn send_video(
        &self,
        to: Recipient,
        video: VideoUpload<'_>,
        _caption: &str,
    ) -> Result<Option<String>, CoreError> {
        self.check(to.chat_id, true)?;
        let by_id = matches!(video, VideoUpload::FileId(_));
        self.record(Sent::Video {
            chat_id: to.chat_id,
            by_id,
        });
        Ok((!by_id).then(|| format!("file-{}", to.chat_id)))
    }

    async fn send_chat_action(&self, _chat_id: i64, _action: ChatAction) -> Result<(), CoreError> {
        Ok(())
    }
}
