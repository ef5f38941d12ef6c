use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Local};
use hikbot_api::{Detection, IrcutFilter};
use strum::IntoStaticStr;

use super::MessageRef;
use crate::config::StreamKind;

/// A result to render to chat.
///
/// `message` is `None` for alert-triggered events, which are broadcast to
/// every alert subscriber instead of answering a command.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub cam_id: String,
    pub cam_description: String,
    pub message: Option<MessageRef>,
    pub kind: OutboundKind,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        (&self.kind).into()
    }
}

#[derive(Debug, Clone, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OutboundKind {
    Snapshot {
        img: Bytes,
        taken_at: DateTime<Local>,
        resized: bool,
        /// Per-camera snapshot number.
        counter: u64,
    },
    AlertSnapshot {
        img: Bytes,
        taken_at: DateTime<Local>,
        detection: Detection,
        alert_count: u64,
        resized: bool,
    },
    VideoGif {
        path: PathBuf,
        /// Set when the recording was triggered by an alert.
        detection: Option<Detection>,
    },
    AlarmConfigured {
        state: bool,
        text: String,
    },
    DetectionConfigured {
        detection: Detection,
        state: bool,
        text: String,
    },
    StreamConfigured {
        stream: StreamKind,
        state: bool,
        text: String,
    },
    IrcutConfigured {
        filter: IrcutFilter,
        text: String,
    },
    SendText {
        text: String,
    },
}
