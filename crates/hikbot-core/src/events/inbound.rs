use std::sync::Arc;

use hikbot_api::{Detection, IrcutFilter};
use strum::IntoStaticStr;

use super::MessageRef;
use crate::camera::Camera;
use crate::config::StreamKind;

/// A user-requested action on one camera.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub cam: Arc<Camera>,
    pub message: MessageRef,
    pub kind: InboundKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum InboundKind {
    TakeSnapshot { resize: bool },
    RecordVideoGif { rewind: bool },
    ConfigureAlarm { state: bool },
    ConfigureDetection { detection: Detection, state: bool },
    ConfigureStream { stream: StreamKind, state: bool },
    ConfigureIrcutFilter { filter: IrcutFilter },
    CameraStatus,
}

impl InboundKind {
    pub fn name(self) -> &'static str {
        self.into()
    }
}
