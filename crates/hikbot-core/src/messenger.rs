// ── Chat delivery seam ──
//
// The outbound dispatcher renders events through this trait. The binary
// implements it against the Telegram Bot API; tests record calls.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use strum::{Display, IntoStaticStr};

use crate::error::CoreError;

/// Status shown in the chat while a reply is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ChatAction {
    Typing,
    UploadPhoto,
    UploadVideo,
    UploadDocument,
}

/// A video either uploaded from disk or re-sent by a previously returned id.
#[derive(Debug, Clone, Copy)]
pub enum VideoUpload<'a> {
    File(&'a Path),
    FileId(&'a str),
}

/// Where a message goes and what it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub chat_id: i64,
    pub reply_to: Option<i64>,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, to: Recipient, text: &str) -> Result<(), CoreError>;

    async fn send_photo(&self, to: Recipient, photo: Bytes, caption: &str)
    -> Result<(), CoreError>;

    /// Send an image without recompression.
    async fn send_document(
        &self,
        to: Recipient,
        document: Bytes,
        filename: &str,
        caption: &str,
    ) -> Result<(), CoreError>;

    /// Send a video; returns the server-side file id when one is assigned.
    async fn send_video(
        &self,
        to: Recipient,
        video: VideoUpload<'_>,
        caption: &str,
    ) -> Result<Option<String>, CoreError>;

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), CoreError>;
}
