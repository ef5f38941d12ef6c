// Update loop
//
// Pulls messages from Telegram, drops those from users outside the allow
// list, and hands camera commands to the inbound dispatcher on their own
// task so a slow camera never stalls polling.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use hikbot_core::{CameraHub, InboundEvent, InboundEventDispatcher, MessageRef, Messenger, Recipient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, BotCommand};
use crate::telegram::{Message, TelegramClient};

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct Bot {
    hub: Arc<CameraHub>,
    telegram: Arc<TelegramClient>,
    inbound: Arc<InboundEventDispatcher>,
    allowed_user_ids: HashSet<i64>,
}

impl Bot {
    pub fn new(
        hub: Arc<CameraHub>,
        telegram: Arc<TelegramClient>,
        inbound: Arc<InboundEventDispatcher>,
        allowed_user_ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            hub,
            telegram,
            inbound,
            allowed_user_ids: allowed_user_ids.into_iter().collect(),
        }
    }

    /// Poll until `cancel` fires. Polling errors are logged and retried.
    pub async fn poll(self, cancel: CancellationToken) {
        let mut offset = None;
        info!("polling for updates");
        loop {
            let updates = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                res = self.telegram.get_updates(offset) => res,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if let Some(message) = update.message {
                            self.handle_message(message).await;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to fetch updates, retrying");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }
        info!("update polling stopped");
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return;
        };
        if !self.allowed_user_ids.contains(&user_id) {
            warn!(user = user_id, chat = message.chat.id, "ignoring message from unknown user");
            return;
        }
        let Some(command) = commands::parse(text) else {
            debug!(user = user_id, "ignoring non-command message");
            return;
        };

        let msg = MessageRef {
            chat_id: message.chat.id,
            message_id: message.message_id,
            user_id,
        };
        debug!(user = user_id, ?command, "received command");
        match command {
            BotCommand::Help => self.reply(msg, commands::HELP).await,
            BotCommand::ListCams => self.reply(msg, &commands::camera_list(&self.hub)).await,
            BotCommand::Camera { cam_id, kind } => match self.hub.get(&cam_id) {
                Ok(cam) => {
                    let event = InboundEvent {
                        cam: Arc::clone(cam),
                        message: msg,
                        kind,
                    };
                    let inbound = Arc::clone(&self.inbound);
                    tokio::spawn(async move { inbound.dispatch(event).await });
                }
                Err(e) => self.reply(msg, &e.to_string()).await,
            },
        }
    }

    async fn reply(&self, msg: MessageRef, text: &str) {
        let to = Recipient {
            chat_id: msg.chat_id,
            reply_to: Some(msg.message_id),
        };
        if let Err(e) = self.telegram.send_text(to, text).await {
            warn!(chat = msg.chat_id, error = %e, "failed to send reply");
        }
    }
}
