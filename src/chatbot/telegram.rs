//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatAction, InputFile, MessageId, ReplyParameters};
use tracing::{info, warn};

/// Chat action shown while a request is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Typing,
    UploadPhoto,
}

impl From<Presence> for ChatAction {
    fn from(presence: Presence) -> Self {
        match presence {
            Presence::Typing => ChatAction::Typing,
            Presence::UploadPhoto => ChatAction::UploadPhoto,
        }
    }
}

/// Outbound messaging operations used by the relay.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Returns the id of the sent message.
    async fn send_message(&self, chat_id: i64, text: &str, reply_to_message_id: Option<i64>) -> Result<i64, String>;

    /// Send a photo by URL. Returns the id of the sent message.
    async fn send_photo(&self, chat_id: i64, url: &str, reply_to_message_id: Option<i64>) -> Result<i64, String>;

    async fn send_chat_action(&self, chat_id: i64, presence: Presence) -> Result<(), String>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Register the command list shown in Telegram's command menu.
    pub async fn set_commands(&self, commands: &[(&str, &str)]) -> Result<(), String> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|(name, description)| BotCommand::new(*name, *description))
            .collect();
        info!("Registering {} commands", commands.len());

        self.bot.set_my_commands(commands).await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to set commands: {e}");
            warn!("{}", msg);
            msg
        })
    }
}

fn reply_parameters(reply_to_message_id: Option<i64>) -> Option<ReplyParameters> {
    reply_to_message_id.map(|id| ReplyParameters::new(MessageId(id as i32)))
}

#[async_trait]
impl Gateway for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str, reply_to_message_id: Option<i64>) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if let Some(reply_params) = reply_parameters(reply_to_message_id) {
            request = request.reply_parameters(reply_params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_photo(&self, chat_id: i64, url: &str, reply_to_message_id: Option<i64>) -> Result<i64, String> {
        info!("📷 Sending image to chat {}", chat_id);

        let url = reqwest::Url::parse(url).map_err(|e| {
            let msg = format!("Invalid image URL {url:?}: {e}");
            warn!("{}", msg);
            msg
        })?;

        let mut request = self.bot.send_photo(ChatId(chat_id), InputFile::url(url));

        if let Some(reply_params) = reply_parameters(reply_to_message_id) {
            request = request.reply_parameters(reply_params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send image: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_chat_action(&self, chat_id: i64, presence: Presence) -> Result<(), String> {
        self.bot
            .send_chat_action(ChatId(chat_id), presence.into())
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to send chat action: {e}"))
    }
}
