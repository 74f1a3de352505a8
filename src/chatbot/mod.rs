//! Chatbot module - relays Telegram messages to a text-completion API.

pub mod command;
pub mod conversation;
pub mod engine;
pub mod format;
pub mod message;
pub mod openai;
pub mod presence;
pub mod telegram;


pub use conversation::{ConversationMode, HistoryLog};
pub use engine::{RelayConfig, RelayEngine};
pub use message::IncomingMessage;
pub use telegram::{Gateway, TelegramClient};
