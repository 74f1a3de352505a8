//! Telegram relay to an OpenAI-compatible text-completion API.

pub mod chatbot;
pub mod config;
pub mod telegram_log;
pub mod translations;
pub mod user_config;
