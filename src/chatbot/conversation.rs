//! Conversation memory prefixed onto prompts, and the interaction log.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// How exchanges are kept between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationMode {
    /// Only the most recent exchange is kept.
    Replace,
    /// Every exchange is appended until `/reset`.
    Accumulate,
}

impl ConversationMode {
    pub fn from_continuous(continuous: bool) -> Self {
        if continuous { Self::Accumulate } else { Self::Replace }
    }
}

/// Format one user/bot turn as it appears in the transcript.
pub fn format_exchange(user_label: &str, input: &str, bot_label: &str, answer: &str) -> String {
    format!("{user_label}: ###{input}###\n{bot_label}: ###{answer}###\n")
}

/// Per-chat transcript buffers.
///
/// Each chat has its own buffer; the lock is only held for a single read
/// or write, never across an upstream call.
pub struct ConversationStore {
    mode: ConversationMode,
    chats: Mutex<HashMap<i64, String>>,
}

impl ConversationStore {
    pub fn new(mode: ConversationMode) -> Self {
        Self {
            mode,
            chats: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> ConversationMode {
        self.mode
    }

    /// Current transcript for a chat (empty if none).
    pub async fn snapshot(&self, chat_id: i64) -> String {
        self.chats.lock().await.get(&chat_id).cloned().unwrap_or_default()
    }

    /// Store a formatted exchange according to the mode.
    pub async fn record(&self, chat_id: i64, exchange: &str) {
        let mut chats = self.chats.lock().await;
        let buffer = chats.entry(chat_id).or_default();
        match self.mode {
            ConversationMode::Replace => {
                buffer.clear();
                buffer.push_str(exchange);
            }
            ConversationMode::Accumulate => {
                buffer.push_str(exchange);
                buffer.push('\n');
            }
        }
        debug!("Conversation for chat {} is now {} bytes", chat_id, buffer.len());
    }

    pub async fn reset(&self, chat_id: i64) {
        self.chats.lock().await.remove(&chat_id);
    }
}

/// One line of `history.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub prompt: String,
    pub completion: String,
}

/// Append-only newline-delimited JSON log of successful turns.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<(), String> {
        let mut line = serde_json::to_string(record).map_err(|e| format!("Failed to serialize: {e}"))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("Failed to open {:?}: {e}", self.path))?;
        file.write_all(line.as_bytes())
            .map_err(|e| format!("Failed to write {:?}: {e}", self.path))
    }
}
