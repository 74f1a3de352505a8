//! Tracing layer forwarding warnings and errors to an operator chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram rejects messages over 4096 characters.
const MAX_MESSAGE_CHARS: usize = 4000;

/// Events arriving this close together are sent as one message.
const COALESCE_WINDOW: Duration = Duration::from_secs(2);

pub struct OperatorLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl OperatorLogLayer {
    /// Must be called from within a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                let deadline = tokio::time::sleep(COALESCE_WINDOW);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        next = rx.recv() => match next {
                            Some(line) => batch.push(line),
                            None => break,
                        },
                    }
                }
                let text = truncate(&batch.join("\n"));
                if let Err(e) = bot.send_message(chat_id, text).await {
                    eprintln!("Failed to send log to Telegram: {e}");
                }
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

/// Operator-facing line for an event, or `None` below WARN.
fn render(level: Level, target: &str, message: &str) -> Option<String> {
    let prefix = match level {
        Level::ERROR => "❌",
        Level::WARN => "⚠️",
        _ => return None,
    };
    Some(format!("{prefix} [{target}] {message}"))
}

impl<S: Subscriber> Layer<S> for OperatorLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // teloxide logs its own send failures; forwarding them would loop
        if metadata.target().starts_with("teloxide") {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(line) = render(*metadata.level(), metadata.target(), &visitor.message)
            && self.tx.send(line).is_err()
        {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_levels() {
        assert_eq!(
            render(Level::ERROR, "chatrelay::chatbot::engine", "Completion failed"),
            Some("❌ [chatrelay::chatbot::engine] Completion failed".to_string())
        );
        assert!(render(Level::WARN, "x", "y").unwrap().starts_with("⚠️"));
        assert_eq!(render(Level::INFO, "x", "y"), None);
        assert_eq!(render(Level::DEBUG, "x", "y"), None);
    }

    #[test]
    fn test_truncate() {
        let long = "é".repeat(MAX_MESSAGE_CHARS + 10);
        let out = truncate(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS + 3);
        assert_eq!(truncate("short"), "short");
    }
}
