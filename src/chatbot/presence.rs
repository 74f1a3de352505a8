//! Repeating chat action ("typing…", "sending photo…") while a request runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chatbot::telegram::{Gateway, Presence};

/// Telegram shows a chat action for about five seconds.
pub const PRESENCE_INTERVAL: Duration = Duration::from_secs(3);

/// Keeps a chat action alive until stopped or dropped.
pub struct PresenceIndicator {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PresenceIndicator {
    /// Send `presence` to `chat_id` now and then every `interval`.
    pub fn start(gateway: Arc<dyn Gateway>, chat_id: i64, presence: Presence, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    result = gateway.send_chat_action(chat_id, presence) => {
                        if let Err(e) = result {
                            debug!("Presence update failed: {}", e);
                        }
                    }
                }
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Cancel and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for PresenceIndicator {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
