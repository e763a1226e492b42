//! Prints the notification stream to the terminal.

use control_core::Notification;

use std::time::Duration;

use log::warn;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long [`NotificationPrinter::finish`] waits for queued notifications.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Background task writing every notification to stderr as `[info] ...` /
/// `[error] ...`.
pub struct NotificationPrinter {
    handle: JoinHandle<()>,
}

impl NotificationPrinter {
    pub fn spawn(mut rx: Receiver<Notification>) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => eprintln!("{notification}"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Notification printer fell behind, skipped {skipped} messages");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { handle }
    }

    /// Wait briefly for the stream to close so trailing notifications are
    /// printed, then stop.
    ///
    /// The stream closes once every `Notifier` clone is dropped; drop the
    /// manager before calling this.
    pub async fn finish(self) {
        let abort = self.handle.abort_handle();
        if timeout(DRAIN_TIMEOUT, self.handle).await.is_err() {
            abort.abort();
        }
    }
}
