//! Info/error notification stream.
//!
//! Every component publishes human-readable status lines here. Consumers
//! subscribe and receive a [`broadcast`] stream of [`Notification`] values;
//! publishing never blocks and never fails, even with no subscribers.
//! Each notification is also mirrored to the `log` facade.

use std::fmt::{Display, Formatter, Result as FormatResult};

use log::{error, info};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// `log` target of the mirrored notifications, so a front end that already
/// shows the stream can filter them out of its console output.
pub const LOG_TARGET: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Display for Notification {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self.kind {
            NotificationKind::Info => write!(f, "[info] {}", self.message),
            NotificationKind::Error => write!(f, "[error] {}", self.message),
        }
    }
}

/// Producer handle for the notification stream.
///
/// Cheap to clone; all clones feed the same stream.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Slow subscribers that fall more than `capacity` messages behind
    /// observe a `Lagged` error and skip ahead.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target: LOG_TARGET, "{message}");
        self.publish(NotificationKind::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(target: LOG_TARGET, "{message}");
        self.publish(NotificationKind::Error, message);
    }

    fn publish(&self, kind: NotificationKind, message: String) {
        // No subscribers is not an error
        let _ = self.tx.send(Notification { kind, message });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
