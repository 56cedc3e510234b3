//! Fan-out of `"status-update"` notifications.
//!
//! Subscribers get a plain `mpsc::Receiver`; dropped receivers are pruned on
//! the next publish.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Event name UI collaborators listen on.
pub const STATUS_UPDATE: &str = "status-update";

/// Who changed the pause state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A control surface call (UI, tray, console).
    User,
    /// The engine itself, e.g. after the OS revoked input permission.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub paused: bool,
    pub origin: Origin,
}

impl StatusUpdate {
    pub fn event_name(&self) -> &'static str {
        STATUS_UPDATE
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<StatusUpdate>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StatusUpdate> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Delivers `update` to every live subscriber. Never blocks.
    pub fn publish(&self, update: StatusUpdate) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(update).is_ok());
        log::debug!(
            "{STATUS_UPDATE}: paused={} origin={:?} ({} subscribers)",
            update.paused,
            update.origin,
            subscribers.len()
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
