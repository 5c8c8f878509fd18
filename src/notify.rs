//! Outbound user notifications and focus-state broadcasts.

use log::warn;
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::models::FocusModeConfig;
use crate::safe_lock;
use crate::store::{keys, PolicyStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Stable id; a newer notification with the same id replaces the older one.
    pub id: String,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(id: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Displays notifications to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Routes notifications to the notifier.
///
/// Focus transitions honor `showNotifications`. Usage alerts are always
/// delivered; break reminders and the daily summary have their own settings.
#[derive(Clone)]
pub struct Notifications {
    store: PolicyStore,
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    pub fn new(store: PolicyStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Send unless the user switched notifications off. Returns true if the
    /// notification was handed to the notifier.
    pub fn send(&self, notification: Notification) -> bool {
        let enabled = match self.store.get::<keys::SettingsKey>() {
            Ok(settings) => settings.show_notifications,
            Err(e) => {
                warn!("Could not read settings, sending notification anyway: {e}");
                true
            }
        };
        if enabled {
            self.notifier.notify(notification);
        }
        enabled
    }

    pub fn alert(&self, notification: Notification) {
        self.notifier.notify(notification);
    }
}

/// Best-effort fan-out of focus state to every live listener.
#[derive(Default)]
pub struct FocusBroadcaster {
    listeners: Mutex<Vec<Sender<FocusModeConfig>>>,
}

impl FocusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<FocusModeConfig> {
        let (tx, rx) = channel();
        safe_lock(&self.listeners, "Focus listeners").push(tx);
        rx
    }

    /// Returns the number of listeners reached. Zero listeners is fine.
    pub fn broadcast(&self, state: &FocusModeConfig) -> usize {
        let mut listeners = safe_lock(&self.listeners, "Focus listeners");
        listeners.retain(|tx| tx.send(state.clone()).is_ok());
        listeners.len()
    }
}
