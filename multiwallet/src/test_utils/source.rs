use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Result, WalletError};
use crate::event_bus::{EventBus, EventReceiver};
use crate::relay::{NotificationSource, WalletNotification};
use crate::types::WalletId;

/// Notification source driven by the test through [`MockNotificationSource::emit`].
pub struct MockNotificationSource {
    bus: EventBus<WalletNotification>,
    refuse: AtomicBool,
    subscriptions: AtomicUsize,
}

impl Default for MockNotificationSource {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockNotificationSource {
    pub fn new(capacity: usize) -> Self {
        Self {
            bus: EventBus::new(capacity),
            refuse: AtomicBool::new(false),
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Refuse further subscriptions.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn emit(&self, notification: WalletNotification) {
        self.bus.emit(&[notification]);
    }

    /// Receivers currently attached.
    pub fn listener_count(&self) -> usize {
        self.bus.receiver_count()
    }

    /// Subscriptions handed out so far.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl NotificationSource for MockNotificationSource {
    fn subscribe(&self, wallet_id: WalletId) -> Result<EventReceiver<WalletNotification>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(WalletError::BackendFailure(format!(
                "notification listener for wallet {} rejected",
                wallet_id
            )));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(self.bus.subscribe())
    }
}
