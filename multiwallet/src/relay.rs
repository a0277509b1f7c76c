//! Notification relay.
//!
//! Pages register a listener per page id. Each listener consumes backend
//! notifications for one wallet, runs exactly one registry refresh per
//! relevant notification on a separate task and broadcasts [`ViewEvent`]s for
//! the presentation layer to re-render from.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::event_bus::{self, EventBus, EventReceiver};
use crate::registry::AccountRegistry;
use crate::types::WalletId;

/// Notifications emitted by the backend wallet engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletNotification {
    NewTransaction {
        wallet_id: WalletId,
        txid: String,
    },
    BlockAttached {
        wallet_id: WalletId,
        height: i32,
    },
    MixerStarted {
        wallet_id: WalletId,
    },
    MixerEnded {
        wallet_id: WalletId,
    },
}

impl WalletNotification {
    pub fn wallet_id(&self) -> WalletId {
        match self {
            WalletNotification::NewTransaction {
                wallet_id,
                ..
            }
            | WalletNotification::BlockAttached {
                wallet_id,
                ..
            }
            | WalletNotification::MixerStarted {
                wallet_id,
            }
            | WalletNotification::MixerEnded {
                wallet_id,
            } => *wallet_id,
        }
    }
}

/// Change events drained by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewEvent {
    AccountsRefreshed {
        wallet_id: WalletId,
    },
    TransactionsChanged {
        wallet_id: WalletId,
    },
    MixerStateChanged {
        wallet_id: WalletId,
        running: bool,
    },
    RefreshFailed {
        wallet_id: WalletId,
        reason: String,
    },
}

/// Backend side handing out notification streams.
pub trait NotificationSource: Send + Sync {
    fn subscribe(&self, wallet_id: WalletId) -> Result<EventReceiver<WalletNotification>>;
}

struct ListenerSlot {
    generation: u64,
    token: CancellationToken,
}

type ListenerMap = Arc<Mutex<HashMap<String, ListenerSlot>>>;

/// Routes backend notifications to registry refreshes and view events.
pub struct NotificationRelay {
    registry: Arc<AccountRegistry>,
    views: EventBus<ViewEvent>,
    listeners: ListenerMap,
    next_generation: AtomicU64,
}

impl NotificationRelay {
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        let views = EventBus::new(registry.config().event_capacity);
        Self {
            registry,
            views,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Stream of change events for the presentation layer.
    pub fn subscribe_views(&self) -> EventReceiver<ViewEvent> {
        self.views.subscribe()
    }

    /// Start listening to `wallet_id`'s notifications on behalf of `page_id`.
    ///
    /// Returns `None` without doing anything if `page_id` already has a
    /// listener. A source that refuses the subscription is logged and also
    /// yields `None`; the page keeps working without live updates.
    pub async fn register(
        &self,
        page_id: impl Into<String>,
        wallet_id: WalletId,
        source: &dyn NotificationSource,
    ) -> Option<Subscription> {
        let page_id = page_id.into();
        let mut listeners = self.listeners.lock().await;
        if listeners.contains_key(&page_id) {
            tracing::debug!("Listener {} already registered", page_id);
            return None;
        }

        let receiver = match source.subscribe(wallet_id) {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::error!("Error adding notification listener {}: {}", page_id, e);
                return None;
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        listeners.insert(
            page_id.clone(),
            ListenerSlot {
                generation,
                token: token.clone(),
            },
        );
        drop(listeners);

        let mixer_completed = Arc::new(AtomicBool::new(false));
        let listener = Listener {
            page_id: page_id.clone(),
            generation,
            wallet_id,
            token: token.clone(),
            registry: self.registry.clone(),
            views: self.views.clone(),
            listeners: self.listeners.clone(),
            mixer_completed: mixer_completed.clone(),
        };
        let task = tokio::spawn(listener.run(receiver));

        tracing::debug!("Listener {} registered for wallet {}", page_id, wallet_id);
        Some(Subscription {
            page_id,
            generation,
            token,
            listeners: self.listeners.clone(),
            mixer_completed,
            task: Some(task),
        })
    }

    /// Stop the listener registered under `page_id`, if any.
    pub async fn deregister(&self, page_id: &str) -> bool {
        match self.listeners.lock().await.remove(page_id) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_registered(&self, page_id: &str) -> bool {
        self.listeners.lock().await.contains_key(page_id)
    }
}

/// Handle of a running listener. Dropping or closing it stops the listener.
///
/// Both free the page id before returning, so it can be registered again
/// right away. If the listener map is busy at drop time the listener task
/// frees it once it has stopped.
pub struct Subscription {
    page_id: String,
    generation: u64,
    token: CancellationToken,
    listeners: ListenerMap,
    mixer_completed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Whether the mixer finished since the last call; resets the flag.
    pub fn take_mixer_completed(&self) -> bool {
        self.mixer_completed.swap(false, Ordering::AcqRel)
    }

    /// Cancel the listener and wait until it has stopped.
    pub async fn close(mut self) {
        self.token.cancel();
        release(&mut *self.listeners.lock().await, &self.page_id, self.generation);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Listener {} ended abnormally: {}", self.page_id, e);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
        if let Ok(mut listeners) = self.listeners.try_lock() {
            release(&mut listeners, &self.page_id, self.generation);
        }
    }
}

/// Remove `page_id`'s slot unless it was taken over by a newer registration.
fn release(listeners: &mut HashMap<String, ListenerSlot>, page_id: &str, generation: u64) {
    if listeners.get(page_id).is_some_and(|slot| slot.generation == generation) {
        listeners.remove(page_id);
    }
}

struct Listener {
    page_id: String,
    generation: u64,
    wallet_id: WalletId,
    token: CancellationToken,
    registry: Arc<AccountRegistry>,
    views: EventBus<ViewEvent>,
    listeners: ListenerMap,
    mixer_completed: Arc<AtomicBool>,
}

impl Listener {
    async fn run(self, mut receiver: EventReceiver<WalletNotification>) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(notification) => self.dispatch(notification),
                    Err(event_bus::Error::Lagged(n)) => {
                        tracing::warn!("Listener {} missed {} notifications, resyncing", self.page_id, n);
                        self.spawn_refresh(RefreshKind::Resync);
                    }
                    Err(event_bus::Error::Closed) => {
                        tracing::debug!("Notification source of {} closed", self.page_id);
                        break;
                    }
                },
            }
        }

        drop(receiver);
        release(&mut *self.listeners.lock().await, &self.page_id, self.generation);
        tracing::debug!("Listener {} stopped", self.page_id);
    }

    fn dispatch(&self, notification: WalletNotification) {
        if notification.wallet_id() != self.wallet_id {
            return;
        }

        match notification {
            WalletNotification::NewTransaction {
                txid,
                ..
            } => {
                tracing::debug!("New transaction {} in wallet {}", txid, self.wallet_id);
                self.spawn_refresh(RefreshKind::Transaction);
            }
            WalletNotification::MixerStarted {
                ..
            } => self.spawn_refresh(RefreshKind::Mixer),
            WalletNotification::MixerEnded {
                ..
            } => {
                self.mixer_completed.store(true, Ordering::Release);
                self.spawn_refresh(RefreshKind::Mixer);
            }
            WalletNotification::BlockAttached {
                ..
            } => {}
        }
    }

    /// Run one refresh off the delivery path; it is abandoned if the listener stops.
    fn spawn_refresh(&self, kind: RefreshKind) {
        let wallet_id = self.wallet_id;
        let registry = self.registry.clone();
        let views = self.views.clone();
        let token = self.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                events = refresh(registry, wallet_id, kind) => views.emit(&events),
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshKind {
    Transaction,
    Mixer,
    Resync,
}

async fn refresh(
    registry: Arc<AccountRegistry>,
    wallet_id: WalletId,
    kind: RefreshKind,
) -> Vec<ViewEvent> {
    if let Err(e) = registry.refresh(wallet_id).await {
        return vec![ViewEvent::RefreshFailed {
            wallet_id,
            reason: e.to_string(),
        }];
    }

    let mut events = vec![ViewEvent::AccountsRefreshed {
        wallet_id,
    }];
    match kind {
        RefreshKind::Transaction | RefreshKind::Resync => {
            events.push(ViewEvent::TransactionsChanged {
                wallet_id,
            });
        }
        RefreshKind::Mixer => match registry.is_mixer_active(wallet_id).await {
            Ok(running) => events.push(ViewEvent::MixerStateChanged {
                wallet_id,
                running,
            }),
            Err(e) => events.push(ViewEvent::RefreshFailed {
                wallet_id,
                reason: e.to_string(),
            }),
        },
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wallet_id() {
        let n = WalletNotification::NewTransaction {
            wallet_id: 4,
            txid: "ab".to_string(),
        };
        assert_eq!(n.wallet_id(), 4);
        assert_eq!(
            WalletNotification::MixerEnded {
                wallet_id: 9
            }
            .wallet_id(),
            9
        );
    }
}
