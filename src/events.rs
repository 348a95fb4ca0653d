//! Disc notifications for the host application

use crate::track_set::SharedDiscTrackSet;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

type SubscriptionId = u64;

/// Events raised about a disc's track set
#[derive(Debug, Clone)]
pub enum DiscEvent {
    /// Raised once, after every field of every track has been written
    MetadataRetrieved {
        set: SharedDiscTrackSet,
        success: bool,
    },
}

struct Subscription {
    tx: tokio_mpsc::UnboundedSender<DiscEvent>,
}

/// Handle for raising and subscribing to disc events
#[derive(Clone, Default)]
pub struct DiscEventHandle {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl DiscEventHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all disc events
    /// Subscription is automatically removed when receiver is dropped
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<DiscEvent> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subscriptions
            .lock()
            .unwrap()
            .insert(id, Subscription { tx });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Deliver an event to every live subscriber
    pub fn emit(&self, event: DiscEvent) {
        let mut subs = self.subscriptions.lock().unwrap();
        let mut to_remove = Vec::new();

        for (id, subscription) in subs.iter() {
            // If send fails, receiver was dropped - mark for removal
            if subscription.tx.send(event.clone()).is_err() {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            debug!("Dropping closed disc event subscription {}", id);
            subs.remove(&id);
        }
    }
}
