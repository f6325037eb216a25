//! Reload subscriber registry.
//!
//! # Responsibilities
//! - Hand out [`ReloadSubscription`]s to components that react to reloads
//! - Deliver one [`ReloadNotice`] per successful reload to every subscriber
//!
//! # Design Decisions
//! - Each subscriber owns a single-slot watch channel: a send never waits,
//!   and a subscriber that falls behind holds only the newest notice, so an
//!   idle subscriber costs one snapshot no matter how many reloads happen
//! - The registry is an `ArcSwap`ed list updated with RCU; no lock is held
//!   while delivering
//! - Dropping a subscription closes its channel; the slot is pruned on the
//!   next delivery

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::config::schema::CanonicalConfig;

/// Sent to every subscriber after a successful reload.
#[derive(Debug, Clone)]
pub struct ReloadNotice {
    /// Monotonic count of published snapshots.
    pub generation: u64,
    pub config: Arc<CanonicalConfig>,
}

#[derive(Clone)]
struct Slot {
    id: u64,
    tx: Arc<watch::Sender<Option<ReloadNotice>>>,
}

/// Receiving end of a reload subscription.
#[derive(Debug)]
pub struct ReloadSubscription {
    id: u64,
    rx: watch::Receiver<Option<ReloadNotice>>,
}

impl ReloadSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next reload. Returns `None` once the registry is gone.
    ///
    /// Reloads that happened since the last call collapse into the newest.
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<ReloadNotice> {
        self.rx.changed().await.ok()?;
        (*self.rx.borrow_and_update()).clone()
    }

    /// Take a pending notice without waiting.
    pub fn try_recv(&mut self) -> Option<ReloadNotice> {
        if !self.rx.has_changed().unwrap_or(false) {
            return None;
        }
        (*self.rx.borrow_and_update()).clone()
    }
}

/// Append-only set of reload subscribers.
pub struct SubscriberRegistry {
    slots: ArcSwap<Vec<Slot>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            slots: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> ReloadSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let slot = Slot { id, tx: Arc::new(tx) };

        self.slots.rcu(|slots| {
            let mut next = Vec::clone(slots);
            next.push(slot.clone());
            next
        });

        tracing::debug!(subscriber = id, "Reload subscriber registered");
        ReloadSubscription { id, rx }
    }

    /// Deliver `notice` to every live subscriber. Returns how many received it.
    pub fn deliver(&self, notice: &ReloadNotice) -> usize {
        let slots = self.slots.load();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for slot in slots.iter() {
            match slot.tx.send(Some(notice.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(slot.id),
            }
        }

        if !closed.is_empty() {
            self.slots.rcu(|slots| {
                slots
                    .iter()
                    .filter(|slot| !closed.contains(&slot.id))
                    .cloned()
                    .collect::<Vec<_>>()
            });
            tracing::debug!(pruned = closed.len(), "Dropped closed reload subscribers");
        }

        delivered
    }

    /// Number of registered (not yet pruned) subscribers.
    pub fn len(&self) -> usize {
        self.slots.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
