// THEORY:
// The `SnapshotBus` is how published state leaves the pipeline. There is exactly
// one writer (the ticking driver) and any number of readers (render sessions).
//
// Each channel has two outlets:
// - a `watch` slot that always holds the latest snapshot. Publishing replaces the
//   `Arc` in one step, so a reader sees either the old snapshot or the new one,
//   never a mix. New sessions read it to paint immediately.
// - a shared `broadcast` stream of every publication, which live sessions follow.
//   A slow reader that lags simply skips ahead; the writer never waits.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Index of a channel within the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ChannelId(pub usize);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An encoded snapshot as published for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedSnapshot {
    pub channel: ChannelId,
    /// The channel's tick number. Strictly increasing per channel.
    pub tick: u64,
    /// Snapshot transport payload.
    pub payload: Arc<str>,
}

pub type Slot = Option<Arc<PublishedSnapshot>>;

#[derive(Clone)]
pub struct SnapshotBus {
    slots: Arc<[watch::Sender<Slot>]>,
    updates_tx: broadcast::Sender<Arc<PublishedSnapshot>>,
}

impl SnapshotBus {
    pub fn new(channels: usize, capacity: usize) -> Self {
        let slots = (0..channels)
            .map(|_| watch::channel::<Slot>(None).0)
            .collect::<Vec<_>>()
            .into();
        let (updates_tx, _) = broadcast::channel(capacity.max(1));
        Self { slots, updates_tx }
    }

    pub fn channel_count(&self) -> usize {
        self.slots.len()
    }

    /// Replaces the channel's latest snapshot and announces it to live readers.
    /// Returns `false` if the channel does not exist.
    pub fn publish(&self, snapshot: PublishedSnapshot) -> bool {
        let Some(slot) = self.slots.get(snapshot.channel.0) else {
            return false;
        };
        let snapshot = Arc::new(snapshot);
        slot.send_replace(Some(snapshot.clone()));
        // No live readers is fine; the slot still holds the value.
        let _ = self.updates_tx.send(snapshot);
        true
    }

    pub fn latest(&self, channel: ChannelId) -> Slot {
        self.slots.get(channel.0).and_then(|slot| slot.borrow().clone())
    }

    pub fn watch(&self, channel: ChannelId) -> Option<watch::Receiver<Slot>> {
        self.slots.get(channel.0).map(watch::Sender::subscribe)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PublishedSnapshot>> {
        self.updates_tx.subscribe()
    }
}
