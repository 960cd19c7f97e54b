//! Per-key watch delivery: registering a watch on a key sets the
//! key's `HasWatch` flag and parks a bounded, drop-on-overflow channel for
//! it. A commit that touches the key notifies every registered watcher with
//! a best-effort, non-blocking send.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use vkv_bytes::Slice;

/// Handle returned to a caller of `watch(txn, key)`. Resolves (by polling
/// `try_recv`, mirroring the core's synchronous, non-blocking contract) once
/// the key changes, or stays pending until dropped.
pub struct WatchHandle {
    rx: Receiver<()>,
}

impl WatchHandle {
    /// Non-blocking poll: `true` once the watched key has changed.
    pub fn is_ready(&self) -> bool {
        matches!(self.rx.try_recv(), Ok(()) | Err(std::sync::mpsc::TryRecvError::Disconnected))
    }
}

#[derive(Default)]
pub struct WatchRegistry {
    watchers: HashMap<Slice, Vec<SyncSender<()>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self { watchers: HashMap::new() }
    }

    pub fn register(&mut self, key: &[u8], queue_depth: usize) -> WatchHandle {
        let (tx, rx) = sync_channel(queue_depth);
        self.watchers.entry(Slice::from(key)).or_default().push(tx);
        WatchHandle { rx }
    }

    /// Whether any watcher is currently registered on `key`; mirrors the
    /// `HasWatch` flag's lifecycle.
    pub fn has_watchers(&self, key: &[u8]) -> bool {
        self.watchers.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Best-effort notify: a full queue silently drops the notification for
    /// that watcher rather than blocking the commit.
    pub fn notify(&mut self, key: &[u8]) {
        if let Some(list) = self.watchers.remove(key) {
            for tx in list {
                let _ = tx.try_send(());
            }
        }
    }

    /// Drop every watcher registered on keys the collector is about to
    /// reclaim, waking each one first (the key is going away, which counts
    /// as a change). Called during the collector's mark pass so `HasWatch`
    /// flags on reclaimed keys don't linger.
    pub fn retire(&mut self, key: &[u8]) {
        self.notify(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_wakes_registered_watchers() {
        let mut reg = WatchRegistry::new();
        let handle = reg.register(b"k", 4);
        assert!(!handle.is_ready());
        reg.notify(b"k");
        assert!(handle.is_ready());
    }

    #[test]
    fn overflow_drops_rather_than_blocks() {
        let mut reg = WatchRegistry::new();
        let handle = reg.register(b"k", 1);
        reg.notify(b"k");
        reg.notify(b"k");
        assert!(handle.is_ready());
    }
}
