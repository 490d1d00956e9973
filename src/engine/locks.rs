use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::warn;

/// In-process named locks, one per channel.
#[derive(Default)]
pub struct ChannelLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// The locks held by one run. Dropping releases them.
#[must_use]
pub struct ChannelGuards<'a> {
    locks: &'a ChannelLocks,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl ChannelGuards<'_> {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Drop for ChannelGuards<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        self.locks.prune();
    }
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire all `names`, in sorted order so that two runs sharing several
    /// names cannot deadlock. The locks are held until the guards drop.
    pub async fn acquire(&self, names: &[String]) -> ChannelGuards<'_> {
        let mut names = names.to_vec();
        names.sort();
        names.dedup();

        let mut guards = ChannelGuards {
            locks: self,
            guards: Vec::with_capacity(names.len()),
        };
        for name in names {
            let lock = self.locks.lock().entry(name.clone()).or_default().clone();
            let guard = match lock.clone().try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(lock = %name, "waiting for lock held by another run");
                    lock.lock_owned().await
                }
            };
            guards.guards.push(guard);
        }
        guards
    }

    /// Number of names with a lock that is held or waited for.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Forget locks nobody holds or waits for. Every holder and waiter keeps
    /// a clone of the `Arc`, and clones are only taken under the map lock.
    fn prune(&self) {
        self.locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
