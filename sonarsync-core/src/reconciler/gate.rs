//! Per-key mutual exclusion within one process.
//!
//! Serializes reconciliations of the same key so that the lookup/act window
//! cannot be interleaved by another task in this process. Races with other
//! processes are still possible and surface as classified errors.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::state::ResourceKey;

/// Lazily created lock per resource key.
#[derive(Debug, Default)]
pub struct KeyedGate {
    slots: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl KeyedGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder for `key` remains, then hold it until the
    /// returned guard is dropped.
    pub async fn acquire(&self, key: &ResourceKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.retain(|_, slot| slot.strong_count() > 0);
            match slots.get(key.as_str()).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(Mutex::new(()));
                    slots.insert(key.as_str().to_string(), Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub async fn active_keys(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.strong_count() > 0).count()
    }
}
