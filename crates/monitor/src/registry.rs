//! Registry of devices already observed
//!
//! Single source of truth for "is this device new". Entries are never
//! removed: a disconnected device stays known for the process lifetime.

use hid::DeviceIdentity;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Append-only, mutex-guarded set of device identities
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    known: Mutex<HashSet<DeviceIdentity>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<DeviceIdentity>> {
        self.known.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, identity: DeviceIdentity) -> bool {
        self.lock().contains(&identity)
    }

    /// Register a device
    ///
    /// The membership test and the insertion happen under one lock, so
    /// concurrent callers observing the same device cannot both see it as new.
    /// Returns `true` if the identity was not known before. Idempotent.
    pub fn insert(&self, identity: DeviceIdentity) -> bool {
        self.lock().insert(identity)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Known identities, sorted
    pub fn identities(&self) -> Vec<DeviceIdentity> {
        let mut ids: Vec<_> = self.lock().iter().copied().collect();
        ids.sort();
        ids
    }
}
