//! The registry map and its merge policy. No I/O and no locking: the engine
//! thread is the only owner.

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use shared::types::{DeviceEntry, DeviceUpdate};

/// What applying one update did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Full record for an identity not seen before
    Inserted,
    /// Full record replacing an existing entry
    Replaced,
    /// Partial record merged into an existing entry
    Merged,
    /// Update rejected: empty identity, or a partial record for an unknown device
    Discarded,
}

impl ApplyOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, ApplyOutcome::Discarded)
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, DeviceEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one update at time `now`.
    pub fn apply(&mut self, update: DeviceUpdate, now: DateTime<Utc>) -> ApplyOutcome {
        if update.id().is_empty() {
            return ApplyOutcome::Discarded;
        }

        match update {
            DeviceUpdate::Full(mut device) => {
                device.normalize();
                match self.entries.get_mut(&device.id) {
                    Some(entry) => {
                        entry.device = device;
                        entry.last_seen = now;
                        ApplyOutcome::Replaced
                    }
                    None => {
                        self.entries.insert(
                            device.id.clone(),
                            DeviceEntry {
                                device,
                                first_seen: now,
                                last_seen: now,
                            },
                        );
                        ApplyOutcome::Inserted
                    }
                }
            }
            DeviceUpdate::Partial(delta) => match self.entries.get_mut(&delta.id) {
                Some(entry) => {
                    entry.device.apply_delta(&delta);
                    entry.last_seen = now;
                    ApplyOutcome::Merged
                }
                None => ApplyOutcome::Discarded,
            },
        }
    }

    pub fn get(&self, id: &str) -> Option<&DeviceEntry> {
        self.entries.get(id)
    }

    /// Copy of every entry, ordered by identity.
    pub fn entries_sorted(&self) -> Vec<DeviceEntry> {
        let mut entries: Vec<DeviceEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.device.id.cmp(&b.device.id));
        entries
    }
}
