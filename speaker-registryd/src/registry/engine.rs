use std::sync::Arc;
use std::thread;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::{Context, Result};
use shared::types::{DeviceEntry, DeviceUpdate};
use super::hash;
use super::store::{ApplyOutcome, Registry};

/// Point-in-time copy of the registry, published after every accepted update.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    /// Entries ordered by identity
    pub devices: Vec<DeviceEntry>,
    /// Number of accepted updates so far
    pub revision: u64,
    pub hash: String,
}

impl RegistrySnapshot {
    fn empty() -> Self {
        Self {
            devices: Vec::new(),
            revision: 0,
            hash: hash::compute_hash(&[]),
        }
    }

    pub fn get(&self, id: &str) -> Option<&DeviceEntry> {
        self.devices
            .binary_search_by(|entry| entry.device.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.devices[i])
    }
}

/// Commands sent to the engine thread
enum EngineCommand {
    Apply(DeviceUpdate, oneshot::Sender<ApplyOutcome>),
    Shutdown,
}

/// Handle to the registry engine. Cheap to clone; every producer holds one.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<EngineCommand>,
    snapshot_rx: watch::Receiver<Arc<RegistrySnapshot>>,
}

impl RegistryHandle {
    /// Spawn the engine thread. It is the only writer of the registry and
    /// applies updates one at a time in arrival order.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<EngineCommand>(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RegistrySnapshot::empty()));

        thread::spawn(move || {
            let mut registry = Registry::new();
            let mut revision = 0u64;

            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    EngineCommand::Apply(update, reply) => {
                        let id = update.id().to_string();
                        let partial = update.is_partial();
                        let outcome = registry.apply(update, Utc::now());
                        log_outcome(&registry, &id, partial, outcome);

                        if outcome.is_accepted() {
                            revision += 1;
                            let devices = registry.entries_sorted();
                            let hash = hash::compute_hash(&devices);
                            snapshot_tx.send_replace(Arc::new(RegistrySnapshot {
                                devices,
                                revision,
                                hash,
                            }));
                        }
                        let _ = reply.send(outcome);
                    }
                    EngineCommand::Shutdown => {
                        tracing::info!("Registry engine shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx, snapshot_rx }
    }

    /// Hand an update to the engine and wait until it has been applied.
    pub async fn apply(&self, update: DeviceUpdate) -> Result<ApplyOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Apply(update, reply))
            .await
            .context("registry engine is gone")?;
        rx.await.context("registry engine dropped the update")
    }

    /// Latest snapshot. Never waits on the engine.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified after every accepted update
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistrySnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Stop the engine thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(EngineCommand::Shutdown)
            .await
            .context("registry engine is already gone")?;
        Ok(())
    }
}

fn log_outcome(registry: &Registry, id: &str, partial: bool, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Inserted => {
            if let Some(entry) = registry.get(id) {
                tracing::info!(
                    "Registered device {} ({}, {})",
                    id,
                    entry.device.friendly_name,
                    entry.device.device_type
                );
            }
        }
        ApplyOutcome::Replaced => tracing::debug!("Refreshed device {}", id),
        ApplyOutcome::Merged => tracing::debug!("Merged event update for {}", id),
        ApplyOutcome::Discarded if partial => {
            tracing::debug!("Discarding event update for unknown device {:?}", id)
        }
        ApplyOutcome::Discarded => tracing::warn!("Discarding full record without identity"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{Device, DeviceDelta, Power};

    fn device(id: &str) -> Device {
        Device {
            id: id.to_string(),
            power: Power::Standby,
            base_url: "http://192.168.1.20/".to_string(),
            control_url: "/YamahaExtendedControl/v1/".to_string(),
            friendly_name: "Office".to_string(),
            device_type: "WX-021".to_string(),
            volume: None,
            max_volume: 100,
            input: String::new(),
            input_text: String::new(),
            mute: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_published_after_accepted_updates() {
        let registry = RegistryHandle::spawn();
        let mut rx = registry.subscribe();
        assert_eq!(registry.snapshot().revision, 0);
        assert!(registry.snapshot().devices.is_empty());

        let outcome = registry.apply(DeviceUpdate::Full(device("b"))).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Inserted);
        assert!(rx.has_changed().unwrap());
        let first = rx.borrow_and_update().clone();
        assert_eq!(first.revision, 1);
        assert!(first.get("b").is_some());

        registry.apply(DeviceUpdate::Full(device("a"))).await.unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.revision, 2);
        assert_ne!(snapshot.hash, first.hash);
        assert!(snapshot.get("a").is_some());
        assert!(snapshot.get("c").is_none());

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_discarded_update_does_not_publish() {
        let registry = RegistryHandle::spawn();
        let mut rx = registry.subscribe();
        let _ = rx.borrow_and_update();

        let mut delta = DeviceDelta::new("ghost");
        delta.power = Some(Power::On);
        let outcome = registry.apply(DeviceUpdate::Partial(delta)).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Discarded);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(registry.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn test_concurrent_producers_are_serialized() {
        let registry = RegistryHandle::spawn();
        registry.apply(DeviceUpdate::Full(device("x"))).await.unwrap();

        let mut tasks = Vec::new();
        for volume in 0..20u8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let mut delta = DeviceDelta::new("x");
                delta.volume = Some(volume);
                registry.apply(DeviceUpdate::Partial(delta)).await.unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), ApplyOutcome::Merged);
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.revision, 21);
        assert_eq!(snapshot.devices.len(), 1);
        assert!(snapshot.devices[0].device.volume.is_some());
    }

    #[tokio::test]
    async fn test_apply_after_shutdown_fails() {
        let registry = RegistryHandle::spawn();
        registry.shutdown().await.unwrap();
        // give the thread a moment to drop its receiver
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(registry.apply(DeviceUpdate::Full(device("x"))).await.is_err());
    }
}
