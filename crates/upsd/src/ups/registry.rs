// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory table of configured UPSes (spec.md §3 component B). Keyed
//! case-insensitively on the UPS short name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::{UpsEntry, UpsHandle};

/// A freshly-created UPS handle paired with the driver-command receiver the
/// caller must hand to a newly spawned connector task.
pub struct NewUps {
    pub handle: Arc<UpsHandle>,
    pub cmd_rx: mpsc::UnboundedReceiver<Vec<String>>,
}

pub struct UpsRegistry {
    inner: RwLock<HashMap<String, Arc<UpsHandle>>>,
    shutdown: CancellationToken,
}

/// One `ups.conf` section, reduced to what the registry needs to reconcile
/// against. Lives here rather than in `crate::config` to keep the registry
/// decoupled from the config file format.
#[derive(Debug, Clone)]
pub struct DesiredUps {
    pub name: String,
    pub desc: String,
    pub driver_socket_path: String,
}

/// Outcome of a single `reconcile` pass, logged by the reload handler.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub deferred: Vec<String>,
}

impl UpsRegistry {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { inner: RwLock::new(HashMap::new()), shutdown }
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// Insert a freshly-configured UPS. Used at initial load; reload goes
    /// through [`Self::reconcile`].
    pub async fn insert(&self, desired: DesiredUps) -> NewUps {
        let (handle, cmd_rx) = UpsHandle::new(
            UpsEntry::new(desired.name.clone(), desired.desc, desired.driver_socket_path),
            &self.shutdown,
        );
        let handle = Arc::new(handle);
        self.inner.write().await.insert(Self::key(&desired.name), Arc::clone(&handle));
        NewUps { handle, cmd_rx }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<UpsHandle>> {
        self.inner.read().await.get(&Self::key(name)).cloned()
    }

    /// Snapshot of `(name, desc)` pairs for `LIST UPS`, sorted by name.
    pub async fn list_names(&self) -> Vec<(String, String)> {
        let guard = self.inner.read().await;
        let mut out = Vec::with_capacity(guard.len());
        for handle in guard.values() {
            let entry = handle.entry.read().await;
            if !entry.pending_removal {
                out.push((entry.name.clone(), entry.desc.clone()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn all_handles(&self) -> Vec<Arc<UpsHandle>> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Reconcile the registry against a freshly re-read `ups.conf`
    /// (spec.md §4.6): add new UPSes, update descriptions of existing ones,
    /// and mark removed ones `pending_removal` until no client remains
    /// bound — never touch anything while a client is bound. Newly-added
    /// UPSes are returned so the caller can spawn their connector tasks.
    pub async fn reconcile(&self, desired: &[DesiredUps]) -> (ReconcileReport, Vec<NewUps>) {
        let mut report = ReconcileReport::default();
        let mut spawned = Vec::new();
        let desired_keys: std::collections::HashSet<String> =
            desired.iter().map(|d| Self::key(&d.name)).collect();

        for d in desired {
            let key = Self::key(&d.name);
            let mut guard = self.inner.write().await;
            match guard.get(&key) {
                Some(existing) => {
                    let mut entry = existing.entry.write().await;
                    if entry.desc != d.desc || entry.driver_socket_path != d.driver_socket_path {
                        entry.desc = d.desc.clone();
                        entry.driver_socket_path = d.driver_socket_path.clone();
                        report.updated.push(d.name.clone());
                    }
                    entry.pending_removal = false;
                }
                None => {
                    let (handle, cmd_rx) = UpsHandle::new(
                        UpsEntry::new(d.name.clone(), d.desc.clone(), d.driver_socket_path.clone()),
                        &self.shutdown,
                    );
                    let handle = Arc::new(handle);
                    guard.insert(key, Arc::clone(&handle));
                    report.added.push(d.name.clone());
                    spawned.push(NewUps { handle, cmd_rx });
                }
            }
        }

        let mut to_drop = Vec::new();
        {
            let guard = self.inner.read().await;
            for (key, handle) in guard.iter() {
                if desired_keys.contains(key) {
                    continue;
                }
                let mut entry = handle.entry.write().await;
                if entry.numlogins == 0 {
                    to_drop.push(key.clone());
                    report.removed.push(entry.name.clone());
                } else {
                    entry.pending_removal = true;
                    report.deferred.push(entry.name.clone());
                }
            }
        }

        if !to_drop.is_empty() {
            let mut guard = self.inner.write().await;
            for key in to_drop {
                if let Some(handle) = guard.remove(&key) {
                    handle.driver_cancel.cancel();
                }
            }
        }

        (report, spawned)
    }

    /// Called by the maintenance tick: finish removing any UPS that was
    /// marked `pending_removal` and has since reached zero logins.
    pub async fn sweep_deferred_removals(&self) -> Vec<String> {
        let mut removed = Vec::new();
        let mut to_drop = Vec::new();
        {
            let guard = self.inner.read().await;
            for (key, handle) in guard.iter() {
                let entry = handle.entry.read().await;
                if entry.pending_removal && entry.numlogins == 0 {
                    to_drop.push(key.clone());
                    removed.push(entry.name.clone());
                }
            }
        }
        if !to_drop.is_empty() {
            let mut guard = self.inner.write().await;
            for key in to_drop {
                if let Some(handle) = guard.remove(&key) {
                    handle.driver_cancel.cancel();
                }
            }
        }
        removed
    }
}
