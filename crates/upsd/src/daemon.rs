// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's shared state (spec.md §9: "a single `Daemon` value owned by
//! the event loop; all handlers receive it explicitly") and its top-level
//! run loop: load config, spawn one task per driver and per listener, serve
//! until shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acl::HostAcl;
use crate::config::{DaemonConfig, UpsdConfig};
use crate::driver;
use crate::error::StartupError;
use crate::listener;
use crate::maintenance;
use crate::tls::TlsMaterial;
use crate::ups::{DesiredUps, UpsRegistry};
use crate::users::UserTable;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "1.3";

/// Everything a client command handler or maintenance tick needs, shared
/// behind reference-counted, independently-lockable pieces (spec.md §5: no
/// single global mutex is mandated, only that per-UPS operations on the
/// same record don't interleave).
pub struct SharedState {
    pub registry: UpsRegistry,
    pub users: RwLock<UserTable>,
    pub acl: RwLock<HostAcl>,
    pub maxage: Duration,
    pub tracking_ttl: Duration,
    pub idle_timeout: Duration,
    pub tls: RwLock<Option<Arc<TlsMaterial>>>,
    pub shutdown: CancellationToken,
    pub reload: CancellationToken,
    pub next_session_id: AtomicU64,
    /// Caps concurrently-serviced clients (spec.md §5 `maxconn`). Accept
    /// keeps pulling connections off the listen backlog even once this is
    /// exhausted; they simply queue for a permit rather than being refused.
    pub connections: Semaphore,
}

impl SharedState {
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

pub async fn run(config: DaemonConfig) -> Result<(), StartupError> {
    let shutdown = CancellationToken::new();
    let mut upsd_conf = UpsdConfig::load(&config.upsd_conf_path)?;
    let ups_conf = crate::config::ups::load(&config.ups_conf_path)?;
    let users_conf = crate::config::users::load(&config.users_conf_path)?;

    if ups_conf.is_empty() {
        return Err(StartupError::NoUpsDefined);
    }

    upsd_conf.listen_addrs.retain(|addr| config.address_family.accepts(addr));
    if upsd_conf.listen_addrs.is_empty() {
        return Err(StartupError::InvalidCli(
            "-4/-6 excludes every configured LISTEN address".to_owned(),
        ));
    }

    let mut acl = HostAcl::new();
    for rule in &upsd_conf.acl_rules {
        acl.add_rule(&rule.spec, rule.allow);
    }

    let tls = if let Some(certfile) = &upsd_conf.certfile {
        Some(Arc::new(TlsMaterial::load(certfile, upsd_conf.certpath.as_deref(), upsd_conf.disable_weak_ssl)?))
    } else {
        None
    };

    let state = Arc::new(SharedState {
        registry: UpsRegistry::new(shutdown.child_token()),
        users: RwLock::new(users_conf),
        acl: RwLock::new(acl),
        maxage: Duration::from_secs(upsd_conf.maxage),
        tracking_ttl: upsd_conf.tracking_ttl.map(Duration::from_secs).unwrap_or(config.tracking_ttl),
        idle_timeout: Duration::from_secs(60),
        tls: RwLock::new(tls),
        shutdown: shutdown.clone(),
        reload: CancellationToken::new(),
        next_session_id: AtomicU64::new(1),
        connections: Semaphore::new(upsd_conf.maxconn.unwrap_or(4096) as usize),
    });

    let statepath = upsd_conf.statepath.clone().unwrap_or_else(|| std::path::PathBuf::from("/var/state/ups"));
    for entry in ups_conf {
        let driver_socket_path = statepath.join(&entry.name).display().to_string();
        let desired = DesiredUps { name: entry.name, desc: entry.desc, driver_socket_path };
        let new_ups = state.registry.insert(desired).await;
        tokio::spawn(driver::run(new_ups.handle, new_ups.cmd_rx));
    }

    let mut listener_tasks = Vec::new();
    for addr in &upsd_conf.listen_addrs {
        let listener = listener::bind(addr).await?;
        let state = Arc::clone(&state);
        let cancel = shutdown.child_token();
        listener_tasks.push(tokio::spawn(listener::accept_loop(listener, state, cancel)));
    }

    let maint_state = Arc::clone(&state);
    let maint_cancel = shutdown.child_token();
    let maint_task = tokio::spawn(maintenance::run(maint_state, maint_cancel));

    let reload_state = Arc::clone(&state);
    let reload_cancel = shutdown.child_token();
    let reload_paths = config.clone();
    let reload_task = tokio::spawn(crate::signals::reload_loop(reload_state, reload_paths, reload_cancel));

    crate::signals::wait_for_shutdown(&shutdown).await;
    info!("shutdown signal received, draining");

    shutdown.cancel();
    maint_task.abort();
    reload_task.abort();
    for task in listener_tasks {
        task.abort();
    }

    for handle in state.registry.all_handles().await {
        handle.driver_cancel.cancel();
    }

    Ok(())
}

pub fn log_reload_failure(context: &str, err: impl std::fmt::Display) {
    warn!(context, error = %err, "reload failed, preserving pre-reload state");
}
