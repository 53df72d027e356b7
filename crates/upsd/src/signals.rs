// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal wiring (spec.md §9: "a small control channel or atomic flags read
//! at the top of the loop iteration; the handler never mutates data
//! structures directly"). `SIGTERM`/`SIGINT` cancel the shared shutdown
//! token; `SIGHUP` triggers a reload pass.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::DaemonConfig;
use crate::daemon::{self, SharedState};

/// Block until `SIGTERM` or `SIGINT` is received, then cancel `shutdown`.
pub async fn wait_for_shutdown(shutdown: &CancellationToken) {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

    tokio::select! {
        _ = async {
            match sigterm.as_mut() {
                Some(s) => s.recv().await,
                None => std::future::pending().await,
            }
        } => info!("received SIGTERM"),
        _ = async {
            match sigint.as_mut() {
                Some(s) => s.recv().await,
                None => std::future::pending().await,
            }
        } => info!("received SIGINT"),
    }

    shutdown.cancel();
}

/// Re-read `ups.conf` and `upsd.users` on every `SIGHUP` (spec.md §4.6);
/// listeners are never touched. Partial failures are logged and leave the
/// pre-reload state in place.
pub async fn reload_loop(state: Arc<SharedState>, config: DaemonConfig, cancel: CancellationToken) {
    let Ok(mut sighup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) else {
        return;
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            recvd = sighup.recv() => {
                if recvd.is_none() {
                    return;
                }
                info!("received SIGHUP, reloading configuration");
                reload_once(&state, &config).await;
            }
        }
    }
}

async fn reload_once(state: &Arc<SharedState>, config: &DaemonConfig) {
    let ups_conf = match crate::config::ups::load(&config.ups_conf_path) {
        Ok(entries) => entries,
        Err(e) => {
            daemon::log_reload_failure("ups.conf", e);
            return;
        }
    };

    let users_conf = match crate::config::users::load(&config.users_conf_path) {
        Ok(table) => table,
        Err(e) => {
            daemon::log_reload_failure("upsd.users", e);
            return;
        }
    };

    let upsd_conf = match crate::config::UpsdConfig::load(&config.upsd_conf_path) {
        Ok(c) => c,
        Err(e) => {
            daemon::log_reload_failure("upsd.conf", e);
            return;
        }
    };

    let statepath = upsd_conf.statepath.clone().unwrap_or_else(|| std::path::PathBuf::from("/var/state/ups"));
    let desired: Vec<_> = ups_conf
        .into_iter()
        .map(|entry| {
            let driver_socket_path = statepath.join(&entry.name).display().to_string();
            crate::ups::DesiredUps { name: entry.name, desc: entry.desc, driver_socket_path }
        })
        .collect();

    let (report, spawned) = state.registry.reconcile(&desired).await;
    for new_ups in spawned {
        tokio::spawn(crate::driver::run(new_ups.handle, new_ups.cmd_rx));
    }
    info!(
        added = report.added.len(),
        updated = report.updated.len(),
        removed = report.removed.len(),
        deferred = report.deferred.len(),
        "ups.conf reconciled"
    );

    let mut acl = crate::acl::HostAcl::new();
    for rule in &upsd_conf.acl_rules {
        acl.add_rule(&rule.spec, rule.allow);
    }
    *state.acl.write().await = acl;
    *state.users.write().await = users_conf;
}
