// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic maintenance tick (spec.md §4.2 staleness check, §4.5 tracking
//! pruning, §4.6 deferred-removal sweep). Idle-client eviction is instead
//! enforced locally by each session task (see `client::handler`), since
//! this realization gives every connection its own task rather than a
//! single polled fd set (spec.md §5, tokio-task realization).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::daemon::SharedState;

const TICK: Duration = Duration::from_secs(2);

pub async fn run(state: Arc<SharedState>, cancel: CancellationToken) {
    let mut tick = interval(TICK);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tick.tick() => {
                scan_staleness(&state).await;
                prune_tracking(&state).await;
                sweep_removals(&state).await;
            }
        }
    }
}

async fn scan_staleness(state: &Arc<SharedState>) {
    for handle in state.registry.all_handles().await {
        let mut entry = handle.entry.write().await;
        let age = entry.last_heard.elapsed();
        if age > state.maxage && !entry.stale {
            entry.stale = true;
            warn!(ups = %entry.name, age_secs = age.as_secs(), "UPS data is now stale");
        }
    }
}

async fn prune_tracking(state: &Arc<SharedState>) {
    for handle in state.registry.all_handles().await {
        handle.entry.write().await.tracking.prune(state.tracking_ttl);
    }
}

async fn sweep_removals(state: &Arc<SharedState>) {
    let removed = state.registry.sweep_deferred_removals().await;
    for name in removed {
        info!(ups = %name, "removed from registry after reload (last client disconnected)");
    }
}
