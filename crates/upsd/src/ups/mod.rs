// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The UPS record: variable map, command set, tracking ring, and the
//! freshness/login-count bookkeeping the daemon owns on behalf of each
//! configured UPS (spec.md §3).

mod registry;
mod tracking;
mod variable;

pub use registry::{DesiredUps, NewUps, ReconcileReport, UpsRegistry};
pub use tracking::{TrackingEntry, TrackingRing, TrackingStatus};
pub use variable::{NumericRange, VarType, VariableDescriptor};

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::ErrCode;

/// The mutable half of a UPS's state: everything the driver connector
/// ingress and the client-facing read/write paths touch.
#[derive(Debug)]
pub struct UpsEntry {
    pub name: String,
    pub desc: String,
    pub driver_socket_path: String,
    pub variables: HashMap<String, VariableDescriptor>,
    pub commands: HashSet<String>,
    pub command_descriptions: HashMap<String, String>,
    pub tracking: TrackingRing,
    pub numlogins: i64,
    pub stale: bool,
    pub connected: bool,
    pub last_heard: Instant,
    /// Set when the driver connector loses its endpoint; cleared (and a
    /// kick fired) on the next `DUMPDONE`, per spec.md §4.6.
    pub needs_kick_on_dumpdone: bool,
    /// Deferred removal: set by a reload that dropped this UPS from
    /// `ups.conf` while clients are still bound. Cleaned up once
    /// `numlogins` reaches zero.
    pub pending_removal: bool,
}

impl UpsEntry {
    pub fn new(name: String, desc: String, driver_socket_path: String) -> Self {
        Self {
            name,
            desc,
            driver_socket_path,
            variables: HashMap::new(),
            commands: HashSet::new(),
            command_descriptions: HashMap::new(),
            tracking: TrackingRing::new(64),
            numlogins: 0,
            stale: true,
            connected: false,
            last_heard: Instant::now(),
            needs_kick_on_dumpdone: false,
            pending_removal: false,
        }
    }

    /// spec.md §4.2 `ups_available`: a client-facing read requires the
    /// driver to be connected and the data fresh.
    pub fn available(&self) -> Result<(), ErrCode> {
        if !self.connected {
            return Err(ErrCode::DriverNotConnected);
        }
        if self.stale {
            return Err(ErrCode::DataStale);
        }
        Ok(())
    }
}

/// A UPS record plus the out-of-band signaling that doesn't belong behind
/// the record's own lock: a broadcast used to kick bound clients on
/// driver-restart (spec.md §4.6), and a token that stops this UPS's driver
/// connector task when the entry is torn down.
pub struct UpsHandle {
    pub entry: RwLock<UpsEntry>,
    pub kick: broadcast::Sender<()>,
    pub driver_cancel: CancellationToken,
    /// Outgoing commands for the driver connector to relay (`SET`,
    /// `INSTCMD`); the connector owns the matching receiver.
    pub cmd_tx: mpsc::UnboundedSender<Vec<String>>,
}

impl UpsHandle {
    /// Builds the handle and the receiver half of its command channel. The
    /// caller must hand the receiver to [`crate::driver::run`] when it
    /// spawns this UPS's connector task.
    pub fn new(entry: UpsEntry, parent: &CancellationToken) -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        let (kick, _) = broadcast::channel(8);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (Self { entry: RwLock::new(entry), kick, driver_cancel: parent.child_token(), cmd_tx }, cmd_rx)
    }
}
