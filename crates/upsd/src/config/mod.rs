// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration: CLI flags plus the three on-disk config file formats
//! (spec.md §6). Parsing reuses the wire-protocol tokenizer (§4.1) since
//! all three files share its whitespace/quote grammar.

mod cli;
mod upsd_conf;
pub mod ups;
pub mod users;

pub use cli::{Cli, ControlCommand};
pub use upsd_conf::{AclRuleConfig, UpsdConfig};

use std::path::PathBuf;
use std::time::Duration;

/// Restricts which `listen_addrs` entries `daemon::run` actually binds,
/// set from `-4`/`-6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Any,
    V4Only,
    V6Only,
}

impl AddressFamily {
    pub fn accepts(self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4Only => addr.is_ipv4(),
            Self::V6Only => addr.is_ipv6(),
        }
    }
}

/// Resolved set of file paths and runtime knobs `daemon::run` needs,
/// derived from [`Cli`] plus built-in defaults.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub upsd_conf_path: PathBuf,
    pub ups_conf_path: PathBuf,
    pub users_conf_path: PathBuf,
    pub tracking_ttl: Duration,
    pub pidfile_dir: PathBuf,
    pub address_family: AddressFamily,
}

impl DaemonConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let conf_dir = cli.conf_dir.clone().unwrap_or_else(|| PathBuf::from("/etc/nut"));
        let address_family = if cli.ipv4 {
            AddressFamily::V4Only
        } else if cli.ipv6 {
            AddressFamily::V6Only
        } else {
            AddressFamily::Any
        };
        Self {
            upsd_conf_path: conf_dir.join("upsd.conf"),
            ups_conf_path: conf_dir.join("ups.conf"),
            users_conf_path: conf_dir.join("upsd.users"),
            tracking_ttl: Duration::from_secs(cli.tracking_ttl_secs),
            pidfile_dir: cli.pidfile_dir.clone().unwrap_or_else(|| PathBuf::from("/var/run/nut")),
            address_family,
        }
    }

    pub fn pidfile_path(&self) -> PathBuf {
        self.pidfile_dir.join("upsd.pid")
    }
}
