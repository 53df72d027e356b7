// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// `upsd` — Network UPS Tools core network daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "upsd", version = crate::daemon::VERSION)]
pub struct Cli {
    /// Raise debug verbosity (repeatable).
    #[arg(short = 'D', long = "debug", action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Raise the logging threshold (quieter).
    #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Send a control signal (`reload` or `stop`) to the running instance
    /// via its pidfile, then exit.
    #[arg(short = 'c', long = "command")]
    pub command: Option<ControlCommand>,

    /// Chroot to this directory after binding listeners.
    #[arg(short = 'r', long = "chroot")]
    pub chroot_dir: Option<PathBuf>,

    /// Drop privileges to this user after binding listeners.
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Force IPv4 only.
    #[arg(short = '4', long = "ipv4", conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Force IPv6 only.
    #[arg(short = '6', long = "ipv6", conflicts_with = "ipv4")]
    pub ipv6: bool,

    /// Stay in the foreground instead of daemonizing. Accepted for
    /// compatibility; this build never forks to the background regardless
    /// of this flag (daemonization is out of scope, see DESIGN.md).
    #[arg(short = 'F', long = "foreground")]
    pub foreground: bool,

    /// Directory holding `upsd.conf`, `ups.conf`, `upsd.users` (default
    /// `/etc/nut`).
    #[arg(long = "conf-dir", env = "NUT_CONFDIR")]
    pub conf_dir: Option<PathBuf>,

    /// Directory to write/read the pidfile (default `/var/run/nut`).
    #[arg(long = "pidfile-dir", env = "NUT_PIDFILEDIR")]
    pub pidfile_dir: Option<PathBuf>,

    /// Tracking-ring entry TTL, in seconds (Open Question (c), DESIGN.md).
    #[arg(long = "tracking-ttl-secs", default_value_t = 600)]
    pub tracking_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ControlCommand {
    Reload,
    Stop,
}
