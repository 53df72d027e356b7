// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::{error, warn};

use upsd::{pidfile, Cli, DaemonConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = DaemonConfig::from_cli(&cli);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level_filter(&cli))),
        )
        .init();

    if let Some(command) = cli.command {
        if let Err(e) = pidfile::send_control(&config.pidfile_path(), command) {
            error!("failed to signal running instance: {e}");
            std::process::exit(1);
        }
        return;
    }

    if cli.chroot_dir.is_some() || cli.user.is_some() {
        warn!("-r/-u privilege-dropping flags are accepted but not yet honoured by this build");
    }

    if !cli.foreground {
        warn!("this build never backgrounds itself regardless of -F; running in the foreground");
    }

    let pidfile_path = config.pidfile_path();
    if let Err(e) = pidfile::write(&pidfile_path) {
        error!("failed to write pidfile {}: {e}", pidfile_path.display());
        std::process::exit(1);
    }

    let result = upsd::run(config).await;
    pidfile::remove(&pidfile_path);

    if let Err(e) = result {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

fn level_filter(cli: &Cli) -> &'static str {
    if cli.debug > 0 {
        "debug"
    } else if cli.quiet > 0 {
        "warn"
    } else {
        "info"
    }
}
