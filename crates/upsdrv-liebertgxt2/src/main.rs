// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Standalone driver binary for the Liebert GXT2 ESP2 serial protocol.
//! Speaks the ESP2 wire format to the UPS over a tty and the driver
//! endpoint protocol to `upsd` over a Unix socket at
//! `<statepath>/<name>` — the same path `upsd`'s driver connector dials as
//! a client, so this binary is the listener.

mod esp2;
mod serial;
mod session;
mod wire;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use esp2::{bitfield_command, decode_status, do_command, format_reading, read_identification, telemetry_table};
use session::Snapshot;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// `upsdrv-liebertgxt2` — Liebert GXT2 ESP2 serial UPS driver.
#[derive(Debug, Parser)]
#[command(name = "upsdrv-liebertgxt2")]
struct Cli {
    /// UPS name, matching its `[name]` section in `ups.conf`.
    #[arg(long)]
    name: String,

    /// Serial device path (e.g. `/dev/ttyS0`).
    #[arg(long)]
    device: PathBuf,

    /// Serial line speed.
    #[arg(long, default_value_t = 2400)]
    baudrate: u32,

    /// Directory the driver endpoint socket is created in.
    #[arg(long, default_value = "/var/state/ups")]
    statepath: PathBuf,

    /// Raise debug verbosity (repeatable).
    #[arg(short = 'D', long = "debug", action = clap::ArgAction::Count)]
    debug: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(if cli.debug > 0 { "debug" } else { "info" })),
        )
        .init();

    let mut port = serial::open(&cli.device, cli.baudrate)?;
    let identification = read_identification(&mut port)?;
    if identification.is_empty() {
        anyhow::bail!("GXT2-capable UPS not detected on {}", cli.device.display());
    }
    info!(ups = %cli.name, identification = ?identification, "identified UPS");

    let (tx, _) = broadcast::channel::<Snapshot>(16);
    let poll_tx = tx.clone();
    std::thread::spawn(move || poll_loop(port, poll_tx));

    std::fs::create_dir_all(&cli.statepath)?;
    let socket_path = cli.statepath.join(&cli.name);
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(path = %socket_path.display(), "listening for upsd");

    loop {
        let (stream, _) = listener.accept().await?;
        let name = cli.name.clone();
        let identification = identification.clone();
        let updates = tx.subscribe();
        let initial = poll_once_best_effort(&tx);
        tokio::spawn(async move {
            if let Err(e) = session::serve(stream, &name, &identification, initial, updates).await {
                warn!(error = %e, "driver session ended");
            }
        });
    }
}

/// `session::serve` needs an immediate `Snapshot` to dump on `DUMPALL`
/// rather than waiting up to `POLL_INTERVAL` for the first broadcast; the
/// polling thread's most recent send isn't retained anywhere else, so
/// start a session with an empty one and let the first broadcast tick
/// (at most `POLL_INTERVAL` later) fill it in.
fn poll_once_best_effort(_tx: &broadcast::Sender<Snapshot>) -> Snapshot {
    Snapshot { vars: Vec::new() }
}

fn poll_loop(mut port: std::fs::File, tx: broadcast::Sender<Snapshot>) {
    loop {
        std::thread::sleep(POLL_INTERVAL);

        let mut vars = Vec::new();
        for point in telemetry_table() {
            match do_command(&mut port, point.command) {
                Ok(reply) => vars.push((point.var.to_owned(), format_reading(&point, &reply))),
                Err(e) => {
                    error!(var = point.var, error = %e, "telemetry read failed");
                }
            }
        }

        let battery_current =
            vars.iter().find(|(var, _)| var == "battery.current").and_then(|(_, v)| v.parse::<f64>().ok());

        let bitfields = [esp2::BITFIELD_1, esp2::BITFIELD_2, esp2::BITFIELD_3]
            .map(|b| do_command(&mut port, bitfield_command(b)));

        if let [Ok(bf1), Ok(bf2), Ok(bf3)] = bitfields {
            let status = decode_status(&bf1, &bf2, &bf3, battery_current);
            vars.push(("ups.status".to_owned(), status.join(" ")));
        } else {
            error!("status bitfield read failed, omitting ups.status this cycle");
        }

        // No receivers between client connections is expected, not an error.
        let _ = tx.send(Snapshot { vars });
    }
}
