// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One connected `upsd` endpoint: a `LOGIN`/`DUMPALL` dump followed by
//! `PING`/`SET`/`INSTCMD` ingress and unsolicited telemetry updates. Mirrors
//! `upsdrv_initinfo`/`upsdrv_updateinfo`'s one-shot dump plus the always-fail
//! `instcmd`/`setvar` stubs (neither ESP2 command is implemented by the
//! hardware this driver targets).

use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::esp2::IDENTIFICATION_VARS;
use crate::wire::{LineEvent, LineLink};

/// One periodic poll's worth of readings, including the folded
/// `ups.status` line, broadcast to whichever session is currently
/// connected.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub vars: Vec<(String, String)>,
}

pub async fn serve(
    stream: UnixStream,
    name: &str,
    identification: &[String],
    initial: Snapshot,
    mut updates: broadcast::Receiver<Snapshot>,
) -> std::io::Result<()> {
    let mut link = LineLink::new(stream);

    loop {
        match link.read_line().await? {
            LineEvent::Line(tokens) => {
                let Some(verb) = tokens.first().map(|s| s.to_ascii_uppercase()) else { continue };
                if verb == "LOGIN" {
                    info!(ups = name, "upsd logged in");
                    break;
                }
                debug!(verb = %verb, "ignoring ingress line before LOGIN");
            }
            LineEvent::Eof => return Ok(()),
        }
    }

    loop {
        match link.read_line().await? {
            LineEvent::Line(tokens) if tokens.first().map(String::as_str) == Some("DUMPALL") => break,
            LineEvent::Line(_) => continue,
            LineEvent::Eof => return Ok(()),
        }
    }

    link.write_line(&["SETINFO", "ups.mfr", "Liebert"]).await?;
    for (var, value) in IDENTIFICATION_VARS.iter().zip(identification.iter()) {
        link.write_line(&["SETINFO", var, value]).await?;
    }
    for (var, value) in &initial.vars {
        link.write_line(&["SETINFO", var, value]).await?;
    }
    link.write_line(&["DUMPDONE"]).await?;

    loop {
        tokio::select! {
            event = link.read_line() => {
                match event? {
                    LineEvent::Line(tokens) => handle_ingress(&mut link, &tokens).await?,
                    LineEvent::Eof => return Ok(()),
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(snapshot) => {
                        for (var, value) in &snapshot.vars {
                            link.write_line(&["SETINFO", var, value]).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "telemetry broadcast lagged, dropping stale updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

async fn handle_ingress(link: &mut LineLink<UnixStream>, tokens: &[String]) -> std::io::Result<()> {
    let Some(verb) = tokens.first().map(|s| s.to_ascii_uppercase()) else { return Ok(()) };
    match verb.as_str() {
        "PING" => link.write_line(&["PONG"]).await,
        "SET" => {
            // `tokens` is `SET <var> <value> <id>`; the hardware's `setvar`
            // stub rejects every variable, so echo UNKNOWN regardless.
            if let Some(id) = tokens.get(3) {
                link.write_line(&["TRACKING", id, "UNKNOWN"]).await?;
            }
            Ok(())
        }
        "INSTCMD" => {
            // `tokens` is `INSTCMD <cmd> <id> [<param>]`; same stub.
            if let Some(id) = tokens.get(2) {
                link.write_line(&["TRACKING", id, "UNKNOWN"]).await?;
            }
            Ok(())
        }
        other => {
            debug!(verb = other, "ignoring unrecognised ingress verb");
            Ok(())
        }
    }
}
