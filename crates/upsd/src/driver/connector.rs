// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::link::{LineEvent, LineLink};
use crate::ups::{NumericRange, TrackingStatus, UpsHandle, VariableDescriptor};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one UPS's driver endpoint connection for the lifetime of the
/// daemon (or until `ups.driver_cancel` fires, on reload-removal or
/// shutdown). Reconnects with exponential backoff; the previous variable
/// map is left untouched across a drop so clients keep reading it until
/// `maxage` marks it stale (spec.md §4.2). `cmd_rx` carries outgoing
/// `SET`/`INSTCMD` lines relayed from client sessions; they are dropped on
/// the floor while no connection is up (the dispatcher only enqueues them
/// after checking `entry.available()`, so this should not happen in
/// practice).
pub async fn run(ups: Arc<UpsHandle>, mut cmd_rx: mpsc::UnboundedReceiver<Vec<String>>) {
    let cancel = ups.driver_cancel.clone();
    let mut backoff = INITIAL_BACKOFF;
    let mut ever_connected = false;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let name = ups.entry.read().await.name.clone();
        let socket_path = ups.entry.read().await.driver_socket_path.clone();

        match UnixStream::connect(&socket_path).await {
            Ok(stream) => {
                backoff = INITIAL_BACKOFF;
                info!(ups = %name, "driver endpoint connected");

                {
                    let mut entry = ups.entry.write().await;
                    entry.connected = true;
                    if ever_connected {
                        entry.needs_kick_on_dumpdone = true;
                    }
                }
                ever_connected = true;

                let mut link = LineLink::new(stream);
                if link.write_line(&["LOGIN", &name]).await.is_err() {
                    mark_disconnected(&ups).await;
                    continue;
                }
                if link.write_line(&["DUMPALL"]).await.is_err() {
                    mark_disconnected(&ups).await;
                    continue;
                }

                let mut ping_tick = interval(PING_INTERVAL);
                ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ping_tick.tick().await; // first tick fires immediately

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = ping_tick.tick() => {
                            if link.write_line(&["PING"]).await.is_err() {
                                break;
                            }
                        }
                        cmd = cmd_rx.recv() => {
                            match cmd {
                                Some(tokens) => {
                                    if link.write_line(&tokens).await.is_err() {
                                        break;
                                    }
                                }
                                None => return, // all senders (UpsHandle) dropped
                            }
                        }
                        event = link.read_line() => {
                            match event {
                                Ok(LineEvent::Line(tokens)) => {
                                    ups.entry.write().await.last_heard = Instant::now();
                                    apply_ingress(&ups, &tokens).await;
                                }
                                Ok(LineEvent::Eof) => {
                                    debug!(ups = %name, "driver endpoint closed");
                                    break;
                                }
                                Ok(LineEvent::Protocol(msg)) => {
                                    warn!(ups = %name, error = %msg, "driver endpoint protocol error");
                                    break;
                                }
                                Err(e) => {
                                    warn!(ups = %name, error = %e, "driver endpoint read error");
                                    break;
                                }
                            }
                        }
                    }
                }

                mark_disconnected(&ups).await;
            }
            Err(e) => {
                debug!(ups = %name, error = %e, backoff_ms = backoff.as_millis(), "driver connect failed, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn mark_disconnected(ups: &Arc<UpsHandle>) {
    ups.entry.write().await.connected = false;
}

/// Fold one complete ingress vector into the UPS record (spec.md §4.2).
/// Unknown verbs are logged and ignored.
async fn apply_ingress(ups: &Arc<UpsHandle>, tokens: &[String]) {
    let Some(verb) = tokens.first().map(|s| s.to_ascii_uppercase()) else { return };
    let args = &tokens[1..];
    let mut entry = ups.entry.write().await;

    match verb.as_str() {
        "SETINFO" => {
            if let [var, value] = args {
                entry
                    .variables
                    .entry(var.clone())
                    .or_insert_with(|| VariableDescriptor::shell(var.clone()))
                    .value = value.clone();
            }
        }
        "ADDINFO" => {
            if let [var] = args {
                entry.variables.entry(var.clone()).or_insert_with(|| VariableDescriptor::shell(var.clone()));
            }
        }
        "DELINFO" => {
            if let [var] = args {
                entry.variables.remove(var);
            }
        }
        "SETFLAGS" => {
            if let Some((var, flags)) = args.split_first() {
                if let Some(desc) = entry.variables.get_mut(var) {
                    desc.apply_flags(flags.iter().map(|s| s.as_str()));
                }
            }
        }
        "SETAUX" => {
            if let [var, n] = args {
                if let (Some(desc), Ok(n)) = (entry.variables.get_mut(var), n.parse()) {
                    desc.display_len = Some(n);
                }
            }
        }
        "ADDENUM" => {
            if let [var, value] = args {
                entry
                    .variables
                    .entry(var.clone())
                    .or_insert_with(|| VariableDescriptor::shell(var.clone()))
                    .add_enum(value.clone());
            }
        }
        "DELENUM" => {
            if let [var, value] = args {
                if let Some(desc) = entry.variables.get_mut(var) {
                    desc.del_enum(value);
                }
            }
        }
        "ADDRANGE" => {
            if let [var, min, max] = args {
                if let (Ok(min), Ok(max)) = (min.parse(), max.parse()) {
                    entry
                        .variables
                        .entry(var.clone())
                        .or_insert_with(|| VariableDescriptor::shell(var.clone()))
                        .add_range(NumericRange { min, max });
                }
            }
        }
        "DELRANGE" => {
            if let [var, min, max] = args {
                if let (Some(desc), Ok(min), Ok(max)) = (entry.variables.get_mut(var), min.parse(), max.parse()) {
                    desc.del_range(NumericRange { min, max });
                }
            }
        }
        "ADDCMD" => {
            if let [cmd] = args {
                entry.commands.insert(cmd.clone());
            }
        }
        "DELCMD" => {
            if let [cmd] = args {
                entry.commands.remove(cmd);
                entry.command_descriptions.remove(cmd);
            }
        }
        "TRACKING" => {
            if let [id, status] = args {
                if let (Ok(id), Some(status)) = (id.parse(), TrackingStatus::parse(status)) {
                    entry.tracking.update(id, status);
                }
            }
        }
        "DUMPDONE" => {
            entry.stale = false;
            if entry.needs_kick_on_dumpdone {
                entry.needs_kick_on_dumpdone = false;
                let _ = ups.kick.send(());
            }
        }
        "PONG" => {}
        other => {
            debug!(verb = other, "unknown driver ingress verb ignored");
        }
    }
}
