// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-connection read/dispatch loop (spec.md §4.3/§4.4): one task per
//! client, serving it until idle timeout, protocol error, `LOGOUT`, a
//! driver-restart kick, or daemon shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::daemon::SharedState;
use crate::link::{LineEvent, LineLink};

use super::commands::{self, dispatch};
use super::conn::Conn;
use super::session::ClientSession;

const TRACKING_POLL: std::time::Duration = std::time::Duration::from_secs(1);

pub async fn serve(stream: TcpStream, peer: SocketAddr, state: Arc<SharedState>, cancel: CancellationToken) {
    let mut session = ClientSession::new(peer.to_string(), peer.ip());
    let mut link = LineLink::new(Conn::Plain(stream));
    let mut tracking_poll = interval(TRACKING_POLL);
    tracking_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let kick = subscribe_kick(&session, &state).await;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wait_for_kick(kick) => {
                debug!(peer = %session.peer_addr, ups = ?session.bound_ups, "kicked by driver restart");
                break;
            }
            _ = tracking_poll.tick() => {
                for line in commands::poll_pending_tracking(&mut session, &state).await {
                    if link.write_raw_line(&line).await.is_err() {
                        cleanup(&session, &state).await;
                        return;
                    }
                }
                continue;
            }
            result = tokio::time::timeout(state.idle_timeout, link.read_line()) => {
                let Ok(event) = result else {
                    debug!(peer = %session.peer_addr, "client idle timeout");
                    break;
                };
                match event {
                    Ok(LineEvent::Line(tokens)) => {
                        session.touch();
                        let outcome = dispatch(&mut session, &state, &tokens).await;
                        for line in &outcome.lines {
                            if link.write_raw_line(line).await.is_err() {
                                cleanup(&session, &state).await;
                                return;
                            }
                        }
                        if outcome.starttls {
                            match upgrade_to_tls(link, &state).await {
                                Ok(upgraded) => {
                                    link = upgraded;
                                    session.tls_active = true;
                                }
                                Err(e) => {
                                    warn!(peer = %session.peer_addr, error = %e, "STARTTLS handshake failed");
                                    cleanup(&session, &state).await;
                                    return;
                                }
                            }
                        }
                        if outcome.close {
                            break;
                        }
                    }
                    Ok(LineEvent::Eof) => break,
                    Ok(LineEvent::Protocol(msg)) => {
                        debug!(peer = %session.peer_addr, error = %msg, "client protocol error, dropping session");
                        break;
                    }
                    Err(e) => {
                        debug!(peer = %session.peer_addr, error = %e, "client read error");
                        break;
                    }
                }
            }
        }
    }

    cleanup(&session, &state).await;
}

async fn subscribe_kick(session: &ClientSession, state: &Arc<SharedState>) -> Option<broadcast::Receiver<()>> {
    let name = session.bound_ups.as_ref()?;
    let handle = state.registry.get(name).await?;
    Some(handle.kick.subscribe())
}

async fn wait_for_kick(kick: Option<broadcast::Receiver<()>>) {
    match kick {
        Some(mut rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending().await,
    }
}

/// Swap the plain stream for a TLS one, preserving the tokenizer's mid-line
/// state across the handshake boundary (there should be none, since
/// `STARTTLS` is only ever the sole token on its line, but `LineLink::new`
/// always starts a fresh [`crate::protocol::Tokenizer`] regardless).
async fn upgrade_to_tls(link: LineLink<Conn>, state: &Arc<SharedState>) -> std::io::Result<LineLink<Conn>> {
    let Conn::Plain(stream) = link.into_inner() else {
        return Err(std::io::Error::new(std::io::ErrorKind::Other, "STARTTLS requested on an already-upgraded connection"));
    };
    let material = state
        .tls
        .read()
        .await
        .clone()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "TLS not configured"))?;
    let tls_stream = material.acceptor.accept(stream).await?;
    Ok(LineLink::new(Conn::Tls(Box::new(tls_stream))))
}

async fn cleanup(session: &ClientSession, state: &Arc<SharedState>) {
    if let Some(ups_name) = &session.bound_ups {
        if let Some(handle) = state.registry.get(ups_name).await {
            let mut entry = handle.entry.write().await;
            entry.numlogins = entry.numlogins.saturating_sub(1);
        }
    }
}
