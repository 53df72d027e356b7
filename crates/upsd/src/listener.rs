// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener set and accept loop (spec.md §4.3).

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client;
use crate::daemon::SharedState;
use crate::error::StartupError;

const BACKLOG: i32 = 16;

/// Bind one `LISTEN` directive with `SO_REUSEADDR`, non-blocking.
pub async fn bind(addr: &SocketAddr) -> Result<TcpListener, StartupError> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| StartupError::ListenerBind { addr: addr.to_string(), source: e })?;
    socket.set_reuse_address(true).map_err(|e| StartupError::ListenerBind { addr: addr.to_string(), source: e })?;
    socket.set_nonblocking(true).map_err(|e| StartupError::ListenerBind { addr: addr.to_string(), source: e })?;
    socket.bind(&(*addr).into()).map_err(|e| StartupError::ListenerBind { addr: addr.to_string(), source: e })?;
    socket.listen(BACKLOG).map_err(|e| StartupError::ListenerBind { addr: addr.to_string(), source: e })?;

    TcpListener::from_std(socket.into()).map_err(|e| StartupError::ListenerBind { addr: addr.to_string(), source: e })
}

/// Accept connections until `cancel` fires. Each connection is handed off
/// to its own session task; a `maxconn` permit gates the moment the session
/// actually starts servicing requests, not the kernel-level accept.
pub async fn accept_loop(listener: TcpListener, state: Arc<SharedState>, cancel: CancellationToken) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "listening");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            let permit_state = Arc::clone(&state);
                            let _permit = match permit_state.connections.acquire().await {
                                Ok(permit) => permit,
                                Err(_) => return, // semaphore closed at shutdown
                            };
                            client::handler::serve(stream, peer, state, cancel).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}
