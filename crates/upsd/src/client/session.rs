// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection state machine (spec.md §4.4).

use std::net::IpAddr;
use std::time::Instant;

/// Authentication progress. `STARTTLS`/`BOUND`/`PRIMARY` are orthogonal
/// flags tracked separately on [`ClientSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anon,
    UserSet,
    AuthSet,
    Authed,
}

pub struct ClientSession {
    pub peer_addr: String,
    pub peer_ip: IpAddr,
    pub auth: AuthState,
    pub tls_active: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bound_ups: Option<String>,
    pub primary: bool,
    pub tracking_enabled: bool,
    pub last_heard: Instant,
    /// `(ups, tracking id)` pairs this session is waiting to hear resolved,
    /// so the handler loop can push an unsolicited `TRACKING <id> <status>`
    /// line once the driver reports completion (spec.md §5: "correlations
    /// ... emitted whenever the driver reports them").
    pub pending_tracking: Vec<(String, u64)>,
}

impl ClientSession {
    pub fn new(peer_addr: String, peer_ip: IpAddr) -> Self {
        Self {
            peer_addr,
            peer_ip,
            auth: AuthState::Anon,
            tls_active: false,
            username: None,
            password: None,
            bound_ups: None,
            primary: false,
            tracking_enabled: true,
            last_heard: Instant::now(),
            pending_tracking: Vec::new(),
        }
    }

    pub fn set_username(&mut self, name: String) -> bool {
        if self.username.is_some() {
            return false;
        }
        self.username = Some(name);
        self.advance();
        true
    }

    pub fn set_password(&mut self, secret: String) -> bool {
        if self.password.is_some() {
            return false;
        }
        self.password = Some(secret);
        self.advance();
        true
    }

    /// Re-derive `auth` from which of username/password are set, then mark
    /// `Authed` once both are present (Open Question (a): a later `PASSWORD`
    /// after `USERNAME` still completes authentication).
    fn advance(&mut self) {
        self.auth = match (&self.username, &self.password) {
            (None, None) => AuthState::Anon,
            (Some(_), None) => AuthState::UserSet,
            (None, Some(_)) => AuthState::AuthSet,
            (Some(_), Some(_)) => AuthState::Authed,
        };
    }

    pub fn is_authed(&self) -> bool {
        self.auth == AuthState::Authed
    }

    pub fn touch(&mut self) {
        self.last_heard = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_heard.elapsed()
    }
}
