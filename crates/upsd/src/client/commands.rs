// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The command table (spec.md §9: "command table is data, not code") and
//! its handlers. Dispatch correctness is tested here in isolation, against
//! a [`SharedState`] built in-process, independent of any live socket.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::daemon::{self, SharedState};
use crate::error::ErrCode;
use crate::users::Action;

use super::session::ClientSession;

/// What a dispatched command asks the caller (`client::handler`) to do
/// besides writing `lines` back to the socket.
#[derive(Debug, Default)]
pub struct Dispatched {
    pub lines: Vec<String>,
    pub close: bool,
    pub starttls: bool,
}

impl Dispatched {
    fn ok() -> Self {
        Self { lines: vec!["OK".to_owned()], ..Default::default() }
    }

    fn line(line: impl Into<String>) -> Self {
        Self { lines: vec![line.into()], ..Default::default() }
    }

    fn err(code: ErrCode) -> Self {
        Self { lines: vec![format!("ERR {code}")], ..Default::default() }
    }

    fn multi(lines: Vec<String>) -> Self {
        Self { lines, ..Default::default() }
    }
}

bitflags::bitflags! {
    /// Per-command requirement bits, checked by [`dispatch`] before the
    /// handler ever runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const NONE = 0;
        /// Caller must have completed `USERNAME` + `PASSWORD`.
        const USER = 1 << 0;
    }
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Dispatched> + Send + 'a>>;
type HandlerFn = for<'a> fn(&'a mut ClientSession, &'a Arc<SharedState>, &'a [String]) -> HandlerFuture<'a>;

pub struct CommandSpec {
    pub name: &'static str,
    pub flags: Flags,
    pub handler: HandlerFn,
}

/// Ordered command table. Case-insensitive match on the first token of a
/// client line; first match wins (names are unique so order does not
/// otherwise matter).
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "HELP", flags: Flags::NONE, handler: |s, st, a| Box::pin(help(s, st, a)) },
    CommandSpec { name: "VER", flags: Flags::NONE, handler: |s, st, a| Box::pin(ver(s, st, a)) },
    CommandSpec { name: "NETVER", flags: Flags::NONE, handler: |s, st, a| Box::pin(netver(s, st, a)) },
    CommandSpec { name: "USERNAME", flags: Flags::NONE, handler: |s, st, a| Box::pin(username(s, st, a)) },
    CommandSpec { name: "PASSWORD", flags: Flags::NONE, handler: |s, st, a| Box::pin(password(s, st, a)) },
    CommandSpec { name: "STARTTLS", flags: Flags::NONE, handler: |s, st, a| Box::pin(starttls(s, st, a)) },
    CommandSpec { name: "LIST", flags: Flags::USER, handler: |s, st, a| Box::pin(list(s, st, a)) },
    CommandSpec { name: "GET", flags: Flags::USER, handler: |s, st, a| Box::pin(get(s, st, a)) },
    CommandSpec { name: "LOGIN", flags: Flags::USER, handler: |s, st, a| Box::pin(login(s, st, a)) },
    CommandSpec { name: "LOGOUT", flags: Flags::NONE, handler: |s, st, a| Box::pin(logout(s, st, a)) },
    CommandSpec { name: "PRIMARY", flags: Flags::USER, handler: |s, st, a| Box::pin(primary(s, st, a)) },
    CommandSpec { name: "MASTER", flags: Flags::USER, handler: |s, st, a| Box::pin(primary(s, st, a)) },
    CommandSpec { name: "FSD", flags: Flags::USER, handler: |s, st, a| Box::pin(fsd(s, st, a)) },
    CommandSpec { name: "SET", flags: Flags::USER, handler: |s, st, a| Box::pin(set(s, st, a)) },
    CommandSpec { name: "INSTCMD", flags: Flags::USER, handler: |s, st, a| Box::pin(instcmd(s, st, a)) },
];

/// Dispatch one already-tokenized client line. `tokens[0]` is the verb;
/// `tokens[1..]` are its arguments. Enforces the flag checks spec.md §4.5
/// lists by name (`USERNAME-REQUIRED`, `PASSWORD-REQUIRED`,
/// `ACCESS-DENIED`) before invoking the matched handler, and consults the
/// host ACL ahead of any authenticated handler.
pub async fn dispatch(session: &mut ClientSession, state: &Arc<SharedState>, tokens: &[String]) -> Dispatched {
    let Some((verb, args)) = tokens.split_first() else {
        return Dispatched::default();
    };
    let verb = verb.to_ascii_uppercase();

    let Some(spec) = COMMANDS.iter().find(|c| c.name == verb) else {
        return Dispatched::err(ErrCode::UnknownCommand);
    };

    if spec.flags.contains(Flags::USER) {
        if session.username.is_none() {
            return Dispatched::err(ErrCode::UsernameRequired);
        }
        if session.password.is_none() {
            return Dispatched::err(ErrCode::PasswordRequired);
        }
        if !session.is_authed() {
            return Dispatched::err(ErrCode::AccessDenied);
        }
        if !state.acl.read().await.allows(session.peer_ip) {
            return Dispatched::err(ErrCode::AccessDenied);
        }
    }

    (spec.handler)(session, state, args).await
}

/// Look up the authenticated user this session claims to be, re-checking
/// the secret against the live (possibly reloaded) user table rather than
/// trusting a cached reference.
async fn current_user(session: &ClientSession, state: &Arc<SharedState>) -> Option<crate::users::User> {
    let username = session.username.as_deref()?;
    let password = session.password.as_deref()?;
    state.users.read().await.authenticate(username, password).cloned()
}

fn help<'a>(_s: &'a mut ClientSession, _st: &'a Arc<SharedState>, _a: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        Dispatched::line(
            "Commands: HELP VER NETVER LIST GET SET INSTCMD LOGIN LOGOUT USERNAME PASSWORD STARTTLS PRIMARY MASTER FSD",
        )
    }
}

fn ver<'a>(_s: &'a mut ClientSession, _st: &'a Arc<SharedState>, _a: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move { Dispatched::line(format!("Network UPS Tools upsd {}", daemon::VERSION)) }
}

fn netver<'a>(_s: &'a mut ClientSession, _st: &'a Arc<SharedState>, _a: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move { Dispatched::line(daemon::PROTOCOL_VERSION) }
}

fn username<'a>(session: &'a mut ClientSession, _st: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some(name) = args.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        if session.set_username(name.clone()) {
            Dispatched::ok()
        } else {
            Dispatched::err(ErrCode::AlreadySetUsername)
        }
    }
}

fn password<'a>(session: &'a mut ClientSession, _st: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some(secret) = args.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        if session.set_password(secret.clone()) {
            Dispatched::ok()
        } else {
            Dispatched::err(ErrCode::AlreadySetPassword)
        }
    }
}

fn starttls<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, _a: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        if session.tls_active {
            return Dispatched::err(ErrCode::TlsAlreadyStarted);
        }
        if state.tls.read().await.is_none() {
            return Dispatched::err(ErrCode::TlsNotEnabled);
        }
        Dispatched { lines: vec!["OK STARTTLS".to_owned()], close: false, starttls: true }
    }
}

fn login<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some(ups_name) = args.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        if session.bound_ups.is_some() {
            return Dispatched::err(ErrCode::AlreadyLoggedIn);
        }
        let Some(handle) = state.registry.get(ups_name).await else {
            return Dispatched::err(ErrCode::UnknownUps);
        };
        handle.entry.write().await.numlogins += 1;
        session.bound_ups = Some(ups_name.clone());
        Dispatched::ok()
    }
}

fn logout<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, _a: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        if let Some(ups_name) = session.bound_ups.take() {
            if let Some(handle) = state.registry.get(&ups_name).await {
                let mut entry = handle.entry.write().await;
                entry.numlogins = entry.numlogins.saturating_sub(1);
            }
        }
        Dispatched { lines: vec!["OK Goodbye".to_owned()], close: true, starttls: false }
    }
}

fn primary<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some(ups_name) = args.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let Some(user) = current_user(session, state).await else { return Dispatched::err(ErrCode::AccessDenied) };
        if !state.users.read().await.permits(&user, Action::Primary) {
            return Dispatched::err(ErrCode::AccessDenied);
        }
        if state.registry.get(ups_name).await.is_none() {
            return Dispatched::err(ErrCode::UnknownUps);
        }
        session.primary = true;
        Dispatched::ok()
    }
}

fn fsd<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some(ups_name) = args.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let Some(user) = current_user(session, state).await else { return Dispatched::err(ErrCode::AccessDenied) };
        if !state.users.read().await.permits(&user, Action::Primary) {
            return Dispatched::err(ErrCode::AccessDenied);
        }
        let Some(handle) = state.registry.get(ups_name).await else {
            return Dispatched::err(ErrCode::UnknownUps);
        };
        let mut entry = handle.entry.write().await;
        entry
            .variables
            .entry("server.flag.fsd".to_owned())
            .or_insert_with(|| crate::ups::VariableDescriptor::shell("server.flag.fsd"))
            .value = "1".to_owned();
        Dispatched::ok()
    }
}

fn list<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some((sub, rest)) = args.split_first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let sub = sub.to_ascii_uppercase();

        if sub == "UPS" {
            let rows: Vec<String> = state
                .registry
                .list_names()
                .await
                .into_iter()
                .map(|(name, desc)| format!("UPS {name} \"{desc}\""))
                .collect();
            return wrap_list("UPS", "", &rows);
        }

        let Some(ups_name) = rest.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let Some(handle) = state.registry.get(ups_name).await else {
            return Dispatched::err(ErrCode::UnknownUps);
        };
        let entry = handle.entry.read().await;
        if let Err(code) = entry.available() {
            return Dispatched::err(code);
        }

        match sub.as_str() {
            "VAR" => {
                let rows: Vec<String> = entry
                    .variables
                    .values()
                    .map(|v| format!("VAR {ups_name} {} \"{}\"", v.name, v.value))
                    .collect();
                wrap_list("VAR", ups_name, &rows)
            }
            "RW" => {
                let rows: Vec<String> = entry
                    .variables
                    .values()
                    .filter(|v| v.writable)
                    .map(|v| format!("RW {ups_name} {} \"{}\"", v.name, v.value))
                    .collect();
                wrap_list("RW", ups_name, &rows)
            }
            "CMD" => {
                let rows: Vec<String> = entry.commands.iter().map(|c| format!("CMD {ups_name} {c}")).collect();
                wrap_list("CMD", ups_name, &rows)
            }
            "ENUM" => {
                let Some(var) = rest.get(1) else { return Dispatched::err(ErrCode::InvalidArgument) };
                let Some(desc) = entry.variables.get(var) else { return Dispatched::err(ErrCode::UnknownVar) };
                let rows: Vec<String> =
                    desc.enum_values.iter().map(|v| format!("ENUM {ups_name} {var} \"{v}\"")).collect();
                wrap_list("ENUM", &format!("{ups_name} {var}"), &rows)
            }
            "RANGE" => {
                let Some(var) = rest.get(1) else { return Dispatched::err(ErrCode::InvalidArgument) };
                let Some(desc) = entry.variables.get(var) else { return Dispatched::err(ErrCode::UnknownVar) };
                let rows: Vec<String> =
                    desc.ranges.iter().map(|r| format!("RANGE {ups_name} {var} \"{}\" \"{}\"", r.min, r.max)).collect();
                wrap_list("RANGE", &format!("{ups_name} {var}"), &rows)
            }
            "CLIENT" => {
                // No per-session IP roster is kept on the UPS record itself;
                // only the login counter is. Represent each logged-in
                // session by an opaque placeholder row count instead of
                // fabricating addresses we don't track.
                let rows: Vec<String> = (0..entry.numlogins).map(|_| format!("CLIENT {ups_name} <unknown>")).collect();
                wrap_list("CLIENT", ups_name, &rows)
            }
            _ => Dispatched::err(ErrCode::InvalidArgument),
        }
    }
}

fn wrap_list(kind: &str, suffix: &str, rows: &[String]) -> Dispatched {
    let header = if suffix.is_empty() { format!("BEGIN LIST {kind}") } else { format!("BEGIN LIST {kind} {suffix}") };
    let footer = if suffix.is_empty() { format!("END LIST {kind}") } else { format!("END LIST {kind} {suffix}") };
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(header);
    lines.extend_from_slice(rows);
    lines.push(footer);
    Dispatched::multi(lines)
}

fn get<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some((sub, rest)) = args.split_first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let sub = sub.to_ascii_uppercase();

        if sub == "TRACKING" {
            let Some(id_str) = rest.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
            let Ok(id) = id_str.parse::<u64>() else { return Dispatched::line("INVALID-ARGUMENT") };
            for handle in state.registry.all_handles().await {
                if let Some(status) = handle.entry.read().await.tracking.get(id) {
                    return Dispatched::line(status.as_str());
                }
            }
            return Dispatched::line("UNKNOWN");
        }

        let Some(ups_name) = rest.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let Some(handle) = state.registry.get(ups_name).await else {
            return Dispatched::err(ErrCode::UnknownUps);
        };
        let entry = handle.entry.read().await;

        match sub.as_str() {
            "NUMLOGINS" => Dispatched::line(format!("NUMLOGINS {ups_name} {}", entry.numlogins)),
            "UPSDESC" => Dispatched::line(format!("UPSDESC {ups_name} \"{}\"", entry.desc)),
            "VAR" => {
                if let Err(code) = entry.available() {
                    return Dispatched::err(code);
                }
                let Some(var) = rest.get(1) else { return Dispatched::err(ErrCode::InvalidArgument) };
                let Some(desc) = entry.variables.get(var) else { return Dispatched::err(ErrCode::UnknownVar) };
                Dispatched::line(format!("VAR {ups_name} {var} \"{}\"", desc.value))
            }
            "TYPE" => {
                let Some(var) = rest.get(1) else { return Dispatched::err(ErrCode::InvalidArgument) };
                let Some(desc) = entry.variables.get(var) else { return Dispatched::err(ErrCode::UnknownVar) };
                let mut flags = Vec::new();
                if desc.writable {
                    flags.push("RW".to_owned());
                }
                flags.push(match desc.var_type {
                    crate::ups::VarType::String => match desc.display_len {
                        Some(len) => format!("STRING:{len}"),
                        None => "STRING".to_owned(),
                    },
                    other => other.as_str().to_owned(),
                });
                Dispatched::line(format!("TYPE {ups_name} {var} {}", flags.join(" ")))
            }
            "DESC" => {
                let Some(var) = rest.get(1) else { return Dispatched::err(ErrCode::InvalidArgument) };
                if !entry.variables.contains_key(var) {
                    return Dispatched::err(ErrCode::UnknownVar);
                }
                Dispatched::line(format!("DESC {ups_name} {var} \"{var}\""))
            }
            "CMDDESC" => {
                let Some(cmd) = rest.get(1) else { return Dispatched::err(ErrCode::InvalidArgument) };
                if !entry.commands.contains(cmd) {
                    return Dispatched::err(ErrCode::UnknownCommand);
                }
                let desc = entry.command_descriptions.get(cmd).cloned().unwrap_or_else(|| cmd.clone());
                Dispatched::line(format!("CMDDESC {ups_name} {cmd} \"{desc}\""))
            }
            "RANGE" => {
                let Some(var) = rest.get(1) else { return Dispatched::err(ErrCode::InvalidArgument) };
                let Some(desc) = entry.variables.get(var) else { return Dispatched::err(ErrCode::UnknownVar) };
                let Some(range) = desc.ranges.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
                Dispatched::line(format!("RANGE {ups_name} {var} \"{}\" \"{}\"", range.min, range.max))
            }
            _ => Dispatched::err(ErrCode::InvalidArgument),
        }
    }
}

fn set<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let [sub, ups_name, var, value, ..] = args else { return Dispatched::err(ErrCode::InvalidArgument) };
        if sub.to_ascii_uppercase() != "VAR" {
            return Dispatched::err(ErrCode::InvalidArgument);
        }

        let Some(user) = current_user(session, state).await else { return Dispatched::err(ErrCode::AccessDenied) };
        if !state.users.read().await.permits(&user, Action::SetVariable) {
            return Dispatched::err(ErrCode::AccessDenied);
        }

        let Some(handle) = state.registry.get(ups_name).await else {
            return Dispatched::err(ErrCode::UnknownUps);
        };

        let id = {
            let mut entry = handle.entry.write().await;
            if !entry.connected {
                return Dispatched::err(ErrCode::DriverNotConnected);
            }
            let Some(desc) = entry.variables.get(var) else { return Dispatched::err(ErrCode::UnknownVar) };
            if let Err(code) = desc.validate(value) {
                return Dispatched::err(code);
            }
            entry.tracking.reserve()
        };

        let _ = handle.cmd_tx.send(vec!["SET".to_owned(), var.clone(), value.clone(), id.to_string()]);

        if session.tracking_enabled {
            session.pending_tracking.push((ups_name.clone(), id));
            Dispatched::ok_tracking(id)
        } else {
            Dispatched::ok()
        }
    }
}

fn instcmd<'a>(session: &'a mut ClientSession, state: &'a Arc<SharedState>, args: &'a [String]) -> impl Future<Output = Dispatched> + Send + 'a {
    async move {
        let Some((ups_name, rest)) = args.split_first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let Some(cmd) = rest.first() else { return Dispatched::err(ErrCode::InvalidArgument) };
        let param = rest.get(1);

        let Some(user) = current_user(session, state).await else { return Dispatched::err(ErrCode::AccessDenied) };
        if !user.permits_instcmd(cmd) {
            return Dispatched::err(ErrCode::AccessDenied);
        }

        let Some(handle) = state.registry.get(ups_name).await else {
            return Dispatched::err(ErrCode::UnknownUps);
        };

        let id = {
            let mut entry = handle.entry.write().await;
            if !entry.connected {
                return Dispatched::err(ErrCode::DriverNotConnected);
            }
            if !entry.commands.contains(cmd) {
                return Dispatched::err(ErrCode::UnknownCommand);
            }
            entry.tracking.reserve()
        };

        let mut relay = vec!["INSTCMD".to_owned(), cmd.clone(), id.to_string()];
        if let Some(p) = param {
            relay.push(p.clone());
        }
        let _ = handle.cmd_tx.send(relay);

        if session.tracking_enabled {
            session.pending_tracking.push((ups_name.clone(), id));
            Dispatched::ok_tracking(id)
        } else {
            Dispatched::ok()
        }
    }
}

impl Dispatched {
    fn ok_tracking(id: u64) -> Self {
        Self { lines: vec![format!("OK TRACKING {id}")], ..Default::default() }
    }
}

/// Check every tracking id this session is still waiting on; resolved ones
/// (anything but `PENDING`) are removed from the wait list and rendered as
/// an unsolicited `TRACKING <id> <status>` line for the caller to push.
pub async fn poll_pending_tracking(session: &mut ClientSession, state: &Arc<SharedState>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut still_pending = Vec::new();

    for (ups_name, id) in std::mem::take(&mut session.pending_tracking) {
        let Some(handle) = state.registry.get(&ups_name).await else { continue };
        let status = handle.entry.read().await.tracking.get(id);
        match status {
            Some(crate::ups::TrackingStatus::Pending) => still_pending.push((ups_name, id)),
            Some(status) => lines.push(format!("TRACKING {id} {}", status.as_str())),
            None => {} // evicted from the ring before resolving; give up on it
        }
    }

    session.pending_tracking = still_pending;
    lines
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
