// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The user database (spec.md §3 component H): username/secret pairs plus
//! the set of actions each user is permitted to invoke.

use std::collections::HashMap;

/// Constant-time comparison, to keep password checks from leaking timing
/// information about how many leading bytes matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Case-sensitive glob match supporting `*` (any run, including empty) and
/// `?` (exactly one byte), as used by `upsd.users`'s `instcmds` lists (e.g.
/// `test.*`).
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p: Vec<u8> = pattern.bytes().collect();
    let c: Vec<u8> = candidate.bytes().collect();
    match_from(&p, &c)
}

fn match_from(p: &[u8], c: &[u8]) -> bool {
    match p.first() {
        None => c.is_empty(),
        Some(b'*') => match_from(&p[1..], c) || (!c.is_empty() && match_from(p, &c[1..])),
        Some(b'?') => !c.is_empty() && match_from(&p[1..], &c[1..]),
        Some(&ch) => c.first() == Some(&ch) && match_from(&p[1..], &c[1..]),
    }
}

/// One `upsd.users` block.
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub secret: String,
    pub can_read_any: bool,
    pub can_set_variable: bool,
    pub instcmd_globs: Vec<String>,
    pub can_primary: bool,
    pub is_admin: bool,
}

impl User {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            can_read_any: false,
            can_set_variable: false,
            instcmd_globs: Vec::new(),
            can_primary: false,
            is_admin: false,
        }
    }

    pub fn secret_matches(&self, candidate: &str) -> bool {
        constant_time_eq(&self.secret, candidate)
    }

    pub fn permits_instcmd(&self, cmd: &str) -> bool {
        self.instcmd_globs.iter().any(|g| glob_match(g, cmd))
    }
}

/// Actions a command handler may require of the authenticated user before
/// running (spec.md §4.4 dispatcher flag checks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadAny,
    SetVariable,
    Primary,
    Admin,
}

/// Snapshot of `upsd.users`, swapped in atomically on reload (spec.md §4.6:
/// "the user database is replaced atomically").
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: HashMap<String, User>,
}

impl UserTable {
    pub fn new() -> Self {
        Self { users: HashMap::new() }
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.username.clone(), user);
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<&User> {
        let user = self.users.get(username)?;
        if user.secret_matches(password) {
            Some(user)
        } else {
            None
        }
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    pub fn permits(&self, user: &User, action: Action) -> bool {
        match action {
            Action::ReadAny => user.can_read_any,
            Action::SetVariable => user.can_set_variable,
            Action::Primary => user.can_primary,
            Action::Admin => user.is_admin,
        }
    }
}
