// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `upsd.users`: per-user `[name]` blocks with `password`, `actions`,
//! `instcmds`, and `upsmon primary|secondary` (spec.md §6).

use std::path::Path;

use crate::error::StartupError;
use crate::protocol::tokenize_line;
use crate::users::{User, UserTable};

pub fn load(path: &Path) -> Result<UserTable, StartupError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UserTable::new()),
        Err(e) => return Err(StartupError::ConfigRead { path: path.display().to_string(), source: e }),
    };

    let file = path.display().to_string();
    let mut table = UserTable::new();
    let mut current: Option<User> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(user) = current.take() {
                table.insert(user);
            }
            current = Some(User::new(name, ""));
            continue;
        }

        let Some(user) = current.as_mut() else {
            return Err(StartupError::ConfigParse {
                file,
                line: lineno + 1,
                message: "key/value line outside any [section]".to_owned(),
            });
        };

        let normalized = trimmed.replacen('=', " ", 1);
        let tokens = tokenize_line(&normalized)
            .map_err(|message| StartupError::ConfigParse { file: file.clone(), line: lineno + 1, message })?;
        let Some((key, rest)) = tokens.split_first() else { continue };

        match key.to_ascii_lowercase().as_str() {
            "password" => {
                user.secret = rest.first().cloned().unwrap_or_default();
            }
            "actions" => {
                for action in rest {
                    match action.to_ascii_uppercase().as_str() {
                        "SET" => user.can_set_variable = true,
                        "FSD" => user.can_primary = true,
                        "ADMIN" => user.is_admin = true,
                        "READ-ANY" | "READANY" => user.can_read_any = true,
                        other => {
                            tracing::warn!(action = other, line = lineno + 1, "unrecognised user action, ignored");
                        }
                    }
                }
            }
            "instcmds" => {
                for pattern in rest {
                    if pattern.eq_ignore_ascii_case("all") {
                        user.instcmd_globs.push("*".to_owned());
                    } else {
                        user.instcmd_globs.push(pattern.clone());
                    }
                }
            }
            "upsmon" => match rest.first().map(|s| s.to_ascii_lowercase()) {
                Some(role) if role == "primary" || role == "master" => user.can_primary = true,
                Some(role) if role == "secondary" || role == "slave" => {}
                _ => {
                    tracing::warn!(line = lineno + 1, "upsmon directive missing primary|secondary role");
                }
            },
            other => {
                tracing::warn!(key = other, line = lineno + 1, "unrecognised upsd.users key, ignored");
            }
        }
    }

    if let Some(user) = current.take() {
        table.insert(user);
    }

    // Every authenticated user may read; there is no distinct "no read"
    // tier in the command set, so this is always granted once logged in.
    Ok(table)
}
