// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ups.conf`: one `[name]` section per UPS, each with `driver`, `port`,
//! `desc` key/value lines (spec.md §6).

use std::path::Path;

use crate::error::StartupError;
use crate::protocol::tokenize_line;

#[derive(Debug, Clone)]
pub struct UpsConfEntry {
    pub name: String,
    pub driver: String,
    pub port: String,
    pub desc: String,
}

pub fn load(path: &Path) -> Result<Vec<UpsConfEntry>, StartupError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StartupError::ConfigRead { path: path.display().to_string(), source: e }),
    };

    let file = path.display().to_string();
    let mut entries = Vec::new();
    let mut current: Option<(String, String, String, String)> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some((name, driver, port, desc)) = current.take() {
                entries.push(UpsConfEntry { name, driver, port, desc });
            }
            current = Some((name.to_owned(), String::new(), String::new(), String::new()));
            continue;
        }

        let Some((_, driver, port, desc)) = current.as_mut() else {
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
        let value = rest.join(" ");

        match key.to_ascii_lowercase().as_str() {
            "driver" => *driver = value,
            "port" => *port = value,
            "desc" => *desc = value,
            other => {
                tracing::warn!(key = other, line = lineno + 1, "unrecognised ups.conf key, ignored");
            }
        }
    }

    if let Some((name, driver, port, desc)) = current.take() {
        entries.push(UpsConfEntry { name, driver, port, desc });
    }

    Ok(entries)
}
