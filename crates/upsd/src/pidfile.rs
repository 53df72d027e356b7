// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pidfile read/write and `-c reload|stop` control signalling
//! (spec.md §6 CLI).

use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::config::ControlCommand;

pub fn write(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", std::process::id()))
}

pub fn remove(path: &Path) {
    let _ = std::fs::remove_file(path);
}

fn read(path: &Path) -> std::io::Result<Pid> {
    let text = std::fs::read_to_string(path)?;
    let pid: i32 = text
        .trim()
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "pidfile does not contain a PID"))?;
    Ok(Pid::from_raw(pid))
}

/// Send the signal corresponding to `-c reload|stop` to the instance named
/// by `pidfile`.
pub fn send_control(pidfile: &Path, command: ControlCommand) -> std::io::Result<()> {
    let pid = read(pidfile)?;
    let signal = match command {
        ControlCommand::Reload => Signal::SIGHUP,
        ControlCommand::Stop => Signal::SIGTERM,
    };
    kill(pid, signal).map_err(|e| std::io::Error::from_raw_os_error(e as i32))
}
