// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opens the tty and puts it in raw 8N1 mode at a configurable baud rate,
//! mirroring `liebertgxt2.c`'s `ser_open`/`ser_set_speed` call into NUT's
//! serial helper. `File` itself already implements `Read + Write`, so the
//! [`crate::esp2::Transport`] blanket impl covers it once configured.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::Path;

use nix::sys::termios::{self, BaudRate, SetArg};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: std::io::Error },
    #[error("unsupported baud rate {0} (supported: 1200, 2400, 4800, 9600, 19200)")]
    UnsupportedBaudRate(u32),
    #[error("termios error: {0}")]
    Termios(#[from] nix::Error),
}

fn baud_rate(bps: u32) -> Result<BaudRate, SerialError> {
    match bps {
        1200 => Ok(BaudRate::B1200),
        2400 => Ok(BaudRate::B2400),
        4800 => Ok(BaudRate::B4800),
        9600 => Ok(BaudRate::B9600),
        19200 => Ok(BaudRate::B19200),
        other => Err(SerialError::UnsupportedBaudRate(other)),
    }
}

/// Open `path` and configure it as an 8N1 raw serial line at `bps`, matching
/// the bit rates `upsdrv_makevartable`'s `baudrate` variable accepts.
pub fn open(path: &Path, bps: u32) -> Result<File, SerialError> {
    let rate = baud_rate(bps)?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| SerialError::Open { path: path.display().to_string(), source })?;

    let fd = file.as_fd();
    let mut tio = termios::tcgetattr(fd)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, rate)?;
    tio.control_flags.insert(termios::ControlFlags::CLOCAL | termios::ControlFlags::CREAD);
    tio.control_flags.remove(termios::ControlFlags::CSTOPB | termios::ControlFlags::PARENB);
    termios::tcsetattr(fd, SetArg::TCSANOW, &tio)?;

    Ok(file)
}
