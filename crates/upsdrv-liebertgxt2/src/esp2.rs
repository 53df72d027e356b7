// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Liebert GXT2 ESP2 serial protocol: fixed 6-byte commands answered by
//! checksummed 8-byte replies. Ported from `liebertgxt2.c`'s `do_command`,
//! `upsdrv_initinfo`, and `upsdrv_updateinfo`.

use std::io::{Read, Write};

use thiserror::Error;

/// A duplex byte transport to the UPS. Implemented by [`crate::serial`] for
/// a real tty; tests implement it over an in-memory buffer pair.
pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

#[derive(Debug, Error)]
pub enum Esp2Error {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reply truncated: got {0} of 8 bytes")]
    Truncated(usize),
    #[error("reply checksum mismatch")]
    BadChecksum,
}

fn checksum(buf: &[u8]) -> u8 {
    buf.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Send a 6-byte command (whose last byte must already be the checksum of
/// the first five) and wait for its checksummed 8-byte reply.
pub fn do_command(port: &mut dyn Transport, command: [u8; 6]) -> Result<[u8; 8], Esp2Error> {
    port.write_all(&command)?;

    let mut reply = [0u8; 8];
    port.read_exact(&mut reply).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Esp2Error::Truncated(0)
        } else {
            Esp2Error::Io(e)
        }
    })?;

    if reply[7] != checksum(&reply[..7]) {
        return Err(Esp2Error::BadChecksum);
    }

    Ok(reply)
}

/// Build the `{1,136,2,1,n+4}` identification-string command used by
/// `upsdrv_initinfo` to read one 2-byte chunk of the `ups.mfr/model/serial`
/// blob at index `n`.
pub fn ident_command(n: u8) -> [u8; 6] {
    let mut cmd = [1, 0x88, 2, 1, n + 4, 0];
    cmd[5] = checksum(&cmd[..5]);
    cmd
}

/// One polled telemetry value: the 6-byte command to send, the variable it
/// fills in, and the scale factor applied to the reply's big-endian 16-bit
/// payload (`reply[5]` high byte, `reply[6]` low byte).
pub struct TelemetryPoint {
    pub command: [u8; 6],
    pub var: &'static str,
    pub scale: f64,
    pub decimals: usize,
}

fn cmd(bytes: [u8; 5]) -> [u8; 6] {
    let mut full = [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], 0];
    full[5] = checksum(&full[..5]);
    full
}

/// `upsdrv_updateinfo`'s `vartab`.
pub fn telemetry_table() -> Vec<TelemetryPoint> {
    vec![
        TelemetryPoint { command: cmd([1, 149, 2, 1, 4]), var: "battery.charge", scale: 1.0, decimals: 0 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 1]), var: "battery.runtime", scale: 60.0, decimals: 0 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 2]), var: "battery.voltage", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 3]), var: "battery.current", scale: 0.01, decimals: 2 },
        TelemetryPoint { command: cmd([1, 161, 2, 1, 13]), var: "battery.voltage.nominal", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 7]), var: "ups.load", scale: 1.0, decimals: 0 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 6]), var: "ups.power", scale: 1.0, decimals: 0 },
        TelemetryPoint { command: cmd([1, 161, 2, 1, 8]), var: "ups.power.nominal", scale: 1.0, decimals: 0 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 5]), var: "ups.realpower", scale: 1.0, decimals: 0 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 14]), var: "ups.temperature", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 144, 2, 1, 1]), var: "input.voltage", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 8]), var: "input.frequency", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 10]), var: "input.frequency.nominal", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 144, 2, 1, 5]), var: "input.bypass.voltage", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 144, 2, 1, 3]), var: "output.voltage", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 149, 2, 1, 9]), var: "output.frequency", scale: 0.1, decimals: 1 },
        TelemetryPoint { command: cmd([1, 144, 2, 1, 4]), var: "output.current", scale: 0.1, decimals: 1 },
    ]
}

/// Decode a telemetry reply's signed 16-bit big-endian payload (`reply[5..7]`).
pub fn decode_reading(reply: &[u8; 8]) -> i16 {
    i16::from_be_bytes([reply[5], reply[6]])
}

pub fn format_reading(point: &TelemetryPoint, reply: &[u8; 8]) -> String {
    let raw = decode_reading(reply) as f64;
    format!("{:.*}", point.decimals, raw * point.scale)
}

/// `vartab` in `upsdrv_initinfo`: the dstate keys filled in, in order, by
/// [`read_identification`]'s whitespace-separated tokens.
pub const IDENTIFICATION_VARS: [&str; 4] = ["ups.model", "ups.firmware", "ups.serial", "ups.mfr.date"];

/// Read the UPS's 37-chunk identification blob and split it into the four
/// `IDENTIFICATION_VARS` fields. Stops early (as the C driver does) the
/// moment a chunk read fails; returns as many leading fields as the blob's
/// tokens cover.
pub fn read_identification(port: &mut dyn Transport) -> Result<Vec<String>, Esp2Error> {
    let mut buf = String::new();
    for n in 0..37u8 {
        let reply = match do_command(port, ident_command(n)) {
            Ok(reply) => reply,
            Err(_) => break,
        };
        buf.push(reply[6] as char);
        buf.push(reply[5] as char);
    }
    Ok(buf.split_whitespace().take(IDENTIFICATION_VARS.len()).map(str::to_owned).collect())
}

pub const BITFIELD_1: [u8; 5] = [1, 148, 2, 1, 1];
pub const BITFIELD_2: [u8; 5] = [1, 148, 2, 1, 2];
pub const BITFIELD_3: [u8; 5] = [1, 148, 2, 1, 3];

pub fn bitfield_command(bytes: [u8; 5]) -> [u8; 6] {
    cmd(bytes)
}

/// Fold the three status bitfields into NUT-style `ups.status` tokens
/// (`upsdrv_updateinfo`'s `status_set` calls).
pub fn decode_status(bitfield1: &[u8; 8], bitfield2: &[u8; 8], bitfield3: &[u8; 8], battery_current: Option<f64>) -> Vec<&'static str> {
    let mut status = Vec::new();

    if bitfield1[5] & 1 != 0 {
        status.push("OB");
    } else {
        status.push("OL");
    }

    if let Some(current) = battery_current {
        if current > 0.05 {
            status.push("CHRG");
        }
        if current < -0.05 {
            status.push("DISCHRG");
        }
    }

    if bitfield2[6] & (1 << 0) != 0 {
        status.push("BYPASS");
    }
    if bitfield2[6] & (1 << 5) != 0 {
        status.push("RB");
    }
    if bitfield2[6] & (1 << 6) != 0 {
        status.push("BOOST");
    }
    if bitfield2[5] & (1 << 1) != 0 {
        status.push("TRIM");
    }

    if bitfield3[6] & (1 << 0) != 0 {
        status.push("OVER");
    }
    if bitfield3[6] & (1 << 5) != 0 {
        status.push("LB");
    }

    status
}
