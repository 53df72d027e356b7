// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-protocol error codes and process-level startup errors.

use std::fmt;

/// The closed set of `ERR <code>` values the client protocol may return
/// (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrCode {
    AccessDenied,
    UnknownCommand,
    InvalidArgument,
    DataStale,
    DriverNotConnected,
    UsernameRequired,
    PasswordRequired,
    AlreadyLoggedIn,
    AlreadySetUsername,
    AlreadySetPassword,
    InvalidValue,
    SetFailed,
    UnknownUps,
    UnknownVar,
    FeatureNotSupported,
    FeatureNotConfigured,
    TlsAlreadyStarted,
    TlsNotEnabled,
}

impl ErrCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS-DENIED",
            Self::UnknownCommand => "UNKNOWN-COMMAND",
            Self::InvalidArgument => "INVALID-ARGUMENT",
            Self::DataStale => "DATA-STALE",
            Self::DriverNotConnected => "DRIVER-NOT-CONNECTED",
            Self::UsernameRequired => "USERNAME-REQUIRED",
            Self::PasswordRequired => "PASSWORD-REQUIRED",
            Self::AlreadyLoggedIn => "ALREADY-LOGGED-IN",
            Self::AlreadySetUsername => "ALREADY-SET-USERNAME",
            Self::AlreadySetPassword => "ALREADY-SET-PASSWORD",
            Self::InvalidValue => "INVALID-VALUE",
            Self::SetFailed => "SET-FAILED",
            Self::UnknownUps => "UNKNOWN-UPS",
            Self::UnknownVar => "UNKNOWN-VAR",
            Self::FeatureNotSupported => "FEATURE-NOT-SUPPORTED",
            Self::FeatureNotConfigured => "FEATURE-NOT-CONFIGURED",
            Self::TlsAlreadyStarted => "TLS-ALREADY-STARTED",
            Self::TlsNotEnabled => "TLS-NOT-ENABLED",
        }
    }
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal startup failures (spec.md §7 tier 3). Each variant maps to exit
/// code 1; `main` logs it and exits rather than unwinding.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead { path: String, source: std::io::Error },

    #[error("failed to parse {file} line {line}: {message}")]
    ConfigParse { file: String, line: usize, message: String },

    #[error("no UPSes defined in ups.conf")]
    NoUpsDefined,

    #[error("failed to bind listener {addr}: {source}")]
    ListenerBind { addr: String, source: std::io::Error },

    #[error("invalid command line: {0}")]
    InvalidCli(String),

    #[error("failed to load TLS material: {0}")]
    Tls(String),
}
