// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::StartupError;
use crate::protocol::tokenize_line;

const DEFAULT_PORT: u16 = 3493;

#[derive(Debug, Clone)]
pub struct AclRuleConfig {
    pub spec: String,
    pub allow: bool,
}

/// Parsed `upsd.conf` (spec.md §6).
#[derive(Debug, Clone)]
pub struct UpsdConfig {
    pub maxage: u64,
    pub maxconn: Option<u64>,
    pub listen_addrs: Vec<SocketAddr>,
    pub statepath: Option<PathBuf>,
    pub certfile: Option<PathBuf>,
    pub certpath: Option<PathBuf>,
    pub certrequest: u8,
    pub disable_weak_ssl: bool,
    pub acl_rules: Vec<AclRuleConfig>,
    /// `TRACKING_TTL` directive; overrides the `-T` CLI default when set.
    pub tracking_ttl: Option<u64>,
}

impl Default for UpsdConfig {
    fn default() -> Self {
        Self {
            maxage: 15,
            maxconn: None,
            listen_addrs: vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT)],
            statepath: None,
            certfile: None,
            certpath: None,
            certrequest: 0,
            disable_weak_ssl: false,
            acl_rules: Vec::new(),
            tracking_ttl: None,
        }
    }
}

impl UpsdConfig {
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StartupError::ConfigRead { path: path.display().to_string(), source: e }),
        };

        let mut config = Self::default();
        let mut saw_listen = false;

        for (lineno, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let file = path.display().to_string();
            let tokens = tokenize_line(trimmed)
                .map_err(|message| StartupError::ConfigParse { file: file.clone(), line: lineno + 1, message })?;
            let Some((directive, args)) = tokens.split_first() else { continue };

            let parse_err = |message: &str| StartupError::ConfigParse {
                file: file.clone(),
                line: lineno + 1,
                message: message.to_owned(),
            };

            match directive.to_ascii_uppercase().as_str() {
                "MAXAGE" => {
                    config.maxage =
                        args.first().and_then(|s| s.parse().ok()).ok_or_else(|| parse_err("MAXAGE requires an integer"))?;
                }
                "MAXCONN" => {
                    config.maxconn = Some(
                        args.first().and_then(|s| s.parse().ok()).ok_or_else(|| parse_err("MAXCONN requires an integer"))?,
                    );
                }
                "LISTEN" => {
                    let host = args.first().ok_or_else(|| parse_err("LISTEN requires an address"))?;
                    let port = match args.get(1) {
                        Some(p) => p.parse().map_err(|_| parse_err("LISTEN port must be numeric"))?,
                        None => DEFAULT_PORT,
                    };
                    let ip: IpAddr = host.parse().map_err(|_| parse_err("LISTEN address must be an IP literal"))?;
                    if !saw_listen {
                        config.listen_addrs.clear();
                        saw_listen = true;
                    }
                    config.listen_addrs.push(SocketAddr::new(ip, port));
                }
                "STATEPATH" => {
                    config.statepath = args.first().map(PathBuf::from);
                }
                "CERTFILE" => {
                    config.certfile = args.first().map(PathBuf::from);
                }
                "CERTPATH" => {
                    config.certpath = args.first().map(PathBuf::from);
                }
                "CERTREQUEST" => {
                    config.certrequest = args
                        .first()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| parse_err("CERTREQUEST must be 0, 1, or 2"))?;
                }
                "DISABLE_WEAK_SSL" => {
                    config.disable_weak_ssl = matches!(
                        args.first().map(|s| s.to_ascii_lowercase()).as_deref(),
                        Some("1" | "true" | "yes")
                    );
                }
                "TRACKING_TTL" => {
                    config.tracking_ttl = Some(
                        args.first()
                            .and_then(|s| s.parse().ok())
                            .ok_or_else(|| parse_err("TRACKING_TTL requires an integer"))?,
                    );
                }
                "ACCEPT" => {
                    let spec = args.first().ok_or_else(|| parse_err("ACCEPT requires a host or CIDR spec"))?;
                    config.acl_rules.push(AclRuleConfig { spec: spec.clone(), allow: true });
                }
                "REJECT" => {
                    let spec = args.first().ok_or_else(|| parse_err("REJECT requires a host or CIDR spec"))?;
                    config.acl_rules.push(AclRuleConfig { spec: spec.clone(), allow: false });
                }
                other => {
                    tracing::warn!(directive = other, line = lineno + 1, "unrecognised upsd.conf directive, ignored");
                }
            }
        }

        if config.listen_addrs.is_empty() {
            config.listen_addrs.push(SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), DEFAULT_PORT));
        }

        Ok(config)
    }
}
