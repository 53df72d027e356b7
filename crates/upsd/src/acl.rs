// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional host-based allow/deny layer (spec.md §3 component H, §4.4:
//! "consulted before running any authenticated handler"). Absent any
//! `ACL`/rule configuration, every host is allowed.

use std::net::IpAddr;

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Any,
    V4 { base: u32, bits: u32 },
    V6 { base: u128, bits: u32 },
}

impl Pattern {
    fn parse(spec: &str) -> Option<Self> {
        if spec == "all" || spec == "0.0.0.0/0" {
            return Some(Self::Any);
        }
        let (addr_part, bits_part) = spec.split_once('/').unwrap_or((spec, ""));
        let addr: IpAddr = addr_part.parse().ok()?;
        match addr {
            IpAddr::V4(v4) => {
                let bits: u32 = if bits_part.is_empty() { 32 } else { bits_part.parse().ok()? };
                Some(Self::V4 { base: u32::from(v4), bits })
            }
            IpAddr::V6(v6) => {
                let bits: u32 = if bits_part.is_empty() { 128 } else { bits_part.parse().ok()? };
                Some(Self::V6 { base: u128::from(v6), bits })
            }
        }
    }

    fn matches(&self, addr: IpAddr) -> bool {
        match (self, addr) {
            (Self::Any, _) => true,
            (Self::V4 { base, bits }, IpAddr::V4(v4)) => {
                let mask = mask32(*bits);
                (u32::from(v4) & mask) == (base & mask)
            }
            (Self::V6 { base, bits }, IpAddr::V6(v6)) => {
                let mask = mask128(*bits);
                (u128::from(v6) & mask) == (base & mask)
            }
            _ => false,
        }
    }
}

fn mask32(bits: u32) -> u32 {
    if bits == 0 { 0 } else { u32::MAX << (32 - bits.min(32)) }
}

fn mask128(bits: u32) -> u128 {
    if bits == 0 { 0 } else { u128::MAX << (128 - bits.min(128)) }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    pattern: Pattern,
    allow: bool,
}

/// First-match-wins list of host rules, as populated from `upsd.conf`'s
/// `ACCEPT`/`REJECT` directives. An empty table allows everything.
#[derive(Debug, Clone, Default)]
pub struct HostAcl {
    rules: Vec<Rule>,
}

impl HostAcl {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append an `ACCEPT <spec>` / `REJECT <spec>` rule. `spec` is an IP
    /// address, a `addr/prefixlen` CIDR block, or `all`. Malformed specs are
    /// rejected by the config loader before reaching here, but an
    /// unparseable rule is simply dropped rather than panicking.
    pub fn add_rule(&mut self, spec: &str, allow: bool) {
        if let Some(pattern) = Pattern::parse(spec) {
            self.rules.push(Rule { pattern, allow });
        }
    }

    pub fn allows(&self, addr: IpAddr) -> bool {
        for rule in &self.rules {
            if rule.pattern.matches(addr) {
                return rule.allow;
            }
        }
        true
    }
}
