// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::ErrCode;

/// Declared variable type (spec.md §3's variable descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    String,
    Number,
    Enum,
    Range,
}

impl VarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Enum => "ENUM",
            Self::Range => "RANGE",
        }
    }
}

/// An inclusive numeric range, as installed by `ADDRANGE`/removed by
/// `DELRANGE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// A single entry of the UPS variable map (spec.md §3). Type is inferred
/// from which of `ADDENUM`/`ADDRANGE` has been applied (Open Question,
/// resolved in DESIGN.md) rather than declared up front by the driver.
#[derive(Debug, Clone)]
pub struct VariableDescriptor {
    pub name: String,
    pub value: String,
    pub var_type: VarType,
    pub writable: bool,
    pub display_len: Option<u32>,
    pub enum_values: Vec<String>,
    pub ranges: Vec<NumericRange>,
}

impl VariableDescriptor {
    pub fn shell(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            var_type: VarType::String,
            writable: false,
            display_len: None,
            enum_values: Vec::new(),
            ranges: Vec::new(),
        }
    }

    pub fn add_enum(&mut self, value: String) {
        self.var_type = VarType::Enum;
        if !self.enum_values.contains(&value) {
            self.enum_values.push(value);
        }
    }

    pub fn del_enum(&mut self, value: &str) {
        self.enum_values.retain(|v| v != value);
    }

    pub fn add_range(&mut self, range: NumericRange) {
        self.var_type = VarType::Range;
        self.ranges.push(range);
    }

    pub fn del_range(&mut self, range: NumericRange) {
        self.ranges.retain(|r| *r != range);
    }

    pub fn apply_flags<'a>(&mut self, flags: impl Iterator<Item = &'a str>) {
        self.writable = false;
        for flag in flags {
            match flag.to_ascii_uppercase().as_str() {
                "RW" => self.writable = true,
                "STRING" => self.var_type = VarType::String,
                "NUMBER" => self.var_type = VarType::Number,
                _ => {}
            }
        }
    }

    /// Validate a candidate value for a client-initiated `SET VAR`
    /// (spec.md §4.5 / §7): the dispatcher must reject type/range/enum
    /// mismatches locally before forwarding to the driver.
    pub fn validate(&self, candidate: &str) -> Result<(), ErrCode> {
        if !self.writable {
            return Err(ErrCode::InvalidValue);
        }

        match self.var_type {
            VarType::Enum => {
                if self.enum_values.iter().any(|v| v == candidate) {
                    Ok(())
                } else {
                    Err(ErrCode::InvalidValue)
                }
            }
            VarType::Range => {
                let parsed: f64 = candidate.parse().map_err(|_| ErrCode::InvalidValue)?;
                if self.ranges.is_empty() || self.ranges.iter().any(|r| r.contains(parsed)) {
                    Ok(())
                } else {
                    Err(ErrCode::InvalidValue)
                }
            }
            VarType::Number => {
                candidate.parse::<f64>().map(|_| ()).map_err(|_| ErrCode::InvalidValue)
            }
            VarType::String => {
                if let Some(len) = self.display_len {
                    if candidate.len() > len as usize {
                        return Err(ErrCode::InvalidValue);
                    }
                }
                Ok(())
            }
        }
    }
}
