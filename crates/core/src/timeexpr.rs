// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time-expression grammar for schedules.
//!
//! ```text
//! expr     := fixed | astro
//! fixed    := DIGIT{1,2} ":" DIGIT{2}           # 0..23 : 0..59
//! astro    := "@" base ( sign duration )?
//! base     := "dawn" | "sunrise" | "noon" | "sunset" | "dusk"
//! sign     := "+" | "-"
//! duration := ( DIGIT+ ("h"|"m"|"s") )+         # "30m", "1h30m"
//! ```
//!
//! Whitespace is allowed around the sign. Evaluation against a timezone
//! and solar data lives in the engine; this module is the pure grammar.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeExprError {
    #[error("empty time expression")]
    Empty,
    #[error("invalid fixed time '{0}': expected HH:MM")]
    InvalidFixed(String),
    #[error("unknown solar base '{0}'")]
    UnknownBase(String),
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Solar event a time expression can anchor to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolarBase {
    Dawn,
    Sunrise,
    Noon,
    Sunset,
    Dusk,
}

impl SolarBase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolarBase::Dawn => "dawn",
            SolarBase::Sunrise => "sunrise",
            SolarBase::Noon => "noon",
            SolarBase::Sunset => "sunset",
            SolarBase::Dusk => "dusk",
        }
    }
}

impl fmt::Display for SolarBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolarBase {
    type Err = TimeExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dawn" => Ok(SolarBase::Dawn),
            "sunrise" => Ok(SolarBase::Sunrise),
            "noon" => Ok(SolarBase::Noon),
            "sunset" => Ok(SolarBase::Sunset),
            "dusk" => Ok(SolarBase::Dusk),
            other => Err(TimeExprError::UnknownBase(other.to_string())),
        }
    }
}

/// Parsed time expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeExpr {
    /// Wall-clock time of day in the configured timezone
    Fixed { hour: u8, minute: u8 },
    /// Solar event plus a signed offset
    Solar { base: SolarBase, offset_secs: i64 },
}

impl TimeExpr {
    /// Whether evaluation requires solar data.
    pub fn is_solar(&self) -> bool {
        matches!(self, TimeExpr::Solar { .. })
    }

    pub fn offset(&self) -> chrono::Duration {
        match self {
            TimeExpr::Fixed { .. } => chrono::Duration::zero(),
            TimeExpr::Solar { offset_secs, .. } => chrono::Duration::seconds(*offset_secs),
        }
    }
}

impl fmt::Display for TimeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeExpr::Fixed { hour, minute } => write!(f, "{hour:02}:{minute:02}"),
            TimeExpr::Solar { base, offset_secs: 0 } => write!(f, "@{base}"),
            TimeExpr::Solar { base, offset_secs } => {
                let sign = if *offset_secs < 0 { '-' } else { '+' };
                write!(f, "@{base} {sign} {}", format_duration(offset_secs.unsigned_abs()))
            }
        }
    }
}

impl FromStr for TimeExpr {
    type Err = TimeExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time_expr(s)
    }
}

/// Parse a time expression per the module grammar.
pub fn parse_time_expr(input: &str) -> Result<TimeExpr, TimeExprError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(TimeExprError::Empty);
    }
    if let Some(astro) = s.strip_prefix('@') {
        return parse_astro(astro);
    }
    parse_fixed(s)
}

fn parse_fixed(s: &str) -> Result<TimeExpr, TimeExprError> {
    let invalid = || TimeExprError::InvalidFixed(s.to_string());
    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u8 = h.parse().map_err(|_| invalid())?;
    let minute: u8 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(TimeExpr::Fixed { hour, minute })
}

fn parse_astro(s: &str) -> Result<TimeExpr, TimeExprError> {
    let s = s.trim();
    let base_end = s.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(s.len());
    let base: SolarBase = s[..base_end].parse()?;
    let rest = s[base_end..].trim();
    if rest.is_empty() {
        return Ok(TimeExpr::Solar { base, offset_secs: 0 });
    }
    let (sign, dur_str) = match rest.split_at(1) {
        ("+", d) => (1, d.trim()),
        ("-", d) => (-1, d.trim()),
        _ => return Err(TimeExprError::InvalidDuration(rest.to_string())),
    };
    let duration = parse_duration(dur_str)?;
    Ok(TimeExpr::Solar { base, offset_secs: sign * duration.as_secs() as i64 })
}

/// Parse a Go-style duration like "30s", "5m", "1h30m", "250ms".
///
/// Units are hours, minutes, seconds, and milliseconds; components may
/// repeat and are summed in order of appearance.
pub fn parse_duration(input: &str) -> Result<Duration, TimeExprError> {
    let s = input.trim();
    let invalid = || TimeExprError::InvalidDuration(input.to_string());
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_millis: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits_end == 0 {
            return Err(invalid());
        }
        let num: u64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = &rest[digits_end..];
        let (multiplier, after) = if let Some(after) = rest.strip_prefix("ms") {
            (1, after)
        } else if let Some(after) = rest.strip_prefix('h') {
            (3_600_000, after)
        } else if let Some(after) = rest.strip_prefix('m') {
            (60_000, after)
        } else if let Some(after) = rest.strip_prefix('s') {
            (1_000, after)
        } else {
            return Err(invalid());
        };
        total_millis = total_millis
            .checked_add(num.checked_mul(multiplier).ok_or_else(invalid)?)
            .ok_or_else(invalid)?;
        rest = after;
    }
    Ok(Duration::from_millis(total_millis))
}

/// Format whole seconds as a compact duration ("1h30m", "45s").
fn format_duration(secs: u64) -> String {
    let (h, rem) = (secs / 3600, secs % 3600);
    let (m, s) = (rem / 60, rem % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{s}s"));
    }
    out
}

#[cfg(test)]
#[path = "timeexpr_tests.rs"]
mod tests;
