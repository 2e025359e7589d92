//! Simulated time: a femtosecond timestamp plus a delta-cycle index.
//!
//! Durations in configuration files are written with a unit suffix
//! (`"10ns"`, `"2.5 us"`) and parsed through [`SimTime`]'s `FromStr`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Femtoseconds per picosecond.
pub const FS_PER_PS: u64 = 1_000;
/// Femtoseconds per nanosecond.
pub const FS_PER_NS: u64 = 1_000_000;
/// Femtoseconds per microsecond.
pub const FS_PER_US: u64 = 1_000_000_000;
/// Femtoseconds per millisecond.
pub const FS_PER_MS: u64 = 1_000_000_000_000;
/// Femtoseconds per second.
pub const FS_PER_S: u64 = 1_000_000_000_000_000;

const UNITS: [(&str, u64); 6] = [
    ("fs", 1),
    ("ps", FS_PER_PS),
    ("ns", FS_PER_NS),
    ("us", FS_PER_US),
    ("ms", FS_PER_MS),
    ("s", FS_PER_S),
];

/// A point in simulated time.
///
/// Ordering is by timestamp first, then by delta cycle, so every zero-delay
/// round at one instant sorts after the previous one.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime {
    /// Timestamp in femtoseconds.
    pub fs: u64,
    /// Zero-delay round within the instant.
    pub delta: u32,
}

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime { fs: 0, delta: 0 };

    /// A time at the given femtosecond timestamp, delta zero.
    pub fn from_fs(fs: u64) -> Self {
        Self { fs, delta: 0 }
    }

    /// A time at the given nanosecond timestamp, delta zero.
    pub fn from_ns(ns: u64) -> Self {
        Self::from_fs(ns.saturating_mul(FS_PER_NS))
    }

    /// A time at the given picosecond timestamp, delta zero.
    pub fn from_ps(ps: u64) -> Self {
        Self::from_fs(ps.saturating_mul(FS_PER_PS))
    }

    /// The next delta cycle of the same instant.
    pub fn next_delta(self) -> Self {
        Self {
            fs: self.fs,
            delta: self.delta.saturating_add(1),
        }
    }

    /// Moves to a later instant, restarting the delta count.
    pub fn advance_to(self, fs: u64) -> Self {
        debug_assert!(fs >= self.fs, "time moved backwards: {} -> {fs}", self.fs);
        Self::from_fs(fs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (count, unit) = UNITS
            .iter()
            .rev()
            .find(|(_, scale)| self.fs != 0 && self.fs % scale == 0)
            .map(|(unit, scale)| (self.fs / scale, *unit))
            .unwrap_or((self.fs, "fs"));
        write!(f, "{count} {unit}")?;
        if self.delta > 0 {
            write!(f, "+d{}", self.delta)?;
        }
        Ok(())
    }
}

/// Error type for parsing time strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time: '{input}'")]
pub struct ParseTimeError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for SimTime {
    type Err = ParseTimeError;

    /// Parses `"<number><unit>"` with an optional space and a case-insensitive
    /// unit (`fs`, `ps`, `ns`, `us`, `ms`, `s`). A bare integer is femtoseconds.
    /// Fractions are allowed as long as the result is a whole femtosecond.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseTimeError {
            input: s.to_string(),
        };
        let lower = s.to_ascii_lowercase();

        // two-letter units first so "ns" is not read as seconds
        for (unit, scale) in UNITS.iter().take(5) {
            if let Some(num) = lower.strip_suffix(unit) {
                return scaled(num.trim(), *scale).map(SimTime::from_fs).ok_or_else(err);
            }
        }
        if let Some(num) = lower.strip_suffix('s') {
            return scaled(num.trim(), FS_PER_S)
                .map(SimTime::from_fs)
                .ok_or_else(err);
        }
        let fs: u64 = s.parse().map_err(|_| err())?;
        Ok(SimTime::from_fs(fs))
    }
}

/// `num * scale` for a decimal `num`, if the product is a whole number that fits.
fn scaled(num: &str, scale: u64) -> Option<u64> {
    let (whole, frac) = num.split_once('.').unwrap_or((num, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut total = whole.checked_mul(scale)?;
    let mut place = scale;
    for digit in frac.chars() {
        let digit = u64::from(digit.to_digit(10)?);
        if place % 10 != 0 {
            if digit != 0 {
                return None;
            }
            continue;
        }
        place /= 10;
        total = total.checked_add(digit * place)?;
    }
    Some(total)
}
