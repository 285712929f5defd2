//! Time utilities for wardend
//!
//! Restriction enforcement never trusts the wall clock: deadlines are held
//! as monotonic instants while an entity is present and collapse to relative
//! remaining durations the moment it is not. Wall-clock values appear only
//! in display and audit fields.

use std::time::{Duration, Instant};

use crate::RestrictionError;

/// A point in monotonic time, used for release deadlines.
/// Immune to wall-clock changes; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.duration_since(earlier.0)
    }

    /// Duration until `self` as seen from `from`, or zero if already past
    pub fn saturating_duration_until(&self, from: MonotonicInstant) -> Duration {
        if self.0 > from.0 {
            self.0.duration_since(from.0)
        } else {
            Duration::ZERO
        }
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Parse a duration from admin input.
///
/// A bare integer is read as minutes (`"15"` == 15 minutes), matching the
/// command conventions of session-server moderation tools. Unit-suffixed
/// forms compose: `"90s"`, `"15m"`, `"1h30m"`, `"2d"`.
pub fn parse_duration(input: &str) -> Result<Duration, RestrictionError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(RestrictionError::InvalidDuration(input.to_string()));
    }

    if let Ok(minutes) = s.parse::<u64>() {
        return Ok(Duration::from_secs(minutes.saturating_mul(60)));
    }

    let mut total_secs: u64 = 0;
    let mut digits = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| RestrictionError::InvalidDuration(input.to_string()))?;
        digits.clear();
        let unit_secs: u64 = match ch {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(RestrictionError::InvalidDuration(input.to_string())),
        };
        total_secs = total_secs.saturating_add(value.saturating_mul(unit_secs));
    }
    if !digits.is_empty() {
        // Trailing digits without a unit in a suffixed form
        return Err(RestrictionError::InvalidDuration(input.to_string()));
    }

    Ok(Duration::from_secs(total_secs))
}

/// Parse a signed duration (`"-10m"`, `"+5m"`, `"30"`) for extensions.
pub fn parse_signed_duration(input: &str) -> Result<chrono::Duration, RestrictionError> {
    let s = input.trim();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let unsigned = parse_duration(rest)?;
    let secs = i64::try_from(unsigned.as_secs())
        .map_err(|_| RestrictionError::InvalidDuration(input.to_string()))?;
    let delta = chrono::Duration::try_seconds(secs)
        .ok_or_else(|| RestrictionError::InvalidDuration(input.to_string()))?;

    Ok(if negative { -delta } else { delta })
}

/// Format a duration in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
