//! Parsing of rate-limit signals carried in response headers.
//!
//! All parsers are strict and return `None` for anything they do not
//! understand. What to do about an unparsable value is the caller's call.

use std::time::Duration;

/// Unit the server uses for its reset timestamps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResetUnit {
    /// Seconds since the Unix epoch, optionally with a fractional part.
    #[default]
    Seconds,
    /// Milliseconds since the Unix epoch.
    Milliseconds,
}

impl ResetUnit {
    fn millis_per_unit(self) -> u64 {
        match self {
            ResetUnit::Seconds => 1_000,
            ResetUnit::Milliseconds => 1,
        }
    }
}

/// True when `value` is a non-empty run of ASCII digits.
pub fn is_number(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a `retry-after` value expressed in whole seconds.
///
/// HTTP dates are deliberately not accepted.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if !is_number(value) {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// Parse a remaining-calls counter.
pub fn parse_remaining(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Parse an absolute reset timestamp into epoch milliseconds.
///
/// Accepts `1470173023` as well as `1470173023.123`. Fractions finer than
/// a millisecond are truncated.
pub fn parse_reset(value: &str, unit: ResetUnit) -> Option<u64> {
    let value = value.trim();
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };

    if !is_number(whole) {
        return None;
    }
    let per_unit = unit.millis_per_unit();
    let mut millis = whole.parse::<u64>().ok()?.checked_mul(per_unit)?;

    if let Some(fraction) = fraction {
        if !is_number(fraction) {
            return None;
        }
        // Scale the leading fraction digits into the unit's millisecond range.
        let mut scale = per_unit;
        for digit in fraction.bytes() {
            scale /= 10;
            if scale == 0 {
                break;
            }
            millis = millis.checked_add(u64::from(digit - b'0') * scale)?;
        }
    }

    Some(millis)
}
