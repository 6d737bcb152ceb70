use std::time::Duration;
use thiserror::Error;

/// Errors from [`parse_interval`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("interval is empty")]
    Empty,
    #[error("invalid interval {0:?}: expected a number followed by a unit (ms, s, m, h)")]
    Malformed(String),
    #[error("unknown unit {unit:?} in interval {input:?}")]
    UnknownUnit { input: String, unit: String },
    #[error("interval must be greater than zero")]
    Zero,
    #[error("interval {0:?} is too large")]
    Overflow(String),
}

/// Parses a duration such as `30s`, `1m`, `1h30m` or `500ms`.
///
/// Components are `<integer><unit>` pairs with units `ms`, `s`, `m` and
/// `h`, concatenated without separators. A zero total is rejected since the
/// aggregator would spin.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gator::util::parse_interval;
///
/// assert_eq!(parse_interval("1m30s").unwrap(), Duration::from_secs(90));
/// assert!(parse_interval("0s").is_err());
/// ```
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(IntervalError::Empty);
    }

    let malformed = || IntervalError::Malformed(input.to_string());
    let overflow = || IntervalError::Overflow(input.to_string());

    let mut total_ms: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(malformed());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| overflow())?;
        rest = &rest[digits..];

        let unit_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
        if unit_len == 0 {
            return Err(malformed());
        }
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale: u64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            other => {
                return Err(IntervalError::UnknownUnit {
                    input: input.to_string(),
                    unit: other.to_string(),
                })
            }
        };
        let component = value.checked_mul(scale).ok_or_else(overflow)?;
        total_ms = total_ms.checked_add(component).ok_or_else(overflow)?;
    }

    if total_ms == 0 {
        return Err(IntervalError::Zero);
    }
    Ok(Duration::from_millis(total_ms))
}
