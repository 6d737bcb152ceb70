//! Publish-date normalization for RSS items.
//!
//! Feeds disagree on date formats. [`parse_time`] tries an ordered list of
//! layout parsers and returns the first success. The layouts are mutually
//! exclusive (numeric zone vs. zone abbreviation, two- vs. four-digit year,
//! RFC 3339 `T` separator), so the order only matters for speed: the most
//! common layout comes first.
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// No known layout matched the input
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unparseable publish date: {0:?}")]
pub struct TimeParseError(pub String);

type LayoutParser = fn(&str) -> Option<DateTime<Utc>>;

/// Known layouts, most common first.
const LAYOUTS: &[(&str, LayoutParser)] = &[
    ("RFC1123Z", parse_rfc1123_numeric),
    ("RFC1123", parse_rfc1123_named),
    ("RFC822Z", parse_rfc822_numeric),
    ("RFC822", parse_rfc822_named),
    ("RFC3339", parse_rfc3339),
];

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parses an RSS publish date into a UTC instant.
///
/// Accepted layouts:
///
/// | Layout   | Example                           |
/// |----------|-----------------------------------|
/// | RFC1123Z | `Mon, 02 Jan 2006 15:04:05 -0700` |
/// | RFC1123  | `Mon, 02 Jan 2006 15:04:05 MST`   |
/// | RFC822Z  | `02 Jan 06 15:04 -0700`           |
/// | RFC822   | `02 Jan 06 15:04 MST`             |
/// | RFC3339  | `2006-01-02T15:04:05-07:00`       |
///
/// Zone abbreviations `UT`, `UTC`, `GMT`, `Z` and the North American zones
/// (`EST`, `EDT`, `CST`, `CDT`, `MST`, `MDT`, `PST`, `PDT`) map to their
/// offsets; any other alphabetic abbreviation is read as UTC.
///
/// # Errors
///
/// Returns [`TimeParseError`] when no layout matches.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let trimmed = raw.trim();
    for (name, parse) in LAYOUTS {
        if let Some(instant) = parse(trimmed) {
            tracing::trace!(layout = name, raw = trimmed, "Parsed publish date");
            return Ok(instant);
        }
    }
    Err(TimeParseError(raw.to_string()))
}

// ============================================================================
// Layout Parsers
// ============================================================================

fn parse_rfc1123_numeric(s: &str) -> Option<DateTime<Utc>> {
    let rest = strip_weekday(s)?;
    DateTime::parse_from_str(rest, "%d %b %Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_rfc1123_named(s: &str) -> Option<DateTime<Utc>> {
    let rest = strip_weekday(s)?;
    let (local, offset) = split_named_zone(rest)?;
    let naive = NaiveDateTime::parse_from_str(local, "%d %b %Y %H:%M:%S").ok()?;
    to_utc(naive, offset)
}

fn parse_rfc822_numeric(s: &str) -> Option<DateTime<Utc>> {
    if !has_two_digit_year(s) {
        return None;
    }
    DateTime::parse_from_str(s, "%d %b %y %H:%M %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_rfc822_named(s: &str) -> Option<DateTime<Utc>> {
    if !has_two_digit_year(s) {
        return None;
    }
    let (local, offset) = split_named_zone(s)?;
    let naive = NaiveDateTime::parse_from_str(local, "%d %b %y %H:%M").ok()?;
    to_utc(naive, offset)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Helpers
// ============================================================================

/// Strips a leading `Mon, ` style weekday.
///
/// The weekday is checked for spelling only, not against the date; feeds
/// with a wrong weekday still carry a usable timestamp.
fn strip_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(", ")?;
    WEEKDAYS.contains(&day).then_some(rest)
}

/// RFC 822 dates carry `DD Mon YY`; reject four-digit years so `%y` does
/// not swallow the first two digits of an RFC 1123 year.
fn has_two_digit_year(s: &str) -> bool {
    s.split_whitespace()
        .nth(2)
        .is_some_and(|year| year.len() == 2 && year.bytes().all(|b| b.is_ascii_digit()))
}

/// Splits `"<local time> ABBR"` into the local part and the zone offset.
fn split_named_zone(s: &str) -> Option<(&str, FixedOffset)> {
    let (local, zone) = s.rsplit_once(' ')?;
    if zone.is_empty() || !zone.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    Some((local, zone_offset(zone)?))
}

fn zone_offset(abbreviation: &str) -> Option<FixedOffset> {
    let hours = match abbreviation.to_ascii_uppercase().as_str() {
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        // UT, UTC, GMT, Z and anything unrecognized
        _ => 0,
    };
    FixedOffset::east_opt(hours * 3600)
}

fn to_utc(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
