use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

const MAX_FRACTION_DIGITS: usize = 9;

/// A YAML timestamp scalar. Datetimes without an explicit zone are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Date(Date),
    DateTime(OffsetDateTime),
}

impl Timestamp {
    /// Canonical text form: `YYYY-MM-DD` for dates, RFC 3339 for datetimes.
    pub fn canonical_text(&self) -> Result<String> {
        match self {
            Self::Date(date) => Ok(format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            )),
            Self::DateTime(datetime) => datetime
                .format(&Rfc3339)
                .context("failed to format timestamp as RFC3339"),
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.canonical_text() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

fn date_re() -> &'static Regex {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    DATE_RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid yaml date regex")
    })
}

fn datetime_re() -> &'static Regex {
    static DATETIME_RE: OnceLock<Regex> = OnceLock::new();
    DATETIME_RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[Tt]|[ \t]+)(\d{1,2}):(\d{2}):(\d{2})(?:\.(\d*))?[ \t]*(Z|[-+]\d{1,2}(?::?\d{2})?)?$",
        )
        .expect("valid yaml datetime regex")
    })
}

/// Recognizes the YAML 1.1 timestamp grammar. Shapes that match but name an
/// impossible calendar value (`2024-13-01`) stay plain strings.
#[must_use]
pub fn parse_yaml_timestamp(raw: &str) -> Option<Timestamp> {
    if let Some(captures) = date_re().captures(raw) {
        return calendar_date(&captures).map(Timestamp::Date);
    }

    let captures = datetime_re().captures(raw)?;
    let date = calendar_date(&captures)?;
    let hour = capture_number::<u8>(&captures, 4)?;
    let minute = capture_number::<u8>(&captures, 5)?;
    let second = capture_number::<u8>(&captures, 6)?;
    let nanos = captures
        .get(7)
        .map_or(Some(0), |fraction| fraction_nanos(fraction.as_str()))?;
    let time = Time::from_hms_nano(hour, minute, second, nanos).ok()?;
    let offset = match captures.get(8) {
        Some(zone) => parse_offset(zone.as_str())?,
        None => UtcOffset::UTC,
    };

    Some(Timestamp::DateTime(
        PrimitiveDateTime::new(date, time).assume_offset(offset),
    ))
}

pub fn now_utc_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("failed to format current time as RFC3339")
}

fn calendar_date(captures: &Captures<'_>) -> Option<Date> {
    let year = capture_number::<i32>(captures, 1)?;
    let month = Month::try_from(capture_number::<u8>(captures, 2)?).ok()?;
    let day = capture_number::<u8>(captures, 3)?;
    Date::from_calendar_date(year, month, day).ok()
}

fn capture_number<T: std::str::FromStr>(captures: &Captures<'_>, index: usize) -> Option<T> {
    captures.get(index)?.as_str().parse::<T>().ok()
}

fn fraction_nanos(digits: &str) -> Option<u32> {
    if digits.is_empty() {
        return Some(0);
    }
    let mut padded: String = digits.chars().take(MAX_FRACTION_DIGITS).collect();
    while padded.len() < MAX_FRACTION_DIGITS {
        padded.push('0');
    }
    padded.parse::<u32>().ok()
}

fn parse_offset(zone: &str) -> Option<UtcOffset> {
    if zone == "Z" {
        return Some(UtcOffset::UTC);
    }

    let (sign, rest) = zone.split_at(1);
    let sign: i8 = if sign == "-" { -1 } else { 1 };
    let (hours, minutes) = match rest.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if rest.len() > 2 => rest.split_at(rest.len() - 2),
        None => (rest, "0"),
    };
    let hours = hours.parse::<i8>().ok()?;
    let minutes = minutes.parse::<i8>().ok()?;
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}
