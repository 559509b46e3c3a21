//! Turns the many ways a scheduler export writes a date into a [`Timestamp`].
//!
//! The attempts run in a fixed order and the first success wins:
//! 1. cells that are already typed (native date-times, spreadsheet serials),
//! 2. ISO-like text,
//! 3. `day/month/year [time]`,
//! 4. `month/day/year [time]`.
//!
//! Ambiguous dates such as `01/02/2024` therefore resolve day-first. Nothing
//! is inferred from the locale.

use chrono::{
    DateTime, Datelike as _, NaiveDate, NaiveDateTime, NaiveTime, TimeZone as _, Utc,
};
use tracing::debug;

use crate::records::{CellValue, Timestamp};

const ISO_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%d %B %Y %H:%M:%S%.f",
    "%d %B %Y %H:%M",
    "%B %d %Y %H:%M:%S%.f",
    "%B %d %Y %H:%M",
];

const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d %Y"];

/// Serial numbers outside this range are not dates (years 1900 through 9999).
const SERIAL_RANGE: std::ops::Range<f64> = 1.0..2_958_466.0;

/// Serial of 1970-01-01; serial day zero is 1899-12-30.
const UNIX_EPOCH_SERIAL: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Parses a cell into a timestamp. Returns `None` for empty cells and for
/// anything none of the supported formats accept.
pub fn parse_timestamp(value: &CellValue) -> Option<Timestamp> {
    match value {
        CellValue::DateTime(dt) => Some(Utc.from_utc_datetime(dt)),
        CellValue::Number(serial) => from_serial_date(*serial),
        CellValue::Text(text) => parse_timestamp_str(text),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

pub fn parse_timestamp_str(text: &str) -> Option<Timestamp> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }

    let parsed = parse_iso_like(&normalized)
        .or_else(|| parse_day_first(&normalized))
        .or_else(|| parse_month_first(&normalized))
        .map(|dt| Utc.from_utc_datetime(&dt));
    if parsed.is_none() {
        debug!("could not interpret {:?} as a timestamp", text);
    }
    parsed
}

/// Converts a spreadsheet serial date (days since 1899-12-30, with the time
/// of day as the fractional part).
pub fn from_serial_date(serial: f64) -> Option<Timestamp> {
    if !serial.is_finite() || !SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let millis = ((serial - UNIX_EPOCH_SERIAL) * MILLIS_PER_DAY).round() as i64;
    DateTime::from_timestamp_millis(millis)
}

/// Inverse of [`from_serial_date`], used when writing timestamps into a
/// workbook.
pub fn to_serial_date(ts: &Timestamp) -> f64 {
    UNIX_EPOCH_SERIAL + ts.timestamp_millis() as f64 / MILLIS_PER_DAY
}

/// Trims, turns commas into spaces and collapses runs of whitespace.
fn normalize(text: &str) -> String {
    text.replace(',', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// chrono's `%Y` also accepts one to three digit years, which would read
/// `15/03/24` as the year 15. Those are left to the day/month/year attempts.
fn parse_iso_like(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    ISO_DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            ISO_DATE_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(text, format).ok().map(|d| d.and_time(NaiveTime::MIN))
            })
        })
        .filter(|dt| dt.year() >= 1000)
}

fn parse_day_first(text: &str) -> Option<NaiveDateTime> {
    let DateComponents { first, second, year, time } = split_components(text)?;
    NaiveDate::from_ymd_opt(year, second, first).map(|date| date.and_time(time))
}

fn parse_month_first(text: &str) -> Option<NaiveDateTime> {
    let DateComponents { first, second, year, time } = split_components(text)?;
    NaiveDate::from_ymd_opt(year, first, second).map(|date| date.and_time(time))
}

struct DateComponents {
    first: u32,
    second: u32,
    year: i32,
    time: NaiveTime,
}

/// Splits `a/b/yyyy [time]` (also with `-` or `.` separators) without
/// deciding which of `a` and `b` is the month.
fn split_components(text: &str) -> Option<DateComponents> {
    let (date_part, time_part) = match text.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };

    let mut parts = date_part.split(['/', '-', '.']);
    let first = parse_digits(parts.next()?)?;
    let second = parse_digits(parts.next()?)?;
    let year = parse_year(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }

    let time = match time_part {
        Some(time) => parse_time(time)?,
        None => NaiveTime::MIN,
    };
    Some(DateComponents { first, second, year, time })
}

fn parse_digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    let year = parse_digits(text)? as i32;
    match text.len() {
        2 => Some(2000 + year),
        4 => Some(year),
        _ => None,
    }
}

/// Parses `H:MM[:SS[.fff]]` with an optional trailing `AM`/`PM`.
fn parse_time(text: &str) -> Option<NaiveTime> {
    let (clock, meridiem) = match text.rsplit_once(' ') {
        Some((clock, suffix)) => (clock, Some(suffix.to_ascii_uppercase())),
        None => (text, None),
    };

    let mut parts = clock.split(':');
    let hour = parse_digits(parts.next()?)?;
    let minute = parse_digits(parts.next()?)?;
    let (second, nano) = match parts.next() {
        Some(seconds) => match seconds.split_once('.') {
            Some((whole, fraction)) => (parse_digits(whole)?, parse_fraction(fraction)?),
            None => (parse_digits(seconds)?, 0),
        },
        None => (0, 0),
    };
    if parts.next().is_some() {
        return None;
    }

    let hour = match meridiem.as_deref() {
        None => hour,
        Some("AM") if (1..=12).contains(&hour) => hour % 12,
        Some("PM") if (1..=12).contains(&hour) => hour % 12 + 12,
        Some(_) => return None,
    };
    NaiveTime::from_hms_nano_opt(hour, minute, second, nano)
}

fn parse_fraction(text: &str) -> Option<u32> {
    parse_digits(text)?;
    let digits: String = text.chars().take(9).collect();
    format!("{:0<9}", digits).parse().ok()
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn day_first_and_iso_agree() {
        let day_first = parse_timestamp_str("15/03/2024 10:30:00").unwrap();
        let iso = parse_timestamp_str("2024-03-15T10:30:00").unwrap();
        assert_eq!(day_first, iso);
        assert_eq!(iso, ts(2024, 3, 15, 10, 30, 0));
    }

    #[test]
    fn garbage_and_empty_are_invalid() {
        assert_eq!(parse_timestamp_str(""), None);
        assert_eq!(parse_timestamp_str("   "), None);
        assert_eq!(parse_timestamp_str("not-a-date"), None);
        assert_eq!(parse_timestamp(&CellValue::Empty), None);
        assert_eq!(parse_timestamp(&CellValue::Bool(true)), None);
    }

    #[test]
    fn ambiguous_dates_resolve_day_first() {
        assert_eq!(parse_timestamp_str("01/02/2024"), Some(ts(2024, 2, 1, 0, 0, 0)));
    }

    #[test]
    fn impossible_day_first_falls_back_to_month_first() {
        assert_eq!(parse_timestamp_str("03/15/2024 10:30"), Some(ts(2024, 3, 15, 10, 30, 0)));
    }

    #[test]
    fn punctuation_and_spacing_are_normalized() {
        assert_eq!(
            parse_timestamp_str("  15/03/2024,   10:30:00 "),
            Some(ts(2024, 3, 15, 10, 30, 0))
        );
        assert_eq!(parse_timestamp_str("March 15, 2024 10:30"), Some(ts(2024, 3, 15, 10, 30, 0)));
        assert_eq!(parse_timestamp_str("15 Mar 2024 10:30:00"), Some(ts(2024, 3, 15, 10, 30, 0)));
    }

    #[test]
    fn month_names_full_or_abbreviated() {
        let expected = Some(ts(2024, 3, 15, 10, 30, 0));
        assert_eq!(parse_timestamp_str("March 15 2024 10:30:00"), expected);
        assert_eq!(parse_timestamp_str("15 March 2024 10:30"), expected);
        assert_eq!(parse_timestamp_str("Mar 15, 2024 10:30"), expected);
        assert_eq!(parse_timestamp_str("15 March 2024"), Some(ts(2024, 3, 15, 0, 0, 0)));
        assert_eq!(parse_timestamp_str("september 1 2024"), Some(ts(2024, 9, 1, 0, 0, 0)));
        assert_eq!(parse_timestamp_str("15 Marchy 2024"), None);
    }

    #[test]
    fn impossible_in_both_orders_is_invalid() {
        assert_eq!(parse_timestamp_str("31/31/2024"), None);
        assert_eq!(parse_timestamp_str("13/13/2024 10:30"), None);
        assert_eq!(parse_timestamp_str("30/02/2024"), None);
        assert_eq!(parse_timestamp_str("2024-02-30"), None);
    }

    #[test]
    fn meridiem_and_two_digit_years() {
        assert_eq!(parse_timestamp_str("15/03/24 3:05 PM"), Some(ts(2024, 3, 15, 15, 5, 0)));
        assert_eq!(parse_timestamp_str("15/03/24 12:05:10 am"), Some(ts(2024, 3, 15, 0, 5, 10)));
        assert_eq!(parse_timestamp_str("15/03/24 13:05 PM"), None);
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        assert_eq!(
            parse_timestamp_str("2024-03-15T12:30:00+02:00"),
            Some(ts(2024, 3, 15, 10, 30, 0))
        );
    }

    #[test]
    fn fractional_seconds_survive() {
        let parsed = parse_timestamp_str("15.03.2024 10:30:00.250").unwrap();
        assert_eq!(parsed - ts(2024, 3, 15, 10, 30, 0), TimeDelta::milliseconds(250));
    }

    #[test]
    fn typed_cells_are_taken_directly() {
        let native = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&CellValue::DateTime(native)), Some(ts(2024, 3, 15, 10, 30, 0)));
        assert_eq!(parse_timestamp(&CellValue::Number(45366.4375)), Some(ts(2024, 3, 15, 10, 30, 0)));
        assert_eq!(parse_timestamp(&CellValue::Number(-3.0)), None);
        assert_eq!(parse_timestamp(&CellValue::Number(f64::NAN)), None);
    }

    #[test]
    fn serial_dates_round_trip_through_workbook_encoding() {
        let instant = ts(2024, 3, 15, 10, 30, 0);
        assert_eq!(to_serial_date(&instant), 45366.4375);
        assert_eq!(from_serial_date(to_serial_date(&instant)), Some(instant));
        assert_eq!(from_serial_date(1.0), Some(ts(1899, 12, 31, 0, 0, 0)));
    }
}
