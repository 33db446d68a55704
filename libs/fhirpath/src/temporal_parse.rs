//! Parsing of partial-precision date, time and dateTime strings
//!
//! Used by the parser for `@` literals and by the conversion functions for
//! string inputs. Partial values are stored on a filled-in chrono value
//! with the written precision carried alongside.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::value::{DatePrecision, DateTimePrecision, TimePrecision, Value};

pub(crate) fn parse_date_parts(input: &str) -> Option<(NaiveDate, DatePrecision)> {
    let s = input.trim();
    match s.len() {
        4 => {
            let date = NaiveDate::parse_from_str(&format!("{}-01-01", s), "%Y-%m-%d").ok()?;
            Some((date, DatePrecision::Year))
        }
        7 => {
            let date = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok()?;
            Some((date, DatePrecision::Month))
        }
        10 => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            Some((date, DatePrecision::Day))
        }
        _ => None,
    }
}

pub(crate) fn parse_time_parts(input: &str) -> Option<(NaiveTime, TimePrecision)> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    let precision = if s.contains('.') {
        TimePrecision::Millisecond
    } else if s.matches(':').count() >= 2 {
        TimePrecision::Second
    } else if s.contains(':') {
        TimePrecision::Minute
    } else {
        TimePrecision::Hour
    };

    let value = NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .or_else(|_| NaiveTime::parse_from_str(s, "%H"))
        .ok()?;

    Some((value, precision))
}

pub(crate) fn parse_datetime_parts(
    input: &str,
) -> Option<(DateTime<Utc>, DateTimePrecision, Option<i32>)> {
    let raw = input.trim();
    if raw.is_empty() {
        return None;
    }

    // Date-only strings are a dateTime at date precision.
    let Some((date_part, rest)) = raw.split_once('T') else {
        let (date, date_prec) = parse_date_parts(raw)?;
        let naive = NaiveDateTime::new(date, NaiveTime::from_hms_opt(0, 0, 0)?);
        let dt = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);
        let precision = match date_prec {
            DatePrecision::Year => DateTimePrecision::Year,
            DatePrecision::Month => DateTimePrecision::Month,
            DatePrecision::Day => DateTimePrecision::Day,
        };
        return Some((dt, precision, None));
    };

    let (date, date_prec) = parse_date_parts(date_part)?;
    let (time_part, tz_offset) = split_timezone(rest)?;

    if time_part.is_empty() {
        // Trailing `T` with nothing after it (`@2015T`).
        let naive = NaiveDateTime::new(date, NaiveTime::from_hms_opt(0, 0, 0)?);
        let dt = apply_offset(naive, tz_offset)?;
        let precision = match date_prec {
            DatePrecision::Year => DateTimePrecision::Year,
            DatePrecision::Month => DateTimePrecision::Month,
            DatePrecision::Day => DateTimePrecision::Day,
        };
        return Some((dt, precision, tz_offset));
    }

    let (time, precision) = parse_datetime_time(time_part)?;
    let naive = NaiveDateTime::new(date, time);
    let dt = apply_offset(naive, tz_offset)?;
    Some((dt, precision, tz_offset))
}

fn apply_offset(naive: NaiveDateTime, tz_offset: Option<i32>) -> Option<DateTime<Utc>> {
    match tz_offset {
        Some(secs) => {
            let offset = FixedOffset::east_opt(secs)?;
            Some(
                offset
                    .from_local_datetime(&naive)
                    .single()?
                    .with_timezone(&Utc),
            )
        }
        None => Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)),
    }
}

/// Split a `Z`/`+HH:MM`/`+HHMM` suffix off the time part.
fn split_timezone(rest: &str) -> Option<(&str, Option<i32>)> {
    if let Some(stripped) = rest.strip_suffix('Z') {
        return Some((stripped, Some(0)));
    }

    if let Some(pos) = rest.rfind(['+', '-']) {
        let (time, tz) = rest.split_at(pos);
        if tz.len() >= 6 && tz.as_bytes().get(3) == Some(&b':') {
            let sign = if tz.starts_with('-') { -1 } else { 1 };
            let hours: i32 = tz[1..3].parse().ok()?;
            let minutes: i32 = tz[4..6].parse().ok()?;
            return Some((time, Some(sign * (hours * 3600 + minutes * 60))));
        }
        if tz.len() == 5 && tz[1..].bytes().all(|b| b.is_ascii_digit()) {
            let sign = if tz.starts_with('-') { -1 } else { 1 };
            let hours: i32 = tz[1..3].parse().ok()?;
            let minutes: i32 = tz[3..5].parse().ok()?;
            return Some((time, Some(sign * (hours * 3600 + minutes * 60))));
        }
    }

    Some((rest, None))
}

fn parse_datetime_time(time_part: &str) -> Option<(NaiveTime, DateTimePrecision)> {
    let (main, frac) = time_part
        .split_once('.')
        .map(|(a, b)| (a, Some(b)))
        .unwrap_or((time_part, None));

    let parts: Vec<&str> = main.split(':').collect();
    let (hour_str, minute_str, second_str, precision) = match parts.as_slice() {
        [hh] => (hh.trim(), "0", "0", DateTimePrecision::Hour),
        [hh, mm] => (hh.trim(), mm.trim(), "0", DateTimePrecision::Minute),
        [hh, mm, ss] => (
            hh.trim(),
            mm.trim(),
            ss.trim(),
            if frac.is_some() {
                DateTimePrecision::Millisecond
            } else {
                DateTimePrecision::Second
            },
        ),
        _ => return None,
    };

    let hour: u32 = hour_str.parse().ok()?;
    let minute: u32 = minute_str.parse().ok()?;
    let second: u32 = second_str.parse().ok()?;

    let nanos: u32 = if let Some(frac) = frac {
        let digits: String = frac.chars().take(3).collect();
        let padded = format!("{:0<3}", digits);
        let ms: u32 = padded.parse().ok()?;
        ms * 1_000_000
    } else {
        0
    };

    let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)?;
    Some((time, precision))
}

/// Parse a string into a Date value (conversion functions).
pub(crate) fn parse_date_value(input: &str) -> Option<Value> {
    let (date, precision) = parse_date_parts(input)?;
    Some(Value::date_with_precision(date, precision))
}

/// Parse a string into a Time value (conversion functions).
pub(crate) fn parse_time_value(input: &str) -> Option<Value> {
    let s = input.trim();
    let s = s.strip_prefix('T').unwrap_or(s);
    let (time, precision) = parse_time_parts(s)?;
    Some(Value::time_with_precision(time, precision))
}

/// Parse a string into a DateTime value (conversion functions).
pub(crate) fn parse_datetime_value(input: &str) -> Option<Value> {
    let (dt, precision, offset) = parse_datetime_parts(input)?;
    Some(Value::datetime_with_precision_and_offset(dt, precision, offset))
}

/// Whether a string is shaped like a date, dateTime or time; used when a
/// raw document string meets a temporal operand.
pub(crate) fn parse_temporal_like(input: &str) -> Option<Value> {
    let s = input.trim();
    if s.contains('T') {
        return parse_datetime_value(s);
    }
    if s.contains(':') {
        return parse_time_value(s);
    }
    let looks_like_date =
        |s: &str| (s.len() == 4 && s.chars().all(|c| c.is_ascii_digit())) || s.contains('-');
    if looks_like_date(s) {
        return parse_date_value(s);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueData;

    #[test]
    fn parses_partial_dates() {
        let (_, p) = parse_date_parts("2012").unwrap();
        assert_eq!(p, DatePrecision::Year);
        let (_, p) = parse_date_parts("2012-05").unwrap();
        assert_eq!(p, DatePrecision::Month);
        let (d, p) = parse_date_parts("2012-05-02").unwrap();
        assert_eq!(p, DatePrecision::Day);
        assert_eq!(d, NaiveDate::from_ymd_opt(2012, 5, 2).unwrap());
        assert!(parse_date_parts("2012-5-2").is_none());
    }

    #[test]
    fn parses_datetime_with_offset() {
        let (dt, precision, offset) = parse_datetime_parts("2012-05-02T10:30:00+01:00").unwrap();
        assert_eq!(precision, DateTimePrecision::Second);
        assert_eq!(offset, Some(3600));
        assert_eq!(dt.to_rfc3339(), "2012-05-02T09:30:00+00:00");
    }

    #[test]
    fn parses_partial_datetime() {
        let (_, precision, offset) = parse_datetime_parts("2015T").unwrap();
        assert_eq!(precision, DateTimePrecision::Year);
        assert_eq!(offset, None);
    }

    #[test]
    fn parses_times() {
        let (t, p) = parse_time_parts("14:30:14.559").unwrap();
        assert_eq!(p, TimePrecision::Millisecond);
        assert_eq!(t.format("%H:%M:%S%.3f").to_string(), "14:30:14.559");
    }

    #[test]
    fn temporal_like_dispatch() {
        assert!(matches!(
            parse_temporal_like("1974-12-25").unwrap().data(),
            ValueData::Date { .. }
        ));
        assert!(matches!(
            parse_temporal_like("1974-12-25T14:35:45").unwrap().data(),
            ValueData::DateTime { .. }
        ));
        assert!(matches!(
            parse_temporal_like("14:35:45").unwrap().data(),
            ValueData::Time { .. }
        ));
        assert!(parse_temporal_like("not a date").is_none());
    }
}
