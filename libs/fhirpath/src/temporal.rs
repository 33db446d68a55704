//! Partial-precision temporal comparison and calendar arithmetic
//!
//! Date/DateTime/Time values compare tri-valued: a definite ordering, a
//! definite equality, or *uncertain* (`None`) when the shared-precision
//! prefix matches but the precisions differ, or when timezone presence
//! differs and the gap falls inside the offset ambiguity window.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDateTime, TimeZone, Timelike, Utc,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::temporal_parse::parse_temporal_like;
use crate::value::{
    CalendarUnit, DatePrecision, DateTimePrecision, TimePrecision, Value, ValueData,
};

/// A temporal operand extracted from a value.
#[derive(Debug, Clone)]
pub enum Temporal {
    Date(chrono::NaiveDate, DatePrecision),
    DateTime(DateTime<Utc>, DateTimePrecision, Option<i32>),
    Time(chrono::NaiveTime, TimePrecision),
}

/// Extract a temporal view from a value. Nodes over date-shaped strings
/// parse lazily; model typing is not required.
pub fn temporal_view(value: &Value) -> Option<Temporal> {
    match value.data() {
        ValueData::Date { value, precision } => Some(Temporal::Date(*value, *precision)),
        ValueData::DateTime {
            value,
            precision,
            timezone_offset,
        } => Some(Temporal::DateTime(*value, *precision, *timezone_offset)),
        ValueData::Time { value, precision } => Some(Temporal::Time(*value, *precision)),
        ValueData::Node(node) => {
            let s = node.data()?.as_str()?;
            match parse_temporal_like(s)?.data() {
                ValueData::Date { value, precision } => Some(Temporal::Date(*value, *precision)),
                ValueData::DateTime {
                    value,
                    precision,
                    timezone_offset,
                } => Some(Temporal::DateTime(*value, *precision, *timezone_offset)),
                ValueData::Time { value, precision } => Some(Temporal::Time(*value, *precision)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn datetime_precision_depth(p: DateTimePrecision) -> usize {
    match p {
        DateTimePrecision::Year => 1,
        DateTimePrecision::Month => 2,
        DateTimePrecision::Day => 3,
        DateTimePrecision::Hour => 4,
        DateTimePrecision::Minute => 5,
        DateTimePrecision::Second => 6,
        DateTimePrecision::Millisecond => 7,
    }
}

fn date_precision_depth(p: DatePrecision) -> usize {
    match p {
        DatePrecision::Year => 1,
        DatePrecision::Month => 2,
        DatePrecision::Day => 3,
    }
}

fn time_precision_depth(p: TimePrecision) -> usize {
    match p {
        TimePrecision::Hour => 1,
        TimePrecision::Minute => 2,
        TimePrecision::Second => 3,
        TimePrecision::Millisecond => 4,
    }
}

/// Calendar components as written (year .. millisecond), with how many of
/// them are significant and whether a timezone was specified.
struct Components {
    values: [i64; 7],
    depth: usize,
    tz_specified: bool,
    /// UTC instant, for the cross-timezone ambiguity check.
    instant: Option<DateTime<Utc>>,
}

fn datetime_components(dt: &DateTime<Utc>, depth: usize, offset: Option<i32>) -> Components {
    // Render in the written offset; unzoned values were stored as naive-UTC.
    let local = match offset {
        Some(secs) => dt.with_timezone(
            &FixedOffset::east_opt(secs).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap()),
        ),
        None => dt.with_timezone(&FixedOffset::east_opt(0).unwrap()),
    };
    Components {
        values: [
            local.year() as i64,
            local.month() as i64,
            local.day() as i64,
            local.hour() as i64,
            local.minute() as i64,
            local.second() as i64,
            (local.nanosecond() / 1_000_000) as i64,
        ],
        depth,
        tz_specified: offset.is_some(),
        instant: Some(*dt),
    }
}

fn components(t: &Temporal) -> Components {
    match t {
        Temporal::Date(date, precision) => Components {
            values: [date.year() as i64, date.month() as i64, date.day() as i64, 0, 0, 0, 0],
            depth: date_precision_depth(*precision),
            tz_specified: false,
            instant: None,
        },
        Temporal::DateTime(dt, precision, offset) => {
            datetime_components(dt, datetime_precision_depth(*precision), *offset)
        }
        Temporal::Time(time, precision) => Components {
            values: [
                time.hour() as i64,
                time.minute() as i64,
                time.second() as i64,
                (time.nanosecond() / 1_000_000) as i64,
                0,
                0,
                0,
            ],
            depth: time_precision_depth(*precision),
            tz_specified: false,
            instant: None,
        },
    }
}

fn same_class(a: &Temporal, b: &Temporal) -> bool {
    match (a, b) {
        (Temporal::Time(..), Temporal::Time(..)) => true,
        (Temporal::Time(..), _) | (_, Temporal::Time(..)) => false,
        // Date, DateTime and Instant share a comparison class.
        _ => true,
    }
}

/// When both values compare as UTC instants, offsets further apart than
/// the -12:00..+14:00 legal range cannot change the answer.
fn offset_ambiguity() -> Duration {
    Duration::hours(26)
}

/// Tri-valued comparison: `Err` for incompatible classes, `Ok(None)` for
/// uncertain, `Ok(Some(ordering))` otherwise.
pub fn compare(a: &Temporal, b: &Temporal) -> Result<Option<Ordering>> {
    if !same_class(a, b) {
        return Err(Error::Type(format!(
            "cannot compare {} with {}",
            temporal_kind(a),
            temporal_kind(b)
        )));
    }

    let ca = components(a);
    let cb = components(b);

    // Timezone presence differs and the time of day is significant: the
    // answer only stands when the gap exceeds the possible-offset window.
    let min_depth = ca.depth.min(cb.depth);
    if ca.tz_specified != cb.tz_specified && min_depth > 3 {
        if let (Some(ia), Some(ib)) = (ca.instant, cb.instant) {
            let gap = ia.signed_duration_since(ib);
            if gap.abs() >= offset_ambiguity() {
                return Ok(Some(ia.cmp(&ib)));
            }
        }
        return Ok(None);
    }

    for i in 0..min_depth {
        match ca.values[i].cmp(&cb.values[i]) {
            Ordering::Equal => continue,
            other => return Ok(Some(other)),
        }
    }

    if ca.depth == cb.depth {
        Ok(Some(Ordering::Equal))
    } else {
        // Equal down to the shared precision; the rest is unknown.
        Ok(None)
    }
}

/// Tri-valued equality for the `=` operator.
pub fn equal(a: &Temporal, b: &Temporal) -> Option<bool> {
    match compare(a, b) {
        Ok(Some(ordering)) => Some(ordering == Ordering::Equal),
        Ok(None) => None,
        // Cross-class equality is definite inequality.
        Err(_) => Some(false),
    }
}

/// Equivalence: comparison at the coarser of the two precisions.
pub fn equivalent(a: &Temporal, b: &Temporal) -> bool {
    if !same_class(a, b) {
        return false;
    }
    let ca = components(a);
    let cb = components(b);
    if ca.tz_specified != cb.tz_specified && ca.depth.min(cb.depth) > 3 {
        return false;
    }
    let min_depth = ca.depth.min(cb.depth);
    (0..min_depth).all(|i| ca.values[i] == cb.values[i])
}

fn temporal_kind(t: &Temporal) -> &'static str {
    match t {
        Temporal::Date(..) => "Date",
        Temporal::DateTime(..) => "DateTime",
        Temporal::Time(..) => "Time",
    }
}

/// Time-valued quantity units accepted by date/time arithmetic: calendar
/// words and the nominally equivalent UCUM codes.
fn arithmetic_unit(unit: &str) -> Option<CalendarUnit> {
    if let Some(cal) = CalendarUnit::parse(unit) {
        return Some(cal);
    }
    match unit {
        "a" => Some(CalendarUnit::Year),
        "mo" => Some(CalendarUnit::Month),
        "wk" => Some(CalendarUnit::Week),
        "d" => Some(CalendarUnit::Day),
        "h" => Some(CalendarUnit::Hour),
        "min" => Some(CalendarUnit::Minute),
        "s" => Some(CalendarUnit::Second),
        "ms" => Some(CalendarUnit::Millisecond),
        _ => None,
    }
}

/// Rank on the year..millisecond chain, weeks folding into days.
fn unit_rank(unit: CalendarUnit) -> usize {
    match unit {
        CalendarUnit::Year => 0,
        CalendarUnit::Month => 1,
        CalendarUnit::Week | CalendarUnit::Day => 2,
        CalendarUnit::Hour => 3,
        CalendarUnit::Minute => 4,
        CalendarUnit::Second => 5,
        CalendarUnit::Millisecond => 6,
    }
}

/// Nominal step factors between adjacent ranks (month→day uses 30, per
/// the partial-precision truncation rules).
const STEP_FACTORS: [i64; 6] = [12, 30, 24, 60, 60, 1000];

/// Convert a quantity to a whole number of `target` units, truncating
/// toward zero when the quantity is finer-grained than the target.
fn convert_to_rank(value: Decimal, unit: CalendarUnit, target_rank: usize) -> Result<i64> {
    let mut v = value;
    if unit == CalendarUnit::Week {
        v *= Decimal::from(7);
    }
    let from_rank = unit_rank(unit);

    if from_rank <= target_rank {
        // Coarser or equal: multiply down the chain.
        for factor in STEP_FACTORS[from_rank..target_rank].iter() {
            v *= Decimal::from(*factor);
        }
    } else {
        // Finer: divide up the chain, truncating.
        for factor in STEP_FACTORS[target_rank..from_rank].iter() {
            v /= Decimal::from(*factor);
        }
    }
    v.trunc()
        .to_i64()
        .ok_or_else(|| Error::Domain("date/time arithmetic overflow".into()))
}

fn add_months_naive(naive: NaiveDateTime, months: i64) -> Result<NaiveDateTime> {
    let out = if months >= 0 {
        naive.checked_add_months(Months::new(months as u32))
    } else {
        naive.checked_sub_months(Months::new((-months) as u32))
    };
    out.ok_or_else(|| Error::Domain("date/time arithmetic overflow".into()))
}

/// `temporal ± quantity`. The quantity converts to the operand's finest
/// precision unit (truncating toward zero); the result keeps the
/// operand's precision. Calendar month/year steps clamp the day-of-month.
pub fn add_quantity(t: &Temporal, value: Decimal, unit: &str, negate: bool) -> Result<Value> {
    let unit = arithmetic_unit(unit).ok_or_else(|| {
        Error::Domain(format!("'{}' is not a time-valued unit", unit))
    })?;
    let value = if negate { -value } else { value };

    match t {
        Temporal::Date(date, precision) => {
            let target_rank = match precision {
                DatePrecision::Year => 0,
                DatePrecision::Month => 1,
                DatePrecision::Day => 2,
            };
            let amount = convert_to_rank(value, unit, target_rank)?;
            let naive = NaiveDateTime::new(*date, chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap());
            let out = match target_rank {
                0 => add_months_naive(naive, amount * 12)?,
                1 => add_months_naive(naive, amount)?,
                _ => naive
                    .checked_add_signed(Duration::days(amount))
                    .ok_or_else(|| Error::Domain("date/time arithmetic overflow".into()))?,
            };
            Ok(Value::date_with_precision(out.date(), *precision))
        }
        Temporal::DateTime(dt, precision, offset) => {
            let target_rank = match precision {
                DateTimePrecision::Year => 0,
                DateTimePrecision::Month => 1,
                DateTimePrecision::Day => 2,
                DateTimePrecision::Hour => 3,
                DateTimePrecision::Minute => 4,
                DateTimePrecision::Second => 5,
                DateTimePrecision::Millisecond => 6,
            };
            let amount = convert_to_rank(value, unit, target_rank)?;

            let fixed = FixedOffset::east_opt(offset.unwrap_or(0))
                .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
            let local = dt.with_timezone(&fixed).naive_local();

            let out = match target_rank {
                0 => add_months_naive(local, amount * 12)?,
                1 => add_months_naive(local, amount)?,
                rank => {
                    let duration = match rank {
                        2 => Duration::days(amount),
                        3 => Duration::hours(amount),
                        4 => Duration::minutes(amount),
                        5 => Duration::seconds(amount),
                        _ => Duration::milliseconds(amount),
                    };
                    local
                        .checked_add_signed(duration)
                        .ok_or_else(|| Error::Domain("date/time arithmetic overflow".into()))?
                }
            };

            let rebuilt = fixed
                .from_local_datetime(&out)
                .single()
                .ok_or_else(|| Error::Domain("date/time arithmetic overflow".into()))?
                .with_timezone(&Utc);
            Ok(Value::datetime_with_precision_and_offset(
                rebuilt, *precision, *offset,
            ))
        }
        Temporal::Time(time, precision) => {
            if unit_rank(unit) < 3 {
                return Err(Error::Domain(format!(
                    "cannot add {}-valued quantities to a Time",
                    unit.ucum_code()
                )));
            }
            let target_rank = match precision {
                TimePrecision::Hour => 3,
                TimePrecision::Minute => 4,
                TimePrecision::Second => 5,
                TimePrecision::Millisecond => 6,
            };
            let amount = convert_to_rank(value, unit, target_rank)?;
            let duration = match target_rank {
                3 => Duration::hours(amount),
                4 => Duration::minutes(amount),
                5 => Duration::seconds(amount),
                _ => Duration::milliseconds(amount),
            };
            // NaiveTime arithmetic wraps around midnight.
            let out = *time + duration;
            Ok(Value::time_with_precision(out, *precision))
        }
    }
}
