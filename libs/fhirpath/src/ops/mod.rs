//! Operator semantics: equality/equivalence, ordering, arithmetic and
//! three-valued boolean logic.

pub mod arithmetic;
pub mod boolean;
pub mod compare;
pub mod equality;

use crate::value::{classify_unit, CalendarUnit, UnitCategory};
use rust_decimal::Decimal;

/// Outcome of converting a quantity magnitude between two units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum QuantityConv {
    Converted(Decimal),
    /// Calendar/UCUM boundary above seconds, or year/month against the
    /// fixed-length calendar group: incomparable, not an error.
    Boundary,
    /// Dimensions differ outright.
    Mismatch,
}

/// Exact seconds per fixed-length calendar unit.
fn calendar_seconds(unit: CalendarUnit) -> Option<Decimal> {
    match unit {
        CalendarUnit::Week => Some(Decimal::from(604_800)),
        CalendarUnit::Day => Some(Decimal::from(86_400)),
        CalendarUnit::Hour => Some(Decimal::from(3_600)),
        CalendarUnit::Minute => Some(Decimal::from(60)),
        CalendarUnit::Second => Some(Decimal::ONE),
        CalendarUnit::Millisecond => Some(Decimal::new(1, 3)),
        // Variable-length units convert only to themselves.
        CalendarUnit::Year | CalendarUnit::Month => None,
    }
}

/// Convert `value` from `from` to `to`, honoring the unit taxonomy:
/// calendar words convert within their group by exact factors; UCUM codes
/// convert through the unit table; calendar durations above one second
/// never cross into UCUM time above one second.
pub(crate) fn convert_quantity_value(value: Decimal, from: &str, to: &str) -> QuantityConv {
    if from == to {
        return QuantityConv::Converted(value);
    }

    match (classify_unit(from), classify_unit(to)) {
        (UnitCategory::Calendar(f), UnitCategory::Calendar(t)) => {
            if f == t {
                return QuantityConv::Converted(value);
            }
            match (calendar_seconds(f), calendar_seconds(t)) {
                (Some(fs), Some(ts)) => QuantityConv::Converted(value * fs / ts),
                // year/month cross-talk is nominal, not exact.
                _ => QuantityConv::Boundary,
            }
        }
        (UnitCategory::Calendar(f), UnitCategory::Ucum) => {
            if f.above_seconds() && ucum_time_above_seconds(to) {
                return QuantityConv::Boundary;
            }
            ucum_convert(value, f.ucum_code(), to)
        }
        (UnitCategory::Ucum, UnitCategory::Calendar(t)) => {
            if t.above_seconds() && ucum_time_above_seconds(from) {
                return QuantityConv::Boundary;
            }
            ucum_convert(value, from, t.ucum_code())
        }
        (UnitCategory::Ucum, UnitCategory::Ucum) => ucum_convert(value, from, to),
    }
}

/// Whether a UCUM expression is a time quantity coarser than one second.
fn ucum_time_above_seconds(unit: &str) -> bool {
    matches!(unit, "min" | "h" | "d" | "wk" | "mo" | "a")
}

fn ucum_convert(value: Decimal, from: &str, to: &str) -> QuantityConv {
    match corten_ucum::convert_decimal(value, from, to) {
        Ok(v) => QuantityConv::Converted(v),
        Err(corten_ucum::Error::Incompatible { .. }) => QuantityConv::Mismatch,
        Err(_) => QuantityConv::Mismatch,
    }
}
