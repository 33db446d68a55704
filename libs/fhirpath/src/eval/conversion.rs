//! The `to*` conversion family and its `convertsTo*` predicates
//!
//! Inconvertible inputs yield empty, never an error; only a 2+-item
//! input is an error. The matrix follows the FHIRPath specification.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Result;
use crate::ops::{convert_quantity_value, QuantityConv};
use crate::temporal_parse;
use crate::value::{Collection, DateTimePrecision, Num, Value, ValueData};

fn singleton<'a>(input: &'a Collection, what: &str) -> Result<Option<&'a Value>> {
    input.singleton_item(what)
}

/// `true/t/yes/y/1/1.0` and `false/f/no/n/0/0.0`, case-insensitively.
fn string_to_boolean(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "0.0" => Some(false),
        _ => None,
    }
}

fn num_to_boolean(n: Num) -> Option<bool> {
    let d = n.to_decimal();
    if d == Decimal::ONE {
        Some(true)
    } else if d == Decimal::ZERO {
        Some(false)
    } else {
        None
    }
}

pub fn to_boolean(input: &Collection) -> Result<Collection> {
    let Some(item) = singleton(input, "toBoolean()")? else {
        return Ok(Collection::empty());
    };
    let out = if let Some(b) = item.as_bool_like() {
        Some(b)
    } else if let Some(n) = item.as_num() {
        num_to_boolean(n)
    } else if let Some(s) = item.as_str_like() {
        string_to_boolean(s)
    } else {
        None
    };
    Ok(out
        .map(|b| Collection::singleton(Value::boolean(b)))
        .unwrap_or_default())
}

fn integer_like_string(s: &str) -> Option<i64> {
    let s = s.trim();
    let rest = s.strip_prefix(['+', '-']).unwrap_or(s);
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn to_integer(input: &Collection) -> Result<Collection> {
    let Some(item) = singleton(input, "toInteger()")? else {
        return Ok(Collection::empty());
    };
    let out = match item.data() {
        ValueData::Integer(i) | ValueData::Long(i) => Some(*i),
        ValueData::Boolean(b) => Some(if *b { 1 } else { 0 }),
        // Decimal → Integer is not a defined conversion.
        ValueData::Decimal(_) => None,
        _ => match (item.as_num(), item.as_str_like(), item.as_bool_like()) {
            (Some(Num::Integer(i)), _, _) | (Some(Num::Long(i)), _, _) => Some(i),
            (Some(Num::Decimal(_)), _, _) => None,
            (_, Some(s), _) => integer_like_string(s),
            (_, _, Some(b)) => Some(if b { 1 } else { 0 }),
            _ => None,
        },
    };
    Ok(out
        .map(|i| Collection::singleton(Value::integer(i)))
        .unwrap_or_default())
}

pub fn to_long(input: &Collection) -> Result<Collection> {
    let Some(item) = singleton(input, "toLong()")? else {
        return Ok(Collection::empty());
    };
    let out = match item.data() {
        ValueData::Integer(i) | ValueData::Long(i) => Some(*i),
        ValueData::Boolean(b) => Some(if *b { 1 } else { 0 }),
        ValueData::Decimal(_) => None,
        _ => match (item.as_num(), item.as_str_like(), item.as_bool_like()) {
            (Some(Num::Integer(i)), _, _) | (Some(Num::Long(i)), _, _) => Some(i),
            (Some(Num::Decimal(_)), _, _) => None,
            (_, Some(s), _) => integer_like_string(s),
            (_, _, Some(b)) => Some(if b { 1 } else { 0 }),
            _ => None,
        },
    };
    Ok(out
        .map(|i| Collection::singleton(Value::long(i)))
        .unwrap_or_default())
}

pub fn to_decimal(input: &Collection) -> Result<Collection> {
    let Some(item) = singleton(input, "toDecimal()")? else {
        return Ok(Collection::empty());
    };
    let out = if let Some(n) = item.as_num() {
        Some(n.to_decimal())
    } else if let Some(b) = item.as_bool_like() {
        Some(if b { Decimal::ONE } else { Decimal::ZERO })
    } else if let Some(s) = item.as_str_like() {
        Decimal::from_str(s.trim()).ok()
    } else {
        None
    };
    Ok(out
        .map(|d| Collection::singleton(Value::decimal(d)))
        .unwrap_or_default())
}

pub fn to_date(input: &Collection) -> Result<Collection> {
    let Some(item) = singleton(input, "toDate()")? else {
        return Ok(Collection::empty());
    };
    let out = match item.data() {
        ValueData::Date { .. } => Some(item.clone()),
        ValueData::DateTime {
            value,
            precision,
            timezone_offset,
        } => {
            let date_precision = match precision {
                DateTimePrecision::Year => crate::value::DatePrecision::Year,
                DateTimePrecision::Month => crate::value::DatePrecision::Month,
                _ => crate::value::DatePrecision::Day,
            };
            let offset = chrono::FixedOffset::east_opt(timezone_offset.unwrap_or(0))
                .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).unwrap());
            Some(Value::date_with_precision(
                value.with_timezone(&offset).date_naive(),
                date_precision,
            ))
        }
        _ => item
            .as_str_like()
            .and_then(temporal_parse::parse_date_value),
    };
    Ok(out.map(Collection::singleton).unwrap_or_default())
}

pub fn to_datetime(input: &Collection) -> Result<Collection> {
    let Some(item) = singleton(input, "toDateTime()")? else {
        return Ok(Collection::empty());
    };
    let out = match item.data() {
        ValueData::DateTime { .. } => Some(item.clone()),
        ValueData::Date { value, precision } => {
            let dt_precision = match precision {
                crate::value::DatePrecision::Year => DateTimePrecision::Year,
                crate::value::DatePrecision::Month => DateTimePrecision::Month,
                crate::value::DatePrecision::Day => DateTimePrecision::Day,
            };
            value.and_hms_opt(0, 0, 0).map(|naive| {
                Value::datetime_with_precision_and_offset(
                    chrono::DateTime::from_naive_utc_and_offset(naive, chrono::Utc),
                    dt_precision,
                    None,
                )
            })
        }
        _ => item
            .as_str_like()
            .and_then(temporal_parse::parse_datetime_value),
    };
    Ok(out.map(Collection::singleton).unwrap_or_default())
}

pub fn to_time(input: &Collection) -> Result<Collection> {
    let Some(item) = singleton(input, "toTime()")? else {
        return Ok(Collection::empty());
    };
    let out = match item.data() {
        ValueData::Time { .. } => Some(item.clone()),
        _ => item
            .as_str_like()
            .and_then(temporal_parse::parse_time_value),
    };
    Ok(out.map(Collection::singleton).unwrap_or_default())
}

/// Parse a quantity-shaped string: `<number>`, `<number> 'ucum'` or
/// `<number> calendarWord`.
fn string_to_quantity(s: &str) -> Option<(Decimal, Arc<str>)> {
    let s = s.trim();
    let (number_part, unit_part) = match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim()),
        None => (s, ""),
    };
    let value = Decimal::from_str(number_part).ok()?;
    if unit_part.is_empty() {
        return Some((value, Arc::from("1")));
    }
    let unit = if unit_part.starts_with('\'') && unit_part.ends_with('\'') && unit_part.len() >= 2 {
        &unit_part[1..unit_part.len() - 1]
    } else {
        // Unquoted units must be calendar words.
        crate::value::CalendarUnit::parse(unit_part)?;
        unit_part
    };
    Some((value, Arc::from(unit)))
}

pub fn to_quantity(input: &Collection, to_unit: Option<&Collection>) -> Result<Collection> {
    let Some(item) = singleton(input, "toQuantity()")? else {
        return Ok(Collection::empty());
    };

    let parsed: Option<(Decimal, Arc<str>)> = match item.data() {
        ValueData::Quantity { value, unit } => Some((*value, unit.clone())),
        ValueData::Boolean(b) => Some((
            if *b { Decimal::ONE } else { Decimal::ZERO },
            Arc::from("1"),
        )),
        _ => {
            if let Some((v, u)) = item.as_quantity_like() {
                Some((v, u))
            } else if let Some(n) = item.as_num() {
                Some((n.to_decimal(), Arc::from("1")))
            } else if let Some(b) = item.as_bool_like() {
                Some((if b { Decimal::ONE } else { Decimal::ZERO }, Arc::from("1")))
            } else {
                item.as_str_like().and_then(string_to_quantity)
            }
        }
    };

    let Some((value, unit)) = parsed else {
        return Ok(Collection::empty());
    };

    match to_unit {
        None => Ok(Collection::singleton(Value::quantity(value, unit))),
        Some(target) => {
            if target.is_empty() {
                return Ok(Collection::empty());
            }
            let target = target.as_string()?;
            match convert_quantity_value(value, &unit, &target) {
                QuantityConv::Converted(v) => {
                    Ok(Collection::singleton(Value::quantity(v, target)))
                }
                // Crossing the calendar/UCUM boundary (and any failed
                // conversion) yields no result.
                QuantityConv::Boundary | QuantityConv::Mismatch => Ok(Collection::empty()),
            }
        }
    }
}

macro_rules! converts_predicate {
    ($name:ident, $conv:expr) => {
        pub fn $name(input: &Collection) -> Result<Collection> {
            let out = $conv(input)?;
            Ok(Collection::singleton(Value::boolean(!out.is_empty())))
        }
    };
}

converts_predicate!(converts_to_boolean, to_boolean);
converts_predicate!(converts_to_integer, to_integer);
converts_predicate!(converts_to_long, to_long);
converts_predicate!(converts_to_decimal, to_decimal);
converts_predicate!(converts_to_date, to_date);
converts_predicate!(converts_to_datetime, to_datetime);
converts_predicate!(converts_to_time, to_time);

pub fn converts_to_string(input: &Collection) -> Result<Collection> {
    let out = crate::eval::strings::to_string(input).is_ok();
    Ok(Collection::singleton(Value::boolean(out)))
}

pub fn converts_to_quantity(input: &Collection, to_unit: Option<&Collection>) -> Result<Collection> {
    let out = to_quantity(input, to_unit)?;
    Ok(Collection::singleton(Value::boolean(!out.is_empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(v: Value) -> Collection {
        Collection::singleton(v)
    }

    #[test]
    fn boolean_conversions() {
        for (text, expected) in [
            ("true", Some(true)),
            ("T", Some(true)),
            ("YES", Some(true)),
            ("1", Some(true)),
            ("1.0", Some(true)),
            ("false", Some(false)),
            ("n", Some(false)),
            ("0.0", Some(false)),
            ("maybe", None),
        ] {
            let out = to_boolean(&one(Value::string(text))).unwrap();
            let got = out.as_boolean_singleton().unwrap();
            assert_eq!(got, expected, "toBoolean('{}')", text);
        }

        assert_eq!(
            to_boolean(&one(Value::integer(1)))
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(true)
        );
        assert!(to_boolean(&one(Value::integer(2))).unwrap().is_empty());
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(
            to_integer(&one(Value::string("42"))).unwrap().as_integer().unwrap(),
            42
        );
        assert_eq!(
            to_integer(&one(Value::string("-7"))).unwrap().as_integer().unwrap(),
            -7
        );
        assert!(to_integer(&one(Value::string("4.2"))).unwrap().is_empty());
        // Decimal → Integer is not defined
        assert!(to_integer(&one(Value::decimal(Decimal::from_str("1.0").unwrap())))
            .unwrap()
            .is_empty());
        assert_eq!(
            to_integer(&one(Value::boolean(true))).unwrap().as_integer().unwrap(),
            1
        );
    }

    #[test]
    fn long_conversions() {
        let out = to_long(&one(Value::integer(5))).unwrap();
        assert!(matches!(out.first_item().unwrap().data(), ValueData::Long(5)));
    }

    #[test]
    fn decimal_conversions() {
        let out = to_decimal(&one(Value::string("0.5"))).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Decimal(d) => assert_eq!(*d, Decimal::from_str("0.5").unwrap()),
            other => panic!("expected decimal, got {:?}", other),
        }
        assert!(to_decimal(&one(Value::string("x"))).unwrap().is_empty());
    }

    #[test]
    fn temporal_conversions() {
        assert!(!to_date(&one(Value::string("2012-05-02"))).unwrap().is_empty());
        assert!(to_date(&one(Value::string("not a date"))).unwrap().is_empty());
        assert!(!to_datetime(&one(Value::string("2012-05-02T10:30:00Z")))
            .unwrap()
            .is_empty());
        assert!(!to_time(&one(Value::string("10:30"))).unwrap().is_empty());
    }

    #[test]
    fn quantity_conversions() {
        let out = to_quantity(&one(Value::string("5.4 'mg'")), None).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Quantity { value, unit } => {
                assert_eq!(*value, Decimal::from_str("5.4").unwrap());
                assert_eq!(unit.as_ref(), "mg");
            }
            other => panic!("expected quantity, got {:?}", other),
        }

        // Missing unit defaults to '1'
        let out = to_quantity(&one(Value::string("5")), None).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Quantity { unit, .. } => assert_eq!(unit.as_ref(), "1"),
            other => panic!("expected quantity, got {:?}", other),
        }

        // Unquoted non-calendar unit is not a quantity string
        assert!(to_quantity(&one(Value::string("5 mg")), None).unwrap().is_empty());
        // Calendar words are fine unquoted
        assert!(!to_quantity(&one(Value::string("4 days")), None).unwrap().is_empty());
    }

    #[test]
    fn quantity_unit_conversion_and_boundary() {
        let minutes = one(Value::quantity(Decimal::from(3), "min"));
        let out = to_quantity(&minutes, Some(&one(Value::string("s")))).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Quantity { value, unit } => {
                assert_eq!(*value, Decimal::from(180));
                assert_eq!(unit.as_ref(), "s");
            }
            other => panic!("expected quantity, got {:?}", other),
        }

        // Calendar year cannot cross into UCUM months
        let year = one(Value::quantity(Decimal::ONE, "year"));
        assert!(to_quantity(&year, Some(&one(Value::string("mo"))))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn converts_predicates() {
        assert_eq!(
            converts_to_integer(&one(Value::string("3")))
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(true)
        );
        assert_eq!(
            converts_to_integer(&one(Value::string("3.5")))
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(false)
        );
    }
}
