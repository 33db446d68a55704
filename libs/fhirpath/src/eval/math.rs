//! Math functions

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::value::{Collection, Num, Value, ValueData};

fn singleton_num(input: &Collection, name: &str) -> Result<Num> {
    let item = input
        .singleton_item(name)?
        .ok_or_else(|| Error::Type(format!("{}() requires a value", name)))?;
    item.as_num()
        .ok_or_else(|| Error::Type(format!("{}() requires a number, got {}", name, item.type_name())))
}

fn decimal_result(name: &str, value: f64) -> Result<Collection> {
    if value.is_infinite() || value.is_nan() {
        return Ok(Collection::empty());
    }
    let d = Decimal::from_f64(value)
        .ok_or_else(|| Error::Domain(format!("{}() result cannot be represented", name)))?;
    // Trim float noise past the 15 significant digits an f64 carries.
    Ok(Collection::singleton(Value::decimal(
        d.round_dp(15).normalize(),
    )))
}

fn to_f64(name: &str, d: Decimal) -> Result<f64> {
    d.to_f64()
        .ok_or_else(|| Error::Domain(format!("{}() input value too large", name)))
}

pub fn abs(input: &Collection) -> Result<Collection> {
    let item = input
        .singleton_item("abs()")?
        .ok_or_else(|| Error::Type("abs() requires a value".into()))?;
    match item.data() {
        ValueData::Quantity { value, unit } => Ok(Collection::singleton(Value::quantity(
            value.abs(),
            unit.clone(),
        ))),
        _ => match singleton_num(input, "abs")? {
            Num::Integer(i) => Ok(Collection::singleton(Value::integer(i.abs()))),
            Num::Long(i) => Ok(Collection::singleton(Value::long(i.abs()))),
            Num::Decimal(d) => Ok(Collection::singleton(Value::decimal(d.abs()))),
        },
    }
}

pub fn ceiling(input: &Collection) -> Result<Collection> {
    match singleton_num(input, "ceiling")? {
        Num::Integer(i) => Ok(Collection::singleton(Value::integer(i))),
        Num::Long(i) => Ok(Collection::singleton(Value::long(i))),
        Num::Decimal(d) => {
            let i = d
                .ceil()
                .to_i64()
                .ok_or_else(|| Error::Domain("ceiling() out of range".into()))?;
            Ok(Collection::singleton(Value::integer(i)))
        }
    }
}

pub fn floor(input: &Collection) -> Result<Collection> {
    match singleton_num(input, "floor")? {
        Num::Integer(i) => Ok(Collection::singleton(Value::integer(i))),
        Num::Long(i) => Ok(Collection::singleton(Value::long(i))),
        Num::Decimal(d) => {
            let i = d
                .floor()
                .to_i64()
                .ok_or_else(|| Error::Domain("floor() out of range".into()))?;
            Ok(Collection::singleton(Value::integer(i)))
        }
    }
}

pub fn truncate(input: &Collection) -> Result<Collection> {
    match singleton_num(input, "truncate")? {
        Num::Integer(i) => Ok(Collection::singleton(Value::integer(i))),
        Num::Long(i) => Ok(Collection::singleton(Value::long(i))),
        Num::Decimal(d) => {
            let i = d
                .trunc()
                .to_i64()
                .ok_or_else(|| Error::Domain("truncate() out of range".into()))?;
            Ok(Collection::singleton(Value::integer(i)))
        }
    }
}

pub fn round(input: &Collection, precision: Option<i64>) -> Result<Collection> {
    let d = singleton_num(input, "round")?.to_decimal();
    let dp = match precision {
        Some(p) if p < 0 => {
            return Err(Error::Domain("round() precision must be >= 0".into()));
        }
        Some(p) => p as u32,
        None => 0,
    };
    // Traditional rounding: halves go away from zero, not to even.
    Ok(Collection::singleton(Value::decimal(
        d.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero),
    )))
}

pub fn sqrt(input: &Collection) -> Result<Collection> {
    let d = singleton_num(input, "sqrt")?.to_decimal();
    if d < Decimal::ZERO {
        return Ok(Collection::empty());
    }
    decimal_result("sqrt", to_f64("sqrt", d)?.sqrt())
}

pub fn exp(input: &Collection) -> Result<Collection> {
    let d = singleton_num(input, "exp")?.to_decimal();
    decimal_result("exp", to_f64("exp", d)?.exp())
}

pub fn ln(input: &Collection) -> Result<Collection> {
    let d = singleton_num(input, "ln")?.to_decimal();
    if d <= Decimal::ZERO {
        return Ok(Collection::empty());
    }
    decimal_result("ln", to_f64("ln", d)?.ln())
}

pub fn log(input: &Collection, base: &Collection) -> Result<Collection> {
    if base.is_empty() {
        return Ok(Collection::empty());
    }
    let d = singleton_num(input, "log")?.to_decimal();
    let b = singleton_num(base, "log")?.to_decimal();
    if d <= Decimal::ZERO || b <= Decimal::ZERO || b == Decimal::ONE {
        return Ok(Collection::empty());
    }
    let value = to_f64("log", d)?.ln() / to_f64("log", b)?.ln();
    decimal_result("log", value)
}

pub fn power(input: &Collection, exponent: &Collection) -> Result<Collection> {
    if exponent.is_empty() {
        return Ok(Collection::empty());
    }
    let base = singleton_num(input, "power")?;
    let exp = singleton_num(exponent, "power")?;

    let base_d = base.to_decimal();
    let exp_d = exp.to_decimal();

    // Negative base with a fractional exponent has no real result.
    if base_d < Decimal::ZERO && exp_d.fract() != Decimal::ZERO {
        return Ok(Collection::empty());
    }

    let value = to_f64("power", base_d)?.powf(to_f64("power", exp_d)?);
    if value.is_infinite() || value.is_nan() {
        return Ok(Collection::empty());
    }

    // Integer base and non-negative integer exponent stay integral.
    if !base.is_decimal() && !exp.is_decimal() && exp_d >= Decimal::ZERO {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            return Ok(Collection::singleton(Value::integer(value as i64)));
        }
    }

    decimal_result("power", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn int(i: i64) -> Collection {
        Collection::singleton(Value::integer(i))
    }

    fn dec(s: &str) -> Collection {
        Collection::singleton(Value::decimal(Decimal::from_str(s).unwrap()))
    }

    #[test]
    fn rounding_family() {
        assert_eq!(ceiling(&dec("1.1")).unwrap().as_integer().unwrap(), 2);
        assert_eq!(ceiling(&dec("-1.1")).unwrap().as_integer().unwrap(), -1);
        assert_eq!(floor(&dec("2.9")).unwrap().as_integer().unwrap(), 2);
        assert_eq!(floor(&dec("-2.1")).unwrap().as_integer().unwrap(), -3);
        assert_eq!(truncate(&dec("-2.9")).unwrap().as_integer().unwrap(), -2);
    }

    #[test]
    fn round_with_precision() {
        let out = round(&dec("3.14159"), Some(3)).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Decimal(d) => assert_eq!(*d, Decimal::from_str("3.142").unwrap()),
            other => panic!("expected decimal, got {:?}", other),
        }
        assert!(round(&dec("1.5"), Some(-1)).is_err());
    }

    #[test]
    fn power_integral_and_fractional() {
        assert_eq!(power(&int(2), &int(10)).unwrap().as_integer().unwrap(), 1024);
        assert!(power(&int(-1), &dec("0.5")).unwrap().is_empty());
    }

    #[test]
    fn sqrt_of_negative_is_empty() {
        assert!(sqrt(&int(-1)).unwrap().is_empty());
        let out = sqrt(&int(81)).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Decimal(d) => assert_eq!(*d, Decimal::from(9)),
            other => panic!("expected decimal, got {:?}", other),
        }
    }

    #[test]
    fn ln_and_log() {
        assert!(ln(&int(0)).unwrap().is_empty());
        let out = log(&int(8), &int(2)).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Decimal(d) => assert_eq!(*d, Decimal::from(3)),
            other => panic!("expected decimal, got {:?}", other),
        }
    }

    #[test]
    fn abs_keeps_quantity_units() {
        let out = abs(&Collection::singleton(Value::quantity(
            Decimal::from(-5),
            "mg",
        )))
        .unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Quantity { value, unit } => {
                assert_eq!(*value, Decimal::from(5));
                assert_eq!(unit.as_ref(), "mg");
            }
            other => panic!("expected quantity, got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_input_is_a_type_error() {
        let err = abs(&Collection::singleton(Value::string("x"))).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }
}
