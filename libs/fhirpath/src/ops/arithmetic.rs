//! Polymorphic arithmetic: numbers, longs, quantities and temporals

use super::{convert_quantity_value, QuantityConv};
use crate::error::{Error, Result};
use crate::temporal;
use crate::value::{Collection, Num, Value, ValueData};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    DivInt,
    Mod,
}

fn is_temporal(value: &Value) -> bool {
    matches!(
        value.data(),
        ValueData::Date { .. } | ValueData::DateTime { .. } | ValueData::Time { .. }
    )
}

fn is_quantity(value: &Value) -> bool {
    matches!(value.data(), ValueData::Quantity { .. })
}

/// `+ - * / div mod` over collections. Empty operands propagate; both
/// sides must be singletons.
pub fn arithmetic(op: ArithOp, left: &Collection, right: &Collection) -> Result<Collection> {
    if left.is_empty() || right.is_empty() {
        return Ok(Collection::empty());
    }
    let a = left
        .singleton_item("arithmetic left operand")?
        .expect("non-empty");
    let b = right
        .singleton_item("arithmetic right operand")?
        .expect("non-empty");
    arithmetic_values(op, a, b)
}

fn arithmetic_values(op: ArithOp, a: &Value, b: &Value) -> Result<Collection> {
    // Date/DateTime/Time ± calendar quantity
    if is_temporal(a) {
        if !matches!(op, ArithOp::Add | ArithOp::Sub) {
            return Err(Error::Type(format!(
                "cannot apply this operator to {}",
                a.type_name()
            )));
        }
        let (value, unit) = b.as_quantity_like().ok_or_else(|| {
            Error::Type(format!(
                "date/time arithmetic requires a quantity, got {}",
                b.type_name()
            ))
        })?;
        let t = temporal::temporal_view(a).expect("temporal operand");
        let out = temporal::add_quantity(&t, value, &unit, op == ArithOp::Sub)?;
        return Ok(Collection::singleton(out));
    }
    if is_temporal(b) {
        // Quantity-first addition is not defined by the grammar semantics.
        return Err(Error::Type(
            "a date/time operand must be on the left of +/-".into(),
        ));
    }

    if is_quantity(a) || is_quantity(b) {
        return quantity_arithmetic(op, a, b);
    }

    if let (Some(na), Some(nb)) = (a.as_num(), b.as_num()) {
        return numeric_arithmetic(op, na, nb);
    }

    // String + string concatenates; empty propagation already happened.
    if op == ArithOp::Add {
        if let (Some(sa), Some(sb)) = (a.as_str_like(), b.as_str_like()) {
            return Ok(Collection::singleton(Value::string(format!("{}{}", sa, sb))));
        }
    }

    Err(Error::Type(format!(
        "cannot apply arithmetic to {} and {}",
        a.type_name(),
        b.type_name()
    )))
}

fn numeric_arithmetic(op: ArithOp, a: Num, b: Num) -> Result<Collection> {
    // Long and Decimal do not mix.
    if (a.is_long() && b.is_decimal()) || (a.is_decimal() && b.is_long()) {
        return Err(Error::Type(
            "Long and Decimal operands cannot be combined".into(),
        ));
    }

    let overflow = || Error::Domain("arithmetic overflow".into());

    // Integer-family fast path (div/mod/whole arithmetic stays integral).
    if !a.is_decimal() && !b.is_decimal() {
        let (x, y) = (int_of(a), int_of(b));
        let long = a.is_long() || b.is_long();
        let wrap = |v: i64| {
            if long {
                Value::long(v)
            } else {
                Value::integer(v)
            }
        };
        return match op {
            ArithOp::Add => x
                .checked_add(y)
                .map(|v| Collection::singleton(wrap(v)))
                .ok_or_else(overflow),
            ArithOp::Sub => x
                .checked_sub(y)
                .map(|v| Collection::singleton(wrap(v)))
                .ok_or_else(overflow),
            ArithOp::Mul => x
                .checked_mul(y)
                .map(|v| Collection::singleton(wrap(v)))
                .ok_or_else(overflow),
            ArithOp::Div => {
                if y == 0 {
                    return Ok(Collection::empty());
                }
                let d = Decimal::from(x)
                    .checked_div(Decimal::from(y))
                    .ok_or_else(overflow)?;
                Ok(Collection::singleton(Value::decimal(d)))
            }
            ArithOp::DivInt => {
                if y == 0 {
                    return Ok(Collection::empty());
                }
                Ok(Collection::singleton(wrap(x / y)))
            }
            ArithOp::Mod => {
                if y == 0 {
                    return Ok(Collection::empty());
                }
                Ok(Collection::singleton(wrap(x % y)))
            }
        };
    }

    let (x, y) = (a.to_decimal(), b.to_decimal());
    match op {
        ArithOp::Add => x
            .checked_add(y)
            .map(|v| Collection::singleton(Value::decimal(v)))
            .ok_or_else(overflow),
        ArithOp::Sub => x
            .checked_sub(y)
            .map(|v| Collection::singleton(Value::decimal(v)))
            .ok_or_else(overflow),
        ArithOp::Mul => x
            .checked_mul(y)
            .map(|v| Collection::singleton(Value::decimal(v)))
            .ok_or_else(overflow),
        ArithOp::Div => {
            if y.is_zero() {
                return Ok(Collection::empty());
            }
            x.checked_div(y)
                .map(|v| Collection::singleton(Value::decimal(v)))
                .ok_or_else(overflow)
        }
        ArithOp::DivInt => {
            if y.is_zero() {
                return Ok(Collection::empty());
            }
            let d = x.checked_div(y).ok_or_else(overflow)?.trunc();
            let i = d
                .to_string()
                .parse::<i64>()
                .map_err(|_| overflow())?;
            Ok(Collection::singleton(Value::integer(i)))
        }
        ArithOp::Mod => {
            if y.is_zero() {
                return Ok(Collection::empty());
            }
            let q = x.checked_div(y).ok_or_else(overflow)?.trunc();
            let m = x
                .checked_sub(q.checked_mul(y).ok_or_else(overflow)?)
                .ok_or_else(overflow)?;
            Ok(Collection::singleton(Value::decimal(m)))
        }
    }
}

fn int_of(n: Num) -> i64 {
    match n {
        Num::Integer(i) | Num::Long(i) => i,
        Num::Decimal(_) => unreachable!("decimal handled by caller"),
    }
}

fn quantity_arithmetic(op: ArithOp, a: &Value, b: &Value) -> Result<Collection> {
    // A Long never combines with a quantity.
    if matches!(a.data(), ValueData::Long(_)) || matches!(b.data(), ValueData::Long(_)) {
        return Err(Error::Domain(
            "cannot combine a Quantity with a Long value".into(),
        ));
    }

    let qa = a.as_quantity_like();
    let qb = b.as_quantity_like();

    match op {
        ArithOp::Add | ArithOp::Sub => {
            let (va, ua) = qa.ok_or_else(|| quantity_type_error(a))?;
            let (vb, ub) = qb.ok_or_else(|| quantity_type_error(b))?;
            let vb = match convert_quantity_value(vb, &ub, &ua) {
                QuantityConv::Converted(v) => v,
                QuantityConv::Boundary => {
                    return Err(Error::Domain(format!(
                        "cannot combine '{}' and '{}' quantities",
                        ua, ub
                    )));
                }
                QuantityConv::Mismatch => {
                    return Err(Error::Domain(format!(
                        "quantity units '{}' and '{}' have different dimensions",
                        ua, ub
                    )));
                }
            };
            let value = if op == ArithOp::Add { va + vb } else { va - vb };
            Ok(Collection::singleton(Value::quantity(value, ua)))
        }
        ArithOp::Mul => {
            // quantity * number, number * quantity, quantity * quantity
            if is_quantity(a) && !is_quantity(b) {
                if let (Some((va, ua)), Some(n)) = (qa.clone(), b.as_num()) {
                    return Ok(Collection::singleton(Value::quantity(
                        va * n.to_decimal(),
                        ua,
                    )));
                }
            }
            if is_quantity(b) && !is_quantity(a) {
                if let (Some((vb, ub)), Some(n)) = (qb.clone(), a.as_num()) {
                    return Ok(Collection::singleton(Value::quantity(
                        n.to_decimal() * vb,
                        ub,
                    )));
                }
            }
            let (va, ua) = qa.ok_or_else(|| quantity_type_error(a))?;
            let (vb, ub) = qb.ok_or_else(|| quantity_type_error(b))?;
            Ok(Collection::singleton(Value::quantity(
                va * vb,
                compose_units_mul(&ua, &ub),
            )))
        }
        ArithOp::Div => {
            let (va, ua) = qa.ok_or_else(|| quantity_type_error(a))?;
            if let Some(n) = b.as_num().filter(|_| !is_quantity(b)) {
                let d = n.to_decimal();
                if d.is_zero() {
                    return Ok(Collection::empty());
                }
                return Ok(Collection::singleton(Value::quantity(va / d, ua)));
            }
            let (vb, ub) = qb.ok_or_else(|| quantity_type_error(b))?;
            if vb.is_zero() {
                return Ok(Collection::empty());
            }
            Ok(Collection::singleton(Value::quantity(
                va / vb,
                compose_units_div(&ua, &ub),
            )))
        }
        ArithOp::DivInt | ArithOp::Mod => Err(Error::Type(
            "div/mod are not defined for Quantity operands".into(),
        )),
    }
}

fn quantity_type_error(v: &Value) -> Error {
    Error::Type(format!("expected a Quantity, got {}", v.type_name()))
}

fn compose_units_mul(left: &str, right: &str) -> Arc<str> {
    match (left, right) {
        ("1", _) => Arc::from(right),
        (_, "1") => Arc::from(left),
        _ => Arc::from(format!("{}.{}", left, right)),
    }
}

fn compose_units_div(left: &str, right: &str) -> Arc<str> {
    if left == right {
        return Arc::from("1");
    }
    match right {
        "1" => Arc::from(left),
        _ => Arc::from(format!("{}/{}", left, right)),
    }
}

/// The `&` operator: string concatenation with empty treated as `''`.
pub fn concat(left: &Collection, right: &Collection) -> Result<Collection> {
    let side = |c: &Collection| -> Result<String> {
        match c.singleton_item("'&' operand")? {
            None => Ok(String::new()),
            Some(item) => item
                .as_str_like()
                .map(|s| s.to_string())
                .ok_or_else(|| Error::Type(format!("'&' requires strings, got {}", item.type_name()))),
        }
    };
    let out = format!("{}{}", side(left)?, side(right)?);
    Ok(Collection::singleton(Value::string(out)))
}

/// Unary `+`/`-`.
pub fn negate(operand: &Collection, negative: bool) -> Result<Collection> {
    if operand.is_empty() {
        return Ok(Collection::empty());
    }
    let item = operand
        .singleton_item("polarity operand")?
        .expect("non-empty");
    if !negative {
        return Ok(Collection::singleton(item.clone()));
    }
    match item.data() {
        ValueData::Integer(i) => Ok(Collection::singleton(Value::integer(-i))),
        ValueData::Long(i) => Ok(Collection::singleton(Value::long(-i))),
        ValueData::Decimal(d) => Ok(Collection::singleton(Value::decimal(-d))),
        ValueData::Quantity { value, unit } => {
            Ok(Collection::singleton(Value::quantity(-value, unit.clone())))
        }
        ValueData::Node(_) => match item.as_num() {
            Some(Num::Integer(i)) => Ok(Collection::singleton(Value::integer(-i))),
            Some(Num::Long(i)) => Ok(Collection::singleton(Value::long(-i))),
            Some(Num::Decimal(d)) => Ok(Collection::singleton(Value::decimal(-d))),
            None => Err(Error::Type("unary minus requires a number".into())),
        },
        _ => Err(Error::Type("unary minus requires a number".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn one(v: Value) -> Collection {
        Collection::singleton(v)
    }

    fn int(i: i64) -> Collection {
        one(Value::integer(i))
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let out = arithmetic(ArithOp::Add, &int(2), &int(3)).unwrap();
        assert!(matches!(
            out.first_item().unwrap().data(),
            ValueData::Integer(5)
        ));

        let out = arithmetic(ArithOp::DivInt, &int(7), &int(2)).unwrap();
        assert!(matches!(
            out.first_item().unwrap().data(),
            ValueData::Integer(3)
        ));

        let out = arithmetic(ArithOp::Mod, &int(7), &int(2)).unwrap();
        assert!(matches!(
            out.first_item().unwrap().data(),
            ValueData::Integer(1)
        ));
    }

    #[test]
    fn division_always_yields_decimal() {
        let out = arithmetic(ArithOp::Div, &int(7), &int(2)).unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Decimal(d) => assert_eq!(*d, Decimal::from_str("3.5").unwrap()),
            other => panic!("expected decimal, got {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_is_empty() {
        assert!(arithmetic(ArithOp::Div, &int(1), &int(0)).unwrap().is_empty());
        assert!(arithmetic(ArithOp::DivInt, &int(1), &int(0)).unwrap().is_empty());
        assert!(arithmetic(ArithOp::Mod, &int(1), &int(0)).unwrap().is_empty());
    }

    #[test]
    fn long_contaminates_integers_but_not_decimals() {
        let out = arithmetic(ArithOp::Add, &one(Value::long(2)), &int(3)).unwrap();
        assert!(matches!(out.first_item().unwrap().data(), ValueData::Long(5)));

        let err = arithmetic(
            ArithOp::Add,
            &one(Value::long(2)),
            &one(Value::decimal(Decimal::ONE)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn string_addition_concatenates() {
        let out = arithmetic(
            ArithOp::Add,
            &one(Value::string("ab")),
            &one(Value::string("cd")),
        )
        .unwrap();
        assert_eq!(out.as_string().unwrap().as_ref(), "abcd");
    }

    #[test]
    fn concat_treats_empty_as_blank() {
        let out = concat(&Collection::empty(), &one(Value::string("x"))).unwrap();
        assert_eq!(out.as_string().unwrap().as_ref(), "x");
    }

    #[test]
    fn quantity_addition_converts_to_left_unit() {
        let out = arithmetic(
            ArithOp::Add,
            &one(Value::quantity(Decimal::from(3), "min")),
            &one(Value::quantity(Decimal::from(120), "s")),
        )
        .unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Quantity { value, unit } => {
                assert_eq!(*value, Decimal::from(5));
                assert_eq!(unit.as_ref(), "min");
            }
            other => panic!("expected quantity, got {:?}", other),
        }
    }

    #[test]
    fn calendar_boundary_addition_is_an_error() {
        let err = arithmetic(
            ArithOp::Add,
            &one(Value::quantity(Decimal::from(1), "year")),
            &one(Value::quantity(Decimal::from(12), "month")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
    }

    #[test]
    fn quantity_scaling_and_composition() {
        let out = arithmetic(
            ArithOp::Mul,
            &one(Value::quantity(Decimal::from(5), "mg")),
            &int(2),
        )
        .unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Quantity { value, unit } => {
                assert_eq!(*value, Decimal::from(10));
                assert_eq!(unit.as_ref(), "mg");
            }
            other => panic!("expected quantity, got {:?}", other),
        }

        let out = arithmetic(
            ArithOp::Div,
            &one(Value::quantity(Decimal::from(10), "mg")),
            &one(Value::quantity(Decimal::from(2), "mg")),
        )
        .unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Quantity { value, unit } => {
                assert_eq!(*value, Decimal::from(5));
                assert_eq!(unit.as_ref(), "1");
            }
            other => panic!("expected quantity, got {:?}", other),
        }
    }

    #[test]
    fn quantity_with_long_is_a_domain_error() {
        let err = arithmetic(
            ArithOp::Add,
            &one(Value::quantity(Decimal::ONE, "mg")),
            &one(Value::long(2)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
    }

    #[test]
    fn date_plus_quantity() {
        let d = crate::temporal_parse::parse_date_value("2012-05-02").unwrap();
        let out = arithmetic(
            ArithOp::Add,
            &one(d),
            &one(Value::quantity(Decimal::from(3), "day")),
        )
        .unwrap();
        match out.first_item().unwrap().data() {
            ValueData::Date { value, .. } => {
                assert_eq!(*value, chrono::NaiveDate::from_ymd_opt(2012, 5, 5).unwrap())
            }
            other => panic!("expected date, got {:?}", other),
        }
    }

    #[test]
    fn negate_numbers_and_quantities() {
        let out = negate(&int(5), true).unwrap();
        assert!(matches!(
            out.first_item().unwrap().data(),
            ValueData::Integer(-5)
        ));

        let out = negate(&one(Value::quantity(Decimal::from(2), "mg")), true).unwrap();
        assert!(matches!(
            out.first_item().unwrap().data(),
            ValueData::Quantity { .. }
        ));

        let err = negate(&one(Value::string("x")), true).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }
}
