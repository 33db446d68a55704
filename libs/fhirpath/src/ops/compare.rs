//! Ordering comparisons (`<`, `<=`, `>`, `>=`)

use super::{convert_quantity_value, QuantityConv};
use crate::ast::InequalityOperator;
use crate::error::{Error, Result};
use crate::temporal;
use crate::value::{Collection, Value, ValueData};
use std::cmp::Ordering;

fn apply(op: InequalityOperator, ordering: Ordering) -> bool {
    match op {
        InequalityOperator::LessThan => ordering == Ordering::Less,
        InequalityOperator::LessThanOrEqual => ordering != Ordering::Greater,
        InequalityOperator::GreaterThan => ordering == Ordering::Greater,
        InequalityOperator::GreaterThanOrEqual => ordering != Ordering::Less,
    }
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

/// Tri-valued ordering of two single values. `Ok(None)` means
/// incomparable-but-legal (temporal precision, unit boundary).
fn compare_values(a: &Value, b: &Value) -> Result<Option<Ordering>> {
    if is_temporal(a) || is_temporal(b) {
        let ta = temporal::temporal_view(a);
        let tb = temporal::temporal_view(b);
        return match (ta, tb) {
            (Some(ta), Some(tb)) => temporal::compare(&ta, &tb),
            _ => Err(Error::Type(format!(
                "InequalityExpression: cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        };
    }

    if is_quantity(a) || is_quantity(b) {
        return match (a.as_quantity_like(), b.as_quantity_like()) {
            (Some((va, ua)), Some((vb, ub))) => match convert_quantity_value(vb, &ub, &ua) {
                QuantityConv::Converted(vb) => Ok(Some(va.cmp(&vb))),
                QuantityConv::Boundary => Ok(None),
                QuantityConv::Mismatch => Err(Error::Type(format!(
                    "InequalityExpression: units '{}' and '{}' are not comparable",
                    ua, ub
                ))),
            },
            _ => Err(Error::Type(format!(
                "InequalityExpression: cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        };
    }

    // Long compares with Integer and Decimal freely.
    if let (Some(na), Some(nb)) = (a.as_num(), b.as_num()) {
        return Ok(Some(na.to_decimal().cmp(&nb.to_decimal())));
    }

    if let (Some(sa), Some(sb)) = (a.as_str_like(), b.as_str_like()) {
        return Ok(Some(sa.cmp(sb)));
    }

    Err(Error::Type(format!(
        "InequalityExpression: cannot compare {} with {}",
        a.type_name(),
        b.type_name()
    )))
}

/// `<`-family operator over collections: empty operand yields empty,
/// operands must be singletons of a shared comparison class.
pub fn compare_collections(
    op: InequalityOperator,
    left: &Collection,
    right: &Collection,
) -> Result<Collection> {
    if left.is_empty() || right.is_empty() {
        return Ok(Collection::empty());
    }
    let a = left
        .singleton_item("InequalityExpression left operand")?
        .expect("non-empty");
    let b = right
        .singleton_item("InequalityExpression right operand")?
        .expect("non-empty");

    match compare_values(a, b)? {
        Some(ordering) => Ok(Collection::singleton(Value::boolean(apply(op, ordering)))),
        None => Ok(Collection::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal_parse::parse_date_value;
    use rust_decimal::Decimal;

    fn one(v: Value) -> Collection {
        Collection::singleton(v)
    }

    #[test]
    fn numeric_ordering_across_kinds() {
        let out = compare_collections(
            InequalityOperator::LessThan,
            &one(Value::integer(3)),
            &one(Value::decimal(Decimal::new(35, 1))),
        )
        .unwrap();
        assert_eq!(out.as_boolean_singleton().unwrap(), Some(true));

        let out = compare_collections(
            InequalityOperator::GreaterThanOrEqual,
            &one(Value::long(4)),
            &one(Value::integer(4)),
        )
        .unwrap();
        assert_eq!(out.as_boolean_singleton().unwrap(), Some(true));
    }

    #[test]
    fn string_ordering() {
        let out = compare_collections(
            InequalityOperator::LessThan,
            &one(Value::string("abc")),
            &one(Value::string("abd")),
        )
        .unwrap();
        assert_eq!(out.as_boolean_singleton().unwrap(), Some(true));
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let err = compare_collections(
            InequalityOperator::LessThan,
            &one(Value::string("abc")),
            &one(Value::integer(1)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn empty_operand_yields_empty() {
        let out = compare_collections(
            InequalityOperator::LessThan,
            &Collection::empty(),
            &one(Value::integer(1)),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn incomparable_dates_yield_empty() {
        let out = compare_collections(
            InequalityOperator::LessThan,
            &one(parse_date_value("2012").unwrap()),
            &one(parse_date_value("2012-05").unwrap()),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn quantity_comparison_converts_units() {
        let out = compare_collections(
            InequalityOperator::GreaterThan,
            &one(Value::quantity(Decimal::from(4), "min")),
            &one(Value::quantity(Decimal::from(180), "s")),
        )
        .unwrap();
        assert_eq!(out.as_boolean_singleton().unwrap(), Some(true));
    }

    #[test]
    fn two_items_is_a_singleton_error() {
        let err = compare_collections(
            InequalityOperator::LessThan,
            &Collection::from_values(vec![Value::integer(1), Value::integer(2)]),
            &one(Value::integer(1)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Singleton(_)));
    }
}
