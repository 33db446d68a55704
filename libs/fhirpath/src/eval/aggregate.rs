//! Collection aggregates: `sum`, `min`, `max`, `avg`
//!
//! `aggregate()` itself is a macro and lives with the evaluator; these
//! are the eager reductions.

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::ops::arithmetic::{arithmetic, ArithOp};
use crate::ops::compare::compare_collections;
use crate::ast::InequalityOperator;
use crate::value::{Collection, Value};

/// `sum()`: 0 for an empty input, numeric or quantity addition otherwise
/// (quantities convert into the first item's unit).
pub fn sum(input: &Collection) -> Result<Collection> {
    if input.is_empty() {
        return Ok(Collection::singleton(Value::integer(0)));
    }
    let mut acc = Collection::singleton(input.first_item().expect("non-empty").clone());
    for item in input.iter().skip(1) {
        acc = arithmetic(ArithOp::Add, &acc, &Collection::singleton(item.clone()))?;
    }
    Ok(acc)
}

pub fn avg(input: &Collection) -> Result<Collection> {
    if input.is_empty() {
        return Ok(Collection::empty());
    }
    let total = sum(input)?;
    arithmetic(
        ArithOp::Div,
        &total,
        &Collection::singleton(Value::decimal(Decimal::from(input.len() as i64))),
    )
}

fn extreme(input: &Collection, keep_left: InequalityOperator, name: &str) -> Result<Collection> {
    if input.is_empty() {
        return Ok(Collection::empty());
    }
    let mut best = Collection::singleton(input.first_item().expect("non-empty").clone());
    for item in input.iter().skip(1) {
        let candidate = Collection::singleton(item.clone());
        let keeps = compare_collections(keep_left, &best, &candidate)?;
        match keeps.as_boolean_singleton()? {
            Some(true) => {}
            Some(false) => best = candidate,
            None => {
                return Err(Error::Type(format!(
                    "{}() requires comparable items",
                    name
                )))
            }
        }
    }
    Ok(best)
}

/// `min()`: the smallest item; all items must share a comparison class.
pub fn min(input: &Collection) -> Result<Collection> {
    extreme(input, InequalityOperator::LessThanOrEqual, "min")
}

/// `max()`: the largest item.
pub fn max(input: &Collection) -> Result<Collection> {
    extreme(input, InequalityOperator::GreaterThanOrEqual, "max")
}
