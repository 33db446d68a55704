//! Existence and collection-query functions

use crate::distinct;
use crate::error::{Error, Result};
use crate::value::{Collection, Value};

pub fn empty(input: &Collection) -> Result<Collection> {
    Ok(Collection::singleton(Value::boolean(input.is_empty())))
}

pub fn count(input: &Collection) -> Result<Collection> {
    Ok(Collection::singleton(Value::integer(input.len() as i64)))
}

fn require_booleans(input: &Collection, name: &str) -> Result<Vec<bool>> {
    input
        .iter()
        .map(|item| {
            item.as_bool_like().ok_or_else(|| {
                Error::Type(format!(
                    "{}() requires a collection of booleans, got {}",
                    name,
                    item.type_name()
                ))
            })
        })
        .collect()
}

pub fn all_true(input: &Collection) -> Result<Collection> {
    let bools = require_booleans(input, "allTrue")?;
    Ok(Collection::singleton(Value::boolean(
        bools.iter().all(|b| *b),
    )))
}

pub fn any_true(input: &Collection) -> Result<Collection> {
    let bools = require_booleans(input, "anyTrue")?;
    Ok(Collection::singleton(Value::boolean(
        bools.iter().any(|b| *b),
    )))
}

pub fn all_false(input: &Collection) -> Result<Collection> {
    let bools = require_booleans(input, "allFalse")?;
    Ok(Collection::singleton(Value::boolean(
        bools.iter().all(|b| !*b),
    )))
}

pub fn any_false(input: &Collection) -> Result<Collection> {
    let bools = require_booleans(input, "anyFalse")?;
    Ok(Collection::singleton(Value::boolean(
        bools.iter().any(|b| !*b),
    )))
}

pub fn subset_of(input: &Collection, other: &Collection) -> Result<Collection> {
    Ok(Collection::singleton(Value::boolean(distinct::is_subset(
        input, other,
    ))))
}

pub fn superset_of(input: &Collection, other: &Collection) -> Result<Collection> {
    Ok(Collection::singleton(Value::boolean(distinct::is_subset(
        other, input,
    ))))
}

pub fn distinct_fn(input: &Collection) -> Result<Collection> {
    Ok(distinct::distinct(input))
}

pub fn is_distinct(input: &Collection) -> Result<Collection> {
    let deduped = distinct::distinct(input);
    Ok(Collection::singleton(Value::boolean(
        deduped.len() == input.len(),
    )))
}

/// True for a singleton whose underlying element carries a value (a
/// primitive, as opposed to an extension-only node or a complex element).
pub fn has_value(input: &Collection) -> Result<Collection> {
    let result = input.len() == 1 && input.first_item().map(|v| v.is_primitive()).unwrap_or(false);
    Ok(Collection::singleton(Value::boolean(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bools(values: &[bool]) -> Collection {
        Collection::from_values(values.iter().map(|b| Value::boolean(*b)).collect())
    }

    #[test]
    fn empty_collection_vacuous_truths() {
        assert_eq!(
            all_true(&Collection::empty())
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(true)
        );
        assert_eq!(
            any_true(&Collection::empty())
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(false)
        );
        assert_eq!(
            all_false(&Collection::empty())
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(true)
        );
    }

    #[test]
    fn boolean_quantifiers() {
        assert_eq!(
            all_true(&bools(&[true, true]))
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(true)
        );
        assert_eq!(
            all_true(&bools(&[true, false]))
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(false)
        );
        assert_eq!(
            any_false(&bools(&[true, false]))
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(true)
        );
    }

    #[test]
    fn non_boolean_items_are_a_type_error() {
        let err = all_true(&Collection::singleton(Value::integer(1))).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn has_value_checks_primitiveness() {
        assert_eq!(
            has_value(&Collection::singleton(Value::integer(1)))
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(true)
        );
        assert_eq!(
            has_value(&Collection::empty())
                .unwrap()
                .as_boolean_singleton()
                .unwrap(),
            Some(false)
        );
    }
}
