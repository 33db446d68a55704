//! Subsetting functions: `single`, `first`, `last`, `tail`, `skip`,
//! `take`, `intersect`, `exclude`

use crate::distinct;
use crate::error::{Error, Result};
use crate::value::Collection;

pub fn single(input: &Collection) -> Result<Collection> {
    match input.len() {
        0 => Ok(Collection::empty()),
        1 => Ok(input.clone()),
        n => Err(Error::Singleton(format!(
            "single() expected at most one item, got {}",
            n
        ))),
    }
}

pub fn first(input: &Collection) -> Result<Collection> {
    Ok(input
        .first_item()
        .map(|v| Collection::singleton(v.clone()))
        .unwrap_or_default())
}

pub fn last(input: &Collection) -> Result<Collection> {
    Ok(input
        .iter()
        .last()
        .map(|v| Collection::singleton(v.clone()))
        .unwrap_or_default())
}

pub fn tail(input: &Collection) -> Result<Collection> {
    Ok(input.iter().skip(1).cloned().collect())
}

pub fn skip(input: &Collection, count: i64) -> Result<Collection> {
    let count = count.max(0) as usize;
    Ok(input.iter().skip(count).cloned().collect())
}

pub fn take(input: &Collection, count: i64) -> Result<Collection> {
    if count <= 0 {
        return Ok(Collection::empty());
    }
    Ok(input.iter().take(count as usize).cloned().collect())
}

pub fn intersect(input: &Collection, other: &Collection) -> Result<Collection> {
    Ok(distinct::intersect(input, other))
}

pub fn exclude(input: &Collection, other: &Collection) -> Result<Collection> {
    Ok(distinct::exclude(input, other))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn ints(values: &[i64]) -> Collection {
        Collection::from_values(values.iter().map(|i| Value::integer(*i)).collect())
    }

    #[test]
    fn single_enforces_cardinality() {
        assert!(single(&Collection::empty()).unwrap().is_empty());
        assert_eq!(single(&ints(&[1])).unwrap().len(), 1);
        assert!(matches!(
            single(&ints(&[1, 2])),
            Err(Error::Singleton(_))
        ));
    }

    #[test]
    fn positional_functions() {
        let c = ints(&[1, 2, 3]);
        assert_eq!(first(&c).unwrap().as_integer().unwrap(), 1);
        assert_eq!(last(&c).unwrap().as_integer().unwrap(), 3);
        assert_eq!(tail(&c).unwrap().len(), 2);
        assert_eq!(skip(&c, 2).unwrap().len(), 1);
        assert_eq!(take(&c, 2).unwrap().len(), 2);
        assert!(take(&c, 0).unwrap().is_empty());
        assert_eq!(skip(&c, -1).unwrap().len(), 3);
    }
}
