//! Combining functions: `union` (deduplicating) and `combine` (not)

use crate::distinct;
use crate::error::Result;
use crate::value::Collection;

pub fn union(input: &Collection, other: &Collection) -> Result<Collection> {
    Ok(distinct::union(input, other))
}

pub fn combine(input: &Collection, other: &Collection) -> Result<Collection> {
    let mut out = input.clone();
    out.append(other.clone());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn ints(values: &[i64]) -> Collection {
        Collection::from_values(values.iter().map(|i| Value::integer(*i)).collect())
    }

    #[test]
    fn union_deduplicates_combine_does_not() {
        let a = ints(&[1, 2]);
        let b = ints(&[2, 3]);
        assert_eq!(union(&a, &b).unwrap().len(), 3);
        assert_eq!(combine(&a, &b).unwrap().len(), 4);
    }
}
