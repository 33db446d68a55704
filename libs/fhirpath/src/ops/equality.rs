//! Equality (`=`, tri-valued) and equivalence (`~`, two-valued)

use super::{convert_quantity_value, QuantityConv};
use crate::temporal;
use crate::value::{Collection, Num, Value, ValueData, NUMERIC_EQUALITY_DP};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;

fn is_temporal(value: &Value) -> bool {
    matches!(
        value.data(),
        ValueData::Date { .. } | ValueData::DateTime { .. } | ValueData::Time { .. }
    )
}

fn is_quantity(value: &Value) -> bool {
    matches!(value.data(), ValueData::Quantity { .. })
}

fn round(d: Decimal) -> Decimal {
    d.round_dp(NUMERIC_EQUALITY_DP)
}

/// Tri-valued equality between two single values.
pub fn equal_values(a: &Value, b: &Value) -> Option<bool> {
    // Temporal operands: a raw document string on the other side parses
    // lazily; non-overlapping precision yields empty.
    if is_temporal(a) || is_temporal(b) {
        let ta = temporal::temporal_view(a);
        let tb = temporal::temporal_view(b);
        return match (ta, tb) {
            (Some(ta), Some(tb)) => temporal::equal(&ta, &tb),
            _ => Some(false),
        };
    }

    // Quantity operands: convert to the left unit; the calendar/UCUM
    // boundary is incomparable (empty), a dimension mismatch is false.
    if is_quantity(a) || is_quantity(b) {
        let qa = a.as_quantity_like();
        let qb = b.as_quantity_like();
        return match (qa, qb) {
            (Some((va, ua)), Some((vb, ub))) => {
                match convert_quantity_value(vb, &ub, &ua) {
                    QuantityConv::Converted(vb) => Some(round(va) == round(vb)),
                    QuantityConv::Boundary => None,
                    QuantityConv::Mismatch => Some(false),
                }
            }
            _ => Some(false),
        };
    }

    // Numbers round to the equality step to erase representation noise.
    if let (Some(na), Some(nb)) = (a.as_num(), b.as_num()) {
        return Some(round(na.to_decimal()) == round(nb.to_decimal()));
    }

    if let (Some(sa), Some(sb)) = (a.as_str_like(), b.as_str_like()) {
        return Some(sa == sb);
    }

    if let (Some(ba), Some(bb)) = (a.as_bool_like(), b.as_bool_like()) {
        return Some(ba == bb);
    }

    // Structural comparison for complex nodes and anything cross-kind.
    Some(a.deep_equal(b))
}

/// `=` over collections: empty operand propagates; ordered pairing.
pub fn equal_collections(a: &Collection, b: &Collection) -> Option<bool> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a.len() != b.len() {
        return Some(false);
    }
    let mut uncertain = false;
    for (x, y) in a.iter().zip(b.iter()) {
        match equal_values(x, y) {
            Some(false) => return Some(false),
            Some(true) => {}
            None => uncertain = true,
        }
    }
    if uncertain {
        None
    } else {
        Some(true)
    }
}

/// String normalization for equivalence: case-folded to uppercase with
/// whitespace runs collapsed.
fn normalize_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            in_space = false;
            for upper in c.to_uppercase() {
                out.push(upper);
            }
        }
    }
    out
}

/// Numbers are equivalent when equal after rounding to the coarser of the
/// two visible decimal-place counts.
fn nums_equivalent(a: Num, b: Num) -> bool {
    let da = a.to_decimal();
    let db = b.to_decimal();
    let dp = da.scale().min(db.scale());
    da.round_dp(dp) == db.round_dp(dp)
}

fn quantities_equivalent(va: Decimal, ua: &str, vb: Decimal, ub: &str) -> bool {
    // Equivalence canonicalizes through UCUM, treating calendar words as
    // their nominal codes (1 year ~ 12 month holds here).
    let code = |u: &str| match crate::value::classify_unit(u) {
        crate::value::UnitCategory::Calendar(c) => c.ucum_code().to_string(),
        crate::value::UnitCategory::Ucum => u.to_string(),
    };
    let ca = corten_ucum::normalize(va, &code(ua));
    let cb = corten_ucum::normalize(vb, &code(ub));
    match (ca, cb) {
        (Ok(na), Ok(nb)) => na.unit == nb.unit && round(na.value) == round(nb.value),
        _ => ua == ub && nums_equivalent(Num::Decimal(va), Num::Decimal(vb)),
    }
}

fn json_num(n: &serde_json::Number) -> Num {
    if let Some(i) = n.as_i64() {
        Num::Integer(i)
    } else {
        Num::Decimal(Decimal::from_str(&n.to_string()).unwrap_or_default())
    }
}

/// Structural equivalence over raw JSON, with fuzzy leaves.
fn equivalent_json(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x == y,
        (JsonValue::Number(x), JsonValue::Number(y)) => nums_equivalent(json_num(x), json_num(y)),
        (JsonValue::String(x), JsonValue::String(y)) => normalize_string(x) == normalize_string(y),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(i, j)| equivalent_json(i, j))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.get(k).map(|w| equivalent_json(v, w)).unwrap_or(false)
                })
        }
        _ => false,
    }
}

/// Two-valued equivalence between single values.
pub fn equivalent_values(a: &Value, b: &Value) -> bool {
    if is_temporal(a) || is_temporal(b) {
        let ta = temporal::temporal_view(a);
        let tb = temporal::temporal_view(b);
        return match (ta, tb) {
            (Some(ta), Some(tb)) => temporal::equivalent(&ta, &tb),
            _ => false,
        };
    }

    if is_quantity(a) || is_quantity(b) {
        return match (a.as_quantity_like(), b.as_quantity_like()) {
            (Some((va, ua)), Some((vb, ub))) => quantities_equivalent(va, &ua, vb, &ub),
            _ => false,
        };
    }

    if let (Some(na), Some(nb)) = (a.as_num(), b.as_num()) {
        return nums_equivalent(na, nb);
    }

    if let (Some(sa), Some(sb)) = (a.as_str_like(), b.as_str_like()) {
        return normalize_string(sa) == normalize_string(sb);
    }

    if let (Some(ba), Some(bb)) = (a.as_bool_like(), b.as_bool_like()) {
        return ba == bb;
    }

    let ja = node_json(a);
    let jb = node_json(b);
    match (ja, jb) {
        (Some(ja), Some(jb)) => equivalent_json(&ja, &jb),
        _ => false,
    }
}

fn node_json(v: &Value) -> Option<Arc<JsonValue>> {
    match v.data() {
        ValueData::Node(node) => node.data_arc(),
        _ => None,
    }
}

/// `~` over collections: both-empty is true; pairing is order-independent.
pub fn equivalent_collections(a: &Collection, b: &Collection) -> bool {
    if a.is_empty() && b.is_empty() {
        return true;
    }
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for x in a.iter() {
        for (i, y) in b.iter().enumerate() {
            if !used[i] && equivalent_values(x, y) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal_parse::{parse_date_value, parse_datetime_value};

    fn ints(values: &[i64]) -> Collection {
        Collection::from_values(values.iter().map(|i| Value::integer(*i)).collect())
    }

    #[test]
    fn empty_operand_propagates() {
        assert_eq!(equal_collections(&Collection::empty(), &ints(&[1])), None);
        assert_eq!(equal_collections(&Collection::empty(), &Collection::empty()), None);
    }

    #[test]
    fn equivalence_of_empties_is_true() {
        assert!(equivalent_collections(&Collection::empty(), &Collection::empty()));
        assert!(!equivalent_collections(&Collection::empty(), &ints(&[1])));
    }

    #[test]
    fn equivalence_is_order_independent() {
        assert!(equivalent_collections(&ints(&[1, 2]), &ints(&[2, 1])));
        assert_eq!(equal_collections(&ints(&[1, 2]), &ints(&[2, 1])), Some(false));
    }

    #[test]
    fn date_precision_mismatch_is_empty_but_equivalent() {
        let d1 = parse_date_value("2012").unwrap();
        let d2 = parse_date_value("2012-01").unwrap();
        assert_eq!(equal_values(&d1, &d2), None);
        assert!(equivalent_values(&d1, &d2));
    }

    #[test]
    fn quantity_ucum_equality() {
        let a = Value::quantity(Decimal::from(3), "min");
        let b = Value::quantity(Decimal::from(180), "s");
        assert_eq!(equal_values(&a, &b), Some(true));
    }

    #[test]
    fn quantity_calendar_boundary() {
        let year = Value::quantity(Decimal::from(1), "year");
        let months = Value::quantity(Decimal::from(12), "month");
        assert_eq!(equal_values(&year, &months), None);
        assert!(equivalent_values(&year, &months));
    }

    #[test]
    fn quantity_dimension_mismatch_is_false() {
        let mg = Value::quantity(Decimal::from(1), "mg");
        let s = Value::quantity(Decimal::from(1), "s");
        assert_eq!(equal_values(&mg, &s), Some(false));
    }

    #[test]
    fn string_equivalence_folds_case_and_whitespace() {
        let a = Value::string("Hello   World");
        let b = Value::string("hello world");
        assert_eq!(equal_values(&a, &b), Some(false));
        assert!(equivalent_values(&a, &b));
    }

    #[test]
    fn number_equivalence_uses_visible_precision() {
        let a = Value::decimal(Decimal::from_str("1.24").unwrap());
        let b = Value::decimal(Decimal::from_str("1.2").unwrap());
        assert!(equivalent_values(&a, &b));
        assert_eq!(equal_values(&a, &b), Some(false));
    }

    #[test]
    fn datetime_timezone_alignment() {
        let a = parse_datetime_value("2012-05-02T10:30:00+01:00").unwrap();
        let b = parse_datetime_value("2012-05-02T09:30:00Z").unwrap();
        assert_eq!(equal_values(&a, &b), Some(true));
    }
}
