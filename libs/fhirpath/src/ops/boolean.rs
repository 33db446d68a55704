//! Three-valued boolean logic
//!
//! Operands arrive as `Option<bool>`: `None` is the empty collection.
//! The tables follow the FHIRPath truth tables; short-circuiting on the
//! left operand is handled by the evaluator.

pub fn and(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub fn or(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn xor(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(a), Some(b)) => Some(a != b),
        _ => None,
    }
}

pub fn implies(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) => Some(true),
        (Some(true), b) => b,
        (None, Some(true)) => Some(true),
        (None, _) => None,
    }
}

pub fn not(operand: Option<bool>) -> Option<bool> {
    operand.map(|b| !b)
}
