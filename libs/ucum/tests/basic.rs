use rust_decimal::Decimal;
use std::str::FromStr;

#[test]
fn parse_rejects_non_ascii() {
    let err = corten_ucum::validate("µg").unwrap_err();
    assert!(matches!(err, corten_ucum::Error::NonAscii));
}

#[test]
fn validate_rejects_invalid_syntax() {
    assert!(corten_ucum::validate("m..s").is_err());
    assert!(corten_ucum::validate("mg lumps").is_err());
}

#[test]
fn equivalence_basic() {
    assert!(corten_ucum::equivalent("mg/dL", "g/L").unwrap());
    assert!(!corten_ucum::equivalent("mg", "m").unwrap());
}

#[test]
fn converts_minutes_to_seconds() {
    let v = corten_ucum::convert_decimal(Decimal::ONE, "min", "s").unwrap();
    assert_eq!(v, Decimal::from(60));
}

#[test]
fn converts_deciliter_to_liter() {
    let v = corten_ucum::convert_decimal(Decimal::ONE, "dL", "L").unwrap();
    assert_eq!(v, Decimal::from_str("0.1").unwrap());
}

#[test]
fn converts_year_to_months() {
    // UCUM calendar approximations: a = 12 mo exactly.
    let v = corten_ucum::convert_decimal(Decimal::ONE, "a", "mo").unwrap();
    assert_eq!(v, Decimal::from(12));
}

#[test]
fn incompatible_units_error() {
    let err = corten_ucum::convert_decimal(Decimal::ONE, "mg", "s").unwrap_err();
    assert!(matches!(err, corten_ucum::Error::Incompatible { .. }));
}

#[test]
fn compare_across_units() {
    use std::cmp::Ordering;
    let ord = corten_ucum::compare_decimal_quantities(
        &Decimal::from(3),
        "min",
        &Decimal::from(180),
        "s",
    )
    .unwrap();
    assert_eq!(ord, Ordering::Equal);
}
