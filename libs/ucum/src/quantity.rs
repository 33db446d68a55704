use crate::error::{Error, Result};
use crate::unit::{DimensionVector, Unit, UnitKind};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: String,
}

/// A quantity reduced to its canonical named unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedQuantity {
    pub value: Decimal,
    pub unit: String,
}

/// Normalize a value to the canonical unit for its dimension.
///
/// Affine units normalize to kelvin; everything else goes to the preferred
/// named unit for the dimension, falling back to a rendered base expression.
pub fn normalize(value: Decimal, unit: &str) -> Result<NormalizedQuantity> {
    let u = Unit::parse(unit)?;
    match &u.kind {
        UnitKind::Affine { .. } => normalize_to("K", &u, value),
        UnitKind::Multiplicative { .. } => {
            if let Some(target) = CANONICAL_BY_DIMENSION.get(&u.dimensions) {
                normalize_to(target, &u, value)
            } else {
                let base = u.to_base(&value)?;
                Ok(NormalizedQuantity {
                    value: base,
                    unit: render_base_expr(u.dimensions),
                })
            }
        }
    }
}

fn normalize_to(target_unit: &str, from: &Unit, value: Decimal) -> Result<NormalizedQuantity> {
    let base = from.to_base(&value)?;
    let to = Unit::parse(target_unit)?;
    if to.dimensions != from.dimensions {
        return Err(Error::Incompatible {
            from: render_base_expr(from.dimensions),
            to: target_unit.to_string(),
        });
    }
    Ok(NormalizedQuantity {
        value: to.from_base(&base)?,
        unit: target_unit.to_string(),
    })
}

static CANONICAL_BY_DIMENSION: Lazy<HashMap<DimensionVector, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for name in ["m", "g", "s", "rad", "K", "C", "cd", "mol", "L", "N", "Pa", "J", "W", "Hz", "A", "V"] {
        let unit = Unit::parse(name).expect("canonical table entry parses");
        map.entry(unit.dimensions).or_insert(name);
    }
    map
});

fn render_base_expr(dim: DimensionVector) -> String {
    let mut out = String::new();
    let parts = [
        ("g", dim.0[1]),
        ("mol", dim.0[7]),
        ("m", dim.0[0]),
        ("s", dim.0[2]),
        ("K", dim.0[4]),
        ("C", dim.0[5]),
        ("rad", dim.0[3]),
        ("cd", dim.0[6]),
    ];
    for (sym, exp) in parts {
        if exp == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push('.');
        }
        out.push_str(sym);
        if exp != 1 {
            out.push_str(&exp.to_string());
        }
    }
    if out.is_empty() {
        out.push('1');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn normalizes_time_to_seconds() {
        let n = normalize(Decimal::from(3), "min").unwrap();
        assert_eq!(n.unit, "s");
        assert_eq!(n.value, Decimal::from(180));
    }

    #[test]
    fn normalizes_mass_to_grams() {
        let n = normalize(Decimal::from(5), "mg").unwrap();
        assert_eq!(n.unit, "g");
        assert_eq!(n.value, Decimal::from_str("0.005").unwrap());
    }

    #[test]
    fn normalizes_pressure_to_pa() {
        let n = normalize(Decimal::from(120), "mm[Hg]").unwrap();
        assert_eq!(n.unit, "Pa");
        assert_eq!(n.value, Decimal::from_str("15998.6864898").unwrap());
    }

    #[test]
    fn concentration_renders_base_expr() {
        let n = normalize(Decimal::ONE, "mg/dL").unwrap();
        assert_eq!(n.unit, "g.m-3");
        assert_eq!(n.value, Decimal::from(10));
    }
}
