//! UCUM unit parsing and conversion over a curated atom table.
//!
//! The grammar subset covers what clinical FHIR data actually carries:
//! products and quotients of prefixed atoms with integer exponents,
//! bracketed atoms (`mm[Hg]`, `[lb_av]`), integer scalars, and `{...}`
//! annotations (which are dimensionless per UCUM).

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::{Add, Neg, Sub};

/// Exponents over the UCUM base dimensions, in the order
/// m, g, s, rad, K, C, cd, mol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DimensionVector(pub [i8; 8]);

impl DimensionVector {
    pub const ZERO: DimensionVector = DimensionVector([0; 8]);

    fn scaled(self, exp: i32) -> Result<DimensionVector> {
        let mut out = [0i8; 8];
        for (i, d) in self.0.iter().enumerate() {
            let v = (*d as i32) * exp;
            out[i] = i8::try_from(v).map_err(|_| Error::Overflow)?;
        }
        Ok(DimensionVector(out))
    }
}

impl Add for DimensionVector {
    type Output = DimensionVector;
    fn add(self, rhs: DimensionVector) -> DimensionVector {
        let mut out = [0i8; 8];
        for i in 0..8 {
            out[i] = self.0[i].saturating_add(rhs.0[i]);
        }
        DimensionVector(out)
    }
}

impl Sub for DimensionVector {
    type Output = DimensionVector;
    fn sub(self, rhs: DimensionVector) -> DimensionVector {
        self + (-rhs)
    }
}

impl Neg for DimensionVector {
    type Output = DimensionVector;
    fn neg(self) -> DimensionVector {
        let mut out = [0i8; 8];
        for i in 0..8 {
            out[i] = self.0[i].saturating_neg();
        }
        DimensionVector(out)
    }
}

/// Conversion behavior of a parsed unit.
#[derive(Clone, Debug, PartialEq)]
pub enum UnitKind {
    /// `base = value * factor`
    Multiplicative { factor: Decimal },
    /// `base = value * factor + offset` (temperature scales)
    Affine { factor: Decimal, offset: Decimal },
}

/// A parsed UCUM expression reduced to dimensions + conversion kind.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub dimensions: DimensionVector,
    pub kind: UnitKind,
}

struct AtomDef {
    dimensions: DimensionVector,
    factor: Decimal,
    offset: Option<Decimal>,
    metric: bool,
}

fn dec(s: &str) -> Decimal {
    // Table literals are all well-formed.
    s.parse().unwrap()
}

macro_rules! dim {
    ($m:expr, $g:expr, $s:expr, $rad:expr, $k:expr, $c:expr, $cd:expr, $mol:expr) => {
        DimensionVector([$m, $g, $s, $rad, $k, $c, $cd, $mol])
    };
}

static ATOMS: Lazy<HashMap<&'static str, AtomDef>> = Lazy::new(|| {
    let mut t = HashMap::new();
    let mut atom = |sym: &'static str, dims: DimensionVector, factor: &str, metric: bool| {
        t.insert(
            sym,
            AtomDef {
                dimensions: dims,
                factor: dec(factor),
                offset: None,
                metric,
            },
        );
    };

    // Base units
    atom("m", dim!(1, 0, 0, 0, 0, 0, 0, 0), "1", true);
    atom("g", dim!(0, 1, 0, 0, 0, 0, 0, 0), "1", true);
    atom("s", dim!(0, 0, 1, 0, 0, 0, 0, 0), "1", true);
    atom("rad", dim!(0, 0, 0, 1, 0, 0, 0, 0), "1", true);
    atom("K", dim!(0, 0, 0, 0, 1, 0, 0, 0), "1", true);
    atom("C", dim!(0, 0, 0, 0, 0, 1, 0, 0), "1", true);
    atom("cd", dim!(0, 0, 0, 0, 0, 0, 1, 0), "1", true);
    atom("mol", dim!(0, 0, 0, 0, 0, 0, 0, 1), "1", true);

    // Time
    atom("min", dim!(0, 0, 1, 0, 0, 0, 0, 0), "60", false);
    atom("h", dim!(0, 0, 1, 0, 0, 0, 0, 0), "3600", false);
    atom("d", dim!(0, 0, 1, 0, 0, 0, 0, 0), "86400", false);
    atom("wk", dim!(0, 0, 1, 0, 0, 0, 0, 0), "604800", false);
    // UCUM: a = 365.25 d (Julian year), mo = a/12
    atom("a", dim!(0, 0, 1, 0, 0, 0, 0, 0), "31557600", false);
    atom("mo", dim!(0, 0, 1, 0, 0, 0, 0, 0), "2629800", false);

    // Volume
    atom("L", dim!(3, 0, 0, 0, 0, 0, 0, 0), "0.001", true);
    atom("l", dim!(3, 0, 0, 0, 0, 0, 0, 0), "0.001", true);

    // Derived SI (mass dimension is grams, hence the 1000s)
    atom("N", dim!(1, 1, -2, 0, 0, 0, 0, 0), "1000", true);
    atom("Pa", dim!(-1, 1, -2, 0, 0, 0, 0, 0), "1000", true);
    atom("J", dim!(2, 1, -2, 0, 0, 0, 0, 0), "1000", true);
    atom("W", dim!(2, 1, -3, 0, 0, 0, 0, 0), "1000", true);
    atom("Hz", dim!(0, 0, -1, 0, 0, 0, 0, 0), "1", true);
    atom("Bq", dim!(0, 0, -1, 0, 0, 0, 0, 0), "1", true);
    atom("A", dim!(0, 0, -1, 0, 0, 1, 0, 0), "1", true);
    atom("V", dim!(2, 1, -2, 0, 0, -1, 0, 0), "1000", true);
    atom("bar", dim!(-1, 1, -2, 0, 0, 0, 0, 0), "100000000", true);

    // Pressure column and customary units
    atom("m[Hg]", dim!(-1, 1, -2, 0, 0, 0, 0, 0), "133322387.4150", true);
    atom("[lb_av]", dim!(0, 1, 0, 0, 0, 0, 0, 0), "453.59237", false);
    atom("[in_i]", dim!(1, 0, 0, 0, 0, 0, 0, 0), "0.0254", false);
    atom("[ft_i]", dim!(1, 0, 0, 0, 0, 0, 0, 0), "0.3048", false);

    // Dimensionless
    atom("1", DimensionVector::ZERO, "1", false);
    atom("%", DimensionVector::ZERO, "0.01", false);

    // Temperature scales (affine)
    t.insert(
        "Cel",
        AtomDef {
            dimensions: dim!(0, 0, 0, 0, 1, 0, 0, 0),
            factor: dec("1"),
            offset: Some(dec("273.15")),
            metric: true,
        },
    );
    t.insert(
        "[degF]",
        AtomDef {
            dimensions: dim!(0, 0, 0, 0, 1, 0, 0, 0),
            factor: Decimal::from(5) / Decimal::from(9),
            offset: Some(Decimal::from(45967) * Decimal::from(5) / Decimal::from(900)),
            metric: false,
        },
    );

    t
});

// Ordered longest-first so `da` wins over `d`.
const PREFIXES: &[(&str, i32)] = &[
    ("da", 1),
    ("Y", 24),
    ("Z", 21),
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
    ("h", 2),
    ("d", -1),
    ("c", -2),
    ("m", -3),
    ("u", -6),
    ("n", -9),
    ("p", -12),
    ("f", -15),
    ("a", -18),
    ("z", -21),
    ("y", -24),
];

fn pow10(exp: i32) -> Result<Decimal> {
    if exp >= 0 {
        if exp > 28 {
            return Err(Error::Overflow);
        }
        let mut v = Decimal::ONE;
        for _ in 0..exp {
            v = v.checked_mul(Decimal::TEN).ok_or(Error::Overflow)?;
        }
        Ok(v)
    } else {
        if exp < -28 {
            return Err(Error::Overflow);
        }
        Ok(Decimal::new(1, (-exp) as u32))
    }
}

/// One parsed component: an atom with its prefix factor and exponent.
struct Component {
    dimensions: DimensionVector,
    factor: Decimal,
    offset: Option<Decimal>,
    exponent: i32,
}

struct UnitParser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> UnitParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn syntax(&self, message: &'static str) -> Error {
        Error::Syntax {
            pos: self.pos,
            message,
        }
    }

    fn parse(mut self) -> Result<Unit> {
        let mut dimensions = DimensionVector::ZERO;
        let mut factor = Decimal::ONE;
        let mut affine: Option<(Decimal, Decimal)> = None;
        let mut component_count = 0usize;

        // A leading '/' inverts the first component.
        let mut invert = if self.peek() == Some(b'/') {
            self.pos += 1;
            true
        } else {
            false
        };

        loop {
            let comp = self.parse_component()?;
            component_count += 1;

            let signed_exp = if invert { -comp.exponent } else { comp.exponent };
            dimensions = dimensions + comp.dimensions.scaled(signed_exp)?;

            if let Some(offset) = comp.offset {
                // Affine units only stand alone with exponent 1.
                affine = Some((comp.factor, offset));
                if signed_exp != 1 {
                    return Err(Error::AffineExponent(self.input.to_string()));
                }
            } else {
                factor = apply_factor(factor, comp.factor, signed_exp)?;
            }

            match self.peek() {
                Some(b'.') => {
                    self.pos += 1;
                    invert = false;
                }
                Some(b'/') => {
                    self.pos += 1;
                    invert = true;
                }
                None => break,
                _ => return Err(self.syntax("expected '.', '/' or end of expression")),
            }
        }

        if let Some((afactor, offset)) = affine {
            if component_count > 1 {
                return Err(Error::AffineExponent(self.input.to_string()));
            }
            return Ok(Unit {
                dimensions,
                kind: UnitKind::Affine {
                    factor: afactor,
                    offset,
                },
            });
        }

        Ok(Unit {
            dimensions,
            kind: UnitKind::Multiplicative { factor },
        })
    }

    fn parse_component(&mut self) -> Result<Component> {
        // Annotations are dimensionless: `{rbc}` == 1.
        if self.peek() == Some(b'{') {
            self.skip_annotation()?;
            return Ok(Component {
                dimensions: DimensionVector::ZERO,
                factor: Decimal::ONE,
                offset: None,
                exponent: 1,
            });
        }

        if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            let value = self.read_integer()?;
            return Ok(Component {
                dimensions: DimensionVector::ZERO,
                factor: Decimal::from(value),
                offset: None,
                exponent: 1,
            });
        }

        let symbol = self.read_symbol()?;
        let (prefix_exp, def) = resolve_symbol(&symbol)?;
        let exponent = self.read_exponent()?;

        let mut factor = def.factor;
        if prefix_exp != 0 {
            factor = factor
                .checked_mul(pow10(prefix_exp)?)
                .ok_or(Error::Overflow)?;
        }

        // Trailing annotation binds to the preceding unit: `mL{total}`.
        if self.peek() == Some(b'{') {
            self.skip_annotation()?;
        }

        Ok(Component {
            dimensions: def.dimensions,
            factor,
            offset: def.offset,
            exponent,
        })
    }

    fn skip_annotation(&mut self) -> Result<()> {
        let start = self.pos;
        self.pos += 1;
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == b'}' {
                return Ok(());
            }
        }
        Err(Error::Syntax {
            pos: start,
            message: "unterminated annotation",
        })
    }

    fn read_integer(&mut self) -> Result<u64> {
        let start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| Error::Overflow)
    }

    fn read_symbol(&mut self) -> Result<String> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                b'[' => {
                    depth += 1;
                    self.pos += 1;
                }
                b']' => {
                    if depth == 0 {
                        return Err(self.syntax("unexpected ']'"));
                    }
                    depth -= 1;
                    self.pos += 1;
                }
                b'.' | b'/' | b'{' if depth == 0 => break,
                c if depth == 0 && (c.is_ascii_digit() || c == b'+' || c == b'-') => break,
                _ => self.pos += 1,
            }
        }
        if depth != 0 {
            return Err(self.syntax("unterminated '['"));
        }
        if start == self.pos {
            return Err(self.syntax("expected unit symbol"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn read_exponent(&mut self) -> Result<i32> {
        let negative = match self.peek() {
            Some(b'+') => {
                self.pos += 1;
                false
            }
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(c) if c.is_ascii_digit() => false,
            _ => return Ok(1),
        };
        let start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.syntax("expected exponent digits"));
        }
        let value: i32 = self.input[start..self.pos]
            .parse()
            .map_err(|_| Error::Overflow)?;
        Ok(if negative { -value } else { value })
    }
}

fn resolve_symbol(symbol: &str) -> Result<(i32, &'static AtomDef)> {
    if let Some(def) = ATOMS.get(symbol) {
        return Ok((0, def));
    }
    for (prefix, exp) in PREFIXES {
        if let Some(rest) = symbol.strip_prefix(prefix) {
            if let Some(def) = ATOMS.get(rest) {
                if !def.metric {
                    return Err(Error::NotPrefixable(rest.to_string()));
                }
                return Ok((*exp, def));
            }
        }
    }
    Err(Error::UnknownUnit(symbol.to_string()))
}

fn apply_factor(acc: Decimal, factor: Decimal, exponent: i32) -> Result<Decimal> {
    let mut out = acc;
    let n = exponent.unsigned_abs();
    for _ in 0..n {
        if exponent > 0 {
            out = out.checked_mul(factor).ok_or(Error::Overflow)?;
        } else {
            if factor.is_zero() {
                return Err(Error::Overflow);
            }
            out = out.checked_div(factor).ok_or(Error::Overflow)?;
        }
    }
    Ok(out)
}

impl Unit {
    /// Parse a UCUM expression into a unit.
    pub fn parse(expr: &str) -> Result<Unit> {
        if !expr.is_ascii() {
            return Err(Error::NonAscii);
        }
        if expr.bytes().any(|c| c.is_ascii_whitespace()) {
            return Err(Error::ContainsWhitespace);
        }
        if expr.is_empty() {
            return Ok(Unit {
                dimensions: DimensionVector::ZERO,
                kind: UnitKind::Multiplicative {
                    factor: Decimal::ONE,
                },
            });
        }
        UnitParser::new(expr).parse()
    }

    /// Convert a value in this unit to base-unit magnitude.
    pub fn to_base(&self, value: &Decimal) -> Result<Decimal> {
        match &self.kind {
            UnitKind::Multiplicative { factor } => {
                value.checked_mul(*factor).ok_or(Error::Overflow)
            }
            UnitKind::Affine { factor, offset } => value
                .checked_mul(*factor)
                .and_then(|v| v.checked_add(*offset))
                .ok_or(Error::Overflow),
        }
    }

    /// Convert a base-unit magnitude into this unit.
    pub fn from_base(&self, value: &Decimal) -> Result<Decimal> {
        match &self.kind {
            UnitKind::Multiplicative { factor } => {
                if factor.is_zero() {
                    return Err(Error::Overflow);
                }
                value.checked_div(*factor).ok_or(Error::Overflow)
            }
            UnitKind::Affine { factor, offset } => {
                if factor.is_zero() {
                    return Err(Error::Overflow);
                }
                value
                    .checked_sub(*offset)
                    .and_then(|v| v.checked_div(*factor))
                    .ok_or(Error::Overflow)
            }
        }
    }
}

/// Check that an expression parses.
pub fn validate(expr: &str) -> Result<()> {
    Unit::parse(expr).map(|_| ())
}

/// Whether two expressions share a dimension (and so can convert).
pub fn convertible(from: &str, to: &str) -> Result<bool> {
    let f = Unit::parse(from)?;
    let t = Unit::parse(to)?;
    Ok(f.dimensions == t.dimensions)
}

/// Alias kept for the historical name: commensurability check.
pub fn equivalent(from: &str, to: &str) -> Result<bool> {
    convertible(from, to)
}

/// Convert `value` from one unit expression to another.
pub fn convert_decimal(value: Decimal, from: &str, to: &str) -> Result<Decimal> {
    let f = Unit::parse(from)?;
    let t = Unit::parse(to)?;
    if f.dimensions != t.dimensions {
        return Err(Error::Incompatible {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    t.from_base(&f.to_base(&value)?)
}

/// Compare two quantities after conversion to a common base.
pub fn compare_decimal_quantities(
    lhs_value: &Decimal,
    lhs_unit: &str,
    rhs_value: &Decimal,
    rhs_unit: &str,
) -> Result<Ordering> {
    let l = Unit::parse(lhs_unit)?;
    let r = Unit::parse(rhs_unit)?;
    if l.dimensions != r.dimensions {
        return Err(Error::Incompatible {
            from: lhs_unit.to_string(),
            to: rhs_unit.to_string(),
        });
    }
    let lb = l.to_base(lhs_value)?;
    let rb = r.to_base(rhs_value)?;
    Ok(lb.cmp(&rb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_prefixed_atoms() {
        let mg = Unit::parse("mg").unwrap();
        assert_eq!(mg.dimensions, DimensionVector([0, 1, 0, 0, 0, 0, 0, 0]));
        match mg.kind {
            UnitKind::Multiplicative { factor } => {
                assert_eq!(factor, Decimal::from_str("0.001").unwrap())
            }
            _ => panic!("expected multiplicative"),
        }
    }

    #[test]
    fn atom_wins_over_prefix_split() {
        // `min` is minutes, not milli-`in`.
        let min = Unit::parse("min").unwrap();
        assert_eq!(min.dimensions, DimensionVector([0, 0, 1, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn quotient_units() {
        let u = Unit::parse("mg/dL").unwrap();
        assert_eq!(u.dimensions, DimensionVector([-3, 1, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn exponent_units() {
        let u = Unit::parse("m2").unwrap();
        assert_eq!(u.dimensions, DimensionVector([2, 0, 0, 0, 0, 0, 0, 0]));
        let u = Unit::parse("kg/m2").unwrap();
        assert_eq!(u.dimensions, DimensionVector([-2, 1, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn rejects_nonsense() {
        assert!(Unit::parse("m..s").is_err());
        assert!(Unit::parse("florbs").is_err());
        assert!(Unit::parse("kmin").is_err()); // `min` is not prefixable
    }

    #[test]
    fn annotation_is_dimensionless() {
        let u = Unit::parse("{score}").unwrap();
        assert_eq!(u.dimensions, DimensionVector::ZERO);
        assert!(Unit::parse("mL{total}").is_ok());
    }

    #[test]
    fn affine_temperature() {
        let v = convert_decimal(Decimal::from(37), "Cel", "K").unwrap();
        assert_eq!(v, Decimal::from_str("310.15").unwrap());
        assert!(Unit::parse("Cel2").is_err());
    }
}
