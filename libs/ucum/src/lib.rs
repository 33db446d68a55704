#![forbid(unsafe_code)]

//! Curated UCUM unit arithmetic.
//!
//! Covers the unit expressions that show up in clinical FHIR data:
//! prefixed atoms, products/quotients, integer exponents, bracketed atoms
//! and annotations. The atom table is curated rather than generated from
//! `ucum-essence.xml`; unknown symbols are reported, never guessed.

mod error;
mod quantity;
mod unit;

pub use error::{Error, Result};
pub use quantity::{normalize, NormalizedQuantity, Quantity};
pub use unit::{
    compare_decimal_quantities, convert_decimal, convertible, equivalent, validate,
    DimensionVector, Unit, UnitKind,
};
