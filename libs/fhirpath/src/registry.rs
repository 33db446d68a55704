//! Invocation table for the FHIRPath standard library
//!
//! Functions are data: each entry carries its numeric id, the allowed
//! signatures as parameter-kind lists per argument count, whether an
//! empty input short-circuits to empty (`nullable`), and whether the
//! implementation may suspend on I/O (`is_async`). The compiler validates
//! arity and captures `Expr`/`TypeSpecifier` arguments unevaluated; the
//! evaluator dispatches on the id.
//!
//! User-defined functions plug into the same surface through
//! `UserInvocationTable`.

use crate::error::Result;
use crate::value::Collection;
use phf::phf_map;
use std::collections::HashMap;
use std::sync::Arc;

pub type FunctionId = u16;

/// How one declared parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Bound subtree, evaluated lazily per item (macros).
    Expr,
    /// Bound subtree evaluated against the evaluation root.
    AnyAtRoot,
    /// Literal identifier capture.
    Identifier,
    /// Literal (possibly qualified) type name capture.
    TypeSpecifier,
    /// Eager value arguments, coerced to a singleton of the kind.
    Integer,
    Number,
    String,
    StringOrNumber,
    Boolean,
    Any,
}

/// One standard-library function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub id: FunctionId,
    pub name: &'static str,
    /// Allowed signatures, matched by exact argument count.
    pub arity: &'static [&'static [ParamKind]],
    /// Empty input collection returns empty without invoking.
    pub nullable: bool,
    /// May suspend (terminology access).
    pub is_async: bool,
}

use ParamKind::*;

macro_rules! spec {
    ($id:expr, $name:expr, $arity:expr) => {
        FunctionSpec {
            id: $id,
            name: $name,
            arity: $arity,
            nullable: false,
            is_async: false,
        }
    };
    ($id:expr, $name:expr, $arity:expr, nullable) => {
        FunctionSpec {
            id: $id,
            name: $name,
            arity: $arity,
            nullable: true,
            is_async: false,
        }
    };
    ($id:expr, $name:expr, $arity:expr, nullable, async) => {
        FunctionSpec {
            id: $id,
            name: $name,
            arity: $arity,
            nullable: true,
            is_async: true,
        }
    };
}

pub mod fid {
    pub const NOT: u16 = 0;

    // Existence
    pub const EMPTY: u16 = 10;
    pub const EXISTS: u16 = 11;
    pub const ALL: u16 = 12;
    pub const ALL_TRUE: u16 = 13;
    pub const ANY_TRUE: u16 = 14;
    pub const ALL_FALSE: u16 = 15;
    pub const ANY_FALSE: u16 = 16;
    pub const SUBSET_OF: u16 = 17;
    pub const SUPERSET_OF: u16 = 18;
    pub const COUNT: u16 = 19;
    pub const DISTINCT: u16 = 20;
    pub const IS_DISTINCT: u16 = 21;
    pub const HAS_VALUE: u16 = 22;

    // Filtering and projection
    pub const WHERE: u16 = 30;
    pub const SELECT: u16 = 31;
    pub const REPEAT: u16 = 32;
    pub const OF_TYPE: u16 = 33;
    pub const EXTENSION: u16 = 34;

    // Subsetting
    pub const SINGLE: u16 = 40;
    pub const FIRST: u16 = 41;
    pub const LAST: u16 = 42;
    pub const TAIL: u16 = 43;
    pub const SKIP: u16 = 44;
    pub const TAKE: u16 = 45;
    pub const INTERSECT: u16 = 46;
    pub const EXCLUDE: u16 = 47;

    // Combining
    pub const UNION: u16 = 50;
    pub const COMBINE: u16 = 51;

    // Strings
    pub const TO_STRING: u16 = 100;
    pub const INDEX_OF: u16 = 101;
    pub const SUBSTRING: u16 = 103;
    pub const STARTS_WITH: u16 = 104;
    pub const ENDS_WITH: u16 = 105;
    pub const CONTAINS: u16 = 106;
    pub const UPPER: u16 = 107;
    pub const LOWER: u16 = 108;
    pub const REPLACE: u16 = 109;
    pub const MATCHES: u16 = 110;
    pub const REPLACE_MATCHES: u16 = 112;
    pub const LENGTH: u16 = 113;
    pub const TO_CHARS: u16 = 114;
    pub const TRIM: u16 = 115;
    pub const ENCODE: u16 = 116;
    pub const DECODE: u16 = 117;
    pub const SPLIT: u16 = 120;
    pub const JOIN: u16 = 121;

    // Math
    pub const ABS: u16 = 200;
    pub const CEILING: u16 = 201;
    pub const EXP: u16 = 202;
    pub const FLOOR: u16 = 203;
    pub const LN: u16 = 204;
    pub const LOG: u16 = 205;
    pub const POWER: u16 = 206;
    pub const ROUND: u16 = 207;
    pub const SQRT: u16 = 208;
    pub const TRUNCATE: u16 = 209;

    // Conversion
    pub const IIF: u16 = 300;
    pub const TO_BOOLEAN: u16 = 301;
    pub const CONVERTS_TO_BOOLEAN: u16 = 302;
    pub const TO_INTEGER: u16 = 303;
    pub const CONVERTS_TO_INTEGER: u16 = 304;
    pub const TO_DECIMAL: u16 = 305;
    pub const CONVERTS_TO_DECIMAL: u16 = 306;
    pub const CONVERTS_TO_STRING: u16 = 307;
    pub const TO_DATE: u16 = 308;
    pub const CONVERTS_TO_DATE: u16 = 309;
    pub const TO_DATETIME: u16 = 310;
    pub const CONVERTS_TO_DATETIME: u16 = 311;
    pub const TO_TIME: u16 = 312;
    pub const CONVERTS_TO_TIME: u16 = 313;
    pub const TO_QUANTITY: u16 = 314;
    pub const CONVERTS_TO_QUANTITY: u16 = 315;
    pub const TO_LONG: u16 = 316;
    pub const CONVERTS_TO_LONG: u16 = 317;

    // Navigation
    pub const CHILDREN: u16 = 400;
    pub const DESCENDANTS: u16 = 401;

    // Type operations as functions
    pub const IS_FN: u16 = 410;
    pub const AS_FN: u16 = 411;

    // Utility
    pub const TRACE: u16 = 500;
    pub const NOW: u16 = 501;
    pub const TODAY: u16 = 502;
    pub const TIME_OF_DAY: u16 = 503;
    pub const DEFINE_VARIABLE: u16 = 504;

    // Aggregates
    pub const AGGREGATE: u16 = 600;
    pub const SUM: u16 = 601;
    pub const MIN: u16 = 602;
    pub const MAX: u16 = 603;
    pub const AVG: u16 = 604;

    // SDC terminology
    pub const WEIGHT: u16 = 700;
}

static FUNCTIONS: phf::Map<&'static str, FunctionSpec> = phf_map! {
    "not" => spec!(fid::NOT, "not", &[&[]]),

    // Existence
    "empty" => spec!(fid::EMPTY, "empty", &[&[]]),
    "exists" => spec!(fid::EXISTS, "exists", &[&[], &[Expr]]),
    "all" => spec!(fid::ALL, "all", &[&[Expr]]),
    "allTrue" => spec!(fid::ALL_TRUE, "allTrue", &[&[]]),
    "anyTrue" => spec!(fid::ANY_TRUE, "anyTrue", &[&[]]),
    "allFalse" => spec!(fid::ALL_FALSE, "allFalse", &[&[]]),
    "anyFalse" => spec!(fid::ANY_FALSE, "anyFalse", &[&[]]),
    "subsetOf" => spec!(fid::SUBSET_OF, "subsetOf", &[&[AnyAtRoot]]),
    "supersetOf" => spec!(fid::SUPERSET_OF, "supersetOf", &[&[AnyAtRoot]]),
    "count" => spec!(fid::COUNT, "count", &[&[]]),
    "distinct" => spec!(fid::DISTINCT, "distinct", &[&[]]),
    "isDistinct" => spec!(fid::IS_DISTINCT, "isDistinct", &[&[]]),
    "hasValue" => spec!(fid::HAS_VALUE, "hasValue", &[&[]]),

    // Filtering and projection
    "where" => spec!(fid::WHERE, "where", &[&[Expr]]),
    "select" => spec!(fid::SELECT, "select", &[&[Expr]]),
    "repeat" => spec!(fid::REPEAT, "repeat", &[&[Expr]]),
    "ofType" => spec!(fid::OF_TYPE, "ofType", &[&[TypeSpecifier]]),
    "extension" => spec!(fid::EXTENSION, "extension", &[&[String]], nullable),

    // Subsetting
    "single" => spec!(fid::SINGLE, "single", &[&[]]),
    "first" => spec!(fid::FIRST, "first", &[&[]]),
    "last" => spec!(fid::LAST, "last", &[&[]]),
    "tail" => spec!(fid::TAIL, "tail", &[&[]]),
    "skip" => spec!(fid::SKIP, "skip", &[&[Integer]]),
    "take" => spec!(fid::TAKE, "take", &[&[Integer]]),
    "intersect" => spec!(fid::INTERSECT, "intersect", &[&[AnyAtRoot]]),
    "exclude" => spec!(fid::EXCLUDE, "exclude", &[&[AnyAtRoot]]),

    // Combining
    "union" => spec!(fid::UNION, "union", &[&[AnyAtRoot]]),
    "combine" => spec!(fid::COMBINE, "combine", &[&[AnyAtRoot]]),

    // Strings
    "toString" => spec!(fid::TO_STRING, "toString", &[&[]], nullable),
    "indexOf" => spec!(fid::INDEX_OF, "indexOf", &[&[String]], nullable),
    "substring" => spec!(fid::SUBSTRING, "substring", &[&[Integer], &[Integer, Integer]], nullable),
    "startsWith" => spec!(fid::STARTS_WITH, "startsWith", &[&[String]], nullable),
    "endsWith" => spec!(fid::ENDS_WITH, "endsWith", &[&[String]], nullable),
    "contains" => spec!(fid::CONTAINS, "contains", &[&[String]], nullable),
    "upper" => spec!(fid::UPPER, "upper", &[&[]], nullable),
    "lower" => spec!(fid::LOWER, "lower", &[&[]], nullable),
    "replace" => spec!(fid::REPLACE, "replace", &[&[String, String]], nullable),
    "matches" => spec!(fid::MATCHES, "matches", &[&[String]], nullable),
    "replaceMatches" => spec!(fid::REPLACE_MATCHES, "replaceMatches", &[&[String, String]], nullable),
    "length" => spec!(fid::LENGTH, "length", &[&[]], nullable),
    "toChars" => spec!(fid::TO_CHARS, "toChars", &[&[]], nullable),
    "trim" => spec!(fid::TRIM, "trim", &[&[]], nullable),
    "encode" => spec!(fid::ENCODE, "encode", &[&[String]], nullable),
    "decode" => spec!(fid::DECODE, "decode", &[&[String]], nullable),
    "split" => spec!(fid::SPLIT, "split", &[&[String]], nullable),
    "join" => spec!(fid::JOIN, "join", &[&[], &[String]]),

    // Math
    "abs" => spec!(fid::ABS, "abs", &[&[]], nullable),
    "ceiling" => spec!(fid::CEILING, "ceiling", &[&[]], nullable),
    "exp" => spec!(fid::EXP, "exp", &[&[]], nullable),
    "floor" => spec!(fid::FLOOR, "floor", &[&[]], nullable),
    "ln" => spec!(fid::LN, "ln", &[&[]], nullable),
    "log" => spec!(fid::LOG, "log", &[&[Number]], nullable),
    "power" => spec!(fid::POWER, "power", &[&[Number]], nullable),
    "round" => spec!(fid::ROUND, "round", &[&[], &[Integer]], nullable),
    "sqrt" => spec!(fid::SQRT, "sqrt", &[&[]], nullable),
    "truncate" => spec!(fid::TRUNCATE, "truncate", &[&[]], nullable),

    // Conversion
    "iif" => spec!(fid::IIF, "iif", &[&[Expr, Expr], &[Expr, Expr, Expr]]),
    "toBoolean" => spec!(fid::TO_BOOLEAN, "toBoolean", &[&[]], nullable),
    "convertsToBoolean" => spec!(fid::CONVERTS_TO_BOOLEAN, "convertsToBoolean", &[&[]], nullable),
    "toInteger" => spec!(fid::TO_INTEGER, "toInteger", &[&[]], nullable),
    "convertsToInteger" => spec!(fid::CONVERTS_TO_INTEGER, "convertsToInteger", &[&[]], nullable),
    "toLong" => spec!(fid::TO_LONG, "toLong", &[&[]], nullable),
    "convertsToLong" => spec!(fid::CONVERTS_TO_LONG, "convertsToLong", &[&[]], nullable),
    "toDecimal" => spec!(fid::TO_DECIMAL, "toDecimal", &[&[]], nullable),
    "convertsToDecimal" => spec!(fid::CONVERTS_TO_DECIMAL, "convertsToDecimal", &[&[]], nullable),
    "convertsToString" => spec!(fid::CONVERTS_TO_STRING, "convertsToString", &[&[]], nullable),
    "toDate" => spec!(fid::TO_DATE, "toDate", &[&[]], nullable),
    "convertsToDate" => spec!(fid::CONVERTS_TO_DATE, "convertsToDate", &[&[]], nullable),
    "toDateTime" => spec!(fid::TO_DATETIME, "toDateTime", &[&[]], nullable),
    "convertsToDateTime" => spec!(fid::CONVERTS_TO_DATETIME, "convertsToDateTime", &[&[]], nullable),
    "toTime" => spec!(fid::TO_TIME, "toTime", &[&[]], nullable),
    "convertsToTime" => spec!(fid::CONVERTS_TO_TIME, "convertsToTime", &[&[]], nullable),
    "toQuantity" => spec!(fid::TO_QUANTITY, "toQuantity", &[&[], &[String]], nullable),
    "convertsToQuantity" => spec!(fid::CONVERTS_TO_QUANTITY, "convertsToQuantity", &[&[], &[String]], nullable),

    // Navigation
    "children" => spec!(fid::CHILDREN, "children", &[&[]]),
    "descendants" => spec!(fid::DESCENDANTS, "descendants", &[&[]]),

    // Type tests
    "is" => spec!(fid::IS_FN, "is", &[&[TypeSpecifier]]),
    "as" => spec!(fid::AS_FN, "as", &[&[TypeSpecifier]]),

    // Utility
    "trace" => spec!(fid::TRACE, "trace", &[&[String], &[String, Expr]]),
    "now" => spec!(fid::NOW, "now", &[&[]]),
    "today" => spec!(fid::TODAY, "today", &[&[]]),
    "timeOfDay" => spec!(fid::TIME_OF_DAY, "timeOfDay", &[&[]]),
    "defineVariable" => spec!(fid::DEFINE_VARIABLE, "defineVariable", &[&[String], &[String, Expr]]),

    // Aggregates
    "aggregate" => spec!(fid::AGGREGATE, "aggregate", &[&[Expr], &[Expr, Any]]),
    "sum" => spec!(fid::SUM, "sum", &[&[]]),
    "min" => spec!(fid::MIN, "min", &[&[]]),
    "max" => spec!(fid::MAX, "max", &[&[]]),
    "avg" => spec!(fid::AVG, "avg", &[&[]]),

    // SDC terminology (async)
    "weight" => spec!(fid::WEIGHT, "weight", &[&[]], nullable, async),
    "ordinal" => spec!(fid::WEIGHT, "ordinal", &[&[]], nullable, async),
};

/// Look up a built-in function by name.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.get(name)
}

/// A user-supplied function implementation: input collection plus
/// eagerly-evaluated argument collections.
pub type UserFunction =
    Arc<dyn Fn(&Collection, &[Collection]) -> Result<Collection> + Send + Sync>;

/// Metadata for one user-defined function, mirroring the built-in shape.
#[derive(Clone)]
pub struct UserFunctionSpec {
    pub func: UserFunction,
    /// Allowed signatures by exact argument count (value kinds only;
    /// user functions receive evaluated collections).
    pub arity: Vec<Vec<ParamKind>>,
    pub nullable: bool,
}

impl std::fmt::Debug for UserFunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserFunctionSpec")
            .field("func", &"<fn>")
            .field("arity", &self.arity)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// Extension surface for user-defined functions.
pub type UserInvocationTable = HashMap<std::string::String, UserFunctionSpec>;
