//! Typed value algebra for FHIRPath evaluation
//!
//! Every expression yields a `Collection`: an ordered, flat sequence of
//! `Value`s. Values are cheap-clone handles over a tagged union covering
//! the System primitives, partial-precision temporals, quantities, and
//! `ResourceNode` document fragments.
//!
//! `Value` equality/hashing implement *structural* deep-equality: the
//! relation used by distinctness, membership and set operations. The
//! tri-valued `=` operator lives in `ops::equality` and is looser or
//! stricter depending on kind (temporal uncertainty, unit boundaries).

use crate::node::ResourceNode;
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Rounding step applied before numeric equality (8 decimal places).
pub const NUMERIC_EQUALITY_DP: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateTimePrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimePrecision {
    Hour,
    Minute,
    Second,
    Millisecond,
}

/// Calendar duration words, distinct from UCUM time codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl CalendarUnit {
    /// Parse a calendar word, accepting the plural form.
    pub fn parse(word: &str) -> Option<CalendarUnit> {
        let singular = word.strip_suffix('s').unwrap_or(word);
        match singular {
            "year" => Some(CalendarUnit::Year),
            "month" => Some(CalendarUnit::Month),
            "week" => Some(CalendarUnit::Week),
            "day" => Some(CalendarUnit::Day),
            "hour" => Some(CalendarUnit::Hour),
            "minute" => Some(CalendarUnit::Minute),
            "second" => Some(CalendarUnit::Second),
            "millisecond" => Some(CalendarUnit::Millisecond),
            _ => None,
        }
    }

    /// The UCUM code with the same nominal meaning.
    pub fn ucum_code(&self) -> &'static str {
        match self {
            CalendarUnit::Year => "a",
            CalendarUnit::Month => "mo",
            CalendarUnit::Week => "wk",
            CalendarUnit::Day => "d",
            CalendarUnit::Hour => "h",
            CalendarUnit::Minute => "min",
            CalendarUnit::Second => "s",
            CalendarUnit::Millisecond => "ms",
        }
    }

    /// Calendar durations above one second do not convert into UCUM time.
    pub fn above_seconds(&self) -> bool {
        !matches!(self, CalendarUnit::Second | CalendarUnit::Millisecond)
    }
}

/// Classification of a quantity's unit string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitCategory {
    Calendar(CalendarUnit),
    Ucum,
}

pub fn classify_unit(unit: &str) -> UnitCategory {
    match CalendarUnit::parse(unit) {
        Some(cal) => UnitCategory::Calendar(cal),
        None => UnitCategory::Ucum,
    }
}

/// The tagged union behind `Value`.
#[derive(Debug, Clone)]
pub enum ValueData {
    Boolean(bool),
    /// FHIRPath Integer (32-bit conceptual; stored wide for arithmetic)
    Integer(i64),
    /// FHIRPath Long (`L` literals)
    Long(i64),
    Decimal(Decimal),
    String(Arc<str>),
    Date {
        value: NaiveDate,
        precision: DatePrecision,
    },
    DateTime {
        value: DateTime<Utc>,
        precision: DateTimePrecision,
        /// Offset seconds east of UTC as written; `None` when unzoned.
        timezone_offset: Option<i32>,
    },
    Time {
        value: NaiveTime,
        precision: TimePrecision,
    },
    Quantity {
        value: Decimal,
        unit: Arc<str>,
    },
    Node(ResourceNode),
}

/// A single FHIRPath value.
#[derive(Clone)]
pub struct Value {
    data: Arc<ValueData>,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.data, f)
    }
}

impl Value {
    pub fn new(data: ValueData) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(ValueData::Boolean(b))
    }

    pub fn integer(i: i64) -> Self {
        Self::new(ValueData::Integer(i))
    }

    pub fn long(i: i64) -> Self {
        Self::new(ValueData::Long(i))
    }

    pub fn decimal(d: Decimal) -> Self {
        Self::new(ValueData::Decimal(d))
    }

    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::new(ValueData::String(s.into()))
    }

    pub fn quantity(value: Decimal, unit: impl Into<Arc<str>>) -> Self {
        Self::new(ValueData::Quantity {
            value,
            unit: unit.into(),
        })
    }

    pub fn date_with_precision(value: NaiveDate, precision: DatePrecision) -> Self {
        Self::new(ValueData::Date { value, precision })
    }

    pub fn datetime_with_precision_and_offset(
        value: DateTime<Utc>,
        precision: DateTimePrecision,
        timezone_offset: Option<i32>,
    ) -> Self {
        Self::new(ValueData::DateTime {
            value,
            precision,
            timezone_offset,
        })
    }

    pub fn time_with_precision(value: NaiveTime, precision: TimePrecision) -> Self {
        Self::new(ValueData::Time { value, precision })
    }

    pub fn node(node: ResourceNode) -> Self {
        Self::new(ValueData::Node(node))
    }

    pub fn as_node(&self) -> Option<&ResourceNode> {
        match self.data() {
            ValueData::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The string content of a String value or a node over a JSON string.
    pub fn as_str_like(&self) -> Option<&str> {
        match self.data() {
            ValueData::String(s) => Some(s),
            ValueData::Node(node) => node.data().and_then(|d| d.as_str()),
            _ => None,
        }
    }

    /// The boolean content of a Boolean value or a node over a JSON bool.
    pub fn as_bool_like(&self) -> Option<bool> {
        match self.data() {
            ValueData::Boolean(b) => Some(*b),
            ValueData::Node(node) => node.data().and_then(|d| d.as_bool()),
            _ => None,
        }
    }

    /// Numeric view across Integer/Long/Decimal and nodes over JSON numbers.
    pub fn as_num(&self) -> Option<Num> {
        match self.data() {
            ValueData::Integer(i) => Some(Num::Integer(*i)),
            ValueData::Long(i) => Some(Num::Long(*i)),
            ValueData::Decimal(d) => Some(Num::Decimal(*d)),
            ValueData::Node(node) => {
                let json = node.data()?;
                match json {
                    JsonValue::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            Some(Num::Integer(i))
                        } else {
                            Decimal::from_str(&n.to_string()).ok().map(Num::Decimal)
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Quantity view: an FP Quantity, or a node over a FHIR Quantity object.
    pub fn as_quantity_like(&self) -> Option<(Decimal, Arc<str>)> {
        match self.data() {
            ValueData::Quantity { value, unit } => Some((*value, unit.clone())),
            ValueData::Node(node) => {
                let json = node.data()?;
                let obj = json.as_object()?;
                let value = obj.get("value")?;
                let value = Decimal::from_str(&value.as_f64()?.to_string()).ok()?;
                let unit = obj
                    .get("code")
                    .or_else(|| obj.get("unit"))
                    .and_then(|u| u.as_str())
                    .unwrap_or("1");
                Some((value, Arc::from(unit)))
            }
            _ => None,
        }
    }

    /// True for System primitives and nodes over primitive JSON.
    pub fn is_primitive(&self) -> bool {
        match self.data() {
            ValueData::Node(node) => match node.data() {
                Some(JsonValue::Object(_)) | Some(JsonValue::Array(_)) => false,
                Some(_) => true,
                None => false,
            },
            _ => true,
        }
    }

    /// The System or model type name of this value.
    pub fn type_name(&self) -> String {
        match self.data() {
            ValueData::Boolean(_) => "Boolean".into(),
            ValueData::Integer(_) => "Integer".into(),
            ValueData::Long(_) => "Long".into(),
            ValueData::Decimal(_) => "Decimal".into(),
            ValueData::String(_) => "String".into(),
            ValueData::Date { .. } => "Date".into(),
            ValueData::DateTime { .. } => "DateTime".into(),
            ValueData::Time { .. } => "Time".into(),
            ValueData::Quantity { .. } => "Quantity".into(),
            ValueData::Node(node) => node.type_name(),
        }
    }

    /// Lower to plain JSON (the `resolveInternalTypes` rendering):
    /// quantities become `{value, unit}` dictionaries, temporals become
    /// their canonical strings, nodes expose their raw data.
    pub fn to_json(&self) -> JsonValue {
        match self.data() {
            ValueData::Boolean(b) => JsonValue::Bool(*b),
            ValueData::Integer(i) | ValueData::Long(i) => JsonValue::from(*i),
            ValueData::Decimal(d) => decimal_to_json(*d),
            ValueData::String(s) => JsonValue::String(s.to_string()),
            ValueData::Date { value, precision } => {
                JsonValue::String(format_date(value, *precision))
            }
            ValueData::DateTime {
                value,
                precision,
                timezone_offset,
            } => JsonValue::String(format_datetime(value, *precision, *timezone_offset)),
            ValueData::Time { value, precision } => {
                JsonValue::String(format_time(value, *precision))
            }
            ValueData::Quantity { value, unit } => serde_json::json!({
                "value": decimal_to_json(*value),
                "unit": unit.to_string(),
            }),
            ValueData::Node(node) => node.data().cloned().unwrap_or(JsonValue::Null),
        }
    }

    /// Structural deep equality: the distinctness relation.
    pub fn deep_equal(&self, other: &Value) -> bool {
        canonical_form(self) == canonical_form(other)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_equal(other)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        canonical_form(self).hash(state)
    }
}

/// Numeric view used by arithmetic and comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Integer(i64),
    Long(i64),
    Decimal(Decimal),
}

impl Num {
    pub fn to_decimal(self) -> Decimal {
        match self {
            Num::Integer(i) | Num::Long(i) => Decimal::from(i),
            Num::Decimal(d) => d,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Num::Long(_))
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, Num::Decimal(_))
    }
}

/// Canonical structural form used by deep equality and hashing. Arrays of
/// sorted key/value pairs keep object comparison key-order independent;
/// numbers are rounded to the equality step; quantities are normalized to
/// canonical units when the unit is convertible.
#[derive(PartialEq, Eq, Hash, Debug)]
pub(crate) enum Canonical {
    Null,
    Boolean(bool),
    Number(String),
    String(String),
    Date(String),
    DateTime(String),
    Time(String),
    Quantity(String, String),
    Array(Vec<Canonical>),
    Object(Vec<(String, Canonical)>),
}

pub(crate) fn canonical_form(value: &Value) -> Canonical {
    match value.data() {
        ValueData::Boolean(b) => Canonical::Boolean(*b),
        ValueData::Integer(i) | ValueData::Long(i) => {
            Canonical::Number(Decimal::from(*i).normalize().to_string())
        }
        ValueData::Decimal(d) => Canonical::Number(canonical_number(*d)),
        ValueData::String(s) => Canonical::String(s.to_string()),
        ValueData::Date { value, precision } => Canonical::Date(format_date(value, *precision)),
        ValueData::DateTime {
            value,
            precision,
            timezone_offset,
        } => Canonical::DateTime(format_datetime(value, *precision, *timezone_offset)),
        ValueData::Time { value, precision } => Canonical::Time(format_time(value, *precision)),
        ValueData::Quantity { value, unit } => canonical_quantity(*value, unit),
        ValueData::Node(node) => match node.data() {
            Some(json) => canonical_json(json),
            None => Canonical::Null,
        },
    }
}

fn canonical_number(d: Decimal) -> String {
    d.round_dp(NUMERIC_EQUALITY_DP).normalize().to_string()
}

fn canonical_quantity(value: Decimal, unit: &str) -> Canonical {
    let code = match classify_unit(unit) {
        UnitCategory::Calendar(cal) => cal.ucum_code(),
        UnitCategory::Ucum => unit,
    };
    match corten_ucum::normalize(value, code) {
        Ok(n) => Canonical::Quantity(canonical_number(n.value), n.unit),
        Err(_) => Canonical::Quantity(canonical_number(value), unit.to_string()),
    }
}

fn canonical_json(json: &JsonValue) -> Canonical {
    match json {
        JsonValue::Null => Canonical::Null,
        JsonValue::Bool(b) => Canonical::Boolean(*b),
        JsonValue::Number(n) => {
            let d = Decimal::from_str(&n.to_string()).unwrap_or_default();
            Canonical::Number(canonical_number(d))
        }
        JsonValue::String(s) => Canonical::String(s.clone()),
        JsonValue::Array(items) => Canonical::Array(items.iter().map(canonical_json).collect()),
        JsonValue::Object(map) => {
            let mut fields: Vec<(String, Canonical)> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonical_json(v)))
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Canonical::Object(fields)
        }
    }
}

fn decimal_to_json(d: Decimal) -> JsonValue {
    if d.scale() == 0 {
        if let Some(i) = d.to_i64() {
            return JsonValue::from(i);
        }
    }
    match d.to_f64() {
        Some(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        None => JsonValue::Null,
    }
}

pub fn format_date(date: &NaiveDate, precision: DatePrecision) -> String {
    match precision {
        DatePrecision::Year => date.format("%Y").to_string(),
        DatePrecision::Month => date.format("%Y-%m").to_string(),
        DatePrecision::Day => date.format("%Y-%m-%d").to_string(),
    }
}

pub fn format_datetime(
    dt: &DateTime<Utc>,
    precision: DateTimePrecision,
    timezone_offset: Option<i32>,
) -> String {
    // Render in the offset the value was written with.
    let offset = chrono::FixedOffset::east_opt(timezone_offset.unwrap_or(0))
        .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).unwrap());
    let local = dt.with_timezone(&offset);

    let core = match precision {
        DateTimePrecision::Year => return local.format("%Y").to_string(),
        DateTimePrecision::Month => return local.format("%Y-%m").to_string(),
        DateTimePrecision::Day => return local.format("%Y-%m-%d").to_string(),
        DateTimePrecision::Hour => local.format("%Y-%m-%dT%H").to_string(),
        DateTimePrecision::Minute => local.format("%Y-%m-%dT%H:%M").to_string(),
        DateTimePrecision::Second => local.format("%Y-%m-%dT%H:%M:%S").to_string(),
        DateTimePrecision::Millisecond => {
            let ms = local.timestamp_subsec_millis();
            format!("{}.{:03}", local.format("%Y-%m-%dT%H:%M:%S"), ms)
        }
    };

    match timezone_offset {
        Some(0) => format!("{}Z", core),
        Some(secs) => {
            let sign = if secs < 0 { '-' } else { '+' };
            let abs = secs.abs();
            format!("{}{}{:02}:{:02}", core, sign, abs / 3600, (abs % 3600) / 60)
        }
        None => core,
    }
}

pub fn format_time(t: &NaiveTime, precision: TimePrecision) -> String {
    match precision {
        TimePrecision::Hour => t.format("%H").to_string(),
        TimePrecision::Minute => t.format("%H:%M").to_string(),
        TimePrecision::Second => t.format("%H:%M:%S").to_string(),
        TimePrecision::Millisecond => {
            let ms = t.nanosecond() / 1_000_000;
            format!("{}.{:03}", t.format("%H:%M:%S"), ms)
        }
    }
}

/// An ordered, flat collection of values — the universal FHIRPath result.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    items: Vec<Value>,
}

impl Collection {
    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    pub fn singleton(value: Value) -> Self {
        Self { items: vec![value] }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn from_values(items: Vec<Value>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    /// Append another collection (collections never nest, so this is the
    /// flattening operation).
    pub fn append(&mut self, other: Collection) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn first_item(&self) -> Option<&Value> {
        self.items.first()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.items
    }

    /// Singleton accessor: `Ok(None)` when empty, error when 2+ items.
    pub fn singleton_item(&self, what: &str) -> crate::error::Result<Option<&Value>> {
        match self.items.len() {
            0 => Ok(None),
            1 => Ok(Some(&self.items[0])),
            n => Err(crate::error::Error::Singleton(format!(
                "{} got {} items",
                what, n
            ))),
        }
    }

    /// Boolean singleton coercion: empty is `None`; a non-boolean singleton
    /// evaluates as true (singleton evaluation of collections).
    pub fn as_boolean_singleton(&self) -> crate::error::Result<Option<bool>> {
        match self.singleton_item("boolean operand expected a singleton,")? {
            None => Ok(None),
            Some(item) => match item.as_bool_like() {
                Some(b) => Ok(Some(b)),
                None => Ok(Some(true)),
            },
        }
    }

    /// String singleton coercion.
    pub fn as_string(&self) -> crate::error::Result<Arc<str>> {
        match self.singleton_item("string operand expected a singleton,")? {
            None => Err(crate::error::Error::Type(
                "expected a string, got an empty collection".into(),
            )),
            Some(item) => match item.data() {
                ValueData::String(s) => Ok(s.clone()),
                ValueData::Node(node) => node
                    .data()
                    .and_then(|d| d.as_str())
                    .map(Arc::from)
                    .ok_or_else(|| {
                        crate::error::Error::Type(format!(
                            "expected a string, got {}",
                            item.type_name()
                        ))
                    }),
                _ => Err(crate::error::Error::Type(format!(
                    "expected a string, got {}",
                    item.type_name()
                ))),
            },
        }
    }

    /// Integer singleton coercion.
    pub fn as_integer(&self) -> crate::error::Result<i64> {
        match self.singleton_item("integer operand expected a singleton,")? {
            None => Err(crate::error::Error::Type(
                "expected an integer, got an empty collection".into(),
            )),
            Some(item) => match item.as_num() {
                Some(Num::Integer(i)) | Some(Num::Long(i)) => Ok(i),
                Some(Num::Decimal(d)) if d.scale() == 0 || d.normalize().scale() == 0 => d
                    .to_i64()
                    .ok_or_else(|| crate::error::Error::Type("integer out of range".into())),
                _ => Err(crate::error::Error::Type(format!(
                    "expected an integer, got {}",
                    item.type_name()
                ))),
            },
        }
    }
}

impl IntoIterator for Collection {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Value> for Collection {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_deep_equality_crosses_kinds() {
        let int = Value::integer(1);
        let dec = Value::decimal(Decimal::from_str("1.0").unwrap());
        assert!(int.deep_equal(&dec));

        let a = Value::decimal(Decimal::from_str("0.1000000001").unwrap());
        let b = Value::decimal(Decimal::from_str("0.1").unwrap());
        // Differs beyond the 1e-8 step
        assert!(!a.deep_equal(&b));

        let c = Value::decimal(Decimal::from_str("0.100000000001").unwrap());
        assert!(c.deep_equal(&b));
    }

    #[test]
    fn date_deep_equality_respects_precision() {
        let y = Value::date_with_precision(
            NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            DatePrecision::Year,
        );
        let ym = Value::date_with_precision(
            NaiveDate::from_ymd_opt(2012, 1, 1).unwrap(),
            DatePrecision::Month,
        );
        assert!(!y.deep_equal(&ym));
        assert!(y.deep_equal(&y.clone()));
    }

    #[test]
    fn quantity_deep_equality_normalizes_units() {
        let minutes = Value::quantity(Decimal::from(3), "min");
        let seconds = Value::quantity(Decimal::from(180), "s");
        assert!(minutes.deep_equal(&seconds));

        let mg = Value::quantity(Decimal::from(1), "mg");
        let g = Value::quantity(Decimal::from_str("0.001").unwrap(), "g");
        assert!(mg.deep_equal(&g));
        assert!(!mg.deep_equal(&seconds));
    }

    #[test]
    fn node_object_equality_ignores_key_order() {
        let a = Value::node(ResourceNode::detached(Arc::new(
            json!({"a": 1, "b": [1, 2]}),
        )));
        let b = Value::node(ResourceNode::detached(Arc::new(
            json!({"b": [1, 2], "a": 1}),
        )));
        assert!(a.deep_equal(&b));
    }

    #[test]
    fn node_string_equals_plain_string() {
        let node = Value::node(ResourceNode::detached(Arc::new(json!("Alice"))));
        let plain = Value::string("Alice");
        assert!(node.deep_equal(&plain));
    }

    #[test]
    fn boolean_singleton_coercion() {
        let empty = Collection::empty();
        assert_eq!(empty.as_boolean_singleton().unwrap(), None);

        let t = Collection::singleton(Value::boolean(true));
        assert_eq!(t.as_boolean_singleton().unwrap(), Some(true));

        // Non-boolean singleton evaluates as true
        let s = Collection::singleton(Value::string("x"));
        assert_eq!(s.as_boolean_singleton().unwrap(), Some(true));

        let two = Collection::from_values(vec![Value::boolean(true), Value::boolean(false)]);
        assert!(two.as_boolean_singleton().is_err());
    }

    #[test]
    fn calendar_unit_parsing() {
        assert_eq!(CalendarUnit::parse("year"), Some(CalendarUnit::Year));
        assert_eq!(CalendarUnit::parse("years"), Some(CalendarUnit::Year));
        assert_eq!(CalendarUnit::parse("mo"), None);
        assert!(CalendarUnit::Year.above_seconds());
        assert!(!CalendarUnit::Second.above_seconds());
    }

    #[test]
    fn datetime_formatting_keeps_offset() {
        use chrono::TimeZone;
        let dt = chrono::FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2012, 5, 2, 10, 30, 0)
            .unwrap()
            .with_timezone(&Utc);
        let s = format_datetime(&dt, DateTimePrecision::Minute, Some(3600));
        assert_eq!(s, "2012-05-02T10:30+01:00");
    }
}
