// used for dates and timestamps held in slots
use chrono::{NaiveDate, NaiveDateTime};
// used for decimal numbers
use bigdecimal::{BigDecimal, ToPrimitive};

// used when parsing a string into a value
use std::str::FromStr;
// used to print out readable forms of a value
use std::fmt;
// used to expose the wrapped decimal
use std::ops;

use crate::construct::Thing;

// ------------- ValueType -------------
/// The declared type of a slot. Assigning a value of another type calls
/// [`ValueType::coerce`] first, the same way a type would be called on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Date,
    DateTime,
    Decimal,
    Json,
    Object,
}

impl ValueType {
    /// Runtime type of a value, used to infer a slot's type from its default.
    pub fn of(value: &Value) -> ValueType {
        match value {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Date(_) => ValueType::Date,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Decimal(_) => ValueType::Decimal,
            Value::Json(_) => ValueType::Json,
            Value::Object(_) => ValueType::Object,
        }
    }
    pub fn is_instance(&self, value: &Value) -> bool {
        ValueType::of(value) == *self
    }
    /// Converts `value` to this type, or returns `None` when no conversion exists.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if self.is_instance(&value) {
            return Some(value);
        }
        match (self, value) {
            (ValueType::Bool, v) => Some(Value::Bool(v.truthy())),
            (ValueType::Str, v) => Some(Value::Str(v.to_string())),
            (ValueType::Int, Value::Bool(b)) => Some(Value::Int(b as i64)),
            (ValueType::Int, Value::Float(f)) => {
                if f.is_finite() {
                    Some(Value::Int(f.trunc() as i64))
                } else {
                    None
                }
            }
            (ValueType::Int, Value::Str(s)) => s.trim().parse::<i64>().ok().map(Value::Int),
            (ValueType::Int, Value::Decimal(d)) => d.with_scale(0).to_i64().map(Value::Int),
            (ValueType::Float, Value::Bool(b)) => Some(Value::Float(if b { 1. } else { 0. })),
            (ValueType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (ValueType::Float, Value::Str(s)) => s.trim().parse::<f64>().ok().map(Value::Float),
            (ValueType::Float, Value::Decimal(d)) => d.to_f64().map(Value::Float),
            (ValueType::Date, Value::Str(s)) => NaiveDate::from_str(s.trim()).ok().map(Value::Date),
            (ValueType::DateTime, Value::Str(s)) => parse_datetime(s.trim()).map(Value::DateTime),
            (ValueType::DateTime, Value::Date(d)) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
            (ValueType::Decimal, Value::Int(i)) => Some(Value::Decimal(Decimal(BigDecimal::from(i)))),
            (ValueType::Decimal, Value::Float(f)) => Decimal::from_str(&f.to_string()).map(Value::Decimal),
            (ValueType::Decimal, Value::Str(s)) => Decimal::from_str(s.trim()).map(Value::Decimal),
            (ValueType::Json, Value::Str(s)) => serde_json::from_str(&s).ok().map(Value::Json),
            (ValueType::Json, v) => Some(Value::Json(v.to_json())),
            _ => None,
        }
    }
}
impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Float => "Float",
            ValueType::Str => "Str",
            ValueType::Date => "Date",
            ValueType::DateTime => "DateTime",
            ValueType::Decimal => "Decimal",
            ValueType::Json => "Json",
            ValueType::Object => "Object",
        };
        write!(f, "{}", name)
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::from_str(s)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

// ------------- Value -------------
/// A value held by a slot. An unset or cleared slot holds `None` rather
/// than a dedicated variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Decimal(Decimal),
    Json(serde_json::Value),
    Object(Thing),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.,
            Value::Str(s) => !s.is_empty(),
            Value::Decimal(d) => d.0 != BigDecimal::from(0),
            Value::Json(j) => !(j.is_null()
                || j == &serde_json::Value::Bool(false)
                || j.as_array().is_some_and(|a| a.is_empty())
                || j.as_object().is_some_and(|o| o.is_empty())),
            Value::Date(_) | Value::DateTime(_) | Value::Object(_) => true,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
    pub fn as_object(&self) -> Option<Thing> {
        match self {
            Value::Object(t) => Some(*t),
            _ => None,
        }
    }
    /// JSON-safe form: only temporal and decimal values need converting,
    /// everything else passes through.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(d) => Json::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Decimal(d) => Json::String(d.to_string()),
            Value::Json(j) => j.clone(),
            Value::Object(t) => Json::from(*t),
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(d) => write!(f, "{}", d),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Json(j) => write!(f, "{}", j),
            Value::Object(t) => write!(f, "#{}", t),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Int(i as i64) }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self { Value::Float(f) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Str(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Str(s) }
}
impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self { Value::Date(d) }
}
impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self { Value::DateTime(d) }
}
impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self { Value::Decimal(d) }
}
impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self { Value::Json(j) }
}

// Special types below
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal (BigDecimal);

impl Decimal {
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal (decimal)),
            _ => None
        }
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Physical unit tag carried by a slot. Purely descriptive.
#[derive(Eq, PartialEq, Hash, Clone, Debug)]
pub struct Unit (String);

impl Unit {
    pub fn new(symbol: &str) -> Self {
        Unit (symbol.to_owned())
    }
    pub fn symbol(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
