//! Slots: the typed, validated and defaulted fields of an entity class.
//!
//! A field is declared with a [`Field`], which is either a ready-made
//! [`AttSpec`] / [`ComposedSpec`], a bare [`ValueType`] (typed, no default),
//! a bare [`Value`] (type inferred from the default) or a list of
//! [`SlotPart`]s given in any order. When the owning class is declared the
//! field is bound to its name and becomes a [`Slot`].

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::construct::Class;
use crate::datatype::{Unit, Value, ValueType};
use crate::error::{HbdsError, Result};

/// Validation hook of a slot. Returning `Err` rejects the value with the given message.
pub type Constraint = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

// ------------- AttSpec -------------
/// Unbound description of an attribute slot.
#[derive(Clone, Default)]
pub struct AttSpec {
    value_type: Option<ValueType>,
    default: Option<Value>,
    mandatory: bool,
    doc: Option<String>,
    constraint: Option<Constraint>,
    unit: Option<Unit>,
}

impl AttSpec {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn of(value_type: ValueType) -> Self {
        Self::new().typed(value_type)
    }
    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_owned());
        self
    }
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
    /// Binds the description to a field name. The default goes through the
    /// same validation as any assigned value.
    pub(crate) fn bind(self, name: &str) -> Result<Att> {
        let mut att = Att {
            name: name.to_owned(),
            value_type: self.value_type,
            default: None,
            mandatory: self.mandatory,
            doc: self.doc,
            constraint: self.constraint,
            unit: self.unit,
        };
        att.default = att.validate(self.default)?;
        if att.value_type.is_none() {
            att.value_type = att.default.as_ref().map(ValueType::of);
        }
        Ok(att)
    }
}

// ------------- Att -------------
/// A bound attribute slot. Immutable once its class is declared.
#[derive(Clone)]
pub struct Att {
    name: String,
    value_type: Option<ValueType>,
    default: Option<Value>,
    mandatory: bool,
    doc: Option<String>,
    constraint: Option<Constraint>,
    unit: Option<Unit>,
}

impl Att {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
    pub fn mandatory(&self) -> bool {
        self.mandatory
    }
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }
    /// Coerces `value` to the declared type and runs the constraint.
    /// `None` always passes; rejecting it is [`Att::check`]'s job.
    pub fn validate(&self, value: Option<Value>) -> Result<Option<Value>> {
        let Some(mut value) = value else {
            return Ok(None);
        };
        if let Some(value_type) = self.value_type {
            if !value_type.is_instance(&value) {
                let actual = ValueType::of(&value);
                let shown = value.to_string();
                value = value_type.coerce(value).ok_or_else(|| HbdsError::TypeCoercion {
                    slot: self.name.clone(),
                    expected: value_type,
                    actual,
                    value: shown,
                })?;
            }
        }
        if let Some(constraint) = &self.constraint {
            constraint(&value).map_err(|message| HbdsError::Constraint {
                slot: self.name.clone(),
                message,
            })?;
        }
        Ok(Some(value))
    }
    /// Validation plus the mandatory check, as performed on every assignment.
    pub fn check(&self, value: Option<Value>) -> Result<Option<Value>> {
        let value = self.validate(value)?;
        if value.is_none() && self.mandatory {
            return Err(HbdsError::Mandatory { slot: self.name.clone() });
        }
        Ok(value)
    }
}
impl fmt::Debug for Att {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Att")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("default", &self.default)
            .field("mandatory", &self.mandatory)
            .field("unit", &self.unit)
            .finish()
    }
}
impl fmt::Display for Att {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value_type = self.value_type.map_or("None".to_owned(), |t| t.to_string());
        let default = self.default.as_ref().map_or("None".to_owned(), |v| v.to_string());
        write!(
            f,
            "<Att(type={}, default={}, mandatory={})> named {}",
            value_type, default, self.mandatory, self.name
        )
    }
}

// ------------- ComposedSpec -------------
/// Unbound description of a composed slot: an embedded value object made
/// of its own nested fields.
#[derive(Clone, Default)]
pub struct ComposedSpec {
    fields: Vec<(String, Field)>,
}

impl ComposedSpec {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn field(mut self, name: &str, field: impl Into<Field>) -> Self {
        self.fields.push((name.to_owned(), field.into()));
        self
    }
    pub(crate) fn into_fields(self) -> Vec<(String, Field)> {
        self.fields
    }
}

/// A bound composed slot. Reading it on an object lazily creates one
/// instance of the nested class; assigning it is always refused.
#[derive(Clone, Debug)]
pub struct ComposedAtt {
    name: String,
    class: Arc<Class>,
}

impl ComposedAtt {
    pub(crate) fn new(name: &str, class: Arc<Class>) -> Result<Self> {
        if let Some(att) = class
            .attributes()
            .into_iter()
            .find(|att| att.mandatory() && att.default().is_none())
        {
            return Err(HbdsError::ComposedMandatory {
                slot: name.to_owned(),
                field: att.name().to_owned(),
            });
        }
        Ok(Self { name: name.to_owned(), class })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }
}

// ------------- Slot -------------
#[derive(Clone, Debug)]
pub enum Slot {
    Att(Att),
    Composed(ComposedAtt),
}

impl Slot {
    pub fn name(&self) -> &str {
        match self {
            Slot::Att(att) => att.name(),
            Slot::Composed(composed) => composed.name(),
        }
    }
    pub fn as_att(&self) -> Option<&Att> {
        match self {
            Slot::Att(att) => Some(att),
            Slot::Composed(_) => None,
        }
    }
}

// ------------- Field -------------
/// One piece of a shorthand slot declaration. Pieces are told apart by
/// their variant, so they may come in any order; a later piece of the same
/// kind overrides an earlier one.
#[derive(Clone)]
pub enum SlotPart {
    Type(ValueType),
    Default(Value),
    Required,
    Unit(Unit),
    Declared(Box<Field>),
}

/// Raw declaration of a field, before it is bound to its name.
#[derive(Clone)]
pub enum Field {
    Att(AttSpec),
    Composed(ComposedSpec),
    Parts(Vec<SlotPart>),
}

pub(crate) enum ResolvedField {
    Att(AttSpec),
    Composed(ComposedSpec),
}

impl Field {
    pub(crate) fn resolve(self, name: &str) -> Result<ResolvedField> {
        match self {
            Field::Att(spec) => Ok(ResolvedField::Att(spec)),
            Field::Composed(spec) => Ok(ResolvedField::Composed(spec)),
            Field::Parts(parts) => resolve_parts(name, parts),
        }
    }
}

fn resolve_parts(name: &str, parts: Vec<SlotPart>) -> Result<ResolvedField> {
    let count = parts.len();
    if count > 4 {
        return Err(HbdsError::TooManySlotArguments { slot: name.to_owned(), count });
    }
    if parts.iter().any(|part| matches!(part, SlotPart::Declared(_))) {
        return match parts.into_iter().next() {
            Some(SlotPart::Declared(field)) if count == 1 => field.resolve(name),
            _ => Err(HbdsError::AmbiguousSlotRedeclaration { slot: name.to_owned(), count }),
        };
    }
    let mut spec = AttSpec::new();
    for part in parts {
        spec = match part {
            SlotPart::Type(value_type) => spec.typed(value_type),
            SlotPart::Default(value) => spec.default_value(value),
            SlotPart::Required => spec.mandatory(),
            SlotPart::Unit(unit) => spec.unit(unit),
            SlotPart::Declared(_) => spec,
        };
    }
    Ok(ResolvedField::Att(spec))
}

impl From<AttSpec> for Field {
    fn from(spec: AttSpec) -> Self { Field::Att(spec) }
}
impl From<ComposedSpec> for Field {
    fn from(spec: ComposedSpec) -> Self { Field::Composed(spec) }
}
impl From<Vec<SlotPart>> for Field {
    fn from(parts: Vec<SlotPart>) -> Self { Field::Parts(parts) }
}
impl From<ValueType> for Field {
    fn from(value_type: ValueType) -> Self { Field::Parts(vec![SlotPart::Type(value_type)]) }
}
impl From<Value> for Field {
    fn from(value: Value) -> Self { Field::Parts(vec![SlotPart::Default(value)]) }
}
impl From<bool> for Field {
    fn from(b: bool) -> Self { Value::from(b).into() }
}
impl From<i64> for Field {
    fn from(i: i64) -> Self { Value::from(i).into() }
}
impl From<f64> for Field {
    fn from(x: f64) -> Self { Value::from(x).into() }
}
impl From<&str> for Field {
    fn from(s: &str) -> Self { Value::from(s).into() }
}

// ------------- Constraints -------------
pub mod constraint {
    use super::*;

    /// Accepts numbers within `[min, max]`.
    pub fn range(min: f64, max: f64) -> Constraint {
        Arc::new(move |value: &Value| {
            let x = match value {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                other => return Err(format!("{} is not a number", other)),
            };
            if x < min || x > max {
                Err(format!("{} is not within [{}, {}]", x, min, max))
            } else {
                Ok(())
            }
        })
    }

    /// Accepts strings matching `pattern`, compiled once here.
    pub fn pattern(pattern: &str) -> Result<Constraint> {
        let regex = Regex::new(pattern).map_err(|e| HbdsError::InvalidName(e.to_string()))?;
        Ok(Arc::new(move |value: &Value| match value {
            Value::Str(s) if regex.is_match(s) => Ok(()),
            other => Err(format!("'{}' does not match /{}/", other, regex.as_str())),
        }))
    }

    /// Accepts only the listed values.
    pub fn one_of(allowed: Vec<Value>) -> Constraint {
        Arc::new(move |value: &Value| {
            if allowed.contains(value) {
                Ok(())
            } else {
                Err(format!("'{}' is not an allowed value", value))
            }
        })
    }
}
