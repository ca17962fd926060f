//! Declaration of entity and relation classes.
//!
//! A [`SchemaBuilder`] collects the name, bases and ordered fields of a
//! class; [`crate::model::Model::declare_class`] turns it into a
//! [`Class`] whose constructor signature is synthesized from the inherited
//! slots of every base (in base order) followed by the class's own slots.
//! A [`RelationBuilder`] does the same for a relation class, which also
//! names its init and fin classes.

use std::fmt::Write;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::construct::{
    Cardinality, Class, Endpoints, Multiplicity, ParamDefault, Parameter, RoleDecl, Thing,
};
use crate::datatype::Value;
use crate::error::{HbdsError, Result};
use crate::slot::{ComposedAtt, Field, ResolvedField, Slot};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
}

fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(HbdsError::InvalidName(name.to_owned()))
    }
}

/// Declares the nested class of a composed slot, given its name and fields.
pub(crate) type NestedDeclarer<'a> = dyn FnMut(String, Vec<(String, Field)>) -> Result<Arc<Class>> + 'a;

// ------------- SchemaBuilder -------------
pub struct SchemaBuilder {
    name: String,
    bases: Vec<Arc<Class>>,
    meta: Option<Arc<Class>>,
    fields: Vec<(String, Field)>,
    roles: Vec<RoleDecl>,
    instantiable: bool,
    nested: bool,
}

impl SchemaBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            bases: Vec::new(),
            meta: None,
            fields: Vec::new(),
            roles: Vec::new(),
            instantiable: true,
            nested: false,
        }
    }
    pub(crate) fn nested(name: &str, fields: Vec<(String, Field)>) -> Self {
        let mut builder = Self::new(name);
        builder.fields = fields;
        builder.nested = true;
        builder
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn base(mut self, base: &Arc<Class>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }
    /// The class whose slots this class carries as a data-bearing object.
    pub fn metaclass(mut self, meta: &Arc<Class>) -> Self {
        self.meta = Some(Arc::clone(meta));
        self
    }
    /// Declares a field. Redeclaring a name replaces the earlier field but
    /// keeps its position.
    pub fn field(mut self, name: &str, field: impl Into<Field>) -> Self {
        let field = field.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = field,
            None => self.fields.push((name.to_owned(), field)),
        }
        self
    }
    /// Navigation to every fin object linked through `relation`.
    pub fn role(mut self, name: &str, relation: &str) -> Self {
        self.roles.push(RoleDecl::new(name, relation, Multiplicity::Many));
        self
    }
    /// Navigation to the single fin object linked through `relation`, if any.
    pub fn role01(mut self, name: &str, relation: &str) -> Self {
        self.roles.push(RoleDecl::new(name, relation, Multiplicity::AtMostOne));
        self
    }
    /// Forbids creating instances; the class can still be a base or an endpoint.
    pub fn abstract_class(mut self) -> Self {
        self.instantiable = false;
        self
    }

    pub(crate) fn assemble(self, class: Thing, declare_nested: &mut NestedDeclarer<'_>) -> Result<Class> {
        if !self.nested {
            check_identifier(&self.name)?;
        }
        let mut slots = Vec::with_capacity(self.fields.len());
        for (name, field) in self.fields {
            check_identifier(&name)?;
            let slot = match field.resolve(&name)? {
                ResolvedField::Att(spec) => Slot::Att(spec.bind(&name)?),
                ResolvedField::Composed(spec) => {
                    let nested = declare_nested(format!("{}.{}", self.name, name), spec.into_fields())?;
                    Slot::Composed(ComposedAtt::new(&name, nested)?)
                }
            };
            slots.push(slot);
        }
        for role in &self.roles {
            check_identifier(role.name())?;
            if slots.iter().any(|s| s.name() == role.name()) {
                return Err(HbdsError::InvalidName(format!("{} (role shadows a slot)", role.name())));
            }
        }

        let mut slot_names: Vec<String> = Vec::new();
        let inherited = self.bases.iter().flat_map(|b| b.slot_names().iter().cloned());
        for name in inherited.chain(slots.iter().map(|s| s.name().to_owned())) {
            if !slot_names.contains(&name) {
                slot_names.push(name);
            }
        }
        let parameters = synthesize(&self.name, &self.bases, &slots)?;

        Ok(Class {
            class,
            name: self.name,
            bases: self.bases,
            meta: self.meta,
            slots,
            slot_names,
            parameters,
            roles: self.roles,
            endpoints: None,
            instantiable: self.instantiable,
        })
    }
}

// Parameters come from each base in base order, a parameter already
// brought by an earlier base counted once, then from the class's own
// attribute slots. An own slot that repeats an inherited name would make
// the constructor ambiguous.
fn synthesize(class: &str, bases: &[Arc<Class>], slots: &[Slot]) -> Result<Vec<Parameter>> {
    let mut parameters: Vec<Parameter> = Vec::new();
    for parameter in bases.iter().flat_map(|b| b.parameters().iter()) {
        if !parameters.iter().any(|p| p.name() == parameter.name()) {
            parameters.push(parameter.clone());
        }
    }
    for att in slots.iter().filter_map(Slot::as_att) {
        let default = match (att.default(), att.mandatory()) {
            (Some(value), _) => ParamDefault::Value(value.clone()),
            (None, true) => ParamDefault::Required,
            (None, false) => ParamDefault::Optional,
        };
        let parameter = Parameter::new(att.name(), class, default);
        if parameters.iter().any(|p| p.name() == parameter.name()) {
            return Err(code_generation_error(class, &parameters, &parameter));
        }
        parameters.push(parameter);
    }
    Ok(parameters)
}

fn code_generation_error(class: &str, accepted: &[Parameter], offending: &Parameter) -> HbdsError {
    let mut listing = String::new();
    let _ = writeln!(listing, "{:2}: {}(", 1, class);
    for (n, parameter) in accepted.iter().chain(std::iter::once(offending)).enumerate() {
        let _ = writeln!(listing, "{:2}:     {},", n + 2, parameter);
    }
    let _ = writeln!(listing, "{}^", " ".repeat(8));
    HbdsError::CodeGeneration {
        class: class.to_owned(),
        message: format!(
            "duplicate argument '{}' line {} in synthesized constructor",
            offending.name(),
            accepted.len() + 2
        ),
        listing,
    }
}

// ------------- RelationBuilder -------------
pub struct RelationBuilder {
    schema: SchemaBuilder,
    init: Option<Arc<Class>>,
    fin: Option<Arc<Class>>,
    cardinalities: (Cardinality, Cardinality),
}

impl RelationBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            schema: SchemaBuilder::new(name),
            init: None,
            fin: None,
            cardinalities: (Cardinality::MANY, Cardinality::MANY),
        }
    }
    pub fn name(&self) -> &str {
        self.schema.name()
    }
    pub fn init(mut self, class: &Arc<Class>) -> Self {
        self.init = Some(Arc::clone(class));
        self
    }
    pub fn fin(mut self, class: &Arc<Class>) -> Self {
        self.fin = Some(Arc::clone(class));
        self
    }
    pub fn between(self, init: &Arc<Class>, fin: &Arc<Class>) -> Self {
        self.init(init).fin(fin)
    }
    pub fn cardinalities(mut self, init: Cardinality, fin: Cardinality) -> Self {
        self.cardinalities = (init, fin);
        self
    }
    pub fn base(mut self, base: &Arc<Class>) -> Self {
        self.schema = self.schema.base(base);
        self
    }
    pub fn field(mut self, name: &str, field: impl Into<Field>) -> Self {
        self.schema = self.schema.field(name, field);
        self
    }
    pub fn abstract_class(mut self) -> Self {
        self.schema = self.schema.abstract_class();
        self
    }

    /// Endpoint classes, checked before anything is generated.
    pub(crate) fn endpoints(&self) -> Result<(Arc<Class>, Arc<Class>)> {
        let missing = |endpoint| HbdsError::MissingEndpoint {
            relation: self.schema.name.clone(),
            endpoint,
        };
        let init = self.init.clone().ok_or_else(|| missing("init_class"))?;
        let fin = self.fin.clone().ok_or_else(|| missing("fin_class"))?;
        Ok((init, fin))
    }

    pub(crate) fn assemble(self, class: Thing, declare_nested: &mut NestedDeclarer<'_>) -> Result<Class> {
        let (init, fin) = self.endpoints()?;
        let mut relation = self.schema.assemble(class, declare_nested)?;
        relation.endpoints = Some(Endpoints::new(init, fin, self.cardinalities));
        Ok(relation)
    }
}

// ------------- Arguments -------------
/// Arguments of a constructor call, given by position, by name, or both.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    positional: Vec<Option<Value>>,
    named: Vec<(String, Option<Value>)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(Some(value.into()));
        self
    }
    pub fn none(mut self) -> Self {
        self.positional.push(None);
        self
    }
    pub fn named(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.named.push((name.to_owned(), Some(value.into())));
        self
    }
    pub fn named_none(mut self, name: &str) -> Self {
        self.named.push((name.to_owned(), None));
        self
    }

    /// Matches the arguments against `class`'s parameters, filling in defaults.
    pub(crate) fn bind(self, class: &Class) -> Result<Vec<(String, Option<Value>)>> {
        let parameters = class.parameters();
        let unexpected = |message: String| HbdsError::UnexpectedArgument {
            class: class.name().to_owned(),
            message,
        };
        if self.positional.len() > parameters.len() {
            return Err(unexpected(format!(
                "takes {} arguments but {} were given",
                parameters.len(),
                self.positional.len()
            )));
        }
        if let Some((name, _)) = self
            .named
            .iter()
            .find(|(name, _)| !parameters.iter().any(|p| p.name() == name))
        {
            return Err(unexpected(format!("'{}'", name)));
        }
        let mut positional = self.positional.into_iter();
        let mut named = self.named;
        let mut bound = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let by_position = positional.next();
            let by_name = named
                .iter()
                .position(|(name, _)| name == parameter.name())
                .map(|i| named.remove(i).1);
            let value = match (by_position, by_name) {
                (Some(_), Some(_)) => {
                    return Err(unexpected(format!("multiple values for '{}'", parameter.name())));
                }
                (Some(value), None) | (None, Some(value)) => value,
                (None, None) => match parameter.default() {
                    ParamDefault::Value(value) => Some(value.clone()),
                    ParamDefault::Optional => None,
                    ParamDefault::Required => {
                        return Err(HbdsError::MissingArgument {
                            class: class.name().to_owned(),
                            parameter: parameter.name().to_owned(),
                        });
                    }
                },
            };
            bound.push((parameter.name().to_owned(), value));
        }
        if let Some((name, _)) = named.first() {
            return Err(unexpected(format!("multiple values for '{}'", name)));
        }
        Ok(bound)
    }
}
