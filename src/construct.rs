use std::sync::Arc;

// used to keep the one-to-one mapping between class names and their things
use bimap::BiMap;

// keepers use HashSet or HashMap
use core::hash::BuildHasherDefault;
use std::collections::{HashMap, HashSet};
use seahash::SeaHasher;

// class extents are sets of things
use roaring::RoaringTreemap;

// used to print out readable forms of a construct
use std::fmt;

// our own stuff that we need
use crate::datatype::Value;
use crate::error::{HbdsError, Result};
use crate::slot::{Att, Slot};

// ------------- Thing -------------
pub type Thing = u64;

pub type ThingHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: Thing = 0;

#[derive(Debug)]
pub struct ThingGenerator {
    lower_bound: Thing,
    retained: HashSet<Thing, ThingHasher>,
    released: Vec<Thing>,
}

impl ThingGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
            retained: HashSet::<Thing, ThingHasher>::default(),
            released: Vec::new(),
        }
    }
    // A thing is released when the declaration or construction it was
    // generated for fails, so that identities stay dense.
    pub fn release(&mut self, t: Thing) {
        if self.retained.remove(&t) {
            self.released.push(t);
        }
    }
    pub fn generate(&mut self) -> Thing {
        let thing = self.released.pop().unwrap_or_else(|| {
            self.lower_bound += 1;
            self.lower_bound
        });
        self.retained.insert(thing);
        thing
    }
    pub fn len(&self) -> usize {
        self.retained.len()
    }
}

// ------------- Cardinality -------------
/// Bounds of one end of a relation: `(min, max)` where a `max` of `None`
/// reads as "m", i.e. unbounded. Stored as metadata, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cardinality {
    pub min: u32,
    pub max: Option<u32>,
}

impl Cardinality {
    pub const MANY: Cardinality = Cardinality { min: 0, max: None };
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }
}
impl Default for Cardinality {
    fn default() -> Self {
        Self::MANY
    }
}
impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "({},{})", self.min, max),
            None => write!(f, "({},m)", self.min),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    init: Arc<Class>,
    fin: Arc<Class>,
    cardinalities: (Cardinality, Cardinality),
}

impl Endpoints {
    pub(crate) fn new(init: Arc<Class>, fin: Arc<Class>, cardinalities: (Cardinality, Cardinality)) -> Self {
        Self { init, fin, cardinalities }
    }
}

// ------------- Parameter -------------
#[derive(Debug, Clone, PartialEq)]
pub enum ParamDefault {
    Value(Value),
    Optional,
    Required,
}

/// One parameter of a class constructor, synthesized from a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    declared_by: String,
    default: ParamDefault,
}

impl Parameter {
    pub(crate) fn new(name: &str, declared_by: &str, default: ParamDefault) -> Self {
        Self {
            name: name.to_owned(),
            declared_by: declared_by.to_owned(),
            default,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Name of the class whose constructor owns this parameter.
    pub fn declared_by(&self) -> &str {
        &self.declared_by
    }
    pub fn default(&self) -> &ParamDefault {
        &self.default
    }
}
impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.default {
            ParamDefault::Value(v) => write!(f, "{}={}", self.name, v),
            ParamDefault::Optional => write!(f, "{}=None", self.name),
            ParamDefault::Required => write!(f, "{}", self.name),
        }
    }
}

// ------------- Role -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    Many,
    AtMostOne,
}

/// A navigation property: the fin objects reachable through a named relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDecl {
    name: String,
    relation: String,
    multiplicity: Multiplicity,
}

impl RoleDecl {
    pub(crate) fn new(name: &str, relation: &str, multiplicity: Multiplicity) -> Self {
        Self {
            name: name.to_owned(),
            relation: relation.to_owned(),
            multiplicity,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn relation(&self) -> &str {
        &self.relation
    }
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }
}

// ------------- Class -------------
/// An entity class, or a relation class when it has endpoints. A class is
/// also a thing, so it may be the endpoint of a relation and carry values
/// for the slots of its metaclass.
#[derive(Debug)]
pub struct Class {
    pub(crate) class: Thing,
    pub(crate) name: String,
    pub(crate) bases: Vec<Arc<Class>>,
    pub(crate) meta: Option<Arc<Class>>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) slot_names: Vec<String>,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) roles: Vec<RoleDecl>,
    pub(crate) endpoints: Option<Endpoints>,
    pub(crate) instantiable: bool,
}

impl Class {
    pub fn class(&self) -> Thing {
        self.class
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn bases(&self) -> &[Arc<Class>] {
        &self.bases
    }
    pub fn meta(&self) -> Option<&Arc<Class>> {
        self.meta.as_ref()
    }
    /// Slots declared by this class itself, in declaration order.
    pub fn own_slots(&self) -> &[Slot] {
        &self.slots
    }
    /// Public slot names, inherited ones first, in declaration order.
    pub fn slot_names(&self) -> &[String] {
        &self.slot_names
    }
    /// Signature of the synthesized constructor, endpoints excluded.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
    pub fn roles(&self) -> &[RoleDecl] {
        &self.roles
    }
    pub fn instantiable(&self) -> bool {
        self.instantiable
    }
    pub fn is_relation(&self) -> bool {
        self.endpoints.is_some()
    }
    pub fn init_class(&self) -> Option<&Arc<Class>> {
        self.endpoints.as_ref().map(|e| &e.init)
    }
    pub fn fin_class(&self) -> Option<&Arc<Class>> {
        self.endpoints.as_ref().map(|e| &e.fin)
    }
    pub fn cardinalities(&self) -> Option<(Cardinality, Cardinality)> {
        self.endpoints.as_ref().map(|e| e.cardinalities)
    }
    /// This class followed by its ancestors, most derived first, each once.
    pub fn ancestry(&self) -> Vec<&Class> {
        let mut seen = HashSet::<Thing, ThingHasher>::default();
        let mut order = Vec::new();
        self.collect_ancestry(&mut seen, &mut order);
        order
    }
    fn collect_ancestry<'c>(&'c self, seen: &mut HashSet<Thing, ThingHasher>, order: &mut Vec<&'c Class>) {
        if seen.insert(self.class) {
            order.push(self);
            for base in &self.bases {
                base.collect_ancestry(seen, order);
            }
        }
    }
    /// Nested classes of the composed slots this class declares itself.
    pub fn composed_classes(&self) -> impl Iterator<Item = &Arc<Class>> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Composed(composed) => Some(composed.class()),
            Slot::Att(_) => None,
        })
    }
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        self.ancestry().iter().any(|c| c.class == other.class)
    }
    /// The slot named `name`, from the most derived class declaring it.
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.ancestry()
            .into_iter()
            .find_map(|c| c.slots.iter().find(|s| s.name() == name))
    }
    /// Attribute slots in [`Class::slot_names`] order.
    pub fn attributes(&self) -> Vec<&Att> {
        self.slot_names
            .iter()
            .filter_map(|name| self.slot(name).and_then(Slot::as_att))
            .collect()
    }
    pub fn role(&self, name: &str) -> Option<&RoleDecl> {
        self.ancestry()
            .into_iter()
            .find_map(|c| c.roles.iter().find(|r| r.name == name))
    }
    /// Class-level read of a slot: the default of the most derived class
    /// redeclaring it.
    ///
    /// A composed slot reads as `None` here. No nested object exists until
    /// the slot is first read on an instance through
    /// [`crate::model::Model::get`]; the nested defaults are those of
    /// [`crate::slot::ComposedAtt::class`].
    pub fn default_of(&self, name: &str) -> Result<Option<Value>> {
        match self.slot(name) {
            Some(Slot::Att(att)) => Ok(att.default().cloned()),
            Some(Slot::Composed(_)) => Ok(None),
            None => Err(HbdsError::UndeclaredAttribute {
                target: self.name.clone(),
                attribute: name.to_owned(),
            }),
        }
    }
}
impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
    }
}
impl Eq for Class {}
impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.endpoints {
            Some(e) => write!(
                f,
                "{} {}{} -> {}{}",
                self.name, e.init.name, e.cardinalities.0, e.cardinalities.1, e.fin.name
            ),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug)]
pub struct ClassKeeper {
    kept: HashMap<Thing, Arc<Class>, ThingHasher>,
    names: BiMap<String, Thing>,
}
impl ClassKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
            names: BiMap::new(),
        }
    }
    pub(crate) fn keep(&mut self, class: Class) -> Result<Arc<Class>> {
        if self.names.contains_left(&class.name) {
            return Err(HbdsError::DuplicateClass(class.name));
        }
        let kept = Arc::new(class);
        self.names.insert(kept.name.clone(), kept.class);
        self.kept.insert(kept.class, Arc::clone(&kept));
        Ok(kept)
    }
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_left(name)
    }
    /// Removes a class kept during a declaration that later failed.
    pub(crate) fn forget(&mut self, class: &Thing) -> Option<Arc<Class>> {
        self.names.remove_by_right(class);
        self.kept.remove(class)
    }
    pub fn get(&self, class: &Thing) -> Option<Arc<Class>> {
        self.kept.get(class).cloned()
    }
    pub fn lookup(&self, name: &str) -> Option<Arc<Class>> {
        self.names.get_by_left(name).and_then(|thing| self.get(thing))
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Class>> {
        self.kept.values()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}

// ------------- Object -------------
/// An instance of a class. Relation objects additionally hold the two
/// endpoints they were created with, which never change afterwards.
#[derive(Debug)]
pub struct Object {
    thing: Thing,
    class: Arc<Class>,
    fields: HashMap<String, Option<Value>, OtherHasher>,
    private: HashMap<String, Value, OtherHasher>,
    composed: HashMap<String, Thing, OtherHasher>,
    endpoints: Option<(Thing, Thing)>,
}

impl Object {
    pub(crate) fn new(
        thing: Thing,
        class: Arc<Class>,
        fields: HashMap<String, Option<Value>, OtherHasher>,
        endpoints: Option<(Thing, Thing)>,
    ) -> Self {
        Self {
            thing,
            class,
            fields,
            private: HashMap::default(),
            composed: HashMap::default(),
            endpoints,
        }
    }
    pub fn thing(&self) -> Thing {
        self.thing
    }
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }
    /// Stored value of a field, `None` when it was never assigned.
    pub fn field(&self, name: &str) -> Option<&Option<Value>> {
        self.fields.get(name)
    }
    pub fn private(&self, name: &str) -> Option<&Value> {
        self.private.get(name)
    }
    pub fn composed(&self, name: &str) -> Option<Thing> {
        self.composed.get(name).copied()
    }
    pub fn endpoints(&self) -> Option<(Thing, Thing)> {
        self.endpoints
    }
    pub(crate) fn store(&mut self, name: &str, value: Option<Value>) {
        self.fields.insert(name.to_owned(), value);
    }
    pub(crate) fn store_private(&mut self, name: &str, value: Option<Value>) {
        match value {
            Some(v) => self.private.insert(name.to_owned(), v),
            None => self.private.remove(name),
        };
    }
    pub(crate) fn keep_composed(&mut self, name: &str, nested: Thing) -> Thing {
        *self.composed.entry(name.to_owned()).or_insert(nested)
    }
}

#[derive(Debug)]
pub struct ObjectKeeper {
    kept: HashMap<Thing, Object, ThingHasher>,
    extents: HashMap<Thing, RoaringTreemap, ThingHasher>,
}
impl ObjectKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
            extents: HashMap::default(),
        }
    }
    pub(crate) fn keep(&mut self, object: Object) -> Thing {
        let thing = object.thing;
        self.extents
            .entry(object.class.class)
            .or_insert_with(RoaringTreemap::new)
            .insert(thing);
        self.kept.insert(thing, object);
        thing
    }
    pub fn get(&self, thing: &Thing) -> Option<&Object> {
        self.kept.get(thing)
    }
    pub(crate) fn get_mut(&mut self, thing: &Thing) -> Option<&mut Object> {
        self.kept.get_mut(thing)
    }
    /// Things of the objects whose class is exactly `class`.
    pub fn extent(&self, class: &Thing) -> Option<&RoaringTreemap> {
        self.extents.get(class)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}

// ------------- TypeFieldTable -------------
/// Values a class holds for the slots of its metaclass, keyed by class.
#[derive(Debug)]
pub struct TypeFieldTable {
    values: HashMap<Thing, HashMap<String, Option<Value>, OtherHasher>, ThingHasher>,
}
impl TypeFieldTable {
    pub fn new() -> Self {
        Self { values: HashMap::default() }
    }
    pub fn get(&self, class: &Thing, name: &str) -> Option<&Option<Value>> {
        self.values.get(class).and_then(|fields| fields.get(name))
    }
    pub(crate) fn set(&mut self, class: Thing, name: &str, value: Option<Value>) {
        self.values.entry(class).or_default().insert(name.to_owned(), value);
    }
}

// ------------- Semi-cocircuits -------------
/// Whose semi-cocircuit is meant. `Class` is the shared list of relation
/// classes registered against a class; `Type` is the list of relation
/// objects for which a class object itself is an endpoint; `Instance` is
/// the list of relation objects of an ordinary object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Class(Thing),
    Type(Thing),
    Instance(Thing),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    /// The owner is the init end.
    Positive,
    /// The owner is the fin end.
    Negative,
}

#[derive(Debug)]
pub struct SemiCocircuits {
    positive: HashMap<Owner, Vec<Thing>, OtherHasher>,
    negative: HashMap<Owner, Vec<Thing>, OtherHasher>,
}
impl SemiCocircuits {
    pub fn new() -> Self {
        Self {
            positive: HashMap::default(),
            negative: HashMap::default(),
        }
    }
    fn side(&self, polarity: Polarity) -> &HashMap<Owner, Vec<Thing>, OtherHasher> {
        match polarity {
            Polarity::Positive => &self.positive,
            Polarity::Negative => &self.negative,
        }
    }
    fn side_mut(&mut self, polarity: Polarity) -> &mut HashMap<Owner, Vec<Thing>, OtherHasher> {
        match polarity {
            Polarity::Positive => &mut self.positive,
            Polarity::Negative => &mut self.negative,
        }
    }
    /// Insertion-ordered entries, duplicates preserved. Empty when the owner
    /// was never linked.
    pub fn read(&self, owner: Owner, polarity: Polarity) -> &[Thing] {
        self.side(polarity).get(&owner).map_or(&[], |v| v.as_slice())
    }
    fn position(&self, owner: Owner, polarity: Polarity, entry: Thing) -> Option<usize> {
        self.read(owner, polarity).iter().position(|t| *t == entry)
    }
    pub(crate) fn register(&mut self, init: Thing, fin: Thing, relation_class: Thing) {
        self.positive.entry(Owner::Class(init)).or_default().push(relation_class);
        self.negative.entry(Owner::Class(fin)).or_default().push(relation_class);
    }
    pub(crate) fn link(&mut self, init: Owner, fin: Owner, relation: Thing) {
        self.positive.entry(init).or_default().push(relation);
        self.negative.entry(fin).or_default().push(relation);
    }
    /// Removes the first matching entry from both lists, or touches neither
    /// and returns `false` when one of them is missing.
    pub(crate) fn unlink(&mut self, init: Owner, fin: Owner, relation: Thing) -> bool {
        let (Some(p), Some(n)) = (
            self.position(init, Polarity::Positive, relation),
            self.position(fin, Polarity::Negative, relation),
        ) else {
            return false;
        };
        for (owner, polarity, index) in [(init, Polarity::Positive, p), (fin, Polarity::Negative, n)] {
            if let Some(entries) = self.side_mut(polarity).get_mut(&owner) {
                entries.remove(index);
            }
        }
        true
    }
}
