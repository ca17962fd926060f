//! The model: owner of every declared class, every object and the indexes
//! linking them.
//!
//! Classes are declared from a [`SchemaBuilder`] or a [`RelationBuilder`],
//! objects are created through the synthesized constructor of their class,
//! and every read and write of an attribute goes through the model so that
//! undeclared names are refused and observing caches are notified.
//!
//! ```
//! use hbds::datatype::{Value, ValueType};
//! use hbds::model::Model;
//! use hbds::schema::{Arguments, RelationBuilder, SchemaBuilder};
//! use hbds::slot::{AttSpec, SlotPart};
//!
//! let model = Model::new();
//! let person = model
//!     .declare_class(
//!         SchemaBuilder::new("Person")
//!             .field("name", vec![SlotPart::Type(ValueType::Str), SlotPart::Required])
//!             .field("age", 0i64)
//!             .role("cars", "Owns"),
//!     )
//!     .unwrap();
//! let car = model
//!     .declare_class(SchemaBuilder::new("Car").field("plate", AttSpec::of(ValueType::Str)))
//!     .unwrap();
//! let owns = model
//!     .declare_relation(RelationBuilder::new("Owns").between(&person, &car))
//!     .unwrap();
//!
//! let ann = model.create(&person, Arguments::new().arg("Ann")).unwrap();
//! let xyz = model.create(&car, Arguments::new().arg("XYZ")).unwrap();
//! model.relate(&owns, ann, xyz, Arguments::new()).unwrap();
//!
//! assert_eq!(model.get(ann, "age").unwrap(), Some(Value::Int(0)));
//! assert_eq!(model.role(ann, "cars").unwrap(), vec![xyz]);
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use roaring::RoaringTreemap;
use tracing::{debug, trace};

use crate::cache::{Cache, MutationBroker, Observer, SharedObserver};
use crate::config::ModelConfig;
use crate::construct::{
    Class, ClassKeeper, Object, ObjectKeeper, OtherHasher, Owner, Polarity,
    SemiCocircuits, Thing, ThingGenerator, TypeFieldTable, GENESIS,
};
use crate::datatype::Value;
use crate::error::{lock, HbdsError, Result};
use crate::schema::{Arguments, NestedDeclarer, RelationBuilder, SchemaBuilder};
use crate::slot::{Att, Field, Slot};

// What a thing turns out to be: an object of a class, or a class used as
// an object in its own right.
enum Resolved {
    Instance(Arc<Class>),
    Type(Arc<Class>),
}

pub struct Model {
    config: ModelConfig,
    // owns a thing generator shared by classes and objects
    thing_generator: Arc<Mutex<ThingGenerator>>,
    // owns keepers for the available constructs
    class_keeper: Arc<Mutex<ClassKeeper>>,
    object_keeper: Arc<Mutex<ObjectKeeper>>,
    type_fields: Arc<Mutex<TypeFieldTable>>,
    // the relation indexes, at class, type and instance level
    semi_cocircuits: Arc<Mutex<SemiCocircuits>>,
    // live caches and the types they instrument
    broker: Arc<Mutex<MutationBroker>>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }
    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            config,
            thing_generator: Arc::new(Mutex::new(ThingGenerator::new())),
            class_keeper: Arc::new(Mutex::new(ClassKeeper::new())),
            object_keeper: Arc::new(Mutex::new(ObjectKeeper::new())),
            type_fields: Arc::new(Mutex::new(TypeFieldTable::new())),
            semi_cocircuits: Arc::new(Mutex::new(SemiCocircuits::new())),
            broker: Arc::new(Mutex::new(MutationBroker::new())),
        }
    }
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_config(ModelConfig::from_file(path)?))
    }
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    // ------------- declarations -------------
    pub fn declare_class(&self, schema: SchemaBuilder) -> Result<Arc<Class>> {
        if lock(&self.class_keeper)?.contains_name(schema.name()) {
            return Err(HbdsError::DuplicateClass(schema.name().to_owned()));
        }
        let thing = lock(&self.thing_generator)?.generate();
        let class = self.keep_class(thing, |declare_nested| schema.assemble(thing, declare_nested))?;
        debug!(class = %class, thing, parameters = class.parameters().len(), "class declared");
        Ok(class)
    }

    /// Declares a relation class and registers it against its endpoint
    /// classes.
    pub fn declare_relation(&self, relation: RelationBuilder) -> Result<Arc<Class>> {
        if lock(&self.class_keeper)?.contains_name(relation.name()) {
            return Err(HbdsError::DuplicateClass(relation.name().to_owned()));
        }
        // checked before a thing is spent on it
        let (init, fin) = relation.endpoints()?;
        let thing = lock(&self.thing_generator)?.generate();
        let class = self.keep_class(thing, |declare_nested| relation.assemble(thing, declare_nested))?;
        lock(&self.semi_cocircuits)?.register(init.class(), fin.class(), class.class());
        debug!(relation = %class, thing, "relation declared");
        Ok(class)
    }

    /// A relation without fields of its own and with unbounded cardinalities.
    pub fn create_relation(&self, init: &Arc<Class>, name: &str, fin: &Arc<Class>) -> Result<Arc<Class>> {
        self.declare_relation(RelationBuilder::new(name).between(init, fin))
    }

    // Assembles and keeps the class behind `thing`. On failure the thing is
    // released and every nested class declared for it is forgotten again.
    fn keep_class(
        &self,
        thing: Thing,
        assemble: impl FnOnce(&mut NestedDeclarer<'_>) -> Result<Class>,
    ) -> Result<Arc<Class>> {
        let mut nested_kept: Vec<Arc<Class>> = Vec::new();
        let assembled = {
            let mut declare_nested = |name: String, fields: Vec<(String, Field)>| -> Result<Arc<Class>> {
                let nested = self.declare_class(SchemaBuilder::nested(&name, fields))?;
                nested_kept.push(Arc::clone(&nested));
                Ok(nested)
            };
            assemble(&mut declare_nested)
        };
        let kept = match assembled {
            Ok(class) => lock(&self.class_keeper)?.keep(class),
            Err(e) => Err(e),
        };
        if kept.is_err() {
            for nested in &nested_kept {
                self.forget_class(nested)?;
            }
            lock(&self.thing_generator)?.release(thing);
        }
        kept
    }

    fn forget_class(&self, class: &Arc<Class>) -> Result<()> {
        for nested in class.composed_classes() {
            self.forget_class(nested)?;
        }
        lock(&self.class_keeper)?.forget(&class.class());
        lock(&self.thing_generator)?.release(class.class());
        debug!(class = %class, "nested class forgotten");
        Ok(())
    }

    pub fn class(&self, name: &str) -> Result<Arc<Class>> {
        lock(&self.class_keeper)?
            .lookup(name)
            .ok_or_else(|| HbdsError::UnknownClass(name.to_owned()))
    }
    pub fn class_of(&self, thing: Thing) -> Result<Arc<Class>> {
        match self.resolve(thing)? {
            Resolved::Instance(class) | Resolved::Type(class) => Ok(class),
        }
    }

    fn resolve(&self, thing: Thing) -> Result<Resolved> {
        let class = lock(&self.object_keeper)?.get(&thing).map(|o| Arc::clone(o.class()));
        if let Some(class) = class {
            return Ok(Resolved::Instance(class));
        }
        lock(&self.class_keeper)?
            .get(&thing)
            .map(Resolved::Type)
            .ok_or(HbdsError::UnknownThing(thing))
    }
    /// Owner under which `thing`'s relation objects are indexed.
    pub fn owner(&self, thing: Thing) -> Result<Owner> {
        Ok(match self.resolve(thing)? {
            Resolved::Instance(_) => Owner::Instance(thing),
            Resolved::Type(_) => Owner::Type(thing),
        })
    }
    // The type whose assignments are instrumented when `thing` is observed:
    // the class of an object, the metaclass of a class.
    pub(crate) fn type_key(&self, thing: Thing) -> Result<Thing> {
        Ok(match self.resolve(thing)? {
            Resolved::Instance(class) => class.class(),
            Resolved::Type(class) => class.meta().map_or(GENESIS, |meta| meta.class()),
        })
    }
    fn object_view<R>(&self, thing: Thing, view: impl FnOnce(&Object) -> R) -> Result<R> {
        lock(&self.object_keeper)?
            .get(&thing)
            .map(view)
            .ok_or(HbdsError::UnknownThing(thing))
    }

    // ------------- objects -------------
    fn bind_fields(&self, class: &Class, arguments: Arguments) -> Result<HashMap<String, Option<Value>, OtherHasher>> {
        let mut fields = HashMap::<String, Option<Value>, OtherHasher>::default();
        for (name, value) in arguments.bind(class)? {
            let att = class.slot(&name).and_then(Slot::as_att).ok_or_else(|| {
                HbdsError::UndeclaredAttribute { target: class.name().to_owned(), attribute: name.clone() }
            })?;
            let value = att.check(value)?;
            fields.insert(name, value);
        }
        Ok(fields)
    }

    /// Calls the synthesized constructor of an entity class.
    pub fn create(&self, class: &Arc<Class>, arguments: Arguments) -> Result<Thing> {
        if class.is_relation() {
            return Err(HbdsError::UnexpectedArgument {
                class: class.name().to_owned(),
                message: "relation objects need their endpoints, use relate".to_owned(),
            });
        }
        if !class.instantiable() {
            return Err(HbdsError::InstantiationForbidden(class.name().to_owned()));
        }
        let fields = self.bind_fields(class, arguments)?;
        let thing = lock(&self.thing_generator)?.generate();
        lock(&self.object_keeper)?.keep(Object::new(thing, Arc::clone(class), fields, None));
        trace!(class = class.name(), thing, "object created");
        Ok(thing)
    }

    // Owner of an endpoint, after checking it against the declared class.
    fn endpoint(&self, relation: &Class, endpoint: &'static str, thing: Thing, expected: Option<&Arc<Class>>) -> Result<Owner> {
        let (owner, actual) = match self.resolve(thing)? {
            Resolved::Instance(class) => (Owner::Instance(thing), Some(class)),
            Resolved::Type(class) => (Owner::Type(thing), class.meta().cloned()),
        };
        if let Some(expected) = expected.filter(|_| self.config.check_endpoint_classes) {
            if !actual.as_ref().is_some_and(|class| class.is_subclass_of(expected)) {
                return Err(HbdsError::EndpointMismatch {
                    relation: relation.name().to_owned(),
                    endpoint,
                    expected: expected.name().to_owned(),
                    actual: actual.map_or_else(|| "class without metaclass".to_owned(), |c| c.name().to_owned()),
                });
            }
        }
        Ok(owner)
    }

    /// Creates a relation object between `init` and `fin` and links it into
    /// both of their indexes in one step.
    pub fn relate(&self, relation: &Arc<Class>, init: Thing, fin: Thing, arguments: Arguments) -> Result<Thing> {
        if !relation.is_relation() {
            return Err(HbdsError::NotARelation(relation.name().to_owned()));
        }
        if !relation.instantiable() {
            return Err(HbdsError::InstantiationForbidden(relation.name().to_owned()));
        }
        let init_owner = self.endpoint(relation, "init_object", init, relation.init_class())?;
        let fin_owner = self.endpoint(relation, "fin_object", fin, relation.fin_class())?;
        let fields = self.bind_fields(relation, arguments)?;
        let thing = lock(&self.thing_generator)?.generate();
        {
            let mut objects = lock(&self.object_keeper)?;
            let mut semi_cocircuits = lock(&self.semi_cocircuits)?;
            objects.keep(Object::new(thing, Arc::clone(relation), fields, Some((init, fin))));
            semi_cocircuits.link(init_owner, fin_owner, thing);
        }
        debug!(relation = relation.name(), thing, init, fin, "linked");
        let observers = lock(&self.broker)?.targets(&[init, fin]);
        for observer in &observers {
            lock(observer)?.link(relation, init, fin);
        }
        Ok(thing)
    }

    /// Unlinks a relation object from its endpoints. The object keeps its
    /// endpoints and fields; cutting it again fails.
    pub fn cut(&self, relation_object: Thing) -> Result<()> {
        let (relation, init, fin) = self.relation_endpoints(relation_object)?;
        let (init_owner, fin_owner) = (self.owner(init)?, self.owner(fin)?);
        if !lock(&self.semi_cocircuits)?.unlink(init_owner, fin_owner, relation_object) {
            return Err(HbdsError::NotLinked { relation: relation_object });
        }
        debug!(relation = relation.name(), thing = relation_object, init, fin, "cut");
        let observers = lock(&self.broker)?.targets(&[init, fin]);
        for observer in &observers {
            lock(observer)?.unlink(&relation, init, fin);
        }
        Ok(())
    }

    fn relation_endpoints(&self, thing: Thing) -> Result<(Arc<Class>, Thing, Thing)> {
        let (class, endpoints) = self.object_view(thing, |o| (Arc::clone(o.class()), o.endpoints()))?;
        match endpoints {
            Some((init, fin)) => Ok((class, init, fin)),
            None => Err(HbdsError::NotARelation(class.name().to_owned())),
        }
    }
    pub fn init_object(&self, relation_object: Thing) -> Result<Thing> {
        Ok(self.relation_endpoints(relation_object)?.1)
    }
    pub fn fin_object(&self, relation_object: Thing) -> Result<Thing> {
        Ok(self.relation_endpoints(relation_object)?.2)
    }

    // ------------- attribute access -------------
    /// Reads a public slot or an underscore-prefixed private name. An unset
    /// attribute reads as its slot default; a composed slot reads as its
    /// nested object, created on first read.
    pub fn get(&self, thing: Thing, name: &str) -> Result<Option<Value>> {
        let class = match self.resolve(thing)? {
            Resolved::Type(class) => return self.get_type_field(&class, name),
            Resolved::Instance(class) => class,
        };
        if name.starts_with('_') {
            return self.object_view(thing, |o| o.private(name).cloned());
        }
        match class.slot(name) {
            Some(Slot::Att(att)) => {
                let stored = self.object_view(thing, |o| o.field(name).cloned())?;
                Ok(stored.unwrap_or_else(|| att.default().cloned()))
            }
            Some(Slot::Composed(_)) => Ok(Some(Value::Object(self.nested(thing, name)?))),
            None => Err(HbdsError::UndeclaredAttribute {
                target: class.name().to_owned(),
                attribute: name.to_owned(),
            }),
        }
    }

    /// The nested object behind a composed slot.
    pub fn nested(&self, thing: Thing, name: &str) -> Result<Thing> {
        let class = self.class_of(thing)?;
        let Some(Slot::Composed(composed)) = class.slot(name) else {
            return Err(HbdsError::UndeclaredAttribute {
                target: class.name().to_owned(),
                attribute: name.to_owned(),
            });
        };
        if let Some(existing) = self.object_view(thing, |o| o.composed(name))? {
            return Ok(existing);
        }
        let created = self.create(composed.class(), Arguments::new())?;
        lock(&self.object_keeper)?
            .get_mut(&thing)
            .map(|o| o.keep_composed(name, created))
            .ok_or(HbdsError::UnknownThing(thing))
    }

    pub fn set(&self, thing: Thing, name: &str, value: impl Into<Value>) -> Result<()> {
        self.assign(thing, name, Some(value.into()))
    }
    /// Assigns `None`, which a mandatory slot refuses.
    pub fn set_none(&self, thing: Thing, name: &str) -> Result<()> {
        self.assign(thing, name, None)
    }

    fn assign(&self, thing: Thing, name: &str, value: Option<Value>) -> Result<()> {
        let class = match self.resolve(thing)? {
            Resolved::Type(class) => return self.set_type_field(&class, name, value),
            Resolved::Instance(class) => class,
        };
        if name.starts_with('_') {
            return lock(&self.object_keeper)?
                .get_mut(&thing)
                .map(|o| o.store_private(name, value))
                .ok_or(HbdsError::UnknownThing(thing));
        }
        let att = guarded_att(&class, class.slot(name), name)?;
        let value = att.check(value)?;
        let observers = self.observers(class.class(), thing)?;
        if !observers.is_empty() {
            let old = self.get(thing, name)?;
            for observer in &observers {
                lock(observer)?.before_setattr(thing, name, old.as_ref());
            }
        }
        lock(&self.object_keeper)?
            .get_mut(&thing)
            .map(|o| o.store(name, value.clone()))
            .ok_or(HbdsError::UnknownThing(thing))?;
        trace!(thing, attribute = name, observers = observers.len(), "assigned");
        for observer in &observers {
            lock(observer)?.after_setattr(thing, name, value.as_ref());
        }
        Ok(())
    }

    // Observers to notify of an assignment, none unless the type is
    // instrumented by some live cache.
    fn observers(&self, type_key: Thing, thing: Thing) -> Result<Vec<SharedObserver>> {
        let broker = lock(&self.broker)?;
        if broker.is_instrumented(type_key) {
            Ok(broker.targets(&[thing]))
        } else {
            Ok(Vec::new())
        }
    }

    /// Value a class holds for a slot of its metaclass, or that slot's default.
    pub fn get_type_field(&self, class: &Class, name: &str) -> Result<Option<Value>> {
        let stored = lock(&self.type_fields)?.get(&class.class(), name).cloned();
        if name.starts_with('_') {
            return Ok(stored.flatten());
        }
        let meta = class.meta().ok_or_else(|| HbdsError::UndeclaredAttribute {
            target: class.name().to_owned(),
            attribute: name.to_owned(),
        })?;
        match meta.slot(name) {
            Some(Slot::Att(att)) => Ok(stored.unwrap_or_else(|| att.default().cloned())),
            _ => Err(HbdsError::UndeclaredAttribute {
                target: class.name().to_owned(),
                attribute: name.to_owned(),
            }),
        }
    }

    pub fn set_type_field(&self, class: &Class, name: &str, value: Option<Value>) -> Result<()> {
        if name.starts_with('_') {
            lock(&self.type_fields)?.set(class.class(), name, value);
            return Ok(());
        }
        let Some(meta) = class.meta() else {
            return Err(HbdsError::UndeclaredAttribute {
                target: class.name().to_owned(),
                attribute: name.to_owned(),
            });
        };
        let att = guarded_att(class, meta.slot(name), name)?;
        let value = att.check(value)?;
        let observers = self.observers(meta.class(), class.class())?;
        if !observers.is_empty() {
            let old = self.get_type_field(class, name)?;
            for observer in &observers {
                lock(observer)?.before_setattr(class.class(), name, old.as_ref());
            }
        }
        lock(&self.type_fields)?.set(class.class(), name, value.clone());
        trace!(class = class.name(), attribute = name, "type field assigned");
        for observer in &observers {
            lock(observer)?.after_setattr(class.class(), name, value.as_ref());
        }
        Ok(())
    }

    // ------------- navigation -------------
    pub fn semi_cocircuit(&self, owner: Owner, polarity: Polarity) -> Result<Vec<Thing>> {
        Ok(lock(&self.semi_cocircuits)?.read(owner, polarity).to_vec())
    }

    /// Relation objects `thing` is the init end of, optionally only those
    /// of `relation` or its subclasses.
    pub fn positive(&self, thing: Thing, relation: Option<&Arc<Class>>) -> Result<Vec<Thing>> {
        self.linked(thing, Polarity::Positive, relation)
    }
    /// Relation objects `thing` is the fin end of.
    pub fn negative(&self, thing: Thing, relation: Option<&Arc<Class>>) -> Result<Vec<Thing>> {
        self.linked(thing, Polarity::Negative, relation)
    }

    fn linked(&self, thing: Thing, polarity: Polarity, relation: Option<&Arc<Class>>) -> Result<Vec<Thing>> {
        let entries = self.semi_cocircuit(self.owner(thing)?, polarity)?;
        let Some(relation) = relation else {
            return Ok(entries);
        };
        let objects = lock(&self.object_keeper)?;
        Ok(entries
            .into_iter()
            .filter(|entry| objects.get(entry).is_some_and(|o| o.class().is_subclass_of(relation)))
            .collect())
    }

    /// Relation classes whose init class is `class` or one of its ancestors.
    pub fn relation_classes_from(&self, class: &Class) -> Result<Vec<Arc<Class>>> {
        self.registered(class, Polarity::Positive)
    }
    /// Relation classes whose fin class is `class` or one of its ancestors.
    pub fn relation_classes_to(&self, class: &Class) -> Result<Vec<Arc<Class>>> {
        self.registered(class, Polarity::Negative)
    }

    fn registered(&self, class: &Class, polarity: Polarity) -> Result<Vec<Arc<Class>>> {
        let registered: Vec<Thing> = {
            let semi_cocircuits = lock(&self.semi_cocircuits)?;
            class
                .ancestry()
                .iter()
                .flat_map(|c| semi_cocircuits.read(Owner::Class(c.class()), polarity).to_vec())
                .collect()
        };
        let classes = lock(&self.class_keeper)?;
        Ok(registered.iter().filter_map(|thing| classes.get(thing)).collect())
    }

    /// Fin objects of the relation objects of `thing` whose relation class
    /// is registered from its class under `relation_name`.
    pub fn navigate(&self, thing: Thing, relation_name: &str) -> Result<Vec<Thing>> {
        let owner_class = self.navigation_class(thing)?;
        let relation = self
            .relation_classes_from(&owner_class)?
            .into_iter()
            .find(|r| r.name() == relation_name)
            .ok_or_else(|| HbdsError::UnknownRelation {
                class: owner_class.name().to_owned(),
                relation: relation_name.to_owned(),
            })?;
        let entries = self.positive(thing, Some(&relation))?;
        let objects = lock(&self.object_keeper)?;
        Ok(entries
            .iter()
            .filter_map(|entry| objects.get(entry).and_then(Object::endpoints))
            .map(|(_, fin)| fin)
            .collect())
    }

    // The class whose roles and registered relations apply to `thing`.
    fn navigation_class(&self, thing: Thing) -> Result<Arc<Class>> {
        match self.resolve(thing)? {
            Resolved::Instance(class) => Ok(class),
            Resolved::Type(class) => class
                .meta()
                .cloned()
                .ok_or_else(|| HbdsError::UnknownRelation {
                    class: class.name().to_owned(),
                    relation: "*".to_owned(),
                }),
        }
    }

    fn role_relation(&self, thing: Thing, role: &str) -> Result<String> {
        let class = self.navigation_class(thing)?;
        class
            .role(role)
            .map(|r| r.relation().to_owned())
            .ok_or_else(|| HbdsError::UndeclaredAttribute {
                target: class.name().to_owned(),
                attribute: role.to_owned(),
            })
    }

    /// Every object reached through a declared role, in link order.
    pub fn role(&self, thing: Thing, role: &str) -> Result<Vec<Thing>> {
        let relation = self.role_relation(thing, role)?;
        self.navigate(thing, &relation)
    }

    /// The object reached through a role allowing at most one.
    pub fn role01(&self, thing: Thing, role: &str) -> Result<Option<Thing>> {
        let relation = self.role_relation(thing, role)?;
        let reached = self.navigate(thing, &relation)?;
        if reached.len() > 1 && self.config.strict_role01 {
            return Err(HbdsError::Multiplicity { role: role.to_owned(), count: reached.len() });
        }
        Ok(reached.first().copied())
    }

    // ------------- iteration -------------
    /// Every object of `class` or of one of its subclasses, in ascending
    /// thing order. Things released by failed declarations are reused, so
    /// this is not always creation order.
    pub fn objects_of(&self, class: &Class) -> Result<Vec<Thing>> {
        let members: Vec<Thing> = lock(&self.class_keeper)?
            .iter()
            .filter(|c| c.is_subclass_of(class))
            .map(|c| c.class())
            .collect();
        let objects = lock(&self.object_keeper)?;
        let mut extent = RoaringTreemap::new();
        for member in &members {
            if let Some(kept) = objects.extent(member) {
                extent.extend(kept.iter());
            }
        }
        Ok(extent.iter().collect())
    }

    pub fn public_attributes(&self, thing: Thing) -> Result<Vec<String>> {
        Ok(match self.resolve(thing)? {
            Resolved::Instance(class) => class.slot_names().to_vec(),
            Resolved::Type(class) => class.meta().map_or_else(Vec::new, |meta| meta.slot_names().to_vec()),
        })
    }

    pub fn public_values(&self, thing: Thing) -> Result<Vec<(String, Option<Value>)>> {
        self.public_attributes(thing)?
            .into_iter()
            .map(|name| {
                let value = self.get(thing, &name)?;
                Ok((name, value))
            })
            .collect()
    }

    /// Public fields as a JSON object, nested objects of composed slots
    /// embedded in place.
    pub fn to_json(&self, thing: Thing) -> Result<serde_json::Value> {
        let class = self.class_of(thing)?;
        let mut map = serde_json::Map::new();
        for (name, value) in self.public_values(thing)? {
            let json = match (class.slot(&name), value) {
                (Some(Slot::Composed(_)), Some(Value::Object(nested))) => self.to_json(nested)?,
                (_, Some(value)) => value.to_json(),
                (_, None) => serde_json::Value::Null,
            };
            map.insert(name, json);
        }
        Ok(serde_json::Value::Object(map))
    }

    // ------------- caches -------------
    pub fn cache(&self, observer: impl Observer + 'static) -> Result<Cache<'_>> {
        let observer: SharedObserver = Arc::new(Mutex::new(observer));
        let id = lock(&self.broker)?.open(observer);
        Ok(Cache::new(self, id))
    }
    /// A cache observing `members` from the start.
    pub fn cache_with(&self, observer: impl Observer + 'static, members: &[Thing]) -> Result<Cache<'_>> {
        let cache = self.cache(observer)?;
        for member in members {
            cache.add(*member)?;
        }
        Ok(cache)
    }
    pub fn is_instrumented(&self, class: &Class) -> Result<bool> {
        Ok(lock(&self.broker)?.is_instrumented(class.class()))
    }
    pub fn live_caches(&self) -> Result<usize> {
        Ok(lock(&self.broker)?.live())
    }
    pub(crate) fn broker(&self) -> &Mutex<MutationBroker> {
        &self.broker
    }
}

// The attribute slot a public assignment goes through.
fn guarded_att<'c>(class: &Class, slot: Option<&'c Slot>, name: &str) -> Result<&'c Att> {
    match slot {
        Some(Slot::Att(att)) => Ok(att),
        Some(Slot::Composed(_)) => Err(HbdsError::ReadOnly {
            target: class.name().to_owned(),
            attribute: name.to_owned(),
        }),
        None if class.role(name).is_some() => Err(HbdsError::ReadOnly {
            target: class.name().to_owned(),
            attribute: name.to_owned(),
        }),
        None => Err(HbdsError::UndeclaredAttribute {
            target: class.name().to_owned(),
            attribute: name.to_owned(),
        }),
    }
}
