//! hbds – an in-memory object/relation model with typed slots, first-class
//! relations and mutation observers.
//!
//! The model centers on three constructs:
//! * An *entity class* declares an ordered list of slots. Each
//!   [`slot::Att`] carries an optional type, a default, a mandatory flag, a
//!   constraint and a unit; a [`slot::ComposedAtt`] embeds a nested value
//!   object. A constructor is synthesized from the inherited slots of every
//!   base followed by the class's own.
//! * A *relation class* is an entity class tagged with an init class and a
//!   fin class. Each relation object links one init object to one fin
//!   object and appears in the init object's positive semi-cocircuit and in
//!   the fin object's negative semi-cocircuit until it is cut.
//! * A [`cache::Cache`] observes a set of objects and receives their
//!   attribute writes and the links and cuts touching them.
//!
//! Classes and objects are both [`construct::Thing`]s (a simple `u64`), owned
//! by "keeper" structures in the `construct` module and wired together by
//! the [`model::Model`]. Because a class is a thing, it can itself be the
//! endpoint of a relation and hold values for the slots of its metaclass.
//!
//! ## Modules
//! * [`construct`] – Things, classes, objects, their keepers and the
//!   semi-cocircuit indexes.
//! * [`datatype`] – The [`datatype::Value`] enum and type coercion.
//! * [`slot`] – Slot declarations, validation and constraint helpers.
//! * [`schema`] – Builders for entity and relation classes, and constructor
//!   arguments.
//! * [`model`] – Declarations, objects, attribute access and navigation.
//! * [`cache`] – Observers and the broker that instruments observed types.
//! * [`config`] – Behaviour switches loadable from a config file.
//! * [`error`] – The crate error and its taxonomy.
//!
//! ## Quick Start
//! ```
//! use hbds::cache::{MutationEvent, Recorder};
//! use hbds::datatype::{Value, ValueType};
//! use hbds::model::Model;
//! use hbds::schema::{Arguments, SchemaBuilder};
//! use hbds::slot::SlotPart;
//!
//! let model = Model::new();
//! let person = model
//!     .declare_class(SchemaBuilder::new("Person").field("name", vec![SlotPart::Type(ValueType::Str), SlotPart::Required]))
//!     .unwrap();
//! let ann = model.create(&person, Arguments::new().arg("Ann")).unwrap();
//!
//! let recorder = Recorder::new();
//! let cache = model.cache_with(recorder.clone(), &[ann]).unwrap();
//! model.set(ann, "name", "Ann-Marie").unwrap();
//! assert!(recorder.events().contains(&MutationEvent::AfterSet {
//!     object: ann,
//!     attribute: "name".to_owned(),
//!     value: Some(Value::from("Ann-Marie")),
//! }));
//! cache.dispose().unwrap();
//! ```

pub mod cache;
pub mod config;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod model;
pub mod schema;
pub mod slot;

pub use error::{ErrorKind, HbdsError, Result};
