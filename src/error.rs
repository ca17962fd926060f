use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::construct::Thing;
use crate::datatype::ValueType;

/// The four kinds of failure a model can raise, plus the housekeeping ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaDeclaration,
    Validation,
    AccessViolation,
    GraphConsistency,
    Lookup,
    Config,
    Internal,
}

#[derive(Error, Debug)]
pub enum HbdsError {
    // ---- raised while declaring classes ----
    #[error("Too many args for slot '{slot}' ({count}). Must be 4 max")]
    TooManySlotArguments { slot: String, count: usize },
    #[error("Too many slot definitions for '{slot}' ({count}). Use just one")]
    AmbiguousSlotRedeclaration { slot: String, count: usize },
    #[error("Relation '{relation}' must define its '{endpoint}' class")]
    MissingEndpoint { relation: String, endpoint: &'static str },
    #[error("Composed slot '{slot}' cannot use mandatory field '{field}' without default value")]
    ComposedMandatory { slot: String, field: String },
    #[error("Cannot synthesize constructor of '{class}': {message}\n{listing}")]
    CodeGeneration { class: String, message: String, listing: String },
    #[error("Invalid identifier '{0}'")]
    InvalidName(String),
    #[error("Class '{0}' is already declared")]
    DuplicateClass(String),

    // ---- raised while assigning values ----
    #[error("'{value}' for slot '{slot}'. Should be '{expected}' instead of '{actual}'")]
    TypeCoercion { slot: String, expected: ValueType, actual: ValueType, value: String },
    #[error("Constraint of slot '{slot}' rejected value: {message}")]
    Constraint { slot: String, message: String },
    #[error("'{slot}' is mandatory. Can't be set to None")]
    Mandatory { slot: String },
    #[error("{class}() missing required argument '{parameter}'")]
    MissingArgument { class: String, parameter: String },
    #[error("{class}() got an unexpected argument: {message}")]
    UnexpectedArgument { class: String, message: String },
    #[error("Relation '{relation}' expects its {endpoint} object to be a '{expected}', got a '{actual}'")]
    EndpointMismatch { relation: String, endpoint: &'static str, expected: String, actual: String },
    #[error("Instance creation is not allowed for '{0}'")]
    InstantiationForbidden(String),

    // ---- raised on guarded attribute access ----
    #[error("'{target}' has no Att '{attribute}'")]
    UndeclaredAttribute { target: String, attribute: String },
    #[error("'{attribute}' of '{target}' isn't settable")]
    ReadOnly { target: String, attribute: String },

    // ---- raised while maintaining the relation graph ----
    #[error("Relation object {relation} is not linked to its endpoints")]
    NotLinked { relation: Thing },
    #[error("'{0}' is not a relation")]
    NotARelation(String),
    #[error("No relation named '{relation}' originates from '{class}'")]
    UnknownRelation { class: String, relation: String },
    #[error("Role '{role}' resolves to {count} objects but allows at most one")]
    Multiplicity { role: String, count: usize },

    // ---- lookups ----
    #[error("Unknown thing: {0}")]
    UnknownThing(Thing),
    #[error("Unknown class: {0}")]
    UnknownClass(String),
    #[error("Unknown or disposed cache: {0}")]
    UnknownCache(u64),

    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl HbdsError {
    pub fn kind(&self) -> ErrorKind {
        use HbdsError::*;
        match self {
            TooManySlotArguments { .. }
            | AmbiguousSlotRedeclaration { .. }
            | MissingEndpoint { .. }
            | ComposedMandatory { .. }
            | CodeGeneration { .. }
            | InvalidName(_)
            | DuplicateClass(_) => ErrorKind::SchemaDeclaration,
            TypeCoercion { .. }
            | Constraint { .. }
            | Mandatory { .. }
            | MissingArgument { .. }
            | UnexpectedArgument { .. }
            | EndpointMismatch { .. }
            | InstantiationForbidden(_) => ErrorKind::Validation,
            UndeclaredAttribute { .. } | ReadOnly { .. } => ErrorKind::AccessViolation,
            NotLinked { .. } | NotARelation(_) | UnknownRelation { .. } | Multiplicity { .. } => {
                ErrorKind::GraphConsistency
            }
            UnknownThing(_) | UnknownClass(_) | UnknownCache(_) => ErrorKind::Lookup,
            Config(_) => ErrorKind::Config,
            Lock(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, HbdsError>;

// Helper conversions
impl From<config::ConfigError> for HbdsError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| HbdsError::Lock(e.to_string()))
}
