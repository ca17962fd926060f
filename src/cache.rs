//! Mutation observers.
//!
//! A [`Cache`] is a set of objects under observation together with an
//! [`Observer`] receiving their attribute writes and the links and cuts of
//! relations touching them. Caches register with the model's
//! [`MutationBroker`], which keeps a reference count of observed members
//! per type: a type is instrumented while at least one live cache holds one
//! of its instances, and assignments to objects of other types never reach
//! the fan-out at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::construct::{Class, Thing, ThingHasher};
use crate::datatype::Value;
use crate::error::{lock, HbdsError, Result};
use crate::model::Model;

pub type CacheId = u64;

/// Hooks called for the members of a cache. The default implementations
/// only warn that they are not implemented.
pub trait Observer: Send {
    fn before_setattr(&mut self, object: Thing, attribute: &str, old: Option<&Value>) {
        let _ = old;
        warn!(object, attribute, "before_setattr is not implemented");
    }
    fn after_setattr(&mut self, object: Thing, attribute: &str, new: Option<&Value>) {
        let _ = new;
        warn!(object, attribute, "after_setattr is not implemented");
    }
    fn link(&mut self, relation: &Class, init: Thing, fin: Thing) {
        warn!(relation = relation.name(), init, fin, "link is not implemented");
    }
    fn unlink(&mut self, relation: &Class, init: Thing, fin: Thing) {
        warn!(relation = relation.name(), init, fin, "unlink is not implemented");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationEvent {
    BeforeSet { object: Thing, attribute: String, value: Option<Value> },
    AfterSet { object: Thing, attribute: String, value: Option<Value> },
    Link { relation: Thing, init: Thing, fin: Thing },
    Unlink { relation: Thing, init: Thing, fin: Thing },
}

/// Observer keeping every event it receives. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<MutationEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn events(&self) -> Vec<MutationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
    pub fn len(&self) -> usize {
        self.events().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
    fn push(&self, event: MutationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Observer for Recorder {
    fn before_setattr(&mut self, object: Thing, attribute: &str, old: Option<&Value>) {
        self.push(MutationEvent::BeforeSet { object, attribute: attribute.to_owned(), value: old.cloned() });
    }
    fn after_setattr(&mut self, object: Thing, attribute: &str, new: Option<&Value>) {
        self.push(MutationEvent::AfterSet { object, attribute: attribute.to_owned(), value: new.cloned() });
    }
    fn link(&mut self, relation: &Class, init: Thing, fin: Thing) {
        self.push(MutationEvent::Link { relation: relation.class(), init, fin });
    }
    fn unlink(&mut self, relation: &Class, init: Thing, fin: Thing) {
        self.push(MutationEvent::Unlink { relation: relation.class(), init, fin });
    }
}

pub(crate) type SharedObserver = Arc<Mutex<dyn Observer>>;

// ------------- MutationBroker -------------
struct CacheEntry {
    // member -> the type it is counted under
    members: HashMap<Thing, Thing, ThingHasher>,
    observer: SharedObserver,
}

/// Registry of the live caches of a model.
pub struct MutationBroker {
    next_cache: CacheId,
    caches: BTreeMap<CacheId, CacheEntry>,
    instrumented: HashMap<Thing, usize, ThingHasher>,
}

impl MutationBroker {
    pub fn new() -> Self {
        Self {
            next_cache: 0,
            caches: BTreeMap::new(),
            instrumented: HashMap::default(),
        }
    }
    pub(crate) fn open(&mut self, observer: SharedObserver) -> CacheId {
        self.next_cache += 1;
        self.caches.insert(
            self.next_cache,
            CacheEntry { members: HashMap::default(), observer },
        );
        debug!(cache = self.next_cache, live = self.caches.len(), "cache opened");
        self.next_cache
    }
    fn entry(&self, cache: CacheId) -> Result<&CacheEntry> {
        self.caches.get(&cache).ok_or(HbdsError::UnknownCache(cache))
    }
    fn entry_mut(&mut self, cache: CacheId) -> Result<&mut CacheEntry> {
        self.caches.get_mut(&cache).ok_or(HbdsError::UnknownCache(cache))
    }
    fn retain(&mut self, type_key: Thing) {
        let count = self.instrumented.entry(type_key).or_insert(0);
        *count += 1;
        if *count == 1 {
            debug!(type_key, "type instrumented");
        }
    }
    fn release(&mut self, type_key: Thing) {
        if let Some(count) = self.instrumented.get_mut(&type_key) {
            *count -= 1;
            if *count == 0 {
                self.instrumented.remove(&type_key);
                debug!(type_key, "type instrumentation removed");
            }
        }
    }
    /// Returns `false` when the object already was a member.
    pub(crate) fn add(&mut self, cache: CacheId, thing: Thing, type_key: Thing) -> Result<bool> {
        let entry = self.entry_mut(cache)?;
        if entry.members.contains_key(&thing) {
            return Ok(false);
        }
        entry.members.insert(thing, type_key);
        self.retain(type_key);
        Ok(true)
    }
    /// Returns `false` when the object was not a member.
    pub(crate) fn discard(&mut self, cache: CacheId, thing: Thing) -> Result<bool> {
        let entry = self.entry_mut(cache)?;
        match entry.members.remove(&thing) {
            Some(type_key) => {
                self.release(type_key);
                Ok(true)
            }
            None => Ok(false),
        }
    }
    pub(crate) fn dispose(&mut self, cache: CacheId) -> Result<()> {
        let entry = self.caches.remove(&cache).ok_or(HbdsError::UnknownCache(cache))?;
        for type_key in entry.members.into_values() {
            self.release(type_key);
        }
        debug!(cache, live = self.caches.len(), "cache disposed");
        Ok(())
    }
    pub fn contains(&self, cache: CacheId, thing: Thing) -> Result<bool> {
        Ok(self.entry(cache)?.members.contains_key(&thing))
    }
    pub fn members(&self, cache: CacheId) -> Result<Vec<Thing>> {
        let mut members: Vec<Thing> = self.entry(cache)?.members.keys().copied().collect();
        members.sort_unstable();
        Ok(members)
    }
    pub fn is_instrumented(&self, type_key: Thing) -> bool {
        self.instrumented.contains_key(&type_key)
    }
    pub fn instrumented(&self) -> Vec<Thing> {
        let mut types: Vec<Thing> = self.instrumented.keys().copied().collect();
        types.sort_unstable();
        types
    }
    pub fn live(&self) -> usize {
        self.caches.len()
    }
    /// Observers of the live caches holding any of `things`, each once, in
    /// the order the caches were opened.
    pub(crate) fn targets(&self, things: &[Thing]) -> Vec<SharedObserver> {
        let targets: Vec<SharedObserver> = self
            .caches
            .values()
            .filter(|entry| things.iter().any(|t| entry.members.contains_key(t)))
            .map(|entry| Arc::clone(&entry.observer))
            .collect();
        trace!(?things, targets = targets.len(), "notification fan-out");
        targets
    }
}

// ------------- Cache -------------
/// Handle on one live cache of a model. Dropping it disposes the cache.
pub struct Cache<'m> {
    model: &'m Model,
    id: CacheId,
    disposed: bool,
}

impl<'m> Cache<'m> {
    pub(crate) fn new(model: &'m Model, id: CacheId) -> Self {
        Self { model, id, disposed: false }
    }
    pub fn id(&self) -> CacheId {
        self.id
    }
    /// Starts observing `thing`, instrumenting its type on first use.
    pub fn add(&self, thing: Thing) -> Result<bool> {
        let type_key = self.model.type_key(thing)?;
        lock(self.model.broker())?.add(self.id, thing, type_key)
    }
    /// Stops observing `thing`; its type is restored once no live cache
    /// holds any of its instances.
    pub fn discard(&self, thing: Thing) -> Result<bool> {
        lock(self.model.broker())?.discard(self.id, thing)
    }
    pub fn contains(&self, thing: Thing) -> Result<bool> {
        lock(self.model.broker())?.contains(self.id, thing)
    }
    pub fn members(&self) -> Result<Vec<Thing>> {
        lock(self.model.broker())?.members(self.id)
    }
    pub fn len(&self) -> Result<usize> {
        Ok(self.members()?.len())
    }
    pub fn dispose(mut self) -> Result<()> {
        self.disposed = true;
        lock(self.model.broker())?.dispose(self.id)
    }
}

impl Drop for Cache<'_> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        match self.model.broker().lock() {
            Ok(mut broker) => {
                let _ = broker.dispose(self.id);
            }
            Err(e) => warn!(cache = self.id, error = %e, "cache not disposed"),
        }
    }
}
