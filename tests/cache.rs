use std::sync::{Arc, Mutex};

use hbds::cache::{MutationEvent, Observer, Recorder};
use hbds::construct::{Class, Thing};
use hbds::datatype::{Value, ValueType};
use hbds::model::Model;
use hbds::schema::{Arguments, RelationBuilder, SchemaBuilder};
use hbds::slot::SlotPart;
use hbds::HbdsError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn declare(model: &Model) -> (Arc<Class>, Arc<Class>, Arc<Class>) {
    let person = model
        .declare_class(
            SchemaBuilder::new("Person")
                .field("name", vec![SlotPart::Type(ValueType::Str), SlotPart::Required])
                .field("age", 0i64),
        )
        .unwrap();
    let car = model.declare_class(SchemaBuilder::new("Car").field("plate", ValueType::Str)).unwrap();
    let owns = model.declare_relation(RelationBuilder::new("Owns").between(&person, &car)).unwrap();
    (person, car, owns)
}

fn after_sets(recorder: &Recorder) -> Vec<(Thing, String, Option<Value>)> {
    recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            MutationEvent::AfterSet { object, attribute, value } => Some((object, attribute, value)),
            _ => None,
        })
        .collect()
}

#[test]
fn observed_assignment_then_discard() {
    init_tracing();
    let model = Model::new();
    let (person, _, _) = declare(&model);
    let p = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    let recorder = Recorder::new();
    let cache = model.cache_with(recorder.clone(), &[p]).unwrap();

    model.set(p, "name", "Ann-Marie").unwrap();
    assert_eq!(
        recorder.events(),
        vec![
            MutationEvent::BeforeSet { object: p, attribute: "name".to_owned(), value: Some(Value::from("Ann")) },
            MutationEvent::AfterSet { object: p, attribute: "name".to_owned(), value: Some(Value::from("Ann-Marie")) },
        ]
    );

    assert!(cache.discard(p).unwrap());
    assert!(!cache.discard(p).unwrap());
    recorder.clear();
    model.set(p, "name", "Z").unwrap();
    assert!(recorder.is_empty());
    assert_eq!(model.get(p, "name").unwrap(), Some(Value::from("Z")));
}

#[test]
fn one_write_reaches_every_containing_cache_once() {
    let model = Model::new();
    let (person, _, _) = declare(&model);
    let o = model.create(&person, Arguments::new().arg("O")).unwrap();
    let other = model.create(&person, Arguments::new().arg("Other")).unwrap();
    let recorders: Vec<Recorder> = (0..4).map(|_| Recorder::new()).collect();
    let c1 = model.cache_with(recorders[0].clone(), &[o]).unwrap();
    let c2 = model.cache_with(recorders[1].clone(), &[o]).unwrap();
    let c3 = model.cache_with(recorders[2].clone(), &[o, other]).unwrap();
    let c4 = model.cache_with(recorders[3].clone(), &[other]).unwrap();

    model.set(o, "age", 33i64).unwrap();
    for recorder in &recorders[..3] {
        assert_eq!(recorder.len(), 2);
        assert_eq!(after_sets(recorder), vec![(o, "age".to_owned(), Some(Value::Int(33)))]);
    }
    assert!(recorders[3].is_empty());
    assert_eq!(model.live_caches().unwrap(), 4);
    for cache in [c1, c2, c3, c4] {
        cache.dispose().unwrap();
    }
    assert_eq!(model.live_caches().unwrap(), 0);
}

#[test]
fn instrumentation_is_shared_and_removed_with_last_member() {
    let model = Model::new();
    let (person, car, _) = declare(&model);
    let a = model.create(&person, Arguments::new().arg("A")).unwrap();
    let b = model.create(&person, Arguments::new().arg("B")).unwrap();
    let c = model.create(&person, Arguments::new().arg("C")).unwrap();
    assert!(!model.is_instrumented(&person).unwrap());

    let (ra, rb, rc) = (Recorder::new(), Recorder::new(), Recorder::new());
    let cache_a = model.cache_with(ra.clone(), &[a]).unwrap();
    let cache_b = model.cache_with(rb.clone(), &[b]).unwrap();
    assert!(model.is_instrumented(&person).unwrap());
    assert!(!model.is_instrumented(&car).unwrap());

    // an uninvolved third cache observes through the same instrumentation
    let cache_c = model.cache_with(rc.clone(), &[c]).unwrap();
    model.set(c, "age", 3i64).unwrap();
    assert_eq!(after_sets(&rc).len(), 1);
    assert!(ra.is_empty() && rb.is_empty());
    cache_c.dispose().unwrap();

    cache_a.discard(a).unwrap();
    assert!(model.is_instrumented(&person).unwrap());
    cache_b.discard(b).unwrap();
    assert!(!model.is_instrumented(&person).unwrap());

    model.set(a, "age", 1i64).unwrap();
    model.set(b, "age", 2i64).unwrap();
    assert!(ra.is_empty() && rb.is_empty());
}

#[test]
fn dropping_a_cache_disposes_it() {
    let model = Model::new();
    let (person, _, _) = declare(&model);
    let p = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    {
        let cache = model.cache_with(Recorder::new(), &[p]).unwrap();
        assert!(cache.contains(p).unwrap());
        assert_eq!(cache.members().unwrap(), vec![p]);
        assert!(model.is_instrumented(&person).unwrap());
    }
    assert_eq!(model.live_caches().unwrap(), 0);
    assert!(!model.is_instrumented(&person).unwrap());
}

#[test]
fn links_and_cuts_are_reported_to_caches_of_either_end() {
    let model = Model::new();
    let (person, car, owns) = declare(&model);
    let p = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    let c = model.create(&car, Arguments::new().arg("XYZ")).unwrap();
    let (rp, rc, both) = (Recorder::new(), Recorder::new(), Recorder::new());
    let _cp = model.cache_with(rp.clone(), &[p]).unwrap();
    let _cc = model.cache_with(rc.clone(), &[c]).unwrap();
    let _both = model.cache_with(both.clone(), &[p, c]).unwrap();

    let r = model.relate(&owns, p, c, Arguments::new()).unwrap();
    model.cut(r).unwrap();
    let expected = vec![
        MutationEvent::Link { relation: owns.class(), init: p, fin: c },
        MutationEvent::Unlink { relation: owns.class(), init: p, fin: c },
    ];
    assert_eq!(rp.events(), expected);
    assert_eq!(rc.events(), expected);
    assert_eq!(both.events(), expected);
}

#[test]
fn private_assignments_are_not_reported() {
    let model = Model::new();
    let (person, _, _) = declare(&model);
    let p = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    let recorder = Recorder::new();
    let _cache = model.cache_with(recorder.clone(), &[p]).unwrap();
    model.set(p, "_seen", true).unwrap();
    // a rejected write is not reported either
    assert!(matches!(model.set_none(p, "name"), Err(HbdsError::Mandatory { .. })));
    assert!(recorder.is_empty());
}

#[test]
fn type_field_assignments_are_observed() {
    let model = Model::new();
    let meta = model.declare_class(SchemaBuilder::new("Versioned").field("version", 1i64)).unwrap();
    let document = model.declare_class(SchemaBuilder::new("Document").metaclass(&meta)).unwrap();
    let recorder = Recorder::new();
    let cache = model.cache_with(recorder.clone(), &[document.class()]).unwrap();
    assert!(model.is_instrumented(&meta).unwrap());
    model.set(document.class(), "version", 2i64).unwrap();
    assert_eq!(after_sets(&recorder), vec![(document.class(), "version".to_owned(), Some(Value::Int(2)))]);
    cache.dispose().unwrap();
    assert!(!model.is_instrumented(&meta).unwrap());
}

// An observer counting its calls, relying on the default hooks for the rest.
struct Counter(Arc<Mutex<usize>>);

impl Observer for Counter {
    fn after_setattr(&mut self, _object: Thing, _attribute: &str, _new: Option<&Value>) {
        if let Ok(mut count) = self.0.lock() {
            *count += 1;
        }
    }
}

#[test]
fn custom_observer_with_default_hooks() {
    init_tracing();
    let model = Model::new();
    let (person, car, owns) = declare(&model);
    let p = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    let c = model.create(&car, Arguments::new().arg("XYZ")).unwrap();
    let count = Arc::new(Mutex::new(0));
    let cache = model.cache(Counter(Arc::clone(&count))).unwrap();
    assert!(cache.add(p).unwrap());
    assert!(!cache.add(p).unwrap());
    model.set(p, "age", 5i64).unwrap();
    // the default link hook only warns
    model.relate(&owns, p, c, Arguments::new()).unwrap();
    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(cache.len().unwrap(), 1);
}

#[test]
fn unknown_things_cannot_be_observed() {
    let model = Model::new();
    let (person, _, _) = declare(&model);
    let p = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    let cache = model.cache(Recorder::new()).unwrap();
    assert!(matches!(cache.add(p + 100), Err(HbdsError::UnknownThing(_))));
    assert!(cache.members().unwrap().is_empty());
    assert!(!model.is_instrumented(&person).unwrap());
}
