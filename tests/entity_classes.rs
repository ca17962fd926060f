use hbds::datatype::{Value, ValueType};
use hbds::model::Model;
use hbds::schema::{Arguments, SchemaBuilder};
use hbds::slot::{constraint, AttSpec, ComposedSpec, SlotPart};
use hbds::{ErrorKind, HbdsError};

fn person(model: &Model) -> std::sync::Arc<hbds::construct::Class> {
    model
        .declare_class(
            SchemaBuilder::new("Person")
                .field("name", vec![SlotPart::Type(ValueType::Str), SlotPart::Required])
                .field("age", 0i64),
        )
        .expect("Person declared")
}

#[test]
fn mandatory_name_and_defaulted_age() {
    let model = Model::new();
    let person = person(&model);
    let err = model.create(&person, Arguments::new()).unwrap_err();
    assert!(matches!(err, HbdsError::MissingArgument { ref parameter, .. } if parameter == "name"));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let ann = model.create(&person, Arguments::new().arg("Ann")).expect("Ann created");
    assert_eq!(model.get(ann, "name").unwrap(), Some(Value::from("Ann")));
    assert_eq!(model.get(ann, "age").unwrap(), Some(Value::Int(0)));
}

#[test]
fn explicit_none_is_refused_by_mandatory_slot() {
    let model = Model::new();
    let person = person(&model);
    let err = model.create(&person, Arguments::new().none()).unwrap_err();
    assert!(matches!(err, HbdsError::Mandatory { ref slot } if slot == "name"));
    let ann = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    assert!(matches!(model.set_none(ann, "name"), Err(HbdsError::Mandatory { .. })));
    // the optional slot accepts it
    model.set_none(ann, "age").unwrap();
    assert_eq!(model.get(ann, "age").unwrap(), None);
}

#[test]
fn constructor_follows_declaration_order_across_bases() {
    let model = Model::new();
    let b1 = model
        .declare_class(SchemaBuilder::new("B1").field("a", 1i64).field("b", 2i64))
        .unwrap();
    let b2 = model.declare_class(SchemaBuilder::new("B2").field("c", "c")).unwrap();
    let c = model
        .declare_class(
            SchemaBuilder::new("C")
                .base(&b1)
                .base(&b2)
                .field("d", ValueType::Float)
                .field("e", true),
        )
        .unwrap();
    let names: Vec<&str> = c.parameters().iter().map(|p| p.name()).collect();
    assert_eq!(names, ["a", "b", "c", "d", "e"]);
    assert_eq!(c.slot_names(), ["a", "b", "c", "d", "e"]);
    assert_eq!(c.parameters()[2].declared_by(), "B2");

    let x = model
        .create(&c, Arguments::new().arg(10i64).named("e", false).named("c", "see"))
        .unwrap();
    let values = model.public_values(x).unwrap();
    assert_eq!(values[0], ("a".to_owned(), Some(Value::Int(10))));
    assert_eq!(values[1], ("b".to_owned(), Some(Value::Int(2))));
    assert_eq!(values[2], ("c".to_owned(), Some(Value::from("see"))));
    assert_eq!(values[3], ("d".to_owned(), None));
    assert_eq!(values[4], ("e".to_owned(), Some(Value::Bool(false))));
    assert!(model.objects_of(&b1).unwrap().contains(&x));
}

#[test]
fn unknown_public_attribute_is_refused() {
    let model = Model::new();
    let person = person(&model);
    let ann = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    let err = model.set(ann, "unknown_field", 5i64).unwrap_err();
    assert!(matches!(err, HbdsError::UndeclaredAttribute { .. }));
    assert_eq!(err.kind(), ErrorKind::AccessViolation);
    assert!(matches!(model.get(ann, "unknown_field"), Err(HbdsError::UndeclaredAttribute { .. })));
}

#[test]
fn private_names_bypass_the_guard() {
    let model = Model::new();
    let person = person(&model);
    let ann = model.create(&person, Arguments::new().arg("Ann")).unwrap();
    assert_eq!(model.get(ann, "_scratch").unwrap(), None);
    model.set(ann, "_scratch", 5i64).unwrap();
    assert_eq!(model.get(ann, "_scratch").unwrap(), Some(Value::Int(5)));
    assert_eq!(model.public_attributes(ann).unwrap(), ["name", "age"]);
}

#[test]
fn assigned_values_are_coerced_then_constrained() {
    let model = Model::new();
    let sensor = model
        .declare_class(
            SchemaBuilder::new("Sensor")
                .field("reading", AttSpec::of(ValueType::Int).constraint(constraint::range(0., 100.)))
                .field("label", AttSpec::of(ValueType::Str).constraint(constraint::pattern("^[A-Z]+$").unwrap()))
                .field("mode", AttSpec::new().default_value("auto").constraint(constraint::one_of(vec![
                    Value::from("auto"),
                    Value::from("manual"),
                ]))),
        )
        .unwrap();
    let s = model.create(&sensor, Arguments::new().arg("42").arg("T")).unwrap();
    assert_eq!(model.get(s, "reading").unwrap(), Some(Value::Int(42)));

    model.set(s, "reading", 12.9).unwrap();
    assert_eq!(model.get(s, "reading").unwrap(), Some(Value::Int(12)));

    let err = model.set(s, "reading", "lots").unwrap_err();
    assert!(matches!(err, HbdsError::TypeCoercion { expected: ValueType::Int, actual: ValueType::Str, .. }));
    assert!(matches!(model.set(s, "reading", 101i64), Err(HbdsError::Constraint { .. })));
    assert!(matches!(model.set(s, "label", "lower"), Err(HbdsError::Constraint { .. })));
    assert!(matches!(model.set(s, "mode", "off"), Err(HbdsError::Constraint { .. })));
    // a rejected write leaves the old value
    assert_eq!(model.get(s, "reading").unwrap(), Some(Value::Int(12)));
}

#[test]
fn slot_type_is_inferred_from_default() {
    let model = Model::new();
    let shape = model
        .declare_class(
            SchemaBuilder::new("Shape")
                .field("ratio", 0.5)
                .field("sides", vec![SlotPart::Default(Value::Int(4)), SlotPart::Type(ValueType::Int)])
                .field("width", AttSpec::of(ValueType::Float).doc("outer width").unit(hbds::datatype::Unit::new("mm"))),
        )
        .unwrap();
    let atts = shape.attributes();
    assert_eq!(atts[0].value_type(), Some(ValueType::Float));
    assert_eq!(atts[1].value_type(), Some(ValueType::Int));
    assert_eq!(atts[2].doc(), Some("outer width"));
    assert_eq!(atts[2].unit().map(|u| u.symbol()), Some("mm"));
    assert_eq!(shape.default_of("sides").unwrap(), Some(Value::Int(4)));
    assert!(matches!(shape.default_of("corners"), Err(HbdsError::UndeclaredAttribute { .. })));
}

#[test]
fn composed_slot_is_created_lazily_and_not_assignable() {
    let model = Model::new();
    let customer = model
        .declare_class(
            SchemaBuilder::new("Customer").field("name", "").field(
                "address",
                ComposedSpec::new().field("street", "").field("zip", ValueType::Int),
            ),
        )
        .unwrap();
    let address = model.class("Customer.address").expect("nested class registered");
    assert_eq!(address.slot_names(), ["street", "zip"]);
    // composed slots are not constructor parameters
    assert_eq!(customer.parameters().len(), 1);
    // and have no class-level default; the nested class carries the defaults
    assert_eq!(customer.default_of("address").unwrap(), None);
    assert_eq!(address.default_of("street").unwrap(), Some(Value::from("")));

    let c = model.create(&customer, Arguments::new()).unwrap();
    assert!(model.objects_of(&address).unwrap().is_empty());
    let first = model.nested(c, "address").unwrap();
    assert_eq!(model.get(c, "address").unwrap(), Some(Value::Object(first)));
    assert_eq!(model.objects_of(&address).unwrap(), vec![first]);

    model.set(first, "zip", "12345").unwrap();
    assert_eq!(model.get(first, "zip").unwrap(), Some(Value::Int(12345)));

    let err = model.set(c, "address", Value::Object(first)).unwrap_err();
    assert!(matches!(err, HbdsError::ReadOnly { .. }));
}

#[test]
fn composed_slot_refuses_mandatory_field_without_default() {
    let model = Model::new();
    let err = model
        .declare_class(
            SchemaBuilder::new("Invoice")
                .field("total", ComposedSpec::new().field("amount", vec![SlotPart::Type(ValueType::Decimal), SlotPart::Required])),
        )
        .unwrap_err();
    assert!(matches!(err, HbdsError::ComposedMandatory { ref field, .. } if field == "amount"));
    assert_eq!(err.kind(), ErrorKind::SchemaDeclaration);
    assert!(matches!(model.class("Invoice.total"), Err(HbdsError::UnknownClass(_))));

    let invoice = model
        .declare_class(SchemaBuilder::new("Invoice").field("total", ComposedSpec::new().field("amount", 0i64)))
        .expect("corrected Invoice declared");
    assert_eq!(model.class("Invoice.total").unwrap().slot_names(), ["amount"]);
    let i = model.create(&invoice, Arguments::new()).unwrap();
    let total = model.nested(i, "total").unwrap();
    assert_eq!(model.get(total, "amount").unwrap(), Some(Value::Int(0)));
}

#[test]
fn failed_declaration_forgets_its_nested_classes() {
    let model = Model::new();
    let address = || {
        ComposedSpec::new()
            .field("street", "")
            .field("geo", ComposedSpec::new().field("lat", 0.0).field("lon", 0.0))
    };
    let err = model
        .declare_class(
            SchemaBuilder::new("Customer")
                .field("address", address())
                .field("age", vec![SlotPart::Type(ValueType::Int), SlotPart::Default(Value::from("x"))]),
        )
        .unwrap_err();
    assert!(matches!(err, HbdsError::TypeCoercion { .. }));
    for name in ["Customer", "Customer.address", "Customer.address.geo"] {
        assert!(matches!(model.class(name), Err(HbdsError::UnknownClass(_))), "{name} still declared");
    }

    let customer = model
        .declare_class(SchemaBuilder::new("Customer").field("address", address()).field("age", 0i64))
        .expect("corrected Customer declared");
    assert_eq!(customer.parameters().len(), 1);
    let geo = model.class("Customer.address.geo").unwrap();
    assert_eq!(geo.slot_names(), ["lat", "lon"]);
    // every thing in use is distinct after the released ones were reused
    let things = [customer.class(), model.class("Customer.address").unwrap().class(), geo.class()];
    assert!(things[0] != things[1] && things[1] != things[2] && things[0] != things[2]);
}

#[test]
fn redeclared_inherited_slot_fails_code_generation() {
    let model = Model::new();
    let base = model.declare_class(SchemaBuilder::new("Base").field("a", 1i64)).unwrap();
    let err = model
        .declare_class(SchemaBuilder::new("Derived").base(&base).field("a", 2i64))
        .unwrap_err();
    match err {
        HbdsError::CodeGeneration { class, message, listing } => {
            assert_eq!(class, "Derived");
            assert!(message.contains("duplicate argument 'a'"));
            assert!(listing.contains("a=1"));
            assert!(listing.contains('^'));
        }
        other => panic!("unexpected error: {other}"),
    }
    // the failed name stays free
    assert!(matches!(model.class("Derived"), Err(HbdsError::UnknownClass(_))));
}

#[test]
fn declaration_errors() {
    let model = Model::new();
    person(&model);
    assert!(matches!(model.declare_class(SchemaBuilder::new("Person")), Err(HbdsError::DuplicateClass(_))));
    assert!(matches!(model.declare_class(SchemaBuilder::new("1st")), Err(HbdsError::InvalidName(_))));
    let too_many = vec![
        SlotPart::Type(ValueType::Int),
        SlotPart::Default(Value::Int(0)),
        SlotPart::Required,
        SlotPart::Unit(hbds::datatype::Unit::new("s")),
        SlotPart::Required,
    ];
    assert!(matches!(
        model.declare_class(SchemaBuilder::new("Timer").field("t", too_many)),
        Err(HbdsError::TooManySlotArguments { count: 5, .. })
    ));
}

#[test]
fn argument_binding_errors() {
    let model = Model::new();
    let person = person(&model);
    assert!(matches!(
        model.create(&person, Arguments::new().arg("Ann").arg(3i64).arg(4i64)),
        Err(HbdsError::UnexpectedArgument { .. })
    ));
    assert!(matches!(
        model.create(&person, Arguments::new().arg("Ann").named("name", "Bo")),
        Err(HbdsError::UnexpectedArgument { .. })
    ));
    assert!(matches!(
        model.create(&person, Arguments::new().named("height", 3i64)),
        Err(HbdsError::UnexpectedArgument { .. })
    ));
    let bo = model.create(&person, Arguments::new().named("age", 7i64).named("name", "Bo")).unwrap();
    assert_eq!(model.get(bo, "age").unwrap(), Some(Value::Int(7)));
}

#[test]
fn abstract_class_cannot_be_instantiated() {
    let model = Model::new();
    let shape = model
        .declare_class(SchemaBuilder::new("Shape").field("sides", 0i64).abstract_class())
        .unwrap();
    let square = model.declare_class(SchemaBuilder::new("Square").base(&shape)).unwrap();
    assert!(matches!(model.create(&shape, Arguments::new()), Err(HbdsError::InstantiationForbidden(_))));
    let sq = model.create(&square, Arguments::new().arg(4i64)).unwrap();
    assert_eq!(model.objects_of(&shape).unwrap(), vec![sq]);
}

#[test]
fn metaclass_slots_live_on_the_class() {
    let model = Model::new();
    let meta = model.declare_class(SchemaBuilder::new("Versioned").field("version", 1i64)).unwrap();
    let document = model
        .declare_class(SchemaBuilder::new("Document").metaclass(&meta).field("title", ""))
        .unwrap();
    assert_eq!(model.get_type_field(&document, "version").unwrap(), Some(Value::Int(1)));
    model.set(document.class(), "version", "2").unwrap();
    assert_eq!(model.get(document.class(), "version").unwrap(), Some(Value::Int(2)));
    assert_eq!(model.public_attributes(document.class()).unwrap(), ["version"]);

    // instances do not see the type-level slot
    let d = model.create(&document, Arguments::new()).unwrap();
    assert!(matches!(model.get(d, "version"), Err(HbdsError::UndeclaredAttribute { .. })));
    assert!(matches!(
        model.set_type_field(&document, "title", Some(Value::from("x"))),
        Err(HbdsError::UndeclaredAttribute { .. })
    ));
    // a class without metaclass carries no public type fields
    assert!(matches!(model.set(meta.class(), "version", 3i64), Err(HbdsError::UndeclaredAttribute { .. })));
}
