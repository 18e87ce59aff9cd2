//! End-to-end scenarios over the public repository surface.

mod support;

use pilardb::{AccessPath, prelude::*};
use support::*;

#[test]
fn insert_lookup_update() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();

    let saved = people.save(Person::new("Alice", 30)).unwrap();
    let id = saved.id.expect("identity id assigned");
    assert_eq!(id, 1);

    let found = people.find_by_id(id).unwrap().unwrap();
    assert_eq!(found.name.as_deref(), Some("Alice"));
    assert_eq!(found.age, 30);

    let mut updated = found;
    updated.age = 31;
    people.save(updated).unwrap();

    let older = run(&people, "findByAgeGreaterThan", &[Value::Int(30)])
        .many()
        .unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].id, Some(id));
    assert_eq!(older[0].age, 31);

    // Update happened in place: still one live row.
    assert_eq!(people.count(), 1);
}

#[test]
fn delete_and_id_freshness() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();

    for (name, age) in [("a", 1), ("b", 2), ("c", 3)] {
        people.save(Person::new(name, age)).unwrap();
    }
    assert_eq!(people.count(), 3);

    assert!(people.delete_by_id(2i64).unwrap());
    assert!(!people.delete_by_id(2i64).unwrap(), "double delete is a no-op");
    assert_eq!(people.count(), 2);
    assert!(people.find_by_id(2i64).unwrap().is_none());
    assert!(!people.exists_by_id(2i64).unwrap());

    // A fresh save takes a fresh id even though the slot may be recycled.
    let fresh = people.save(Person::new("d", 4)).unwrap();
    assert_eq!(fresh.id, Some(4));
    assert_eq!(people.count(), 3);
}

#[test]
fn range_order_and_top() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for age in [20, 30, 40, 50] {
        people.save(Person::new(&format!("p{age}"), age)).unwrap();
    }

    let mid = run(
        &people,
        "findByAgeBetween",
        &[Value::Int(25), Value::Int(45)],
    )
    .many()
    .unwrap();
    let mut ages: Vec<i32> = mid.iter().map(|p| p.age).collect();
    ages.sort_unstable();
    assert_eq!(ages, vec![30, 40]);

    let top = run(&people, "findTop2ByOrderByAgeAsc", &[]).many().unwrap();
    let ages: Vec<i32> = top.iter().map(|p| p.age).collect();
    assert_eq!(ages, vec![20, 30]);

    let desc = run(&people, "findAllByOrderByAgeDesc", &[]).many().unwrap();
    let ages: Vec<i32> = desc.iter().map(|p| p.age).collect();
    assert_eq!(ages, vec![50, 40, 30, 20]);
}

#[test]
fn embedded_path_query_and_update() {
    let arena = user_arena();
    let users = arena.repository::<User>().unwrap();

    let mut user = User {
        id: None,
        username: Some("jm".to_owned()),
        profile: Profile {
            first_name: Some("Juan".to_owned()),
            email: Some("jm@example.com".to_owned()),
            address: Address {
                city: Some("Madrid".to_owned()),
                postal_code: Some("28001".to_owned()),
            },
        },
    };
    user = users.save(user).unwrap();

    let madrid = run(&users, "findByProfileAddressCity", &[Value::from("Madrid")])
        .many()
        .unwrap();
    assert_eq!(madrid.len(), 1);
    assert_eq!(madrid[0], users.find_by_id(user.id.unwrap()).unwrap().unwrap());

    user.profile.address.city = Some("Bogota".to_owned());
    users.save(user).unwrap();

    assert!(
        run(&users, "findByProfileAddressCity", &[Value::from("Madrid")])
            .many()
            .unwrap()
            .is_empty()
    );
    let bogota = run(&users, "findByProfileAddressCity", &[Value::from("Bogota")])
        .many()
        .unwrap();
    assert_eq!(bogota.len(), 1);
}

#[test]
fn cascade_save_and_relation_navigation() {
    let arena = shop_arena();
    let customers = arena.repository::<Customer>().unwrap();
    let orders = arena.repository::<Order>().unwrap();

    let customer = Customer {
        id: None,
        name: Some("Acme".to_owned()),
        orders: vec![Order::with_status("PAID"), Order::with_status("OPEN")],
    };
    let customer = customers.save(customer).unwrap();
    let customer_id = customer.id.unwrap();

    let attached = run(&orders, "findByCustomerId", &[Value::Long(customer_id)])
        .many()
        .unwrap();
    assert_eq!(attached.len(), 2);
    assert!(attached.iter().all(|o| o.customer_id == Some(customer_id)));

    // Parent navigated through a child-side condition.
    let with_paid = run(&customers, "findByOrdersStatus", &[Value::from("PAID")])
        .many()
        .unwrap();
    assert_eq!(with_paid.len(), 1);
    assert_eq!(with_paid[0].id, Some(customer_id));
    assert_eq!(with_paid[0].orders.len(), 2, "orders eagerly loaded");

    assert!(
        run(&customers, "findByOrdersStatus", &[Value::from("SHIPPED")])
            .many()
            .unwrap()
            .is_empty()
    );

    // Child navigated through a parent-side condition.
    let by_name = run(&orders, "findByCustomerName", &[Value::from("Acme")])
        .many()
        .unwrap();
    assert_eq!(by_name.len(), 2);

    // Materializing a customer by id loads its orders too.
    let reloaded = customers.find_by_id(customer_id).unwrap().unwrap();
    assert_eq!(reloaded.orders.len(), 2);
}

#[test]
fn or_groups_union_their_branches() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for (name, age) in [("young", 10), ("target", 40), ("other", 50)] {
        people.save(Person::new(name, age)).unwrap();
    }

    let got = run(
        &people,
        "findByAgeLessThanOrNameEq",
        &[Value::Int(20), Value::from("target")],
    )
    .many()
    .unwrap();
    let mut names: Vec<_> = got.iter().map(|p| p.name.clone().unwrap()).collect();
    names.sort();
    assert_eq!(names, vec!["target", "young"]);
}

#[test]
fn string_anchors_and_case_fold() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for name in ["Madrid", "Malaga", "Bogota"] {
        people.save(Person::new(name, 1)).unwrap();
    }

    let ma = run(&people, "findByNameStartsWith", &[Value::from("Ma")])
        .many()
        .unwrap();
    assert_eq!(ma.len(), 2);

    let ta = run(&people, "findByNameEndsWith", &[Value::from("ta")])
        .many()
        .unwrap();
    assert_eq!(ta.len(), 1);

    let drid = run(&people, "findByNameContains", &[Value::from("dri")])
        .many()
        .unwrap();
    assert_eq!(drid.len(), 1);

    let folded = run(&people, "findByNameIgnoreCase", &[Value::from("mAdRiD")])
        .many()
        .unwrap();
    assert_eq!(folded.len(), 1);
}

#[test]
fn null_semantics() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    people
        .save(Person {
            id: None,
            name: None,
            age: 5,
        })
        .unwrap();
    people.save(Person::new("", 6)).unwrap();

    let unnamed = run(&people, "findByNameIsNull", &[]).many().unwrap();
    assert_eq!(unnamed.len(), 1, "null is distinct from empty");
    assert_eq!(unnamed[0].age, 5);

    // Round trip keeps the null.
    let back = people.find_by_id(unnamed[0].id.unwrap()).unwrap().unwrap();
    assert_eq!(back.name, None);
}

#[test]
fn composite_index_paths() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for (name, age) in [("a", 10), ("a", 20), ("b", 10)] {
        people.save(Person::new(name, age)).unwrap();
    }

    let exact = run(
        &people,
        "findByNameAndAge",
        &[Value::from("a"), Value::Int(20)],
    )
    .many()
    .unwrap();
    assert_eq!(exact.len(), 1);

    let ranged = run(
        &people,
        "findByNameAndAgeBetween",
        &[Value::from("a"), Value::Int(5), Value::Int(15)],
    )
    .many()
    .unwrap();
    assert_eq!(ranged.len(), 1);
    assert_eq!(ranged[0].age, 10);
}

#[test]
fn count_exists_delete_shapes() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for age in [10, 20, 30] {
        people.save(Person::new(&format!("p{age}"), age)).unwrap();
    }

    let n = run(&people, "countByAgeGreaterThan", &[Value::Int(15)])
        .count()
        .unwrap();
    assert_eq!(n, 2);

    assert!(run(&people, "existsByName", &[Value::from("p10")]).exists().unwrap());
    assert!(!run(&people, "existsByName", &[Value::from("zz")]).exists().unwrap());

    let gone = run(&people, "deleteByAgeLessThan", &[Value::Int(25)])
        .deleted()
        .unwrap();
    assert_eq!(gone, 2);
    assert_eq!(people.count(), 1);
}

#[test]
fn projection_and_grouping() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for (name, age) in [("x", 10), ("y", 10), ("z", 20)] {
        people.save(Person::new(name, age)).unwrap();
    }

    let rows = run(&people, "projectNameAge", &[]).projected().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.len() == 2));
    assert!(rows.iter().any(|r| r[0] == Value::from("x") && r[1] == Value::Int(10)));

    let groups = run(&people, "groupByAge", &[]).grouped().unwrap();
    assert_eq!(groups.len(), 2);
    let ten = groups.iter().find(|(k, _)| *k == Value::Int(10)).unwrap();
    assert_eq!(ten.1.len(), 2);
}

#[test]
fn optional_returns_first_match() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    people.save(Person::new("solo", 1)).unwrap();

    let hit = run(&people, "findOneByName", &[Value::from("solo")])
        .one()
        .unwrap();
    assert!(hit.is_some());

    let miss = run(&people, "findOneByName", &[Value::from("nobody")])
        .one()
        .unwrap();
    assert!(miss.is_none());
}

#[test]
fn in_list_binding() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for age in [10, 20, 30] {
        people.save(Person::new(&format!("p{age}"), age)).unwrap();
    }

    let got = run(
        &people,
        "findByAgeIn",
        &[Value::List(vec![Value::Int(10), Value::Int(30), Value::Int(99)])],
    )
    .many()
    .unwrap();
    assert_eq!(got.len(), 2);
}

#[test]
fn batch_operations() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();

    let saved = people
        .save_all((0..10).map(|i| Person::new(&format!("p{i}"), i)))
        .unwrap();
    assert_eq!(saved.len(), 10);
    assert_eq!(people.count(), 10);

    let some = people
        .find_all_by_id(saved.iter().take(3).map(|p| p.id.unwrap()))
        .unwrap();
    assert_eq!(some.len(), 3);

    assert_eq!(people.find_all().unwrap().len(), 10);
    assert_eq!(people.delete_all().unwrap(), 10);
    assert_eq!(people.count(), 0);
}

#[test]
fn trace_reports_access_path() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    people.save(Person::new("Alice", 30)).unwrap();

    let id = people.query_id("findByName").unwrap();
    let (_, trace) = people.trace(id, &[Value::from("Alice")]).unwrap();
    assert_eq!(trace.query, "findByName");
    assert_eq!(trace.groups.len(), 1);
    assert_eq!(
        trace.groups[0].access,
        AccessPath::Index {
            name: "person_name_hash"
        }
    );
    assert_eq!(trace.result_rows, 1);

    let id = people.query_id("findByAgeBetween").unwrap();
    let (_, trace) = people
        .trace(id, &[Value::Int(0), Value::Int(100)])
        .unwrap();
    assert_eq!(
        trace.groups[0].access,
        AccessPath::Index {
            name: "person_age_range"
        }
    );
}

#[test]
fn disabled_text_indexes_fall_back_to_scans() {
    let mut config = ArenaConfig::default();
    config.enable_prefix_index = false;
    config.enable_suffix_index = false;
    let mut builder = Arena::builder(config);
    builder.register::<Person>().unwrap();
    builder.queries::<Person>(person_queries()).unwrap();
    let arena = builder.build().unwrap();

    let people = arena.repository::<Person>().unwrap();
    people.save(Person::new("Madrid", 1)).unwrap();

    let id = people.query_id("findByNameStartsWith").unwrap();
    let (out, trace) = people.trace(id, &[Value::from("Ma")]).unwrap();
    assert_eq!(out.many().unwrap().len(), 1);
    assert_eq!(trace.groups[0].access, AccessPath::ConditionScan);
}

#[test]
fn storage_report_counts() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    for i in 0..5 {
        people.save(Person::new(&format!("p{i}"), i)).unwrap();
    }
    people.delete_by_id(1i64).unwrap();

    let report = arena.storage_report();
    assert_eq!(report.tables.len(), 1);
    let t = &report.tables[0];
    assert_eq!(t.entity, "Person");
    assert_eq!(t.live_rows, 4);
    assert_eq!(t.allocated_rows, 5);
    assert!(t.approx_bytes > 0);
    assert_eq!(report.total_live_rows(), 4);
}

#[test]
fn registration_failures_abort_build() {
    // Duplicate registration.
    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Person>().unwrap();
    let err = builder.register::<Person>().unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(pilardb::error::RegistryError::DuplicateRegistration { .. })
    ));

    // Unresolvable property path in a query.
    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Person>().unwrap();
    builder
        .queries::<Person>(vec![
            MethodDescriptor::find("findByNope").cond("nope", Operator::Eq),
        ])
        .unwrap();
    let err = builder.build().unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(pilardb::error::PlanError::InvalidPropertyPath { .. })
    ));

    // Ordered comparison on a string column without a range index.
    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<User>().unwrap();
    builder
        .queries::<User>(vec![
            MethodDescriptor::find("findByUsernameBetween").cond("username", Operator::Between),
        ])
        .unwrap();
    let err = builder.build().unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(pilardb::error::PlanError::UnsupportedOperator { .. })
    ));

    // Declared arity out of step with conditions.
    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Person>().unwrap();
    let mut bad = MethodDescriptor::find("findByName").cond("name", Operator::Eq);
    bad.arity = 3;
    builder.queries::<Person>(vec![bad]).unwrap();
    let err = builder.build().unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(pilardb::error::PlanError::ArityMismatch { .. })
    ));
}

#[test]
fn invoke_argument_errors() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    let id = people.query_id("findByName").unwrap();

    // Wrong arity at dispatch.
    assert!(people.invoke(id, &[]).is_err());

    // Unassignable argument type.
    let err = people.invoke(id, &[Value::Bool(true)]).unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(pilardb::error::PlanError::ArgumentType { .. })
    ));
}

#[test]
fn capacity_exhaustion_surfaces() {
    let config = ArenaConfig::default().page_size(4).max_pages(1);
    let mut builder = Arena::builder(config);
    builder.register::<Person>().unwrap();
    let arena = builder.build().unwrap();
    let people = arena.repository::<Person>().unwrap();

    for i in 0..4 {
        people.save(Person::new(&format!("p{i}"), i)).unwrap();
    }
    let err = people.save(Person::new("overflow", 99)).unwrap_err();
    assert!(err.is_capacity_exceeded());

    // Tombstoning frees a slot for reuse.
    people.delete_by_id(1i64).unwrap();
    people.save(Person::new("fits", 1)).unwrap();
}

#[test]
fn custom_id_generation_failures() {
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Gadget {
        id: Option<i64>,
    }
    impl Entity for Gadget {
        fn descriptor() -> EntityDescriptor<Self> {
            EntityDescriptor::new("Gadget")
                .id_strategy(IdStrategy::Custom(|| Value::Long(7)))
                .field(
                    FieldDescriptor::new(
                        "id",
                        TypeCode::LONG,
                        |g: &Self| g.id.into(),
                        |g, v| g.id = v.as_long(),
                    )
                    .id(),
                )
        }
    }

    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Gadget>().unwrap();
    let arena = builder.build().unwrap();
    let gadgets = arena.repository::<Gadget>().unwrap();

    gadgets.save(Gadget::default()).unwrap();
    // Generator always returns 7: second generated id collides.
    let err = gadgets.save(Gadget::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::Execute(pilardb::error::ExecutorError::IdGenerationFailure { .. })
    ));
}

#[test]
fn uuid_ids_are_assigned() {
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Doc {
        id: Option<String>,
        title: Option<String>,
    }
    impl Entity for Doc {
        fn descriptor() -> EntityDescriptor<Self> {
            EntityDescriptor::new("Doc")
                .id_strategy(IdStrategy::Uuid)
                .field(
                    FieldDescriptor::new(
                        "id",
                        TypeCode::STRING,
                        |d: &Self| d.id.clone().into(),
                        |d, v| d.id = v.as_str().map(str::to_owned),
                    )
                    .id(),
                )
                .field(
                    FieldDescriptor::new(
                        "title",
                        TypeCode::STRING,
                        |d: &Self| d.title.clone().into(),
                        |d, v| d.title = v.as_str().map(str::to_owned),
                    )
                    .nullable(),
                )
        }
    }

    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Doc>().unwrap();
    let arena = builder.build().unwrap();
    let docs = arena.repository::<Doc>().unwrap();

    let a = docs.save(Doc { id: None, title: Some("a".into()) }).unwrap();
    let b = docs.save(Doc { id: None, title: Some("b".into()) }).unwrap();
    let id_a = a.id.unwrap();
    assert_ne!(Some(&id_a), b.id.as_ref());
    assert_eq!(id_a.len(), 36);
    assert!(docs.find_by_id(id_a).unwrap().is_some());
}

#[test]
fn round_trip_all_type_codes() {
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Sample {
        id: Option<i64>,
        i: i32,
        l: i64,
        b: bool,
        y: i8,
        s: i16,
        c: char,
        f: f32,
        d: f64,
        t: Option<String>,
    }
    impl Entity for Sample {
        fn descriptor() -> EntityDescriptor<Self> {
            EntityDescriptor::new("Sample")
                .field(
                    FieldDescriptor::new(
                        "id",
                        TypeCode::LONG,
                        |x: &Self| x.id.into(),
                        |x, v| x.id = v.as_long(),
                    )
                    .id(),
                )
                .field(FieldDescriptor::new(
                    "i",
                    TypeCode::INT,
                    |x| Value::Int(x.i),
                    |x, v| x.i = v.as_long().unwrap_or_default() as i32,
                ))
                .field(FieldDescriptor::new(
                    "l",
                    TypeCode::LONG,
                    |x| Value::Long(x.l),
                    |x, v| x.l = v.as_long().unwrap_or_default(),
                ))
                .field(FieldDescriptor::new(
                    "b",
                    TypeCode::BOOL,
                    |x| Value::Bool(x.b),
                    |x, v| x.b = v.as_bool().unwrap_or_default(),
                ))
                .field(FieldDescriptor::new(
                    "y",
                    TypeCode::BYTE,
                    |x| Value::Byte(x.y),
                    |x, v| x.y = v.as_long().unwrap_or_default() as i8,
                ))
                .field(FieldDescriptor::new(
                    "s",
                    TypeCode::SHORT,
                    |x| Value::Short(x.s),
                    |x, v| x.s = v.as_long().unwrap_or_default() as i16,
                ))
                .field(FieldDescriptor::new(
                    "c",
                    TypeCode::CHAR,
                    |x| Value::Char(x.c),
                    |x, v| {
                        x.c = match v {
                            Value::Char(c) => c,
                            _ => '\u{0}',
                        }
                    },
                ))
                .field(FieldDescriptor::new(
                    "f",
                    TypeCode::FLOAT,
                    |x| Value::Float(x.f),
                    |x, v| {
                        x.f = match v {
                            Value::Float(f) => f,
                            _ => 0.0,
                        }
                    },
                ))
                .field(FieldDescriptor::new(
                    "d",
                    TypeCode::DOUBLE,
                    |x| Value::Double(x.d),
                    |x, v| {
                        x.d = match v {
                            Value::Double(d) => d,
                            _ => 0.0,
                        }
                    },
                ))
                .field(
                    FieldDescriptor::new(
                        "t",
                        TypeCode::STRING,
                        |x: &Self| x.t.clone().into(),
                        |x, v| x.t = v.as_str().map(str::to_owned),
                    )
                    .nullable(),
                )
        }
    }

    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Sample>().unwrap();
    let arena = builder.build().unwrap();
    let samples = arena.repository::<Sample>().unwrap();

    let original = Sample {
        id: None,
        i: -42,
        l: i64::MIN + 1,
        b: true,
        y: -7,
        s: 3000,
        c: 'ß',
        f: -1.5,
        d: 2.5e100,
        t: None,
    };
    let saved = samples.save(original.clone()).unwrap();
    let loaded = samples.find_by_id(saved.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.i, original.i);
    assert_eq!(loaded.l, original.l);
    assert_eq!(loaded.b, original.b);
    assert_eq!(loaded.y, original.y);
    assert_eq!(loaded.s, original.s);
    assert_eq!(loaded.c, original.c);
    assert_eq!(loaded.f.to_bits(), original.f.to_bits());
    assert_eq!(loaded.d.to_bits(), original.d.to_bits());
    assert_eq!(loaded.t, None);
}
