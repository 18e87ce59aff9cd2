//! Shared fixture entities for the integration suite.
#![allow(dead_code)]

use pilardb::prelude::*;

///
/// Person
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Person {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub age: i32,
}

impl Person {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            id: None,
            name: Some(name.to_owned()),
            age,
        }
    }
}

impl Entity for Person {
    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new("Person")
            .field(
                FieldDescriptor::new(
                    "id",
                    TypeCode::LONG,
                    |p: &Self| p.id.into(),
                    |p, v| p.id = v.as_long(),
                )
                .id(),
            )
            .field(
                FieldDescriptor::new(
                    "name",
                    TypeCode::STRING,
                    |p: &Self| p.name.clone().into(),
                    |p, v| p.name = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
            .field(FieldDescriptor::new(
                "age",
                TypeCode::INT,
                |p| Value::Int(p.age),
                |p, v| p.age = v.as_long().unwrap_or_default() as i32,
            ))
            .index(IndexDescriptor::new("person_age_range", &["age"], IndexKind::Range))
            .index(IndexDescriptor::new("person_name_hash", &["name"], IndexKind::Hash))
            .index(IndexDescriptor::new("person_name_prefix", &["name"], IndexKind::Prefix))
            .index(IndexDescriptor::new("person_name_suffix", &["name"], IndexKind::Suffix))
            .index(IndexDescriptor::new(
                "person_name_age",
                &["name", "age"],
                IndexKind::CompositeHash,
            ))
            .index(IndexDescriptor::new(
                "person_name_age_range",
                &["name", "age"],
                IndexKind::CompositeRange,
            ))
    }
}

pub fn person_queries() -> Vec<MethodDescriptor> {
    vec![
        MethodDescriptor::find("findByName").cond("name", Operator::Eq),
        MethodDescriptor::find("findByNameIgnoreCase").cond_ignore_case("name", Operator::Eq),
        MethodDescriptor::find("findByAgeGreaterThan").cond("age", Operator::Gt),
        MethodDescriptor::find("findByAgeBetween").cond("age", Operator::Between),
        MethodDescriptor::find("findByAgeIn").cond("age", Operator::In),
        MethodDescriptor::find("findByNameStartsWith").cond("name", Operator::StartsWith),
        MethodDescriptor::find("findByNameEndsWith").cond("name", Operator::EndsWith),
        MethodDescriptor::find("findByNameContains").cond("name", Operator::Contains),
        MethodDescriptor::find("findByNameIsNull").cond("name", Operator::IsNull),
        MethodDescriptor::find("findByNameAndAge")
            .cond("name", Operator::Eq)
            .cond("age", Operator::Eq),
        MethodDescriptor::find("findByNameAndAgeBetween")
            .cond("name", Operator::Eq)
            .cond("age", Operator::Between),
        MethodDescriptor::find("findByAgeLessThanOrNameEq")
            .or_group(vec![ConditionDescriptor::new("age", Operator::Lt)])
            .or_group(vec![ConditionDescriptor::new("name", Operator::Eq)]),
        MethodDescriptor::find("findTop2ByOrderByAgeAsc")
            .order_by("age", OrderDirection::Asc)
            .limit(2),
        MethodDescriptor::find("findAllByOrderByAgeDesc").order_by("age", OrderDirection::Desc),
        MethodDescriptor::find_one("findOneByName").cond("name", Operator::Eq),
        MethodDescriptor::count("countByAgeGreaterThan").cond("age", Operator::Gt),
        MethodDescriptor::exists("existsByName").cond("name", Operator::Eq),
        MethodDescriptor::delete("deleteByAgeLessThan").cond("age", Operator::Lt),
        MethodDescriptor::find("projectNameAge").project(vec!["name", "age"]),
        MethodDescriptor::new("groupByAge", Opcode::Find, ReturnKind::GroupedBy("age")),
    ]
}

///
/// User with embedded profile/address
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Address {
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub address: Address,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub profile: Profile,
}

impl Entity for User {
    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new("User")
            .field(
                FieldDescriptor::new(
                    "id",
                    TypeCode::LONG,
                    |u: &Self| u.id.into(),
                    |u, v| u.id = v.as_long(),
                )
                .id(),
            )
            .field(
                FieldDescriptor::new(
                    "username",
                    TypeCode::STRING,
                    |u: &Self| u.username.clone().into(),
                    |u, v| u.username = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
            .field(
                FieldDescriptor::new(
                    "profile.first_name",
                    TypeCode::STRING,
                    |u: &Self| u.profile.first_name.clone().into(),
                    |u, v| u.profile.first_name = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
            .field(
                FieldDescriptor::new(
                    "profile.email",
                    TypeCode::STRING,
                    |u: &Self| u.profile.email.clone().into(),
                    |u, v| u.profile.email = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
            .field(
                FieldDescriptor::new(
                    "profile.address.city",
                    TypeCode::STRING,
                    |u: &Self| u.profile.address.city.clone().into(),
                    |u, v| u.profile.address.city = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
            .field(
                FieldDescriptor::new(
                    "profile.address.postal_code",
                    TypeCode::STRING,
                    |u: &Self| u.profile.address.postal_code.clone().into(),
                    |u, v| u.profile.address.postal_code = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
    }
}

pub fn user_queries() -> Vec<MethodDescriptor> {
    vec![
        MethodDescriptor::find("findByProfileAddressCity")
            .cond("profile.address.city", Operator::Eq),
        MethodDescriptor::find("findByUsername").cond("username", Operator::Eq),
    ]
}

///
/// Customer / Order relationship pair
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Order {
    pub id: Option<i64>,
    pub customer_id: Option<i64>,
    pub status: Option<String>,
}

impl Order {
    pub fn with_status(status: &str) -> Self {
        Self {
            id: None,
            customer_id: None,
            status: Some(status.to_owned()),
        }
    }
}

impl Entity for Order {
    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new("Order")
            .field(
                FieldDescriptor::new(
                    "id",
                    TypeCode::LONG,
                    |o: &Self| o.id.into(),
                    |o, v| o.id = v.as_long(),
                )
                .id(),
            )
            .field(
                FieldDescriptor::new(
                    "customer_id",
                    TypeCode::LONG,
                    |o: &Self| o.customer_id.into(),
                    |o, v| o.customer_id = v.as_long(),
                )
                .nullable(),
            )
            .field(
                FieldDescriptor::new(
                    "status",
                    TypeCode::STRING,
                    |o: &Self| o.status.clone().into(),
                    |o, v| o.status = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
            .index(IndexDescriptor::new(
                "order_customer_fk",
                &["customer_id"],
                IndexKind::Hash,
            ))
            .relation(
                RelationDescriptor::new("customer", RelationKind::ManyToOne, "Customer")
                    .fk("customer_id"),
            )
    }
}

pub fn order_queries() -> Vec<MethodDescriptor> {
    vec![
        MethodDescriptor::find("findByCustomerId").cond("customer_id", Operator::Eq),
        MethodDescriptor::find("findByStatus").cond("status", Operator::Eq),
        MethodDescriptor::find("findByCustomerName").cond("customer.name", Operator::Eq),
    ]
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Customer {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub orders: Vec<Order>,
}

fn cascade_orders(
    customer: &Customer,
    id: &Value,
    ctx: &mut CascadeCtx<'_>,
) -> Result<(), Error> {
    for order in &customer.orders {
        let mut order = order.clone();
        order.customer_id = id.as_long();
        ctx.save(order)?;
    }
    Ok(())
}

fn load_orders(customer: &mut Customer, id: &Value, ctx: &mut LoadCtx<'_>) -> Result<(), Error> {
    customer.orders = ctx.find_related::<Order>("customer_id", id)?;
    Ok(())
}

impl Entity for Customer {
    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new("Customer")
            .field(
                FieldDescriptor::new(
                    "id",
                    TypeCode::LONG,
                    |c: &Self| c.id.into(),
                    |c, v| c.id = v.as_long(),
                )
                .id(),
            )
            .field(
                FieldDescriptor::new(
                    "name",
                    TypeCode::STRING,
                    |c: &Self| c.name.clone().into(),
                    |c, v| c.name = v.as_str().map(str::to_owned),
                )
                .nullable(),
            )
            .relation(
                RelationDescriptor::new("orders", RelationKind::OneToMany, "Order")
                    .fk("customer_id")
                    .on_save(cascade_orders)
                    .on_load(load_orders),
            )
    }
}

pub fn customer_queries() -> Vec<MethodDescriptor> {
    vec![
        MethodDescriptor::find("findByName").cond("name", Operator::Eq),
        MethodDescriptor::find("findByOrdersStatus").cond("orders.status", Operator::Eq),
    ]
}

///
/// Arena assembly helpers
///

pub fn person_arena() -> Arena {
    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Person>().unwrap();
    builder.queries::<Person>(person_queries()).unwrap();
    builder.build().unwrap()
}

pub fn user_arena() -> Arena {
    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<User>().unwrap();
    builder.queries::<User>(user_queries()).unwrap();
    builder.build().unwrap()
}

pub fn shop_arena() -> Arena {
    let mut builder = Arena::builder(ArenaConfig::default());
    builder.register::<Customer>().unwrap();
    builder.register::<Order>().unwrap();
    builder.queries::<Customer>(customer_queries()).unwrap();
    builder.queries::<Order>(order_queries()).unwrap();
    builder.build().unwrap()
}

/// Dispatch helper: resolve by name once, invoke.
pub fn run<E: Entity>(
    repo: &Repository<E>,
    name: &str,
    args: &[Value],
) -> QueryOutput<E> {
    let id = repo
        .query_id(name)
        .unwrap_or_else(|| panic!("query {name} not registered"));
    repo.invoke(id, args).unwrap()
}
