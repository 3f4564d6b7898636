//! Aggregates created and committed through a transaction.

use entimap_codec::Value;
use entimap_core::{
    persist, CoreError, Entity, EntityId, EntryState, MemoryMapper, Registry, Transaction,
};
use entimap_testkit::{company_input, company_schema, init_logging, office_input};
use std::sync::Arc;

fn text(entity: &Entity, name: &str) -> Option<String> {
    entity.get(name).and_then(|v| v.as_text().map(str::to_string))
}

fn descriptions(entities: &[Entity]) -> Vec<Option<String>> {
    entities.iter().map(|e| text(e, "description")).collect()
}

#[test]
fn creates_a_company_and_retrieves_it_correctly() {
    init_logging();
    let schema = company_schema();
    let mapper = Arc::new(MemoryMapper::new());
    let registry = Registry::new();
    let tx = Transaction::new(&registry, mapper.clone());

    let a_company = Entity::new(
        &schema,
        "Company",
        company_input("Abstra.cc S.A", vec![office_input("branch1", &["addr1"])]),
    )
    .unwrap();
    tx.register_new(&a_company).unwrap();
    a_company
        .make_child("local_offices", office_input("branch2", &["addr2.1"]))
        .unwrap();

    assert_eq!(a_company.class_name(), "Company");
    assert_eq!(text(&a_company, "name").as_deref(), Some("Abstra.cc S.A"));
    let offices = a_company.children("local_offices");
    assert_eq!(offices.len(), 2);
    assert_eq!(offices[0].class_name(), "LocalOffice");
    assert_eq!(
        descriptions(&offices[0].children("addresses")),
        vec![Some("addr1".to_string())]
    );
    let branch2_address = offices[1].children("addresses").remove(0);
    assert_eq!(branch2_address.class_name(), "Address");

    assert!(matches!(
        offices[1].create(mapper.as_ref()),
        Err(CoreError::OwnershipViolation { .. })
    ));
    assert!(matches!(
        branch2_address.create(mapper.as_ref()),
        Err(CoreError::OwnershipViolation { .. })
    ));

    tx.commit().unwrap();

    let abstra = persist::find_by_id(mapper.as_ref(), &schema, "Company", EntityId::new(1))
        .unwrap()
        .unwrap();
    assert_eq!(abstra.id(), Some(EntityId::new(1)));
    assert_eq!(text(&abstra, "name").as_deref(), Some("Abstra.cc S.A"));
    let offices = abstra.children("local_offices");
    assert_eq!(
        descriptions(&offices),
        vec![Some("branch1".to_string()), Some("branch2".to_string())]
    );
    assert_eq!(
        descriptions(&offices[0].children("addresses")),
        vec![Some("addr1".to_string())]
    );
    assert_eq!(
        descriptions(&offices[1].children("addresses")),
        vec![Some("addr2.1".to_string())]
    );
    assert_eq!(offices[1].parent().as_ref(), Some(&abstra));

    let b_company = Entity::new(&schema, "Company", Value::Map(vec![])).unwrap();
    b_company
        .make(company_input(
            "Smarty Pants, Inc.",
            vec![office_input("foo del 1", &["foo dir 1", "foo dir 2"])],
        ))
        .unwrap();
    tx.register_new(&b_company).unwrap();
    tx.commit().unwrap();

    let smarty_pants = persist::find_by_id(mapper.as_ref(), &schema, "Company", EntityId::new(2))
        .unwrap()
        .unwrap();
    assert_eq!(smarty_pants.id(), Some(EntityId::new(2)));
    assert_eq!(
        text(&smarty_pants, "name").as_deref(),
        Some("Smarty Pants, Inc.")
    );
    let offices = smarty_pants.children("local_offices");
    assert_eq!(offices.len(), 1);
    assert_eq!(
        descriptions(&offices[0].children("addresses")),
        vec![Some("foo dir 1".to_string()), Some("foo dir 2".to_string())]
    );

    assert_eq!(
        persist::find_all(mapper.as_ref(), &schema, "Company")
            .unwrap()
            .len(),
        2
    );
    assert_eq!(tx.entries(EntryState::Dirty).len(), 2);
}

#[test]
fn removed_children_are_purged_on_the_next_commit() {
    init_logging();
    let schema = company_schema();
    let mapper = Arc::new(MemoryMapper::new());
    let registry = Registry::new();
    let tx = Transaction::new(&registry, mapper.clone());

    let company = Entity::new(
        &schema,
        "Company",
        company_input(
            "Abstra.cc S.A",
            vec![
                office_input("branch1", &["addr1"]),
                office_input("branch2", &["addr2"]),
            ],
        ),
    )
    .unwrap();
    tx.register_new(&company).unwrap();
    tx.commit().unwrap();
    assert_eq!(mapper.count("Address"), 2);

    let id = company.id().unwrap();
    let offices = company.children("local_offices");
    assert!(company.remove_child("local_offices", &offices[0]).unwrap());
    offices[1]
        .make_child("addresses", Value::record([("description", "addr2.2")]))
        .unwrap();
    company
        .make_child("local_offices", office_input("branch3", &[]))
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(mapper.count("LocalOffice"), 2);
    assert_eq!(mapper.count("Address"), 2);
    let reloaded = persist::find_by_id(mapper.as_ref(), &schema, "Company", id)
        .unwrap()
        .unwrap();
    let offices = reloaded.children("local_offices");
    assert_eq!(
        descriptions(&offices),
        vec![Some("branch2".to_string()), Some("branch3".to_string())]
    );
    assert_eq!(
        descriptions(&offices[0].children("addresses")),
        vec![Some("addr2".to_string()), Some("addr2.2".to_string())]
    );
}

#[test]
fn value_references_are_saved_and_shared_on_load() {
    init_logging();
    let schema = company_schema();
    let mapper = Arc::new(MemoryMapper::new());
    let registry = Registry::new();
    let tx = Transaction::new(&registry, mapper.clone());

    let country = Entity::new(&schema, "Country", Value::record([("code", "AR")])).unwrap();
    let company = Entity::new(
        &schema,
        "Company",
        company_input("Abstra.cc S.A", vec![office_input("branch1", &["a", "b"])]),
    )
    .unwrap();
    for address in company.children("local_offices")[0].children("addresses") {
        address
            .set_reference("country", Some(country.clone()))
            .unwrap();
    }

    tx.register_new(&company).unwrap();
    tx.commit().unwrap();
    assert_eq!(country.id(), Some(EntityId::new(1)));

    let loaded = persist::find_by_id(mapper.as_ref(), &schema, "Company", company.id().unwrap())
        .unwrap()
        .unwrap();
    let addresses = loaded.children("local_offices")[0].children("addresses");
    let first = addresses[0].reference("country").unwrap();
    let second = addresses[1].reference("country").unwrap();
    assert_eq!(first, second);
    assert_eq!(text(&first, "code").as_deref(), Some("AR"));
}

#[test]
fn failed_input_leaves_the_entity_unchanged() {
    let schema = company_schema();
    let company = Entity::new(
        &schema,
        "Company",
        company_input("Abstra.cc S.A", vec![office_input("branch1", &[])]),
    )
    .unwrap();

    let bad = Value::record([
        ("name", Value::from("renamed")),
        (
            "local_offices",
            Value::List(vec![Value::record([("floor", 3)])]),
        ),
    ]);
    assert!(matches!(
        company.make(bad),
        Err(CoreError::AttributeNotAllowed { .. })
    ));
    assert_eq!(text(&company, "name").as_deref(), Some("Abstra.cc S.A"));
    assert_eq!(company.children("local_offices").len(), 1);
}

#[test]
fn non_root_classes_cannot_be_constructed_or_loaded_directly() {
    let schema = company_schema();
    let mapper = MemoryMapper::new();
    assert!(matches!(
        Entity::new(&schema, "LocalOffice", Value::Map(vec![])),
        Err(CoreError::OwnershipViolation { .. })
    ));
    assert!(matches!(
        persist::find_by_id(&mapper, &schema, "Address", EntityId::new(1)),
        Err(CoreError::OwnershipViolation { .. })
    ));
    assert!(matches!(
        persist::find_all(&mapper, &schema, "Nope"),
        Err(CoreError::UnknownClass { .. })
    ));
}
