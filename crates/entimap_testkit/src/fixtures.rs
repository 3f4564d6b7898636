//! Schemas, inputs and journal helpers shared by tests.

use entimap_codec::Value;
use entimap_core::schema::{EntityClass, ScalarAttribute, Schema, ValueType};
use entimap_core::{persist, Entity, JournalConfig, JournalMapper, Mapper};
use entimap_storage::FileBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// `Company` owning `LocalOffice`s owning `Address`es, plus a `Country`
/// root that addresses reference by value.
pub fn company_schema() -> Arc<Schema> {
    let mut company = EntityClass::new("Company");
    company
        .declare_scalar(ScalarAttribute::new("name", ValueType::Text).mandatory())
        .expect("name");
    company
        .declare_child("local_offices", "LocalOffice")
        .expect("local_offices");

    let mut office = EntityClass::new("LocalOffice");
    office
        .declare_scalar(ScalarAttribute::new("description", ValueType::Text))
        .expect("description");
    office.declare_parent("company", "Company").expect("company");
    office
        .declare_child("addresses", "Address")
        .expect("addresses");

    let mut address = EntityClass::new("Address");
    address
        .declare_scalar(ScalarAttribute::new("description", ValueType::Text))
        .expect("description");
    address
        .declare_parent("local_office", "LocalOffice")
        .expect("local_office");
    address
        .declare_value_ref("country", "Country")
        .expect("country");

    let mut country = EntityClass::new("Country");
    country
        .declare_scalar(ScalarAttribute::new("code", ValueType::Text).mandatory())
        .expect("code");

    let mut builder = Schema::builder();
    builder
        .register(company)
        .expect("Company")
        .register(office)
        .expect("LocalOffice")
        .register(address)
        .expect("Address")
        .register(country)
        .expect("Country");
    builder.build().expect("company schema")
}

/// A single `User` root with a name and an optional age.
pub fn user_schema() -> Arc<Schema> {
    let mut user = EntityClass::new("User");
    user.declare_scalar(ScalarAttribute::new("name", ValueType::Text))
        .expect("name");
    user.declare_scalar(ScalarAttribute::new("age", ValueType::Integer))
        .expect("age");
    let mut builder = Schema::builder();
    builder.register(user).expect("register user");
    builder.build().expect("user schema")
}

/// Office input with one address per description.
pub fn office_input(description: &str, addresses: &[&str]) -> Value {
    let addresses = addresses
        .iter()
        .map(|a| Value::record([("description", *a)]))
        .collect();
    Value::record([
        ("description", Value::from(description)),
        ("addresses", Value::List(addresses)),
    ])
}

/// Company input owning `offices`.
pub fn company_input(name: &str, offices: Vec<Value>) -> Value {
    Value::record([
        ("name", Value::from(name)),
        ("local_offices", Value::List(offices)),
    ])
}

/// Stores one user per name directly through `mapper`.
pub fn seed_users(mapper: &dyn Mapper, schema: &Arc<Schema>, names: &[&str]) -> Vec<Entity> {
    names
        .iter()
        .map(|name| {
            let user = Entity::new(schema, "User", Value::record([("name", *name)]))
                .expect("user input");
            persist::save(mapper, &user).expect("seed user");
            user
        })
        .collect()
}

/// A file-backed journal in a temporary directory.
pub struct TestJournal {
    dir: TempDir,
}

impl TestJournal {
    /// Creates an empty temporary directory for the journal.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    /// Path of the journal file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("entimap.journal")
    }

    /// Opens (or reopens) the journal, replaying what is on disk.
    pub fn open(&self) -> JournalMapper {
        let backend = FileBackend::open(&self.path()).expect("journal file");
        JournalMapper::open(Box::new(backend), JournalConfig::default()).expect("open journal")
    }
}

impl Default for TestJournal {
    fn default() -> Self {
        Self::new()
    }
}
