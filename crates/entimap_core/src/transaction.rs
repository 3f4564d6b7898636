//! Transactions: a unit of work that also inserts new aggregates.

use crate::config::UnitOfWorkConfig;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::mapper::Mapper;
use crate::registry::Registry;
use crate::tracker::{EntryState, TrackedEntry};
use crate::unit_of_work::{Phase, UnitOfWork};
use std::ops::Deref;
use std::sync::Arc;

/// A [`UnitOfWork`] that accepts new aggregate roots.
///
/// On commit, new roots are inserted (with their children) before dirty
/// entries are written and deleted entries removed. Everything else,
/// including rollback and completion, behaves as on the unit of work.
///
/// ```
/// use std::sync::Arc;
/// use entimap_codec::Value;
/// use entimap_core::schema::{EntityClass, ScalarAttribute, Schema, ValueType};
/// use entimap_core::{Entity, EntityId, MemoryMapper, Registry, Transaction};
///
/// let mut user = EntityClass::new("User");
/// user.declare_scalar(ScalarAttribute::new("name", ValueType::Text)).unwrap();
/// let mut builder = Schema::builder();
/// builder.register(user).unwrap();
/// let schema = builder.build().unwrap();
///
/// let registry = Registry::new();
/// let tx = Transaction::new(&registry, Arc::new(MemoryMapper::new()));
/// let u = Entity::new(&schema, "User", Value::record([("name", "ada")])).unwrap();
/// tx.register_new(&u).unwrap();
/// tx.commit().unwrap();
/// assert_eq!(u.id(), Some(EntityId::new(1)));
/// ```
#[derive(Clone, Debug)]
pub struct Transaction {
    uow: UnitOfWork,
}

impl Transaction {
    /// Creates and registers a transaction.
    pub fn new(registry: &Registry, mapper: Arc<dyn Mapper>) -> Self {
        Self {
            uow: UnitOfWork::new(registry, mapper),
        }
    }

    /// Creates a transaction with explicit configuration.
    pub fn with_config(
        registry: &Registry,
        mapper: Arc<dyn Mapper>,
        config: UnitOfWorkConfig,
    ) -> Self {
        Self {
            uow: UnitOfWork::with_config(registry, mapper, config),
        }
    }

    /// Registers an aggregate root to be inserted on commit.
    ///
    /// Children are inserted with their root and cannot be registered on
    /// their own.
    pub fn register_new(&self, entity: &Entity) -> CoreResult<Arc<TrackedEntry>> {
        self.uow.require_root(entity, EntryState::New)?;
        self.uow.register(entity, EntryState::New)
    }

    /// Inserts new roots, then commits as [`UnitOfWork::commit`] does.
    pub fn commit(&self) -> CoreResult<()> {
        let _guard = self.uow.enter(Phase::Committing)?;
        let new = self.uow.entries(EntryState::New);
        self.uow.flush(&new)
    }

    /// The underlying unit of work.
    #[must_use]
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    /// Unwraps the underlying unit of work.
    #[must_use]
    pub fn into_inner(self) -> UnitOfWork {
        self.uow
    }
}

impl Deref for Transaction {
    type Target = UnitOfWork;

    fn deref(&self) -> &UnitOfWork {
        &self.uow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::mapper::MemoryMapper;
    use crate::persist;
    use crate::schema::{EntityClass, ScalarAttribute, Schema, ValueType};
    use crate::types::EntityId;
    use entimap_codec::Value;

    fn schema() -> Arc<Schema> {
        let mut company = EntityClass::new("Company");
        company
            .declare_scalar(ScalarAttribute::new("name", ValueType::Text))
            .unwrap();
        company.declare_child("local_offices", "LocalOffice").unwrap();
        let mut office = EntityClass::new("LocalOffice");
        office
            .declare_scalar(ScalarAttribute::new("description", ValueType::Text))
            .unwrap();
        office.declare_parent("company", "Company").unwrap();
        let mut builder = Schema::builder();
        builder.register(company).unwrap().register(office).unwrap();
        builder.build().unwrap()
    }

    fn company(schema: &Arc<Schema>, name: &str) -> Entity {
        let c = Entity::new(schema, "Company", Value::record([("name", name)])).unwrap();
        c.make_child("local_offices", Value::record([("description", "hq")]))
            .unwrap();
        c
    }

    #[test]
    fn commit_inserts_new_roots_with_children() {
        let schema = schema();
        let mapper = Arc::new(MemoryMapper::new());
        let registry = Registry::new();
        let tx = Transaction::new(&registry, mapper.clone());

        let first = company(&schema, "one");
        let second = company(&schema, "two");
        tx.register_new(&first).unwrap();
        tx.register_new(&second).unwrap();
        tx.commit().unwrap();

        assert_eq!(first.id(), Some(EntityId::new(1)));
        assert_eq!(second.id(), Some(EntityId::new(2)));
        assert_eq!(mapper.count("LocalOffice"), 2);
        assert!(tx.entries(EntryState::New).is_empty());
        assert_eq!(tx.entries(EntryState::Dirty).len(), 2);

        let entry = tx.fetch_object_by_id("Company", EntityId::new(2)).unwrap();
        assert_eq!(entry.entity(), &second);
    }

    #[test]
    fn new_roots_are_saved_once() {
        let schema = schema();
        let mapper = Arc::new(MemoryMapper::new());
        let registry = Registry::new();
        let tx = Transaction::new(&registry, mapper.clone());
        let c = company(&schema, "one");

        tx.register_new(&c).unwrap();
        tx.commit().unwrap();
        tx.commit().unwrap();

        assert_eq!(mapper.count("Company"), 1);
        assert_eq!(mapper.count("LocalOffice"), 1);
    }

    #[test]
    fn children_cannot_be_registered_new() {
        let schema = schema();
        let registry = Registry::new();
        let tx = Transaction::new(&registry, Arc::new(MemoryMapper::new()));
        let c = company(&schema, "one");
        let office = c.children("local_offices").remove(0);

        assert!(matches!(
            tx.register_new(&office),
            Err(CoreError::OwnershipViolation { .. })
        ));
        assert!(tx.tracked(|t| t.is_empty()));
    }

    #[test]
    fn rollback_discards_new_entries() {
        let schema = schema();
        let mapper = Arc::new(MemoryMapper::new());
        let registry = Registry::new();
        let tx = Transaction::new(&registry, mapper.clone());
        let c = company(&schema, "one");

        tx.register_new(&c).unwrap();
        tx.rollback().unwrap();
        assert!(tx.tracked(|t| t.is_empty()));
        tx.commit().unwrap();
        assert_eq!(mapper.count("Company"), 0);
        assert!(c.id().is_none());
    }

    #[test]
    fn deleting_a_committed_root_removes_its_children() {
        let schema = schema();
        let mapper = Arc::new(MemoryMapper::new());
        let registry = Registry::new();
        let tx = Transaction::new(&registry, mapper.clone());
        let c = company(&schema, "one");
        tx.register_new(&c).unwrap();
        tx.commit().unwrap();

        tx.register_deleted(&c).unwrap();
        tx.commit().unwrap();
        assert_eq!(mapper.count("Company"), 0);
        assert_eq!(mapper.count("LocalOffice"), 0);
        assert!(persist::find_by_id(mapper.as_ref(), &schema, "Company", EntityId::new(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn into_inner_keeps_registration() {
        let registry = Registry::new();
        let tx = Transaction::new(&registry, Arc::new(MemoryMapper::new()));
        let id = tx.id();
        let uow = tx.into_inner();
        assert_eq!(uow.id(), id);
        assert!(registry.get(id).is_some());
    }
}
