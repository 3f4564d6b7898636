//! Lifecycle state tracking for a unit of work.

use crate::entity::Entity;
use crate::types::{EntityId, EntityKey, UnitOfWorkId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Not yet persisted; inserted on transaction commit.
    New,
    /// Loaded and unchanged.
    Clean,
    /// Modified; written on commit.
    Dirty,
    /// Marked for removal on commit.
    Deleted,
}

impl EntryState {
    /// All states, in commit order.
    pub const ALL: [EntryState; 4] = [
        EntryState::New,
        EntryState::Clean,
        EntryState::Dirty,
        EntryState::Deleted,
    ];
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryState::New => "new",
            EntryState::Clean => "clean",
            EntryState::Dirty => "dirty",
            EntryState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// An entity registered with a unit of work.
///
/// Owned by the unit of work's tracker; the entity keeps only a weak
/// back-reference.
pub struct TrackedEntry {
    entity: Entity,
    unit_of_work: UnitOfWorkId,
    state: Mutex<EntryState>,
}

impl TrackedEntry {
    /// The tracked entity.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EntryState {
        *self.state.lock()
    }

    /// Unit of work tracking the entity.
    #[must_use]
    pub fn unit_of_work_id(&self) -> UnitOfWorkId {
        self.unit_of_work
    }
}

impl fmt::Debug for TrackedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEntry")
            .field("entity", &self.entity)
            .field("state", &self.state())
            .field("unit_of_work", &self.unit_of_work)
            .finish()
    }
}

/// Result of [`ObjectTracker::add`].
#[derive(Debug)]
pub struct Registration {
    /// The entry now tracking the entity.
    pub entry: Arc<TrackedEntry>,
    /// State the entry was in before, `None` if it was just created.
    pub previous: Option<EntryState>,
}

/// State buckets for the entities of one unit of work.
///
/// Each entity appears in exactly one bucket. Entities are keyed by
/// [`EntityKey`] so they can be tracked before they have an id; persisted
/// ones are also indexed by `(class, id)`.
#[derive(Debug, Default)]
pub struct ObjectTracker {
    entries: HashMap<EntityKey, Arc<TrackedEntry>>,
    buckets: HashMap<EntryState, Vec<EntityKey>>,
    by_id: HashMap<(String, EntityId), EntityKey>,
}

impl ObjectTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `entity` under `state`, moving it out of any other bucket.
    pub fn add(
        &mut self,
        entity: &Entity,
        state: EntryState,
        unit_of_work: UnitOfWorkId,
    ) -> Registration {
        let key = entity.key();
        let registration = match self.entries.get(&key).cloned() {
            Some(entry) => {
                let previous = entry.state();
                if previous != state {
                    self.unfile(key, previous);
                    self.buckets.entry(state).or_default().push(key);
                    *entry.state.lock() = state;
                }
                Registration {
                    entry,
                    previous: Some(previous),
                }
            }
            None => {
                let entry = Arc::new(TrackedEntry {
                    entity: entity.clone(),
                    unit_of_work,
                    state: Mutex::new(state),
                });
                self.entries.insert(key, Arc::clone(&entry));
                self.buckets.entry(state).or_default().push(key);
                Registration {
                    entry,
                    previous: None,
                }
            }
        };
        self.reindex(entity);
        registration
    }

    /// Entries in a state, in the order they entered it.
    #[must_use]
    pub fn fetch_by_state(&self, state: EntryState) -> Vec<Arc<TrackedEntry>> {
        self.buckets
            .get(&state)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.entries.get(k).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entry for a persisted entity of `class` with `id`.
    #[must_use]
    pub fn fetch_by_id(&self, class: &str, id: EntityId) -> Option<Arc<TrackedEntry>> {
        self.by_id
            .get(&(class.to_string(), id))
            .and_then(|k| self.entries.get(k))
            .cloned()
    }

    /// Entry for an entity instance.
    #[must_use]
    pub fn get(&self, entity: &Entity) -> Option<Arc<TrackedEntry>> {
        self.entries.get(&entity.key()).cloned()
    }

    /// Stops tracking an entity.
    pub fn remove(&mut self, entity: &Entity) -> Option<Arc<TrackedEntry>> {
        let key = entity.key();
        let entry = self.entries.remove(&key)?;
        self.unfile(key, entry.state());
        self.by_id.retain(|_, k| *k != key);
        Some(entry)
    }

    /// Refreshes the id index for an entity whose id may have changed.
    pub fn reindex(&mut self, entity: &Entity) {
        let key = entity.key();
        if !self.entries.contains_key(&key) {
            return;
        }
        self.by_id.retain(|_, k| *k != key);
        if let Some(id) = entity.id() {
            self.by_id.insert((entity.class_name().to_string(), id), key);
        }
    }

    /// Drops every entry, returning them.
    pub fn clear(&mut self) -> Vec<Arc<TrackedEntry>> {
        self.buckets.clear();
        self.by_id.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entities in a state.
    #[must_use]
    pub fn count(&self, state: EntryState) -> usize {
        self.buckets.get(&state).map_or(0, Vec::len)
    }

    fn unfile(&mut self, key: EntityKey, state: EntryState) {
        if let Some(bucket) = self.buckets.get_mut(&state) {
            bucket.retain(|k| *k != key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityClass, ScalarAttribute, Schema, ValueType};
    use entimap_codec::Value;

    fn user(name: &str) -> Entity {
        let mut class = EntityClass::new("User");
        class
            .declare_scalar(ScalarAttribute::new("name", ValueType::Text))
            .unwrap();
        let mut builder = Schema::builder();
        builder.register(class).unwrap();
        let schema = builder.build().unwrap();
        Entity::new(&schema, "User", Value::record([("name", name)])).unwrap()
    }

    #[test]
    fn add_moves_between_buckets() {
        let uow = UnitOfWorkId::new();
        let mut tracker = ObjectTracker::new();
        let u = user("u1");

        let first = tracker.add(&u, EntryState::Clean, uow);
        assert!(first.previous.is_none());
        let second = tracker.add(&u, EntryState::Dirty, uow);
        assert_eq!(second.previous, Some(EntryState::Clean));
        assert!(Arc::ptr_eq(&first.entry, &second.entry));

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.count(EntryState::Clean), 0);
        assert_eq!(tracker.count(EntryState::Dirty), 1);
        assert_eq!(second.entry.state(), EntryState::Dirty);
    }

    #[test]
    fn fetch_by_state_keeps_registration_order() {
        let uow = UnitOfWorkId::new();
        let mut tracker = ObjectTracker::new();
        let users: Vec<_> = ["a", "b", "c"].into_iter().map(user).collect();
        for u in &users {
            tracker.add(u, EntryState::Dirty, uow);
        }
        tracker.add(&users[0], EntryState::Clean, uow);
        tracker.add(&users[0], EntryState::Dirty, uow);

        let order: Vec<_> = tracker
            .fetch_by_state(EntryState::Dirty)
            .iter()
            .map(|e| e.entity().get("name"))
            .collect();
        assert_eq!(
            order,
            vec![
                Some(Value::from("b")),
                Some(Value::from("c")),
                Some(Value::from("a"))
            ]
        );
    }

    #[test]
    fn id_index_follows_reindex_and_remove() {
        let uow = UnitOfWorkId::new();
        let mut tracker = ObjectTracker::new();
        let u = user("u1");
        tracker.add(&u, EntryState::New, uow);
        assert!(tracker.fetch_by_id("User", EntityId::new(1)).is_none());

        u.set_id(EntityId::new(1));
        tracker.reindex(&u);
        let found = tracker.fetch_by_id("User", EntityId::new(1)).unwrap();
        assert_eq!(found.entity(), &u);
        assert!(tracker.fetch_by_id("Company", EntityId::new(1)).is_none());

        tracker.remove(&u).unwrap();
        assert!(tracker.fetch_by_id("User", EntityId::new(1)).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn clear_returns_entries() {
        let uow = UnitOfWorkId::new();
        let mut tracker = ObjectTracker::new();
        tracker.add(&user("a"), EntryState::Clean, uow);
        tracker.add(&user("b"), EntryState::Deleted, uow);
        assert_eq!(tracker.clear().len(), 2);
        assert!(tracker.is_empty());
        assert!(tracker.fetch_by_state(EntryState::Deleted).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn every_entity_sits_in_exactly_one_bucket(
            moves in proptest::collection::vec((0usize..4, 0usize..4), 0..40)
        ) {
            let uow = UnitOfWorkId::new();
            let mut tracker = ObjectTracker::new();
            let users: Vec<_> = ["a", "b", "c", "d"].into_iter().map(user).collect();
            let mut expected = HashMap::new();
            for (who, state) in moves {
                let state = EntryState::ALL[state];
                tracker.add(&users[who], state, uow);
                expected.insert(who, state);
            }

            let total: usize = EntryState::ALL.iter().map(|s| tracker.count(*s)).sum();
            proptest::prop_assert_eq!(total, expected.len());
            proptest::prop_assert_eq!(tracker.len(), expected.len());
            for (who, state) in expected {
                let entry = tracker.get(&users[who]).unwrap();
                proptest::prop_assert_eq!(entry.state(), state);
            }
        }
    }
}

