//! Lookup of live units of work.

use crate::entity::Entity;
use crate::tracker::TrackedEntry;
use crate::types::{EntityId, UnitOfWorkId};
use crate::unit_of_work::UnitOfWork;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Weak};

type Map = RwLock<HashMap<UnitOfWorkId, UnitOfWork>>;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Registry of units of work by id.
///
/// A unit of work registers itself on creation and removes itself on
/// [`UnitOfWork::complete`]. Clones share the same map.
#[derive(Clone, Default)]
pub struct Registry {
    units: Arc<Map>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    ///
    /// Lives for the whole process; call [`Registry::clear`] to reset it
    /// between tests.
    #[must_use]
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub(crate) fn register(&self, unit_of_work: &UnitOfWork) {
        self.units
            .write()
            .insert(unit_of_work.id(), unit_of_work.clone());
    }

    pub(crate) fn unregister(&self, id: UnitOfWorkId) -> Option<UnitOfWork> {
        self.units.write().remove(&id)
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.units))
    }

    /// Looks up a unit of work.
    #[must_use]
    pub fn get(&self, id: UnitOfWorkId) -> Option<UnitOfWork> {
        self.units.read().get(&id).cloned()
    }

    /// Looks up a unit of work by its hex id. Malformed ids find nothing.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<UnitOfWork> {
        self.get(id.parse().ok()?)
    }

    /// Ids of registered units of work.
    #[must_use]
    pub fn ids(&self) -> Vec<UnitOfWorkId> {
        self.units.read().keys().copied().collect()
    }

    /// Number of registered units of work.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }

    /// Forgets every unit of work without completing it.
    pub fn clear(&self) {
        self.units.write().clear();
    }

    /// Tracked entries for `entity` across every registered unit of work.
    #[must_use]
    pub fn entries_for(&self, entity: &Entity) -> Vec<Arc<TrackedEntry>> {
        let units: Vec<UnitOfWork> = self.units.read().values().cloned().collect();
        units
            .iter()
            .filter_map(|uow| uow.tracked(|tracker| tracker.get(entity)))
            .collect()
    }

    /// Unit of work owning `entry`, while it is registered.
    #[must_use]
    pub fn unit_of_work_of(&self, entry: &TrackedEntry) -> Option<UnitOfWork> {
        self.get(entry.unit_of_work_id())
    }

    /// Entry for `class` / `id` in the unit of work with hex id `unit_of_work`.
    #[must_use]
    pub fn fetch_from_unit_of_work(
        &self,
        unit_of_work: &str,
        class: &str,
        id: EntityId,
    ) -> Option<Arc<TrackedEntry>> {
        self.lookup(unit_of_work)?.fetch_object_by_id(class, id)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("units", &self.len())
            .finish()
    }
}

/// Non-owning handle a unit of work keeps to its registry.
#[derive(Clone, Default)]
pub(crate) struct WeakRegistry(Weak<Map>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|units| Registry { units })
    }
}
