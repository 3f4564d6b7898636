//! Unit of work: tracks entity lifecycle state and drives commit and
//! rollback through a [`Mapper`].
//!
//! ```
//! use std::sync::Arc;
//! use entimap_core::{MemoryMapper, Registry, UnitOfWork};
//!
//! let registry = Registry::new();
//! let uow = UnitOfWork::new(&registry, Arc::new(MemoryMapper::new()));
//! assert!(uow.is_valid());
//! assert!(registry.get(uow.id()).is_some());
//!
//! uow.complete().unwrap();
//! assert!(!uow.is_valid());
//! assert!(registry.get(uow.id()).is_none());
//! ```

use crate::config::UnitOfWorkConfig;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::mapper::Mapper;
use crate::persist;
use crate::registry::{Registry, WeakRegistry};
use crate::tracker::{EntryState, ObjectTracker, TrackedEntry};
use crate::types::{EntityId, UnitOfWorkId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a unit of work is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Phase {
    Idle = 0,
    Committing = 1,
    RollingBack = 2,
    Completed = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Committing,
            2 => Self::RollingBack,
            _ => Self::Completed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Committing => "committing",
            Phase::RollingBack => "rolling back",
            Phase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Returns the unit of work to [`Phase::Idle`] when a commit or rollback
/// ends, however it ends.
pub(crate) struct PhaseGuard<'a> {
    phase: &'a AtomicU8,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(Phase::Idle as u8, Ordering::Release);
    }
}

/// Tracks entities registered as clean, dirty or deleted and writes the
/// changes through its mapper on [`UnitOfWork::commit`].
///
/// A cheap-to-clone handle; the registry holds one clone until
/// [`UnitOfWork::complete`] is called.
#[derive(Clone)]
pub struct UnitOfWork {
    inner: Arc<Inner>,
}

struct Inner {
    id: UnitOfWorkId,
    mapper: Arc<dyn Mapper>,
    registry: WeakRegistry,
    config: UnitOfWorkConfig,
    tracker: Mutex<ObjectTracker>,
    valid: AtomicBool,
    phase: AtomicU8,
}

impl UnitOfWork {
    /// Creates a unit of work and registers it.
    pub fn new(registry: &Registry, mapper: Arc<dyn Mapper>) -> Self {
        Self::with_config(registry, mapper, UnitOfWorkConfig::default())
    }

    /// Creates a unit of work with explicit configuration.
    pub fn with_config(
        registry: &Registry,
        mapper: Arc<dyn Mapper>,
        config: UnitOfWorkConfig,
    ) -> Self {
        let uow = Self {
            inner: Arc::new(Inner {
                id: UnitOfWorkId::new(),
                mapper,
                registry: registry.downgrade(),
                config,
                tracker: Mutex::new(ObjectTracker::new()),
                valid: AtomicBool::new(true),
                phase: AtomicU8::new(Phase::Idle as u8),
            }),
        };
        registry.register(&uow);
        debug!(uow = %uow.id(), "unit of work created");
        uow
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> UnitOfWorkId {
        self.inner.id
    }

    /// Whether the last commit or rollback succeeded and the unit of work
    /// has not been completed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Whether [`UnitOfWork::complete`] has run.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.phase() == Phase::Completed
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &UnitOfWorkConfig {
        &self.inner.config
    }

    /// Mapper commits are written through.
    #[must_use]
    pub fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.inner.mapper
    }

    /// Runs `f` with read access to the tracker.
    pub fn tracked<R>(&self, f: impl FnOnce(&ObjectTracker) -> R) -> R {
        f(&self.inner.tracker.lock())
    }

    /// Entries currently in `state`, in registration order.
    #[must_use]
    pub fn entries(&self, state: EntryState) -> Vec<Arc<TrackedEntry>> {
        self.tracked(|t| t.fetch_by_state(state))
    }

    /// Registers an entity as loaded and unchanged.
    pub fn register_clean(&self, entity: &Entity) -> CoreResult<Arc<TrackedEntry>> {
        self.register(entity, EntryState::Clean)
    }

    /// Registers a modified root to be written on commit.
    pub fn register_dirty(&self, entity: &Entity) -> CoreResult<Arc<TrackedEntry>> {
        self.require_root(entity, EntryState::Dirty)?;
        self.register(entity, EntryState::Dirty)
    }

    /// Registers a root to be deleted on commit.
    pub fn register_deleted(&self, entity: &Entity) -> CoreResult<Arc<TrackedEntry>> {
        self.require_root(entity, EntryState::Deleted)?;
        self.register(entity, EntryState::Deleted)
    }

    /// Entry for a tracked entity of `class` with `id`.
    #[must_use]
    pub fn fetch_object_by_id(&self, class: &str, id: EntityId) -> Option<Arc<TrackedEntry>> {
        self.tracked(|t| t.fetch_by_id(class, id))
    }

    /// Writes dirty entries and deletes deleted ones.
    ///
    /// Entries are processed in registration order, dirty before deleted.
    /// The first mapper failure stops the commit and is returned; entries
    /// already written stay written and the unit of work becomes invalid.
    pub fn commit(&self) -> CoreResult<()> {
        let _guard = self.enter(Phase::Committing)?;
        self.flush(&[])
    }

    /// Discards in-memory changes to dirty and deleted entries.
    ///
    /// Each is reloaded from the mapper and re-filed as clean; entries with
    /// no stored row, and new entries, stop being tracked. Tracked children
    /// the reload dropped from their aggregate stop being tracked too.
    /// Entities not tracked here are not touched.
    pub fn rollback(&self) -> CoreResult<()> {
        let _guard = self.enter(Phase::RollingBack)?;
        let (new, dirty, deleted) = self.tracked(|t| {
            (
                t.fetch_by_state(EntryState::New),
                t.fetch_by_state(EntryState::Dirty),
                t.fetch_by_state(EntryState::Deleted),
            )
        });

        let mut reloaded = 0usize;
        let mut discarded = 0usize;
        for entry in new {
            self.forget(&entry);
            discarded += 1;
        }
        for entry in dirty.iter().chain(&deleted) {
            let entity = entry.entity();
            let restored = self.inner.config.reload_on_rollback
                && persist::reload(self.inner.mapper.as_ref(), entity).inspect_err(|err| {
                    warn!(uow = %self.id(), class = entity.class_name(), error = %err, "rollback failed");
                    self.inner.valid.store(false, Ordering::Release);
                })?;
            if restored {
                self.inner
                    .tracker
                    .lock()
                    .add(entity, EntryState::Clean, self.id());
                reloaded += 1;
            } else {
                self.forget(entry);
                discarded += 1;
            }
        }
        for entry in self.detached() {
            self.forget(&entry);
            discarded += 1;
        }

        self.inner.valid.store(true, Ordering::Release);
        info!(uow = %self.id(), reloaded, discarded, "rollback finished");
        Ok(())
    }

    /// Ends the unit of work.
    ///
    /// Fails while a commit or rollback is running, or if already
    /// completed. Otherwise stops tracking every entity, marks the unit of
    /// work invalid and removes it from the registry.
    pub fn complete(&self) -> CoreResult<()> {
        if let Err(current) = self.inner.phase.compare_exchange(
            Phase::Idle as u8,
            Phase::Completed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(CoreError::protocol_misuse(format!(
                "cannot complete unit of work {} while {}",
                self.id(),
                Phase::from_u8(current)
            )));
        }

        let entries = self.inner.tracker.lock().clear();
        for entry in &entries {
            entry.entity().detach_entry(entry);
        }
        self.inner.valid.store(false, Ordering::Release);
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.unregister(self.id());
        }
        info!(uow = %self.id(), released = entries.len(), "unit of work completed");
        Ok(())
    }

    pub(crate) fn register(
        &self,
        entity: &Entity,
        state: EntryState,
    ) -> CoreResult<Arc<TrackedEntry>> {
        if self.is_completed() {
            return Err(CoreError::protocol_misuse(format!(
                "unit of work {} is completed",
                self.id()
            )));
        }
        let registration = self.inner.tracker.lock().add(entity, state, self.id());
        if registration.previous.is_none() {
            entity.attach_entry(&registration.entry);
        }
        debug!(
            uow = %self.id(),
            class = entity.class_name(),
            key = %entity.key(),
            from = ?registration.previous,
            to = %state,
            "entity registered"
        );
        Ok(registration.entry)
    }

    pub(crate) fn require_root(&self, entity: &Entity, state: EntryState) -> CoreResult<()> {
        if entity.is_root() {
            return Ok(());
        }
        Err(CoreError::ownership_violation(
            entity.class_name(),
            format!("only aggregate roots can be registered as {state}"),
        ))
    }

    pub(crate) fn enter(&self, phase: Phase) -> CoreResult<PhaseGuard<'_>> {
        match self.inner.phase.compare_exchange(
            Phase::Idle as u8,
            phase as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(PhaseGuard {
                phase: &self.inner.phase,
            }),
            Err(current) => Err(CoreError::protocol_misuse(format!(
                "cannot start {phase} on unit of work {} while {}",
                self.id(),
                Phase::from_u8(current)
            ))),
        }
    }

    /// Saves `new` entries, then the dirty ones, then deletes the deleted
    /// ones. The caller holds the commit phase.
    pub(crate) fn flush(&self, new: &[Arc<TrackedEntry>]) -> CoreResult<()> {
        let (dirty, deleted) = self.tracked(|t| {
            (
                t.fetch_by_state(EntryState::Dirty),
                t.fetch_by_state(EntryState::Deleted),
            )
        });
        let mapper = self.inner.mapper.as_ref();

        for entry in new.iter().chain(&dirty) {
            let entity = entry.entity();
            persist::save(mapper, entity).map_err(|err| self.fail(entity, err))?;
            let mut tracker = self.inner.tracker.lock();
            tracker.add(entity, self.inner.config.committed_state(), self.id());
        }
        for entry in &deleted {
            let entity = entry.entity();
            persist::delete(mapper, entity).map_err(|err| self.fail(entity, err))?;
            self.forget(entry);
        }

        self.inner.valid.store(true, Ordering::Release);
        info!(
            uow = %self.id(),
            inserted = new.len(),
            updated = dirty.len(),
            deleted = deleted.len(),
            "commit finished"
        );
        Ok(())
    }

    fn fail(&self, entity: &Entity, err: CoreError) -> CoreError {
        warn!(uow = %self.id(), class = entity.class_name(), error = %err, "commit failed");
        self.inner.valid.store(false, Ordering::Release);
        err
    }

    fn forget(&self, entry: &Arc<TrackedEntry>) {
        self.inner.tracker.lock().remove(entry.entity());
        entry.entity().detach_entry(entry);
    }

    /// Tracked children no longer reachable from their root.
    fn detached(&self) -> Vec<Arc<TrackedEntry>> {
        self.tracked(|t| {
            EntryState::ALL
                .iter()
                .flat_map(|state| t.fetch_by_state(*state))
                .filter(|entry| !entry.entity().is_attached())
                .collect()
        })
    }

    fn phase(&self) -> Phase {
        Phase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }
}

impl PartialEq for UnitOfWork {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for UnitOfWork {}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.inner.id)
            .field("valid", &self.is_valid())
            .field("phase", &self.phase())
            .field("tracked", &self.tracked(ObjectTracker::len))
            .finish()
    }
}
