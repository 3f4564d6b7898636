//! Failure injection for mappers and storage backends.
//!
//! [`FailingMapper`] refuses writes once a budget is spent, which is how
//! commit-stops-at-first-failure behavior is exercised.
//! [`CrashableBackend`] cuts an append short to leave a torn journal tail.

use entimap_codec::Row;
use entimap_core::{EntityId, Mapper, MapperError, MapperResult, ParentLink};
use entimap_storage::{StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a mapper and fails every write after the first `budget` writes.
///
/// Reads always pass through.
pub struct FailingMapper {
    inner: Arc<dyn Mapper>,
    budget: AtomicUsize,
    writes: AtomicUsize,
    failures: AtomicUsize,
}

impl FailingMapper {
    /// Allows `budget` successful writes.
    pub fn new(inner: Arc<dyn Mapper>, budget: usize) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(budget),
            writes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Never fails until [`FailingMapper::fail_after`] is called.
    pub fn passthrough(inner: Arc<dyn Mapper>) -> Self {
        Self::new(inner, usize::MAX)
    }

    /// Allows `writes` more successful writes from now on.
    pub fn fail_after(&self, writes: usize) {
        let done = self.writes.load(Ordering::SeqCst);
        self.budget
            .store(done.saturating_add(writes), Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Refused writes so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn gate(&self, class: &str) -> MapperResult<()> {
        if self.writes.load(Ordering::SeqCst) >= self.budget.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(MapperError::unavailable(format!(
                "injected failure writing {class}"
            )));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Mapper for FailingMapper {
    fn insert(&self, class: &str, parent: Option<&ParentLink>, row: &Row) -> MapperResult<EntityId> {
        self.gate(class)?;
        self.inner.insert(class, parent, row)
    }

    fn update(&self, class: &str, id: EntityId, row: &Row) -> MapperResult<()> {
        self.gate(class)?;
        self.inner.update(class, id, row)
    }

    fn delete(&self, class: &str, id: EntityId) -> MapperResult<bool> {
        self.gate(class)?;
        self.inner.delete(class, id)
    }

    fn find_by_id(&self, class: &str, id: EntityId) -> MapperResult<Option<Row>> {
        self.inner.find_by_id(class, id)
    }

    fn find_all(&self, class: &str) -> MapperResult<Vec<Row>> {
        self.inner.find_all(class)
    }

    fn find_children(&self, child_class: &str, parent: &ParentLink) -> MapperResult<Vec<Row>> {
        self.inner.find_children(child_class, parent)
    }
}

/// A storage backend that simulates a crash part-way through an append.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
}

impl CrashableBackend {
    /// Wraps `inner`; no crash is scheduled.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been appended; the append that
    /// crosses the threshold is written only up to it.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.bytes_written.load(Ordering::SeqCst);
        self.crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Whether the simulated crash happened.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn crash(&self, message: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::other(message.to_string()))
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let current = self.bytes_written.fetch_add(bytes.len(), Ordering::SeqCst);
        let threshold = self.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            return Err(self.crash("simulated crash before write"));
        }
        if current + bytes.len() > threshold {
            let partial = threshold - current;
            self.inner.append(&bytes[..partial])?;
            return Err(self.crash("simulated crash during write"));
        }
        self.inner.append(bytes)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(self.crash("simulated crash during flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entimap_core::MemoryMapper;
    use entimap_storage::InMemoryBackend;

    #[test]
    fn failing_mapper_spends_its_budget() {
        let mapper = FailingMapper::new(Arc::new(MemoryMapper::new()), 1);
        let row = Row::new();
        mapper.insert("User", None, &row).unwrap();
        assert!(matches!(
            mapper.insert("User", None, &row),
            Err(MapperError::Unavailable { .. })
        ));
        assert_eq!(mapper.writes(), 1);
        assert_eq!(mapper.failures(), 1);
        assert_eq!(mapper.find_all("User").unwrap().len(), 1);
    }

    #[test]
    fn crashable_backend_writes_partial_frame() {
        let memory = InMemoryBackend::new();
        let mut backend = CrashableBackend::new(Box::new(memory.clone()));
        backend.append(b"abcd").unwrap();
        backend.crash_after(2);
        assert!(backend.append(b"efgh").is_err());
        assert!(backend.has_crashed());
        assert_eq!(memory.data(), b"abcdef");
    }
}
