//! Durable mapper backed by an append-only journal.

mod record;

use super::{Mapper, MapperError, MapperResult, MemoryMapper, ParentLink};
use crate::config::JournalConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::EntityId;
use entimap_codec::Row;
use entimap_storage::{StorageBackend, StorageError};
use parking_lot::Mutex;
use record::{JournalRecord, CRC_SIZE, HEADER_SIZE};
use tracing::{debug, info, warn};

/// A [`MemoryMapper`] whose mutations are journaled to a
/// [`StorageBackend`] before they are applied.
///
/// Opening a journal replays it. A record cut short at the end of the
/// journal (a torn write) is dropped and the journal truncated to the last
/// complete record; a checksum or magic mismatch anywhere is fatal.
pub struct JournalMapper {
    rows: MemoryMapper,
    backend: Mutex<Box<dyn StorageBackend>>,
    config: JournalConfig,
}

impl JournalMapper {
    /// Opens a journal, replaying any records it already holds.
    pub fn open(backend: Box<dyn StorageBackend>, config: JournalConfig) -> CoreResult<Self> {
        let mut backend = backend;
        let rows = MemoryMapper::new();
        let replayed = replay(&mut *backend, &rows)?;
        info!(records = replayed, rows = rows.row_count(), "journal opened");

        Ok(Self {
            rows,
            backend: Mutex::new(backend),
            config,
        })
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Flushes the backend.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Total number of live rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.row_count()
    }

    fn append(&self, backend: &mut dyn StorageBackend, record: &JournalRecord) -> MapperResult<()> {
        let frame = record.encode()?;
        let offset = backend.append(&frame).map_err(storage_failure)?;
        if self.config.sync_on_write {
            backend.flush().map_err(storage_failure)?;
        }
        debug!(offset, kind = ?record.kind(), "journal record appended");
        Ok(())
    }
}

impl Mapper for JournalMapper {
    fn insert(
        &self,
        class: &str,
        parent: Option<&ParentLink>,
        row: &Row,
    ) -> MapperResult<EntityId> {
        let mut backend = self.backend.lock();
        let id = self.rows.peek_next_id(class);
        let mut row = row.clone();
        row.insert("id", id);

        let record = JournalRecord::Insert {
            class: class.to_string(),
            id,
            parent: parent.cloned(),
            row: row.clone(),
        };
        self.append(&mut **backend, &record)?;
        self.rows.insert_with_id(class, id, parent.cloned(), row);
        Ok(id)
    }

    fn update(&self, class: &str, id: EntityId, row: &Row) -> MapperResult<()> {
        let mut backend = self.backend.lock();
        if !self.rows.contains(class, id) {
            return Err(MapperError::rejected(class, format!("no row with id {id}")));
        }
        let mut row = row.clone();
        row.insert("id", id);
        let record = JournalRecord::Update {
            class: class.to_string(),
            id,
            row: row.clone(),
        };
        self.append(&mut **backend, &record)?;
        self.rows.update(class, id, &row)
    }

    fn delete(&self, class: &str, id: EntityId) -> MapperResult<bool> {
        let mut backend = self.backend.lock();
        if !self.rows.contains(class, id) {
            return Ok(false);
        }
        let record = JournalRecord::Delete {
            class: class.to_string(),
            id,
        };
        self.append(&mut **backend, &record)?;
        self.rows.delete(class, id)
    }

    fn find_by_id(&self, class: &str, id: EntityId) -> MapperResult<Option<Row>> {
        self.rows.find_by_id(class, id)
    }

    fn find_all(&self, class: &str) -> MapperResult<Vec<Row>> {
        self.rows.find_all(class)
    }

    fn find_children(&self, child_class: &str, parent: &ParentLink) -> MapperResult<Vec<Row>> {
        self.rows.find_children(child_class, parent)
    }
}

impl std::fmt::Debug for JournalMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalMapper")
            .field("rows", &self.rows.row_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn storage_failure(err: StorageError) -> MapperError {
    MapperError::storage(err.to_string())
}

/// Applies every complete record to `rows`. Returns the record count.
fn replay(backend: &mut dyn StorageBackend, rows: &MemoryMapper) -> CoreResult<usize> {
    let size = backend.size()?;
    let mut offset = 0u64;
    let mut count = 0usize;

    while offset < size {
        let remaining = size - offset;
        if remaining < HEADER_SIZE as u64 {
            truncate_tail(backend, offset, size)?;
            break;
        }
        let header = backend.read_at(offset, HEADER_SIZE)?;
        let (_, len) = JournalRecord::decode_header(offset, &header)?;
        let frame_len = (HEADER_SIZE + len + CRC_SIZE) as u64;
        if remaining < frame_len {
            truncate_tail(backend, offset, size)?;
            break;
        }

        let frame_size = usize::try_from(frame_len)
            .map_err(|_| CoreError::journal_corruption(offset, "record length overflow"))?;
        let frame = backend.read_at(offset, frame_size)?;
        apply(rows, JournalRecord::decode_frame(offset, &frame)?, offset)?;

        offset += frame_len;
        count += 1;
    }
    Ok(count)
}

fn truncate_tail(backend: &mut dyn StorageBackend, offset: u64, size: u64) -> CoreResult<()> {
    warn!(offset, dropped = size - offset, "dropping torn journal tail");
    backend.truncate(offset)?;
    Ok(())
}

fn apply(rows: &MemoryMapper, record: JournalRecord, offset: u64) -> CoreResult<()> {
    match record {
        JournalRecord::Insert {
            class,
            id,
            parent,
            row,
        } => rows.insert_with_id(&class, id, parent, row),
        JournalRecord::Update { class, id, row } => {
            rows.update(&class, id, &row).map_err(|_| {
                CoreError::journal_corruption(offset, format!("update of unknown {class} {id}"))
            })?;
        }
        JournalRecord::Delete { class, id } => {
            rows.delete(&class, id)?;
        }
    }
    Ok(())
}
