//! In-memory row store.

use super::{Mapper, MapperError, MapperResult, ParentLink};
use crate::types::EntityId;
use entimap_codec::Row;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct StoredRow {
    parent: Option<ParentLink>,
    row: Row,
}

#[derive(Debug)]
struct Table {
    next_id: i64,
    rows: BTreeMap<EntityId, StoredRow>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

/// A [`Mapper`] keeping rows in process memory.
///
/// Ids are assigned per class, starting at 1.
///
/// ```
/// use entimap_codec::Row;
/// use entimap_core::{EntityId, Mapper, MemoryMapper};
///
/// let mapper = MemoryMapper::new();
/// let row: Row = [("name", "Abstra.cc S.A")].into_iter().collect();
/// let id = mapper.insert("Company", None, &row).unwrap();
/// assert_eq!(id, EntityId::new(1));
/// assert_eq!(mapper.find_by_id("Company", id).unwrap().unwrap().id(), Some(1));
/// ```
#[derive(Debug, Default)]
pub struct MemoryMapper {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryMapper {
    /// Creates an empty mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows across classes.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.read().values().map(|t| t.rows.len()).sum()
    }

    /// Number of stored rows of one class.
    #[must_use]
    pub fn count(&self, class: &str) -> usize {
        self.tables.read().get(class).map_or(0, |t| t.rows.len())
    }

    /// The id the next insert into `class` will receive.
    pub(crate) fn peek_next_id(&self, class: &str) -> EntityId {
        EntityId::new(self.tables.read().get(class).map_or(1, |t| t.next_id))
    }

    /// Stores a row under a known id.
    pub(crate) fn insert_with_id(
        &self,
        class: &str,
        id: EntityId,
        parent: Option<ParentLink>,
        mut row: Row,
    ) {
        row.insert("id", id);
        let mut tables = self.tables.write();
        let table = tables.entry(class.to_string()).or_default();
        table.next_id = table.next_id.max(id.as_i64() + 1);
        table.rows.insert(id, StoredRow { parent, row });
    }

    /// Whether a row exists.
    pub(crate) fn contains(&self, class: &str, id: EntityId) -> bool {
        self.tables
            .read()
            .get(class)
            .is_some_and(|t| t.rows.contains_key(&id))
    }
}

impl Mapper for MemoryMapper {
    fn insert(
        &self,
        class: &str,
        parent: Option<&ParentLink>,
        row: &Row,
    ) -> MapperResult<EntityId> {
        let mut tables = self.tables.write();
        let table = tables.entry(class.to_string()).or_default();
        let id = EntityId::new(table.next_id);
        table.next_id += 1;

        let mut row = row.clone();
        row.insert("id", id);
        table.rows.insert(
            id,
            StoredRow {
                parent: parent.cloned(),
                row,
            },
        );
        Ok(id)
    }

    fn update(&self, class: &str, id: EntityId, row: &Row) -> MapperResult<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .get_mut(class)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| MapperError::rejected(class, format!("no row with id {id}")))?;
        let mut row = row.clone();
        row.insert("id", id);
        stored.row = row;
        Ok(())
    }

    fn delete(&self, class: &str, id: EntityId) -> MapperResult<bool> {
        Ok(self
            .tables
            .write()
            .get_mut(class)
            .and_then(|t| t.rows.remove(&id))
            .is_some())
    }

    fn find_by_id(&self, class: &str, id: EntityId) -> MapperResult<Option<Row>> {
        Ok(self
            .tables
            .read()
            .get(class)
            .and_then(|t| t.rows.get(&id))
            .map(|stored| stored.row.clone()))
    }

    fn find_all(&self, class: &str) -> MapperResult<Vec<Row>> {
        Ok(self
            .tables
            .read()
            .get(class)
            .map(|t| t.rows.values().map(|s| s.row.clone()).collect())
            .unwrap_or_default())
    }

    fn find_children(&self, child_class: &str, parent: &ParentLink) -> MapperResult<Vec<Row>> {
        Ok(self
            .tables
            .read()
            .get(child_class)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|s| s.parent.as_ref() == Some(parent))
                    .map(|s| s.row.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entimap_codec::Value;

    fn row(name: &str) -> Row {
        [("name", name)].into_iter().collect()
    }

    #[test]
    fn ids_are_per_class_and_sequential() {
        let mapper = MemoryMapper::new();
        assert_eq!(mapper.insert("Company", None, &row("a")).unwrap().0, 1);
        assert_eq!(mapper.insert("Company", None, &row("b")).unwrap().0, 2);
        assert_eq!(mapper.insert("User", None, &row("c")).unwrap().0, 1);
        assert_eq!(mapper.row_count(), 3);
    }

    #[test]
    fn update_replaces_row() {
        let mapper = MemoryMapper::new();
        let id = mapper.insert("User", None, &row("old")).unwrap();
        mapper.update("User", id, &row("new")).unwrap();

        let stored = mapper.find_by_id("User", id).unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("new")));
        assert_eq!(stored.id(), Some(id.0));
    }

    #[test]
    fn update_of_missing_row_is_rejected() {
        let mapper = MemoryMapper::new();
        let err = mapper.update("User", EntityId::new(9), &row("x")).unwrap_err();
        assert!(matches!(err, MapperError::Rejected { .. }));
    }

    #[test]
    fn delete_reports_existence() {
        let mapper = MemoryMapper::new();
        let id = mapper.insert("User", None, &row("x")).unwrap();
        assert!(mapper.delete("User", id).unwrap());
        assert!(!mapper.delete("User", id).unwrap());
        assert!(mapper.find_by_id("User", id).unwrap().is_none());
    }

    #[test]
    fn children_are_filtered_by_link() {
        let mapper = MemoryMapper::new();
        let company = mapper.insert("Company", None, &row("c")).unwrap();
        let offices = ParentLink::new("Company", company, "local_offices");
        let other = ParentLink::new("Company", EntityId::new(99), "local_offices");

        mapper.insert("LocalOffice", Some(&offices), &row("o1")).unwrap();
        mapper.insert("LocalOffice", Some(&other), &row("o2")).unwrap();
        mapper.insert("LocalOffice", Some(&offices), &row("o3")).unwrap();

        let names: Vec<_> = mapper
            .find_children("LocalOffice", &offices)
            .unwrap()
            .iter()
            .filter_map(|r| r.get("name").and_then(Value::as_text).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["o1", "o3"]);
        assert_eq!(mapper.find_all("LocalOffice").unwrap().len(), 3);
    }

    #[test]
    fn insert_with_id_advances_sequence() {
        let mapper = MemoryMapper::new();
        mapper.insert_with_id("User", EntityId::new(5), None, row("x"));
        assert!(mapper.contains("User", EntityId::new(5)));
        assert_eq!(mapper.peek_next_id("User"), EntityId::new(6));
        assert_eq!(mapper.insert("User", None, &row("y")).unwrap().0, 6);
    }
}
