//! Aggregate persistence over a row-level [`Mapper`].
//!
//! Only roots cross this boundary. Saving a root writes its row and then
//! every descendant depth first, each child row linked to its parent's id.
//! Loading a root rebuilds the whole aggregate.

use crate::entity::{Entity, Fields};
use crate::error::{CoreError, CoreResult};
use crate::mapper::{Mapper, MapperError, ParentLink};
use crate::schema::{Attribute, EntityClass, Schema};
use crate::types::{EntityId, EntityKey};
use entimap_codec::{Row, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Inserts or updates a root and cascades into its descendants.
///
/// Returns the root's id. Entities without an id are inserted and receive
/// the id the mapper assigns; entities with one are updated. Stored
/// children that are no longer in their collection are deleted. Referenced
/// roots that were never saved are saved first. A reference back to a root
/// still being inserted in the same save is written as null and then
/// filled in once that root has its id.
pub fn save(mapper: &dyn Mapper, root: &Entity) -> CoreResult<EntityId> {
    let mut saver = Saver::new(mapper);
    let id = saver.root(root)?;
    saver.finish()?;
    debug!(class = root.class_name(), %id, "aggregate saved");
    Ok(id)
}

/// Deletes a root and every stored descendant.
///
/// Returns `false` if the root was never saved or its row is already gone.
pub fn delete(mapper: &dyn Mapper, root: &Entity) -> CoreResult<bool> {
    ensure_root(root, "deleted")?;
    let Some(id) = root.id() else {
        return Ok(false);
    };
    let deleted = purge(mapper, root.schema(), root.class(), id)?;
    debug!(class = root.class_name(), %id, deleted, "aggregate deleted");
    Ok(deleted)
}

/// Loads the aggregate rooted at `class` / `id`.
pub fn find_by_id(
    mapper: &dyn Mapper,
    schema: &Arc<Schema>,
    class: &str,
    id: EntityId,
) -> CoreResult<Option<Entity>> {
    let class = root_class(schema, class)?;
    let Some(row) = mapper.find_by_id(class.name(), id)? else {
        return Ok(None);
    };
    Hydrator::new(mapper, schema).root(class, row).map(Some)
}

/// Loads every aggregate rooted at `class`, in id order.
pub fn find_all(mapper: &dyn Mapper, schema: &Arc<Schema>, class: &str) -> CoreResult<Vec<Entity>> {
    let class = root_class(schema, class)?;
    let mut hydrator = Hydrator::new(mapper, schema);
    mapper
        .find_all(class.name())?
        .into_iter()
        .map(|row| hydrator.root(class, row))
        .collect()
}

/// Overwrites an entity with its stored state, children included.
///
/// Stored children already present in memory keep their instance; children
/// with no stored row are dropped. Returns `false`, leaving the entity untouched, if it has no id or no
/// stored row.
pub fn reload(mapper: &dyn Mapper, entity: &Entity) -> CoreResult<bool> {
    let Some(id) = entity.id() else {
        return Ok(false);
    };
    let Some(row) = mapper.find_by_id(entity.class_name(), id)? else {
        return Ok(false);
    };
    let mut hydrator = Hydrator::new(mapper, entity.schema());
    let fields = hydrator.fields(entity, row)?;
    entity.replace_fields(fields);
    Ok(true)
}

fn ensure_root(entity: &Entity, action: &str) -> CoreResult<()> {
    match entity.class().parent_reference() {
        None => Ok(()),
        Some(parent) => Err(CoreError::ownership_violation(
            entity.class_name(),
            format!(
                "only aggregate roots can be {action} directly; go through its {} instead",
                parent.parent_class
            ),
        )),
    }
}

fn root_class<'a>(schema: &'a Arc<Schema>, class: &str) -> CoreResult<&'a Arc<EntityClass>> {
    let class = schema.class(class)?;
    if !class.is_root() {
        return Err(CoreError::ownership_violation(
            class.name(),
            "only aggregate roots can be loaded directly",
        ));
    }
    Ok(class)
}

/// One call to [`save`]: the roots entered so far and the rows whose
/// references must be rewritten once every root has an id.
struct Saver<'a> {
    mapper: &'a dyn Mapper,
    entered: HashSet<EntityKey>,
    unresolved: Vec<Entity>,
}

impl<'a> Saver<'a> {
    fn new(mapper: &'a dyn Mapper) -> Self {
        Self {
            mapper,
            entered: HashSet::new(),
            unresolved: Vec::new(),
        }
    }

    fn root(&mut self, root: &Entity) -> CoreResult<EntityId> {
        ensure_root(root, "saved")?;
        self.entered.insert(root.key());
        self.tree(root, None)
    }

    fn tree(&mut self, entity: &Entity, parent: Option<&ParentLink>) -> CoreResult<EntityId> {
        let mut unresolved = false;
        for reference in entity.class().value_references() {
            let Some(target) = entity.reference(&reference.name) else {
                continue;
            };
            if target.id().is_some() {
                continue;
            }
            if self.entered.contains(&target.key()) {
                unresolved = true;
            } else {
                self.root(&target)?;
            }
        }

        let mapper = self.mapper;
        let class = entity.class_name();
        let row = entity.to_row();
        let id = match entity.id() {
            Some(id) => {
                mapper.update(class, id, &row)?;
                id
            }
            None => {
                let id = mapper.insert(class, parent, &row)?;
                entity.set_id(id);
                id
            }
        };
        if unresolved {
            self.unresolved.push(entity.clone());
        }

        for reference in entity.class().child_references() {
            let link = ParentLink::new(class, id, &reference.name);
            let children = entity.children(&reference.name);
            let kept: HashSet<EntityId> = children.iter().filter_map(Entity::id).collect();

            let child_class = entity.schema().class(&reference.child_class)?;
            for stored in mapper.find_children(child_class.name(), &link)? {
                match stored.id().map(EntityId::new) {
                    Some(stale) if !kept.contains(&stale) => {
                        purge(mapper, entity.schema(), child_class, stale)?;
                    }
                    _ => {}
                }
            }
            for child in &children {
                self.tree(child, Some(&link))?;
            }
        }
        Ok(id)
    }

    /// Rewrites rows that referenced a root before it had an id.
    fn finish(self) -> CoreResult<()> {
        for entity in &self.unresolved {
            if let Some(id) = entity.id() {
                self.mapper
                    .update(entity.class_name(), id, &entity.to_row())?;
                debug!(class = entity.class_name(), %id, "circular reference resolved");
            }
        }
        Ok(())
    }
}

/// Deletes a stored row and its stored descendants, children first.
fn purge(
    mapper: &dyn Mapper,
    schema: &Schema,
    class: &EntityClass,
    id: EntityId,
) -> CoreResult<bool> {
    for reference in class.child_references() {
        let child_class = schema.class(&reference.child_class)?;
        let link = ParentLink::new(class.name(), id, &reference.name);
        for row in mapper.find_children(child_class.name(), &link)? {
            if let Some(child_id) = row.id() {
                purge(mapper, schema, child_class, EntityId::new(child_id))?;
            }
        }
    }
    Ok(mapper.delete(class.name(), id)?)
}

/// Rebuilds entities from rows.
///
/// Roots loaded through a value reference are cached for the duration of
/// one load, so shared and cyclic references resolve to one instance.
struct Hydrator<'a> {
    mapper: &'a dyn Mapper,
    schema: &'a Arc<Schema>,
    loaded: HashMap<(String, EntityId), Entity>,
}

impl<'a> Hydrator<'a> {
    fn new(mapper: &'a dyn Mapper, schema: &'a Arc<Schema>) -> Self {
        Self {
            mapper,
            schema,
            loaded: HashMap::new(),
        }
    }

    fn root(&mut self, class: &Arc<EntityClass>, row: Row) -> CoreResult<Entity> {
        let entity = Entity::root_of(self.schema, class);
        if let Some(id) = row.id() {
            self.loaded
                .insert((class.name().to_string(), EntityId::new(id)), entity.clone());
        }
        let fields = self.fields(&entity, row)?;
        entity.replace_fields(fields);
        Ok(entity)
    }

    fn referenced(&mut self, class_name: &str, id: EntityId) -> CoreResult<Option<Entity>> {
        if let Some(entity) = self.loaded.get(&(class_name.to_string(), id)) {
            return Ok(Some(entity.clone()));
        }
        let class = root_class(self.schema, class_name)?;
        match self.mapper.find_by_id(class_name, id)? {
            Some(row) => self.root(class, row).map(Some),
            None => Ok(None),
        }
    }

    /// Builds the complete field set of `entity` from its row.
    fn fields(&mut self, entity: &Entity, row: Row) -> CoreResult<Fields> {
        let schema = self.schema;
        let class = Arc::clone(entity.class());
        let mut fields = entity.empty_fields();
        let id = row.id().map(EntityId::new);

        for (name, value) in row.iter() {
            let corrupted = |message: String| {
                CoreError::from(MapperError::corrupted(format!(
                    "{}.{name}: {message}",
                    class.name()
                )))
            };
            match class.attribute(name) {
                Some(Attribute::Scalar(s)) => {
                    let value = s.check(value.clone()).map_err(corrupted)?;
                    fields.values.insert(name.to_string(), value);
                }
                Some(Attribute::ValueRef(r)) => match value {
                    Value::Null => {}
                    Value::Integer(target) => {
                        if let Some(target) =
                            self.referenced(&r.target_class, EntityId::new(*target))?
                        {
                            fields.references.insert(name.to_string(), target);
                        }
                    }
                    other => {
                        return Err(corrupted(format!(
                            "expected a reference id, got {}",
                            other.kind()
                        )))
                    }
                },
                _ => return Err(corrupted("not a stored attribute".to_string())),
            }
        }

        if let Some(id) = id {
            for reference in class.child_references() {
                let child_class = schema.class(&reference.child_class)?;
                let link = ParentLink::new(class.name(), id, &reference.name);
                let current = entity.children(&reference.name);
                let mut children = Vec::new();
                for row in self.mapper.find_children(child_class.name(), &link)? {
                    // keep the instance already holding this row, if any
                    let existing = row.id().map(EntityId::new).and_then(|child_id| {
                        current.iter().find(|c| c.id() == Some(child_id)).cloned()
                    });
                    let child = match existing {
                        Some(child) => child,
                        None => Entity::child_of(entity, child_class)?,
                    };
                    let child_fields = self.fields(&child, row)?;
                    child.replace_fields(child_fields);
                    children.push(child);
                }
                fields.children.insert(reference.name.clone(), children);
            }
        }
        Ok(fields)
    }
}
