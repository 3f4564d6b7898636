//! Entities and aggregate graphs.
//!
//! An [`Entity`] is a cheap-to-clone handle onto shared, lock-protected
//! state. Children are owned by their parent's collections and point back
//! at it through a weak reference, so an aggregate is freed when its root
//! handle is dropped.

mod load;

use crate::error::{CoreError, CoreResult};
use crate::mapper::Mapper;
use crate::persist;
use crate::schema::{Attribute, EntityClass, Schema, ACTIVE_ATTRIBUTE, ID_ATTRIBUTE};
use crate::tracker::TrackedEntry;
use crate::types::{EntityId, EntityKey};
use entimap_codec::{Row, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Handle onto an entity instance.
///
/// Clones share the same instance; equality is identity.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    key: EntityKey,
    schema: Arc<Schema>,
    class: Arc<EntityClass>,
    parent: Option<Weak<EntityInner>>,
    fields: RwLock<Fields>,
    entries: Mutex<Vec<Weak<TrackedEntry>>>,
}

/// Field storage. A value reference absent from `references` is null.
#[derive(Default)]
pub(crate) struct Fields {
    pub(crate) values: HashMap<String, Value>,
    pub(crate) references: HashMap<String, Entity>,
    pub(crate) children: HashMap<String, Vec<Entity>>,
}

impl Fields {
    fn defaults(class: &EntityClass) -> Self {
        let mut fields = Self::default();
        for attribute in class.attributes() {
            match attribute {
                Attribute::Scalar(s) => {
                    fields
                        .values
                        .insert(s.name().to_string(), s.default_value().clone());
                }
                Attribute::Children(c) => {
                    fields.children.insert(c.name.clone(), Vec::new());
                }
                Attribute::Parent(_) | Attribute::ValueRef(_) => {}
            }
        }
        fields
    }
}

impl Entity {
    /// Constructs a root entity of `class` from a field-value map.
    ///
    /// Child collections in `input` are lists of maps and are built through
    /// this entity after its direct fields are set. Classes that declare a
    /// parent cannot be constructed this way; use [`Entity::make_child`] on
    /// the owner.
    ///
    /// ```
    /// use entimap_codec::Value;
    /// use entimap_core::schema::{EntityClass, ScalarAttribute, Schema, ValueType};
    /// use entimap_core::Entity;
    ///
    /// let mut user = EntityClass::new("User");
    /// user.declare_scalar(ScalarAttribute::new("name", ValueType::Text)).unwrap();
    /// let mut builder = Schema::builder();
    /// builder.register(user).unwrap();
    /// let schema = builder.build().unwrap();
    ///
    /// let u = Entity::new(&schema, "User", Value::record([("name", "u1")])).unwrap();
    /// assert_eq!(u.get("name"), Some(Value::from("u1")));
    /// assert!(u.is_active());
    /// assert_eq!(u.id(), None);
    /// ```
    pub fn new(schema: &Arc<Schema>, class: &str, input: Value) -> CoreResult<Self> {
        let class = schema.class(class)?;
        if let Some(parent) = class.parent_reference() {
            return Err(CoreError::ownership_violation(
                class.name(),
                format!(
                    "must be created through its parent {}",
                    parent.parent_class
                ),
            ));
        }
        let entity = Self::allocate(schema, class, None);
        entity.make(input)?;
        Ok(entity)
    }

    /// Constructs a child of `parent`.
    ///
    /// The child is not added to any of the parent's collections; see
    /// [`Entity::append_child`].
    pub fn with_parent(
        schema: &Arc<Schema>,
        class: &str,
        input: Value,
        parent: &Entity,
    ) -> CoreResult<Self> {
        let class = schema.class(class)?;
        let entity = Self::child_of(parent, class)?;
        entity.make(input)?;
        Ok(entity)
    }

    /// Allocates a child of `parent` with default fields.
    pub(crate) fn child_of(parent: &Entity, class: &Arc<EntityClass>) -> CoreResult<Self> {
        match class.parent_reference() {
            Some(p) if p.parent_class == parent.class_name() => {
                Ok(Self::allocate(&parent.inner.schema, class, Some(parent)))
            }
            Some(p) => Err(CoreError::ownership_violation(
                class.name(),
                format!(
                    "owned by {}, not by {}",
                    p.parent_class,
                    parent.class_name()
                ),
            )),
            None => Err(CoreError::ownership_violation(
                class.name(),
                "is a root and cannot have a parent",
            )),
        }
    }

    /// Allocates a root entity with default fields.
    pub(crate) fn root_of(schema: &Arc<Schema>, class: &Arc<EntityClass>) -> Self {
        Self::allocate(schema, class, None)
    }

    fn allocate(schema: &Arc<Schema>, class: &Arc<EntityClass>, parent: Option<&Entity>) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                key: EntityKey::next(),
                schema: Arc::clone(schema),
                class: Arc::clone(class),
                parent: parent.map(|p| Arc::downgrade(&p.inner)),
                fields: RwLock::new(Fields::defaults(class)),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// In-process identity of this instance.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        self.inner.key
    }

    /// Class descriptor.
    #[must_use]
    pub fn class(&self) -> &Arc<EntityClass> {
        &self.inner.class
    }

    /// Class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.inner.class.name()
    }

    /// Schema the class belongs to.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Whether this entity may be persisted directly.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.class.is_root()
    }

    /// Store-assigned id, unset until first persisted.
    #[must_use]
    pub fn id(&self) -> Option<EntityId> {
        self.inner
            .fields
            .read()
            .values
            .get(ID_ATTRIBUTE)
            .and_then(Value::as_integer)
            .map(EntityId::new)
    }

    pub(crate) fn set_id(&self, id: EntityId) {
        self.inner
            .fields
            .write()
            .values
            .insert(ID_ATTRIBUTE.to_string(), Value::from(id));
    }

    /// Once the store has assigned an id, only that same id may be set.
    pub(super) fn ensure_id_unchanged(&self, value: &Value) -> CoreResult<()> {
        match self.id() {
            Some(current) if value.as_integer().map(EntityId::new) != Some(current) => {
                Err(CoreError::constraint_violation(
                    self.class_name(),
                    ID_ATTRIBUTE,
                    format!("already persisted as {current}"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Soft-delete flag.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.get(ACTIVE_ATTRIBUTE)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Sets the soft-delete flag.
    pub fn set_active(&self, active: bool) {
        self.inner
            .fields
            .write()
            .values
            .insert(ACTIVE_ATTRIBUTE.to_string(), Value::Bool(active));
    }

    /// Value of a scalar field. `None` if `name` is not a scalar attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.fields.read().values.get(name).cloned()
    }

    /// Assigns a field.
    ///
    /// Scalars are checked against their descriptor. A value reference
    /// accepts null or a map describing a new root of the target class.
    /// Child collections and the parent reference cannot be assigned.
    pub fn set(&self, name: &str, value: Value) -> CoreResult<()> {
        match self.attribute(name)? {
            Attribute::Scalar(s) => {
                let value = s.check(value).map_err(|message| {
                    CoreError::constraint_violation(self.class_name(), name, message)
                })?;
                if name == ID_ATTRIBUTE {
                    self.ensure_id_unchanged(&value)?;
                }
                self.inner
                    .fields
                    .write()
                    .values
                    .insert(name.to_string(), value);
                Ok(())
            }
            Attribute::ValueRef(r) => {
                let target = self.build_reference(name, &r.target_class, value)?;
                self.store_reference(name, target);
                Ok(())
            }
            Attribute::Children(_) => Err(CoreError::invalid_input(format!(
                "{}.{name} is a child collection; use make_child",
                self.class_name()
            ))),
            Attribute::Parent(_) => Err(CoreError::invalid_input(format!(
                "{}.{name} is set by the owning entity",
                self.class_name()
            ))),
        }
    }

    /// Entity held by a value reference, or the parent when `name` is the
    /// parent reference.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<Entity> {
        match self.inner.class.attribute(name)? {
            Attribute::ValueRef(_) => self.inner.fields.read().references.get(name).cloned(),
            Attribute::Parent(_) => self.parent(),
            _ => None,
        }
    }

    /// Assigns a value reference.
    pub fn set_reference(&self, name: &str, target: Option<Entity>) -> CoreResult<()> {
        let Attribute::ValueRef(r) = self.attribute(name)? else {
            return Err(CoreError::invalid_input(format!(
                "{}.{name} is not a value reference",
                self.class_name()
            )));
        };
        if let Some(target) = &target {
            if target.class_name() != r.target_class {
                return Err(CoreError::constraint_violation(
                    self.class_name(),
                    name,
                    format!("expected {}, got {}", r.target_class, target.class_name()),
                ));
            }
        }
        self.store_reference(name, target);
        Ok(())
    }

    fn store_reference(&self, name: &str, target: Option<Entity>) {
        let mut fields = self.inner.fields.write();
        match target {
            Some(target) => fields.references.insert(name.to_string(), target),
            None => fields.references.remove(name),
        };
    }

    /// Owning entity. `None` for roots, or if the owner has been dropped.
    #[must_use]
    pub fn parent(&self) -> Option<Entity> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Entity { inner })
    }

    /// Topmost reachable owner, or `self` for a root.
    #[must_use]
    pub fn root(&self) -> Entity {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether every owner up to the root still holds this entity in one
    /// of its collections. Always true for roots.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        let Some(parent) = self.parent() else {
            return self.inner.parent.is_none();
        };
        let held = parent
            .inner
            .fields
            .read()
            .children
            .values()
            .any(|list| list.contains(self));
        held && parent.is_attached()
    }

    /// Children in a collection, in insertion order.
    #[must_use]
    pub fn children(&self, name: &str) -> Vec<Entity> {
        self.inner
            .fields
            .read()
            .children
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Adds an existing child to a collection.
    ///
    /// The child must have been constructed with `self` as its parent and
    /// must be of the collection's class.
    pub fn append_child(&self, name: &str, child: Entity) -> CoreResult<()> {
        let child_class = self.child_class(name)?;
        if child.class_name() != child_class.name() {
            return Err(CoreError::constraint_violation(
                self.class_name(),
                name,
                format!("expected {}, got {}", child_class.name(), child.class_name()),
            ));
        }
        if child.parent().as_ref() != Some(self) {
            return Err(CoreError::ownership_violation(
                child.class_name(),
                format!("is not owned by this {}", self.class_name()),
            ));
        }

        let mut fields = self.inner.fields.write();
        let list = fields.children.entry(name.to_string()).or_default();
        if !list.contains(&child) {
            list.push(child);
        }
        Ok(())
    }

    /// Removes a child from a collection. Its stored row, if any, is
    /// deleted when the root is next saved.
    pub fn remove_child(&self, name: &str, child: &Entity) -> CoreResult<bool> {
        self.child_class(name)?;
        let mut fields = self.inner.fields.write();
        let Some(list) = fields.children.get_mut(name) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|c| c != child);
        Ok(list.len() != before)
    }

    /// Builds a child from a map and appends it to a collection.
    pub fn make_child(&self, name: &str, input: Value) -> CoreResult<Entity> {
        let mut built = self.make_children(name, [input])?;
        built
            .pop()
            .ok_or_else(|| CoreError::invalid_input("no child was built"))
    }

    /// Builds children from a sequence of maps and appends them.
    ///
    /// Nothing is appended unless every child builds.
    pub fn make_children<I>(&self, name: &str, inputs: I) -> CoreResult<Vec<Entity>>
    where
        I: IntoIterator<Item = Value>,
    {
        let child_class = Arc::clone(self.child_class(name)?);
        let built = inputs
            .into_iter()
            .map(|input| -> CoreResult<Entity> {
                let child = Self::child_of(self, &child_class)?;
                child.make(input)?;
                Ok(child)
            })
            .collect::<CoreResult<Vec<_>>>()?;

        self.inner
            .fields
            .write()
            .children
            .entry(name.to_string())
            .or_default()
            .extend(built.iter().cloned());
        Ok(built)
    }

    /// Visits direct children, collection by collection in declaration
    /// order.
    pub fn each_child(&self, mut f: impl FnMut(&str, &Entity)) {
        for reference in self.inner.class.child_references() {
            for child in self.children(&reference.name) {
                f(&reference.name, &child);
            }
        }
    }

    /// All entities below this one, depth first, parents before children.
    #[must_use]
    pub fn descendants(&self) -> Vec<Entity> {
        let mut out = Vec::new();
        self.each_child(|_, child| {
            out.push(child.clone());
            out.extend(child.descendants());
        });
        out
    }

    /// Renders scalar fields and value reference ids as a row.
    ///
    /// A value reference to an entity that has not been persisted yet is
    /// rendered as null.
    pub fn to_row(&self) -> Row {
        let (mut row, references): (Row, Vec<(String, Entity)>) = {
            let fields = self.inner.fields.read();
            (
                fields
                    .values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                fields
                    .references
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        };
        for r in self.inner.class.value_references() {
            row.insert(r.name.clone(), Value::Null);
        }
        for (name, target) in references {
            row.insert(name, target.id().map(Value::from));
        }
        row
    }

    /// Persists this root and its whole aggregate as new rows.
    pub fn create(&self, mapper: &dyn Mapper) -> CoreResult<EntityId> {
        persist::save(mapper, self)
    }

    /// Persists changes to this root and its aggregate.
    pub fn update(&self, mapper: &dyn Mapper) -> CoreResult<EntityId> {
        persist::save(mapper, self)
    }

    /// Removes this root and its aggregate from the store.
    pub fn destroy(&self, mapper: &dyn Mapper) -> CoreResult<bool> {
        persist::delete(mapper, self)
    }

    /// Tracked entries for this entity, one per unit of work tracking it.
    #[must_use]
    pub fn tracked_entries(&self) -> Vec<Arc<TrackedEntry>> {
        let mut entries = self.inner.entries.lock();
        entries.retain(|e| e.strong_count() > 0);
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn attach_entry(&self, entry: &Arc<TrackedEntry>) {
        let mut entries = self.inner.entries.lock();
        if !entries.iter().any(|e| e.ptr_eq(&Arc::downgrade(entry))) {
            entries.push(Arc::downgrade(entry));
        }
    }

    pub(crate) fn detach_entry(&self, entry: &Arc<TrackedEntry>) {
        let target = Arc::downgrade(entry);
        self.inner
            .entries
            .lock()
            .retain(|e| !e.ptr_eq(&target) && e.strong_count() > 0);
    }

    /// Replaces every field at once.
    pub(crate) fn replace_fields(&self, fields: Fields) {
        *self.inner.fields.write() = fields;
    }

    pub(crate) fn empty_fields(&self) -> Fields {
        Fields::defaults(&self.inner.class)
    }

    fn attribute(&self, name: &str) -> CoreResult<&Attribute> {
        self.inner
            .class
            .attribute(name)
            .ok_or_else(|| CoreError::attribute_not_allowed(self.class_name(), name))
    }

    fn child_class(&self, name: &str) -> CoreResult<&Arc<EntityClass>> {
        match self.attribute(name)? {
            Attribute::Children(c) => self.inner.schema.class(&c.child_class),
            _ => Err(CoreError::invalid_input(format!(
                "{}.{name} is not a child collection",
                self.class_name()
            ))),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.key.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("class", &self.class_name())
            .field("key", &self.inner.key)
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ScalarAttribute, ValueType};

    fn schema() -> Arc<Schema> {
        let mut company = EntityClass::new("Company");
        company
            .declare_scalar(ScalarAttribute::new("name", ValueType::Text).mandatory())
            .unwrap();
        company.declare_child("local_offices", "LocalOffice").unwrap();
        company.declare_value_ref("owner", "User").unwrap();

        let mut office = EntityClass::new("LocalOffice");
        office
            .declare_scalar(ScalarAttribute::new("description", ValueType::Text))
            .unwrap();
        office.declare_parent("company", "Company").unwrap();
        office.declare_child("addresses", "Address").unwrap();

        let mut address = EntityClass::new("Address");
        address
            .declare_scalar(ScalarAttribute::new("description", ValueType::Text))
            .unwrap();
        address
            .declare_scalar(ScalarAttribute::new("postal_code", ValueType::Text))
            .unwrap();
        address.declare_parent("local_office", "LocalOffice").unwrap();

        let mut user = EntityClass::new("User");
        user.declare_scalar(ScalarAttribute::new("name", ValueType::Text))
            .unwrap();

        let mut builder = Schema::builder();
        builder
            .register(company)
            .unwrap()
            .register(office)
            .unwrap()
            .register(address)
            .unwrap()
            .register(user)
            .unwrap();
        builder.build().unwrap()
    }

    fn company(schema: &Arc<Schema>) -> Entity {
        Entity::new(
            schema,
            "Company",
            Value::record([
                ("name", Value::from("Abstra.cc S.A")),
                (
                    "local_offices",
                    Value::List(vec![
                        Value::record([
                            ("description", Value::from("branch1")),
                            (
                                "addresses",
                                Value::List(vec![Value::record([
                                    ("description", "addr1"),
                                    ("postal_code", "1000"),
                                ])]),
                            ),
                        ]),
                        Value::record([("description", "branch2")]),
                    ]),
                ),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn constructor_builds_children_with_back_references() {
        let schema = schema();
        let c = company(&schema);
        let offices = c.children("local_offices");
        assert_eq!(offices.len(), 2);
        for office in &offices {
            assert_eq!(office.parent().as_ref(), Some(&c));
            assert_eq!(office.reference("company").as_ref(), Some(&c));
        }
        assert_eq!(offices[0].get("description"), Some(Value::from("branch1")));

        let addresses = offices[0].children("addresses");
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].parent().as_ref(), Some(&offices[0]));
        assert_eq!(addresses[0].root(), c);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let schema = schema();
        let err = Entity::new(&schema, "User", Value::record([("nope", 1i64)])).unwrap_err();
        assert!(matches!(
            err,
            CoreError::AttributeNotAllowed { ref class, ref attribute }
                if class == "User" && attribute == "nope"
        ));
    }

    #[test]
    fn non_map_input_is_rejected() {
        let schema = schema();
        let err = Entity::new(&schema, "User", Value::from("u1")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
    }

    #[test]
    fn child_class_cannot_be_constructed_directly() {
        let schema = schema();
        let err = Entity::new(&schema, "LocalOffice", Value::record([("description", "x")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::OwnershipViolation { .. }));
    }

    #[test]
    fn failed_make_leaves_entity_untouched() {
        let schema = schema();
        let c = company(&schema);
        let err = c
            .make(Value::record([
                ("name", Value::from("renamed")),
                (
                    "local_offices",
                    Value::List(vec![Value::record([("bogus", 1i64)])]),
                ),
            ]))
            .unwrap_err();
        assert!(matches!(err, CoreError::AttributeNotAllowed { .. }));
        assert_eq!(c.get("name"), Some(Value::from("Abstra.cc S.A")));
        assert_eq!(c.children("local_offices").len(), 2);
    }

    #[test]
    fn mandatory_scalar_rejects_null() {
        let schema = schema();
        let c = company(&schema);
        let err = c.set("name", Value::Null).unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation { .. }));
        assert!(c.set("name", Value::Integer(3)).is_err());
        c.set("name", Value::from("ok")).unwrap();
        assert_eq!(c.get("name"), Some(Value::from("ok")));
    }

    #[test]
    fn value_reference_from_map_and_handle() {
        let schema = schema();
        let c = company(&schema);
        c.set("owner", Value::record([("name", "u1")])).unwrap();
        let owner = c.reference("owner").unwrap();
        assert_eq!(owner.class_name(), "User");
        assert!(owner.is_root());

        let other = company(&schema);
        assert!(c.set_reference("owner", Some(other)).is_err());
        c.set_reference("owner", None).unwrap();
        assert!(c.reference("owner").is_none());
    }

    #[test]
    fn append_child_requires_ownership() {
        let schema = schema();
        let a = company(&schema);
        let b = company(&schema);
        let office = Entity::with_parent(
            &schema,
            "LocalOffice",
            Value::record([("description", "branch3")]),
            &a,
        )
        .unwrap();

        let err = b.append_child("local_offices", office.clone()).unwrap_err();
        assert!(matches!(err, CoreError::OwnershipViolation { .. }));

        a.append_child("local_offices", office.clone()).unwrap();
        a.append_child("local_offices", office).unwrap();
        assert_eq!(a.children("local_offices").len(), 3);
    }

    #[test]
    fn with_parent_checks_owner_class() {
        let schema = schema();
        let c = company(&schema);
        let err = Entity::with_parent(&schema, "Address", Value::Map(vec![]), &c)
            .unwrap_err();
        assert!(matches!(err, CoreError::OwnershipViolation { .. }));
    }

    #[test]
    fn descendants_are_depth_first() {
        let schema = schema();
        let c = company(&schema);
        let names: Vec<_> = c
            .descendants()
            .iter()
            .filter_map(|e| e.get("description").and_then(|v| v.as_text().map(str::to_string)))
            .collect();
        assert_eq!(names, vec!["branch1", "addr1", "branch2"]);
    }

    #[test]
    fn to_row_renders_scalars_and_reference_ids() {
        let schema = schema();
        let c = company(&schema);
        c.set("owner", Value::record([("name", "u1")])).unwrap();
        let row = c.to_row();
        assert_eq!(row.get("name"), Some(&Value::from("Abstra.cc S.A")));
        assert_eq!(row.get("active"), Some(&Value::Bool(true)));
        assert_eq!(row.get("id"), Some(&Value::Null));
        assert_eq!(row.get("owner"), Some(&Value::Null));
        assert!(row.get("local_offices").is_none());

        c.reference("owner").unwrap().set_id(EntityId::new(4));
        assert_eq!(c.to_row().get("owner"), Some(&Value::Integer(4)));
    }

    #[test]
    fn set_active_and_id() {
        let schema = schema();
        let u = Entity::new(&schema, "User", Value::record([("name", "u1")])).unwrap();
        assert!(u.is_active());
        u.set_active(false);
        assert!(!u.is_active());
        u.set("id", Value::Integer(12)).unwrap();
        assert_eq!(u.id(), Some(EntityId::new(12)));
    }

    #[test]
    fn persisted_id_cannot_be_reassigned() {
        let schema = schema();
        let u = Entity::new(&schema, "User", Value::record([("id", 3)])).unwrap();

        u.set("id", Value::Integer(3)).unwrap();
        assert!(matches!(
            u.set("id", Value::Integer(4)),
            Err(CoreError::ConstraintViolation { .. })
        ));
        assert!(u.set("id", Value::Null).is_err());
        assert!(matches!(
            u.make(Value::record([("name", Value::from("u")), ("id", Value::Integer(5))])),
            Err(CoreError::ConstraintViolation { .. })
        ));
        assert_eq!(u.id(), Some(EntityId::new(3)));
        assert_eq!(u.get("name"), Some(Value::Null));
    }

    #[test]
    fn removed_children_are_detached() {
        let schema = schema();
        let c = company(&schema);
        let office = c.children("local_offices").remove(0);
        let address = office.children("addresses").remove(0);
        assert!(c.is_attached());
        assert!(address.is_attached());

        c.remove_child("local_offices", &office).unwrap();
        assert!(!office.is_attached());
        assert!(!address.is_attached());
    }

    #[test]
    fn remove_child_drops_only_that_child() {
        let schema = schema();
        let c = company(&schema);
        let first = c.children("local_offices").remove(0);
        assert!(c.remove_child("local_offices", &first).unwrap());
        assert!(!c.remove_child("local_offices", &first).unwrap());
        assert_eq!(c.children("local_offices").len(), 1);
        assert!(c.remove_child("name", &first).is_err());
    }
}
