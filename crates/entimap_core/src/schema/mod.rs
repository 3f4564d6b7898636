//! Entity class declarations.
//!
//! Classes are declared with [`EntityClass`], collected by a
//! [`SchemaBuilder`], and frozen into an immutable [`Schema`]. Entities
//! carry an `Arc<Schema>` so they can construct their children and
//! value references by class name.

mod attribute;
mod class;

pub use attribute::{
    Attribute, AttributeKind, ChildReference, ParentReference, ScalarAttribute, ValueReference,
    ValueType,
};
pub use class::{EntityClass, ACTIVE_ATTRIBUTE, ID_ATTRIBUTE};

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable set of entity classes.
#[derive(Debug, Default)]
pub struct Schema {
    classes: BTreeMap<String, Arc<EntityClass>>,
}

impl Schema {
    /// Starts a new schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EntityClass>> {
        self.classes.get(name)
    }

    /// Looks up a class by name, failing with [`CoreError::UnknownClass`].
    pub fn class(&self, name: &str) -> CoreResult<&Arc<EntityClass>> {
        self.get(name).ok_or_else(|| CoreError::unknown_class(name))
    }

    /// Iterates classes in name order.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<EntityClass>> {
        self.classes.values()
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no classes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Collects classes and validates the references between them.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    classes: BTreeMap<String, EntityClass>,
}

impl SchemaBuilder {
    /// Adds a class. Names must be unique.
    pub fn register(&mut self, class: EntityClass) -> CoreResult<&mut Self> {
        if self.classes.contains_key(class.name()) {
            return Err(CoreError::configuration(
                class.name(),
                "class is already registered",
            ));
        }
        self.classes.insert(class.name().to_string(), class);
        Ok(self)
    }

    /// Freezes the schema.
    ///
    /// Every referenced class must be registered, and every child class
    /// must declare a parent reference pointing back at its owner.
    pub fn build(self) -> CoreResult<Arc<Schema>> {
        for class in self.classes.values() {
            self.validate(class)?;
        }
        Ok(Arc::new(Schema {
            classes: self
                .classes
                .into_iter()
                .map(|(name, class)| (name, Arc::new(class)))
                .collect(),
        }))
    }

    fn validate(&self, class: &EntityClass) -> CoreResult<()> {
        let missing = |target: &str| {
            CoreError::configuration(class.name(), format!("references unknown class {target}"))
        };

        if let Some(parent) = class.parent_reference() {
            if !self.classes.contains_key(&parent.parent_class) {
                return Err(missing(&parent.parent_class));
            }
        }
        for reference in class.value_references() {
            let target = self
                .classes
                .get(&reference.target_class)
                .ok_or_else(|| missing(&reference.target_class))?;
            if target.has_parent() {
                return Err(CoreError::configuration(
                    class.name(),
                    format!(
                        "{} may only reference aggregate roots, {} is owned",
                        reference.name, reference.target_class
                    ),
                ));
            }
        }
        for child in class.child_references() {
            let child_class = self
                .classes
                .get(&child.child_class)
                .ok_or_else(|| missing(&child.child_class))?;
            match child_class.parent_reference() {
                Some(parent) if parent.parent_class == class.name() => {}
                _ => {
                    return Err(CoreError::configuration(
                        class.name(),
                        format!(
                            "child class {} of {} must declare {} as its parent",
                            child.child_class,
                            child.name,
                            class.name()
                        ),
                    ))
                }
            }
        }
        Ok(())
    }
}
