//! Per-class attribute registry.

use super::attribute::{
    Attribute, AttributeKind, ChildReference, ParentReference, ScalarAttribute, ValueReference,
    ValueType,
};
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;

/// Name of the implicit identifier attribute.
pub const ID_ATTRIBUTE: &str = "id";

/// Name of the implicit soft-delete flag.
pub const ACTIVE_ATTRIBUTE: &str = "active";

/// Descriptor of an entity class: its name and declared attributes.
///
/// Every class starts with the implicit `id` (nullable integer) and
/// `active` (bool, default `true`) attributes.
///
/// ```
/// use entimap_core::schema::{EntityClass, ScalarAttribute, ValueType};
///
/// let mut office = EntityClass::new("LocalOffice");
/// office.declare_scalar(ScalarAttribute::new("description", ValueType::Text)).unwrap();
/// office.declare_parent("company", "Company").unwrap();
/// assert!(office.has_parent());
/// assert!(office.declare_parent("other", "Other").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EntityClass {
    name: String,
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
}

impl EntityClass {
    /// Creates a class with only the implicit attributes.
    pub fn new(name: impl Into<String>) -> Self {
        let mut class = Self {
            name: name.into(),
            attributes: Vec::new(),
            index: HashMap::new(),
        };
        class.push(Attribute::Scalar(ScalarAttribute::new(
            ID_ATTRIBUTE,
            ValueType::Integer,
        )));
        class.push(Attribute::Scalar(
            ScalarAttribute::new(ACTIVE_ATTRIBUTE, ValueType::Bool).with_default(true),
        ));
        class
    }

    /// Class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a scalar attribute.
    pub fn declare_scalar(&mut self, attribute: ScalarAttribute) -> CoreResult<()> {
        let default = attribute.default_value();
        if !default.is_null() && !attribute.value_type().accepts(default) {
            return Err(CoreError::configuration(
                &self.name,
                format!(
                    "default of {} is {}, expected {}",
                    attribute.name(),
                    default.kind(),
                    attribute.value_type()
                ),
            ));
        }
        self.declare(Attribute::Scalar(attribute))
    }

    /// Declares an owned collection of `child_class` entities.
    pub fn declare_child(
        &mut self,
        name: impl Into<String>,
        child_class: impl Into<String>,
    ) -> CoreResult<()> {
        self.declare(Attribute::Children(ChildReference {
            name: name.into(),
            child_class: child_class.into(),
        }))
    }

    /// Declares the back-reference to the owning class.
    ///
    /// A class has at most one parent.
    pub fn declare_parent(
        &mut self,
        name: impl Into<String>,
        parent_class: impl Into<String>,
    ) -> CoreResult<()> {
        let name = name.into();
        if let Some(existing) = self.parent_reference() {
            return Err(CoreError::configuration(
                &self.name,
                format!(
                    "found multiple parents: {} already declared, refusing {name}",
                    existing.name
                ),
            ));
        }
        self.declare(Attribute::Parent(ParentReference {
            name,
            parent_class: parent_class.into(),
        }))
    }

    /// Declares a single-valued association to `target_class`.
    pub fn declare_value_ref(
        &mut self,
        name: impl Into<String>,
        target_class: impl Into<String>,
    ) -> CoreResult<()> {
        self.declare(Attribute::ValueRef(ValueReference {
            name: name.into(),
            target_class: target_class.into(),
        }))
    }

    /// All attributes in declaration order, implicit ones first.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute by field name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.index.get(name).and_then(|&i| self.attributes.get(i))
    }

    /// Whether this class is owned by another (i.e. is not a root).
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.parent_reference().is_some()
    }

    /// Whether this class owns child collections.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.count(AttributeKind::Children) > 0
    }

    /// Whether this class has value references.
    #[must_use]
    pub fn has_value_references(&self) -> bool {
        self.count(AttributeKind::ValueRef) > 0
    }

    /// Whether instances may be persisted directly.
    #[must_use]
    pub fn is_root(&self) -> bool {
        !self.has_parent()
    }

    /// The parent reference, if declared.
    #[must_use]
    pub fn parent_reference(&self) -> Option<&ParentReference> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Parent(p) => Some(p),
            _ => None,
        })
    }

    /// Child references in declaration order.
    pub fn child_references(&self) -> impl Iterator<Item = &ChildReference> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Children(c) => Some(c),
            _ => None,
        })
    }

    /// Value references in declaration order.
    pub fn value_references(&self) -> impl Iterator<Item = &ValueReference> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::ValueRef(r) => Some(r),
            _ => None,
        })
    }

    /// Scalar attributes in declaration order.
    pub fn scalars(&self) -> impl Iterator<Item = &ScalarAttribute> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Scalar(s) => Some(s),
            _ => None,
        })
    }

    fn count(&self, kind: AttributeKind) -> usize {
        self.attributes.iter().filter(|a| a.kind() == kind).count()
    }

    fn declare(&mut self, attribute: Attribute) -> CoreResult<()> {
        if self.index.contains_key(attribute.name()) {
            return Err(CoreError::configuration(
                &self.name,
                format!("attribute {} is already declared", attribute.name()),
            ));
        }
        self.push(attribute);
        Ok(())
    }

    fn push(&mut self, attribute: Attribute) {
        self.index
            .insert(attribute.name().to_string(), self.attributes.len());
        self.attributes.push(attribute);
    }
}
