//! Loading field-value maps into entities.

use super::Entity;
use crate::error::{CoreError, CoreResult};
use crate::schema::{Attribute, ID_ATTRIBUTE};
use entimap_codec::Value;
use std::sync::Arc;

impl Entity {
    /// Applies a field-value map to this entity.
    ///
    /// Scalars and value references are assigned first; child lists are
    /// built afterwards, with every direct field already in place. The
    /// whole map is validated before anything is assigned, so on error the
    /// entity is unchanged.
    pub fn make(&self, input: Value) -> CoreResult<()> {
        let Value::Map(entries) = input else {
            return Err(CoreError::invalid_input(format!(
                "{} must be initialized with a map, got {}",
                self.class_name(),
                input.kind()
            )));
        };

        let mut scalars = Vec::new();
        let mut references = Vec::new();
        let mut deferred = Vec::new();

        for (name, value) in entries {
            let attribute = self
                .class()
                .attribute(&name)
                .ok_or_else(|| CoreError::attribute_not_allowed(self.class_name(), &name))?;
            match attribute {
                Attribute::Scalar(s) => {
                    let value = s.check(value).map_err(|message| {
                        CoreError::constraint_violation(self.class_name(), &name, message)
                    })?;
                    if name == ID_ATTRIBUTE {
                        self.ensure_id_unchanged(&value)?;
                    }
                    scalars.push((name, value));
                }
                Attribute::ValueRef(r) => {
                    let target = self.build_reference(&name, &r.target_class, value)?;
                    references.push((name, target));
                }
                Attribute::Children(c) => {
                    let class = Arc::clone(self.schema().class(&c.child_class)?);
                    let inputs = match value {
                        Value::List(items) => items,
                        Value::Null => Vec::new(),
                        other => {
                            return Err(CoreError::constraint_violation(
                                self.class_name(),
                                &name,
                                format!("expected a list of maps, got {}", other.kind()),
                            ))
                        }
                    };
                    deferred.push((name, class, inputs));
                }
                Attribute::Parent(_) => {
                    return Err(CoreError::invalid_input(format!(
                        "{}.{name} is set by the owning entity",
                        self.class_name()
                    )))
                }
            }
        }

        let mut children = Vec::new();
        for (name, class, inputs) in deferred {
            for input in inputs {
                let child = Self::child_of(self, &class)?;
                child.make(input)?;
                children.push((name.clone(), child));
            }
        }

        let mut fields = self.inner.fields.write();
        for (name, value) in scalars {
            fields.values.insert(name, value);
        }
        for (name, target) in references {
            match target {
                Some(target) => fields.references.insert(name, target),
                None => fields.references.remove(&name),
            };
        }
        for (name, child) in children {
            fields.children.entry(name).or_default().push(child);
        }
        Ok(())
    }

    /// Resolves value reference input: null, or a map for a new root of
    /// the target class.
    pub(super) fn build_reference(
        &self,
        name: &str,
        target_class: &str,
        value: Value,
    ) -> CoreResult<Option<Entity>> {
        match value {
            Value::Null => Ok(None),
            map @ Value::Map(_) => Entity::new(self.schema(), target_class, map).map(Some),
            other => Err(CoreError::constraint_violation(
                self.class_name(),
                name,
                format!("expected null or a map, got {}", other.kind()),
            )),
        }
    }
}
