//! Attribute descriptors.

use entimap_codec::Value;
use std::fmt;

/// Value type accepted by a scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Signed integer.
    Integer,
    /// Float; integers are accepted and widened.
    Float,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Bool,
    /// Byte string.
    Bytes,
    /// List of values.
    List,
    /// Nested map.
    Map,
    /// Any non-null value.
    Any,
}

impl ValueType {
    /// Whether a non-null value is of this type.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueType::Any, _)
                | (ValueType::Integer, Value::Integer(_))
                | (ValueType::Float, Value::Float(_) | Value::Integer(_))
                | (ValueType::Text, Value::Text(_))
                | (ValueType::Bool, Value::Bool(_))
                | (ValueType::Bytes, Value::Bytes(_))
                | (ValueType::List, Value::List(_))
                | (ValueType::Map, Value::Map(_))
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Text => "text",
            ValueType::Bool => "bool",
            ValueType::Bytes => "bytes",
            ValueType::List => "list",
            ValueType::Map => "map",
            ValueType::Any => "any",
        };
        f.write_str(name)
    }
}

/// A plain value field.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarAttribute {
    name: String,
    value_type: ValueType,
    mandatory: bool,
    default: Value,
}

impl ScalarAttribute {
    /// Creates an optional attribute with a null default.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            mandatory: false,
            default: Value::Null,
        }
    }

    /// Rejects null on assignment.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Sets the value a new entity starts with.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted value type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Whether null is rejected.
    #[must_use]
    pub const fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Default value.
    #[must_use]
    pub const fn default_value(&self) -> &Value {
        &self.default
    }

    /// Checks a value against the type and mandatory constraints.
    ///
    /// Returns the value to store; integers assigned to a float field are
    /// widened. On failure returns a message naming the broken constraint.
    pub fn check(&self, value: Value) -> Result<Value, String> {
        if value.is_null() {
            if self.mandatory {
                return Err("value is mandatory".to_string());
            }
            return Ok(value);
        }
        if !self.value_type.accepts(&value) {
            return Err(format!(
                "expected {}, got {}",
                self.value_type,
                value.kind()
            ));
        }
        match (self.value_type, &value) {
            (ValueType::Float, Value::Integer(_)) => {
                Ok(value.as_float().map_or(value, Value::Float))
            }
            _ => Ok(value),
        }
    }
}

/// The back-reference a child class holds to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentReference {
    /// Field name.
    pub name: String,
    /// Owning class.
    pub parent_class: String,
}

/// An owned, ordered collection of child entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildReference {
    /// Field name.
    pub name: String,
    /// Class of the children.
    pub child_class: String,
}

/// A single-valued association to an entity of another class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueReference {
    /// Field name.
    pub name: String,
    /// Class of the referenced entity.
    pub target_class: String,
}

/// Kind of an attribute descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Plain value field.
    Scalar,
    /// Back-reference to the owner.
    Parent,
    /// Owned child collection.
    Children,
    /// Association to another entity.
    ValueRef,
}

/// Attribute descriptor declared on a class.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Plain value field.
    Scalar(ScalarAttribute),
    /// Back-reference to the owner.
    Parent(ParentReference),
    /// Owned child collection.
    Children(ChildReference),
    /// Association to another entity.
    ValueRef(ValueReference),
}

impl Attribute {
    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Attribute::Scalar(s) => s.name(),
            Attribute::Parent(p) => &p.name,
            Attribute::Children(c) => &c.name,
            Attribute::ValueRef(r) => &r.name,
        }
    }

    /// Descriptor kind.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        match self {
            Attribute::Scalar(_) => AttributeKind::Scalar,
            Attribute::Parent(_) => AttributeKind::Parent,
            Attribute::Children(_) => AttributeKind::Children,
            Attribute::ValueRef(_) => AttributeKind::ValueRef,
        }
    }
}
