//! Error types for the entimap engine.

use crate::mapper::MapperError;
use entimap_codec::CodecError;
use entimap_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in entimap core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The schema itself is malformed. Raised while classes are declared.
    #[error("configuration error in {class}: {message}")]
    Configuration {
        /// Class being declared.
        class: String,
        /// What is wrong with it.
        message: String,
    },

    /// Input of the wrong shape (e.g. a constructor given a non-map).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// A mapping key that is not declared on the class.
    #[error("attribute {attribute} is not allowed in {class}")]
    AttributeNotAllowed {
        /// Class of the entity.
        class: String,
        /// Offending key.
        attribute: String,
    },

    /// A value failed its descriptor's type or mandatory check.
    #[error("constraint violation on {class}.{attribute}: {message}")]
    ConstraintViolation {
        /// Class of the entity.
        class: String,
        /// Attribute being assigned.
        attribute: String,
        /// Which constraint failed.
        message: String,
    },

    /// A non-root entity was submitted for direct persistence, or a child
    /// was attached to an entity that does not own it.
    #[error("ownership violation on {class}: {message}")]
    OwnershipViolation {
        /// Class of the entity.
        class: String,
        /// Description of the violation.
        message: String,
    },

    /// Class name not present in the schema.
    #[error("unknown entity class: {name}")]
    UnknownClass {
        /// The missing class name.
        name: String,
    },

    /// The mapper reported a failure.
    #[error("persistence failure: {0}")]
    Persistence(#[from] MapperError),

    /// A unit of work was used out of protocol order.
    #[error("protocol misuse: {message}")]
    ProtocolMisuse {
        /// Description of the misuse.
        message: String,
    },

    /// The change journal is corrupted.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an attribute-not-allowed error.
    pub fn attribute_not_allowed(class: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::AttributeNotAllowed {
            class: class.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint_violation(
        class: impl Into<String>,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            class: class.into(),
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Creates an ownership violation error.
    pub fn ownership_violation(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OwnershipViolation {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown class error.
    pub fn unknown_class(name: impl Into<String>) -> Self {
        Self::UnknownClass { name: name.into() }
    }

    /// Creates a protocol misuse error.
    pub fn protocol_misuse(message: impl Into<String>) -> Self {
        Self::ProtocolMisuse {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }
}
