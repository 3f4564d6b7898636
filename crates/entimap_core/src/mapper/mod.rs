//! Row-level persistence boundary.
//!
//! A [`Mapper`] stores flat [`Row`]s per entity class. It knows nothing
//! about aggregates: cascading an aggregate into rows and enforcing that
//! only roots are persisted directly is done by [`crate::persist`].

mod journal;
mod memory;

pub use journal::JournalMapper;
pub use memory::MemoryMapper;

use crate::types::EntityId;
use entimap_codec::{CodecError, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for mapper operations.
pub type MapperResult<T> = Result<T, MapperError>;

/// Errors reported by a mapper.
#[derive(Debug, Error)]
pub enum MapperError {
    /// The underlying store failed.
    #[error("storage failure: {message}")]
    Storage {
        /// Description from the store.
        message: String,
    },

    /// A row could not be encoded or decoded.
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),

    /// The store refused the operation.
    #[error("{class} rejected: {message}")]
    Rejected {
        /// Class of the row.
        class: String,
        /// Reason given by the store.
        message: String,
    },

    /// Stored data is inconsistent.
    #[error("corrupted data: {message}")]
    Corrupted {
        /// Description of the inconsistency.
        message: String,
    },

    /// The store cannot serve requests right now.
    #[error("mapper unavailable: {message}")]
    Unavailable {
        /// Description of the outage.
        message: String,
    },
}

impl MapperError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a rejection.
    pub fn rejected(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Identifies the owner of a child row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentLink {
    /// Class of the owner.
    pub class: String,
    /// Id of the owner row.
    pub id: EntityId,
    /// Child collection the row belongs to.
    pub field: String,
}

impl ParentLink {
    /// Creates a parent link.
    pub fn new(class: impl Into<String>, id: EntityId, field: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            id,
            field: field.into(),
        }
    }
}

/// Row store for entity classes.
///
/// Implementations assign ids on insert and must be safe to share across
/// threads; units of work hold them as `Arc<dyn Mapper>`.
pub trait Mapper: Send + Sync {
    /// Stores a new row and returns its assigned id.
    ///
    /// `parent` is set for child rows.
    fn insert(&self, class: &str, parent: Option<&ParentLink>, row: &Row)
        -> MapperResult<EntityId>;

    /// Replaces the row stored under `id`.
    fn update(&self, class: &str, id: EntityId, row: &Row) -> MapperResult<()>;

    /// Deletes a row. Returns `false` if it did not exist.
    fn delete(&self, class: &str, id: EntityId) -> MapperResult<bool>;

    /// Fetches one row.
    fn find_by_id(&self, class: &str, id: EntityId) -> MapperResult<Option<Row>>;

    /// Fetches every row of a class in id order.
    fn find_all(&self, class: &str) -> MapperResult<Vec<Row>>;

    /// Fetches the child rows linked to `parent` in id order.
    fn find_children(&self, child_class: &str, parent: &ParentLink) -> MapperResult<Vec<Row>>;
}
