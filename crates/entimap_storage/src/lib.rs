//! # entimap Storage
//!
//! Byte-level storage for the entimap change journal.
//!
//! A backend is an append-only byte store. It knows nothing about rows,
//! entity classes, or journal framing; `entimap_core` owns all of that.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - for tests and throwaway stores
//! - [`FileBackend`] - for a journal that survives restarts
//!
//! ## Example
//!
//! ```rust
//! use entimap_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"row bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 9).unwrap(), b"row bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
