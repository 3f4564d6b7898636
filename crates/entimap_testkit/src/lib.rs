//! # entimap Testkit
//!
//! Test utilities for entimap.
//!
//! This crate provides:
//! - Fixture schemas (`Company`/`LocalOffice`/`Address`/`Country`, `User`)
//!   and input builders
//! - A temporary file-backed journal
//! - Failure injection for mappers and storage backends
//! - Property-based test generators using proptest
//! - Test logging through `tracing-subscriber`
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use entimap_core::{Entity, MemoryMapper, Registry, Transaction};
//! use entimap_testkit::prelude::*;
//!
//! init_logging();
//! let schema = company_schema();
//! let input = company_input("Acme", vec![office_input("HQ", &["Main St"])]);
//! let acme = Entity::new(&schema, "Company", input).unwrap();
//!
//! let registry = Registry::new();
//! let tx = Transaction::new(&registry, Arc::new(MemoryMapper::new()));
//! tx.register_new(&acme).unwrap();
//! tx.commit().unwrap();
//! assert!(acme.id().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod failing;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::failing::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use failing::*;
pub use fixtures::*;
pub use generators::*;
