//! # entimap Core
//!
//! Object persistence around aggregates.
//!
//! This crate provides:
//! - Entity class declarations ([`schema`]) with scalar attributes, owned
//!   child collections, parent back-references and references to other
//!   aggregate roots
//! - Dynamic [`Entity`] instances built from field-value mappings
//! - The row-level [`Mapper`] boundary, with an in-memory
//!   ([`MemoryMapper`]) and a journaled ([`JournalMapper`]) implementation
//! - Aggregate persistence ([`persist`]): roots are saved, loaded and
//!   deleted together with everything they own
//! - [`UnitOfWork`] and [`Transaction`] change tracking, findable through
//!   a [`Registry`]
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use entimap_codec::Value;
//! use entimap_core::schema::{EntityClass, ScalarAttribute, Schema, ValueType};
//! use entimap_core::{persist, Entity, EntityId, EntryState, MemoryMapper, Registry, Transaction};
//!
//! let mut company = EntityClass::new("Company");
//! company.declare_scalar(ScalarAttribute::new("name", ValueType::Text)).unwrap();
//! company.declare_child("local_offices", "LocalOffice").unwrap();
//! let mut office = EntityClass::new("LocalOffice");
//! office.declare_scalar(ScalarAttribute::new("description", ValueType::Text)).unwrap();
//! office.declare_parent("company", "Company").unwrap();
//!
//! let mut builder = Schema::builder();
//! builder.register(company).unwrap().register(office).unwrap();
//! let schema = builder.build().unwrap();
//!
//! let acme = Entity::new(
//!     &schema,
//!     "Company",
//!     Value::record([
//!         ("name", Value::from("Acme")),
//!         ("local_offices", Value::List(vec![Value::record([("description", "HQ")])])),
//!     ]),
//! )
//! .unwrap();
//!
//! let mapper = Arc::new(MemoryMapper::new());
//! let registry = Registry::new();
//! let tx = Transaction::new(&registry, mapper.clone());
//! tx.register_new(&acme).unwrap();
//! tx.commit().unwrap();
//!
//! let entry = tx.fetch_object_by_id("Company", EntityId::new(1)).unwrap();
//! assert_eq!(entry.state(), EntryState::Dirty);
//!
//! let loaded = persist::find_by_id(mapper.as_ref(), &schema, "Company", EntityId::new(1))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(loaded.children("local_offices").len(), 1);
//! tx.complete().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod mapper;
pub mod persist;
mod registry;
pub mod schema;
mod tracker;
mod transaction;
mod types;
mod unit_of_work;

pub use config::{JournalConfig, UnitOfWorkConfig};
pub use entity::Entity;
pub use error::{CoreError, CoreResult};
pub use mapper::{
    JournalMapper, Mapper, MapperError, MapperResult, MemoryMapper, ParentLink,
};
pub use registry::Registry;
pub use schema::Schema;
pub use tracker::{EntryState, ObjectTracker, Registration, TrackedEntry};
pub use transaction::Transaction;
pub use types::{EntityId, EntityKey, UnitOfWorkId};
pub use unit_of_work::UnitOfWork;
