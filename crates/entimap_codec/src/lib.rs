//! # entimap Codec
//!
//! Field values and rows as they cross the mapper boundary.
//!
//! - [`Value`] is the dynamic type of an entity field and of the
//!   field-value mappings handed to entity constructors.
//! - [`Row`] is the flat, name-keyed shape a mapper stores.
//! - [`to_cbor`] / [`from_cbor`] serialize any serde type (rows, journal
//!   payloads) to CBOR through `ciborium`.
//!
//! ## Usage
//!
//! ```
//! use entimap_codec::{from_cbor, to_cbor, Row, Value};
//!
//! let mut row = Row::new();
//! row.insert("name", Value::from("Abstra.cc S.A"));
//! let bytes = to_cbor(&row).unwrap();
//! let decoded: Row = from_cbor(&bytes).unwrap();
//! assert_eq!(row, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod row;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use row::Row;
pub use value::Value;
