//! Tidal Core - value, tuple and schema types for the tidal dataflow engine.
//!
//! This crate provides the foundational types shared by every other tidal crate:
//!
//! - `Value`: Runtime values stored in tuple columns (Null, Boolean, Int64, Float64, String, DateTime, Bytes, List)
//! - `Tuple`: A fixed-arity sequence of values
//! - `Schema`: Column layout of a collection, key columns first
//! - `Error`: Error taxonomy for the engine
//!
//! # Example
//!
//! ```rust
//! use tidal_core::{tuple, Schema, Value};
//!
//! let link = Schema::new("link", &["from", "to"], &["cost"]).unwrap();
//! let t = tuple!["a", "b", 1];
//!
//! assert_eq!(link.key_of(&t), vec![Value::from("a"), Value::from("b")]);
//! assert_eq!(t.get(2), Some(&Value::Int64(1)));
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod error;
pub mod schema;
mod tuple;
mod value;

pub use error::{Error, Result};
pub use schema::{Schema, SchemaBuilder};
pub use tuple::Tuple;
pub use value::Value;
