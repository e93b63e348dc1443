// ABOUTME: Compact binary object-graph serializer with versioned template schemas.
// ABOUTME: Exposes the wire codec, the template/schema layer, and a serde-style API.

//! # objpack
//!
//! A compact, self-describing binary serializer for object graphs.
//!
//! Values are written in a MessagePack-style wire format using the
//! smallest encoding for every integer and length. On top of that, an
//! object layer writes each object through a *template* chosen by its
//! runtime type, writes repeated objects and equal strings once and
//! back-references them afterwards, and restores shared and cyclic
//! structure when reading.
//!
//! ## Object graphs
//!
//! ```rust
//! use objpack::{Codec, Value, ValueMap};
//!
//! let name = Value::from("gear");
//! let mut part = ValueMap::new();
//! part.insert("name", name.clone());
//! part.insert("alias", name);
//! let part = Value::object(part);
//!
//! let codec = Codec::default();
//! let bytes = codec.pack(&Value::list(vec![part.clone(), part])).unwrap();
//!
//! let back = codec.unpack(&bytes).unwrap();
//! let items = back.as_object().unwrap().get::<Vec<Value>>().unwrap();
//! assert!(items[0].same(&items[1]));
//! ```
//!
//! ## Plain serde types
//!
//! ```rust
//! use objpack::{from_slice, to_vec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! let person = Person { name: "Alice".to_string(), age: 30 };
//! let bytes = to_vec(&person).unwrap();
//! let decoded: Person = from_slice(&bytes).unwrap();
//! assert_eq!(person, decoded);
//! ```
//!
//! ## Schema versions
//!
//! Every stream names the schema it was written with. Templates may limit
//! themselves to a range of schema IDs, and several versions of one
//! template may share an ID slot; a reader always decodes with the
//! templates of the writer's schema, so older streams stay readable.
//!
//! ## Resource Limits
//!
//! Declared lengths and nesting are checked before anything is allocated:
//! - Maximum raw length: 128 MiB
//! - Maximum array length: 4 Mi elements
//! - Maximum map length: 2 Mi pairs
//! - Maximum container nesting: 512
//! - Maximum object nesting: 256
//! - Cached schemas per manager: 256

mod builtin;
pub mod de;
pub mod error;
pub mod object;
pub mod packer;
pub mod schema;
pub mod ser;
pub mod serde_template;
pub mod template;
pub mod tracker;
pub mod translator;
pub mod types;
pub mod unpacker;
pub mod value;

// Re-export commonly used items at the crate root
pub use de::{from_reader, from_slice, from_slice_with_config, Deserializer};
pub use error::{Error, LimitKind, Result};
pub use object::{Codec, CodecConfig, ObjectPacker, ObjectUnpacker};
pub use packer::Packer;
pub use schema::{Schema, SchemaManager};
pub use ser::Serializer;
pub use serde_template::SerdeTemplate;
pub use template::{ContainerShape, Template, TemplateRegistry, TemplateSlot, Tracking};
pub use translator::{IdentityTranslator, TypeNameTranslator};
pub use types::{limits, tag, Decimal, FORMAT_VERSION};
pub use unpacker::{Event, Unpacker, UnpackerConfig};
pub use value::{BigInt, ElementType, ObjectArray, ObjectRef, UnknownType, Value, ValueMap};

use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, OnceLock};

/// Serialize a value to a byte vector.
///
/// # Example
///
/// ```rust
/// use objpack::to_vec;
///
/// let bytes = to_vec(&42i32).unwrap();
/// assert_eq!(bytes, vec![0x2a]); // positive fixnum 42
/// ```
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    to_writer(&mut buf, value)?;
    Ok(buf)
}

/// Serialize a value to a writer.
///
/// # Example
///
/// ```rust
/// use objpack::to_writer;
///
/// let mut buf = Vec::new();
/// to_writer(&mut buf, &"hello").unwrap();
/// assert_eq!(buf[0], 0xa5);
/// ```
pub fn to_writer<W: Write, T: Serialize>(writer: W, value: &T) -> Result<()> {
    let mut packer = Packer::new(writer);
    {
        let mut serializer = Serializer::new(&mut packer);
        value.serialize(&mut serializer)?;
    }
    packer.finish()?;
    Ok(())
}

fn default_schemas() -> Arc<SchemaManager> {
    static SCHEMAS: OnceLock<Arc<SchemaManager>> = OnceLock::new();
    Arc::clone(SCHEMAS.get_or_init(|| Arc::new(SchemaManager::default())))
}

/// Pack an object graph using only the built-in templates.
///
/// # Example
///
/// ```rust
/// use objpack::{pack, unpack, Value};
///
/// let bytes = pack(&Value::from("hi")).unwrap();
/// assert_eq!(unpack(&bytes).unwrap(), Value::from("hi"));
/// ```
pub fn pack(value: &Value) -> Result<Vec<u8>> {
    Codec::with_manager(default_schemas()).pack(value)
}

/// Unpack an object graph using only the built-in templates.
pub fn unpack(data: &[u8]) -> Result<Value> {
    Codec::with_manager(default_schemas()).unpack(data)
}
