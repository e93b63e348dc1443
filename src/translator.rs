// ABOUTME: Pluggable mapping between runtime type names and their on-wire identifiers.
// ABOUTME: Used by the unknown-type fallback, which writes a type as (module path, simple name).

use memchr::{memchr, memmem};

/// Maps runtime type names to and from stable wire identifiers.
///
/// Environments that rename or sandbox types supply their own translation;
/// the core never interprets the names beyond splitting them.
pub trait TypeNameTranslator: Send + Sync {
    /// Name to write for a runtime type.
    fn to_wire(&self, type_name: &str) -> String;

    /// Runtime type name for a name read off the wire.
    fn from_wire(&self, wire_name: &str) -> String;
}

/// Writes and reads type names unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl TypeNameTranslator for IdentityTranslator {
    fn to_wire(&self, type_name: &str) -> String {
        type_name.to_owned()
    }

    fn from_wire(&self, wire_name: &str) -> String {
        wire_name.to_owned()
    }
}

/// Split a type path into (module path, simple name).
///
/// Separators inside generic arguments are ignored, so
/// `alloc::vec::Vec<my::Item>` splits into `alloc::vec` and `Vec<my::Item>`.
#[must_use]
pub fn split_type_name(type_name: &str) -> (&str, &str) {
    let bytes = type_name.as_bytes();
    let path_end = memchr(b'<', bytes).unwrap_or(bytes.len());
    match memmem::rfind(&bytes[..path_end], b"::") {
        Some(pos) => (&type_name[..pos], &type_name[pos + 2..]),
        None => ("", type_name),
    }
}

/// Join a (module path, simple name) pair back into a type path.
#[must_use]
pub fn join_type_name(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_owned()
    } else {
        format!("{package}::{name}")
    }
}
