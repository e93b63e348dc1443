// ABOUTME: The Template trait binding one runtime type to its wire encoding and decoding.
// ABOUTME: Templates are registered in slots; a schema assigns each chosen template its ID.

use crate::error::{Error, Result};
use crate::object::{ObjectPacker, ObjectUnpacker};
use crate::value::{ObjectRef, Value};
use std::any::{Any, TypeId};
use std::cell::{Ref, RefMut};
use std::sync::Arc;

/// The wire container a template's data is written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerShape {
    /// An array of `space_required` slots
    Array,
    /// A map of `space_required / 2` pairs
    Map,
    /// Exactly one scalar slot, no container header
    Primitive,
    /// Exactly one raw byte string
    Raw,
}

/// How repeated occurrences of a value are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    /// Equal strings are written once
    Equality,
    /// The same object is written once
    Identity,
    /// Every occurrence is written in full
    DoNotTrack,
}

/// Describes how one runtime type is written to and read from the wire.
///
/// A full write emits the template ID followed by `write_data`, which must
/// emit exactly `space_required(value)` slots into the container implied by
/// [`Template::shape`]. `read_data` consumes the same number of slots.
///
/// Slots are either plain wire values written through
/// [`ObjectPacker::packer`] or nested objects written with
/// [`ObjectPacker::write_value`]; each takes exactly one slot.
pub trait Template: Send + Sync + 'static {
    /// The concrete runtime type this template accepts.
    fn target_type(&self) -> TypeId;

    /// Stable name of the target type, used for unknown-type resolution.
    fn type_name(&self) -> &'static str;

    fn shape(&self) -> ContainerShape;

    fn tracking(&self) -> Tracking {
        Tracking::Identity
    }

    /// Slot count when it does not depend on the value.
    fn fixed_size(&self) -> Option<usize> {
        None
    }

    /// Whether this template is consulted when no exact type matches.
    fn is_fallback(&self) -> bool {
        false
    }

    /// Whether this template claims its target type for exact lookup.
    /// Non-main templates are reachable only by ID or as fallbacks.
    fn is_main_template(&self) -> bool {
        true
    }

    /// Whether this template is part of the given schema version.
    fn supports_schema(&self, _schema_id: u32) -> bool {
        true
    }

    /// Fallback match test. Exact lookups never call this.
    fn accepts(&self, value: &Value) -> bool {
        value.type_id() == Some(self.target_type())
    }

    /// Number of slots `write_data` emits for `value`.
    fn space_required(&self, value: &Value) -> Result<usize> {
        match (self.shape(), self.fixed_size()) {
            (_, Some(size)) => Ok(size),
            (ContainerShape::Primitive | ContainerShape::Raw, None) => Ok(1),
            _ => Err(Error::UnsupportedValue(format!(
                "{} has no fixed size and does not report one for {}",
                self.type_name(),
                value.type_name()
            ))),
        }
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()>;

    /// An unpopulated instance registered before nested data is read,
    /// so that cyclic references resolve to it.
    fn pre_create(&self, _size: usize) -> Option<ObjectRef> {
        None
    }

    /// Read `size` slots. When `shell` is given it came from
    /// [`Template::pre_create`] and must be populated, not replaced.
    fn read_data(
        &self,
        shell: Option<&ObjectRef>,
        size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value>;

    /// Whether [`Template::complete`] must run once the graph is read.
    fn has_completion_hook(&self) -> bool {
        false
    }

    /// Called after the whole graph is read, in registration order.
    fn complete(&self, _value: &Value) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("type_name", &self.type_name())
            .field("shape", &self.shape())
            .field("tracking", &self.tracking())
            .finish()
    }
}

/// Position of a user template slot in a [`TemplateRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateSlot(pub(crate) usize);

impl TemplateSlot {
    /// Index among the user slots, starting at 0.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The caller-supplied template list from which schemas are built.
///
/// Every registration opens a slot whose ID stays the same in every schema
/// version. A slot may hold several variants of a template for different
/// schema versions; a schema takes the one variant that supports it, or
/// leaves the slot empty.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    slots: Vec<Vec<Arc<dyn Template>>>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template in a new slot.
    pub fn register<T: Template>(&mut self, template: T) -> TemplateSlot {
        self.register_arc(Arc::new(template))
    }

    pub fn register_arc(&mut self, template: Arc<dyn Template>) -> TemplateSlot {
        self.slots.push(vec![template]);
        TemplateSlot(self.slots.len() - 1)
    }

    /// Register another version of the template in `slot`.
    ///
    /// Both variants share one ID; the schema version selects between them.
    pub fn register_alias<T: Template>(&mut self, slot: TemplateSlot, template: T) -> Result<()> {
        let variants = self.slots.get_mut(slot.0).ok_or_else(|| {
            Error::SchemaConflict(format!("no template slot {}", slot.0))
        })?;
        variants.push(Arc::new(template));
        Ok(())
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn slots(&self) -> &[Vec<Arc<dyn Template>>] {
        &self.slots
    }
}

pub(crate) fn type_mismatch(template: &dyn Template, value: &Value) -> Error {
    Error::UnexpectedType(format!(
        "template for {} cannot write a {}",
        template.type_name(),
        value.type_name()
    ))
}

/// Borrow the object behind `value` as the template's target type.
pub fn borrow_target<'v, T: Any>(template: &dyn Template, value: &'v Value) -> Result<Ref<'v, T>> {
    value
        .as_object()
        .and_then(ObjectRef::borrow::<T>)
        .ok_or_else(|| type_mismatch(template, value))
}

/// Mutably borrow a pre-created shell as the template's target type.
pub fn borrow_shell<'o, T: Any>(template: &dyn Template, shell: &'o ObjectRef) -> Result<RefMut<'o, T>> {
    shell.borrow_mut::<T>().ok_or_else(|| {
        Error::UnexpectedType(format!(
            "template for {} was given a {} shell",
            template.type_name(),
            shell.type_name()
        ))
    })
}

/// Check the slot count of a fixed-size read.
pub fn expect_size(template: &dyn Template, size: usize, expected: usize) -> Result<()> {
    if size != expected {
        return Err(Error::UnexpectedType(format!(
            "{} expects {expected} slots, found {size}",
            template.type_name()
        )));
    }
    Ok(())
}
