// ABOUTME: A template that writes any serde type as a single slot of an object graph.
// ABOUTME: Bridges plain Rust data types into graphs without a hand-written template.

use crate::de::Deserializer;
use crate::error::Result;
use crate::object::{ObjectPacker, ObjectUnpacker};
use crate::ser::Serializer;
use crate::template::{borrow_shell, borrow_target, ContainerShape, Template, Tracking};
use crate::value::{ObjectRef, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::marker::PhantomData;
use std::ops::RangeInclusive;

/// Template for objects of type `T`, encoded through serde.
///
/// The whole value occupies one slot, so nested objects inside `T` are
/// copied rather than shared.
///
/// ```
/// use objpack::{Codec, SerdeTemplate, TemplateRegistry, Value};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Point { x: i32, y: i32 }
///
/// let mut registry = TemplateRegistry::new();
/// registry.register(SerdeTemplate::<Point>::new());
/// let codec = Codec::new(registry);
///
/// let bytes = codec.pack(&Value::object(Point { x: 1, y: 2 })).unwrap();
/// let back = codec.unpack(&bytes).unwrap();
/// assert_eq!(back.as_object().unwrap().get::<Point>().unwrap().y, 2);
/// ```
pub struct SerdeTemplate<T> {
    schemas: RangeInclusive<u32>,
    tracking: Tracking,
    shell: Option<fn() -> T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeTemplate<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemas: 1..=u32::MAX,
            tracking: Tracking::Identity,
            shell: None,
            _marker: PhantomData,
        }
    }

    /// Limit this template to a range of schema IDs.
    #[must_use]
    pub fn for_schemas(mut self, schemas: RangeInclusive<u32>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Write every occurrence in full instead of back-referencing repeats.
    #[must_use]
    pub fn untracked(mut self) -> Self {
        self.tracking = Tracking::DoNotTrack;
        self
    }
}

impl<T: Default> SerdeTemplate<T> {
    /// Pre-create default instances, which also lets objects written
    /// through the unknown-type fallback be restored as `T`.
    #[must_use]
    pub fn with_default_shell(mut self) -> Self {
        self.shell = Some(T::default);
        self
    }
}

impl<T> Default for SerdeTemplate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Template for SerdeTemplate<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn target_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Primitive
    }

    fn tracking(&self) -> Tracking {
        self.tracking
    }

    fn supports_schema(&self, schema_id: u32) -> bool {
        self.schemas.contains(&schema_id)
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let target = borrow_target::<T>(self, value)?;
        target.serialize(&mut Serializer::new(out.packer()))
    }

    fn pre_create(&self, _size: usize) -> Option<ObjectRef> {
        self.shell.map(|make| ObjectRef::new(make()))
    }

    fn read_data(
        &self,
        shell: Option<&ObjectRef>,
        _size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        let decoded = T::deserialize(&mut Deserializer::new(input.unpacker()))?;
        match shell {
            Some(obj) => {
                *borrow_shell::<T>(self, obj)? = decoded;
                Ok(Value::Object(obj.clone()))
            }
            None => Ok(Value::object(decoded)),
        }
    }
}
