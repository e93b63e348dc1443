// ABOUTME: Templates for the types every schema knows: scalars, strings, primitive arrays,
// ABOUTME: big integers, decimals, timestamps, generic lists and maps, and the unknown-type fallback.

use crate::error::{Error, Result};
use crate::object::{ObjectPacker, ObjectUnpacker};
use crate::packer::Packer;
use crate::template::{
    borrow_shell, borrow_target, expect_size, type_mismatch, ContainerShape, Template, Tracking,
};
use crate::translator::{join_type_name, split_type_name};
use crate::types::Decimal;
use crate::unpacker::Unpacker;
use crate::value::{BigInt, ObjectRef, UnknownType, Value, ValueMap};
use std::any::TypeId;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// The built-in templates in ID order, starting at ID 1.
///
/// Appending is the only compatible change to this list.
pub(crate) fn templates() -> Vec<Arc<dyn Template>> {
    vec![
        Arc::new(ScalarTemplate::<bool>::new()),
        Arc::new(ScalarTemplate::<i8>::new()),
        Arc::new(ScalarTemplate::<i16>::new()),
        Arc::new(ScalarTemplate::<i32>::new()),
        Arc::new(ScalarTemplate::<i64>::new()),
        Arc::new(ScalarTemplate::<u8>::new()),
        Arc::new(ScalarTemplate::<u16>::new()),
        Arc::new(ScalarTemplate::<u32>::new()),
        Arc::new(ScalarTemplate::<u64>::new()),
        Arc::new(ScalarTemplate::<f32>::new()),
        Arc::new(ScalarTemplate::<f64>::new()),
        Arc::new(ScalarTemplate::<char>::new()),
        Arc::new(StringTemplate),
        Arc::new(PrimitiveArrayTemplate::<bool>::new()),
        Arc::new(PrimitiveArrayTemplate::<i8>::new()),
        Arc::new(BytesTemplate),
        Arc::new(PrimitiveArrayTemplate::<i16>::new()),
        Arc::new(PrimitiveArrayTemplate::<i32>::new()),
        Arc::new(PrimitiveArrayTemplate::<i64>::new()),
        Arc::new(PrimitiveArrayTemplate::<f32>::new()),
        Arc::new(PrimitiveArrayTemplate::<f64>::new()),
        Arc::new(PrimitiveArrayTemplate::<char>::new()),
        Arc::new(BigIntTemplate),
        Arc::new(DecimalTemplate),
        Arc::new(TimestampTemplate),
        Arc::new(ListTemplate),
        Arc::new(ValueMapTemplate),
        Arc::new(StringMapTemplate),
        Arc::new(UnknownTypeTemplate),
    ]
}

/// A scalar with a direct wire representation.
pub(crate) trait Scalar: Copy + Send + Sync + 'static {
    const NAME: &'static str;
    fn to_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
    fn write<W: Write>(self, packer: &mut Packer<W>) -> Result<()>;
    fn read<R: Read>(unpacker: &mut Unpacker<R>) -> Result<Self>;
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident, $write:ident, $read:ident) => {
        impl Scalar for $ty {
            const NAME: &'static str = stringify!($ty);

            fn to_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            fn write<W: Write>(self, packer: &mut Packer<W>) -> Result<()> {
                packer.$write(self)
            }

            fn read<R: Read>(unpacker: &mut Unpacker<R>) -> Result<Self> {
                unpacker.$read()
            }
        }
    };
}

impl_scalar!(bool, Bool, write_bool, read_bool);
impl_scalar!(i8, I8, write_i8, read_i8);
impl_scalar!(i16, I16, write_i16, read_i16);
impl_scalar!(i32, I32, write_i32, read_i32);
impl_scalar!(i64, I64, write_i64, read_i64);
impl_scalar!(u8, U8, write_u8, read_u8);
impl_scalar!(u16, U16, write_u16, read_u16);
impl_scalar!(u32, U32, write_u32, read_u32);
impl_scalar!(u64, U64, write_u64, read_u64);
impl_scalar!(f32, F32, write_f32, read_f32);
impl_scalar!(f64, F64, write_f64, read_f64);

impl Scalar for char {
    const NAME: &'static str = "char";

    fn to_value(self) -> Value {
        Value::Char(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }

    fn write<W: Write>(self, packer: &mut Packer<W>) -> Result<()> {
        packer.write_u32(u32::from(self))
    }

    fn read<R: Read>(unpacker: &mut Unpacker<R>) -> Result<Self> {
        let code = unpacker.read_u32()?;
        char::from_u32(code)
            .ok_or_else(|| Error::UnsupportedValue(format!("0x{code:x} is not a char")))
    }
}

/// One untracked scalar written as a single wire value.
pub(crate) struct ScalarTemplate<T>(PhantomData<fn() -> T>);

impl<T: Scalar> ScalarTemplate<T> {
    fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Scalar> Template for ScalarTemplate<T> {
    fn target_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Primitive
    }

    fn tracking(&self) -> Tracking {
        Tracking::DoNotTrack
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let v = T::from_value(value).ok_or_else(|| type_mismatch(self, value))?;
        v.write(out.packer())
    }

    fn read_data(
        &self,
        _shell: Option<&ObjectRef>,
        _size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        Ok(T::read(input.unpacker())?.to_value())
    }
}

/// Strings are raw UTF-8, merged by equality.
struct StringTemplate;

impl Template for StringTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<str>()
    }

    fn type_name(&self) -> &'static str {
        "str"
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Raw
    }

    fn tracking(&self) -> Tracking {
        Tracking::Equality
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let s = value.as_str().ok_or_else(|| type_mismatch(self, value))?;
        out.packer().write_str(s)
    }

    fn read_data(
        &self,
        _shell: Option<&ObjectRef>,
        _size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        Ok(Value::String(Rc::from(input.unpacker().read_str()?)))
    }
}

/// A `Vec` of one scalar type, one slot per element.
pub(crate) struct PrimitiveArrayTemplate<T>(PhantomData<fn() -> T>);

impl<T: Scalar> PrimitiveArrayTemplate<T> {
    fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Scalar> Template for PrimitiveArrayTemplate<T> {
    fn target_type(&self) -> TypeId {
        TypeId::of::<Vec<T>>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Vec<T>>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Array
    }

    fn space_required(&self, value: &Value) -> Result<usize> {
        Ok(borrow_target::<Vec<T>>(self, value)?.len())
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let items = borrow_target::<Vec<T>>(self, value)?;
        let packer = out.packer();
        for &item in items.iter() {
            item.write(packer)?;
        }
        Ok(())
    }

    fn pre_create(&self, size: usize) -> Option<ObjectRef> {
        Some(ObjectRef::new(Vec::<T>::with_capacity(size)))
    }

    fn read_data(
        &self,
        shell: Option<&ObjectRef>,
        size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        let obj = shell
            .cloned()
            .unwrap_or_else(|| ObjectRef::new(Vec::<T>::with_capacity(size)));
        {
            let mut items = borrow_shell::<Vec<T>>(self, &obj)?;
            let unpacker = input.unpacker();
            for _ in 0..size {
                items.push(T::read(unpacker)?);
            }
        }
        Ok(Value::Object(obj))
    }
}

/// Byte vectors travel as one raw value rather than an array of integers.
struct BytesTemplate;

impl Template for BytesTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<Vec<u8>>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Vec<u8>>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Raw
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let bytes = borrow_target::<Vec<u8>>(self, value)?;
        out.packer().write_raw(&bytes)
    }

    fn read_data(
        &self,
        _shell: Option<&ObjectRef>,
        _size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        Ok(Value::object(input.unpacker().read_raw()?))
    }
}

/// Big integers within the 64-bit wire range.
struct BigIntTemplate;

impl Template for BigIntTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<BigInt>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<BigInt>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Primitive
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let BigInt(n) = *borrow_target::<BigInt>(self, value)?;
        if let Ok(v) = i64::try_from(n) {
            out.packer().write_i64(v)
        } else if let Ok(v) = u64::try_from(n) {
            out.packer().write_u64(v)
        } else {
            Err(Error::UnsupportedValue(format!(
                "big integer {n} does not fit in 64 bits"
            )))
        }
    }

    fn read_data(
        &self,
        _shell: Option<&ObjectRef>,
        _size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        Ok(Value::object(BigInt(input.unpacker().read_i128()?)))
    }
}

/// Decimals as `[negative, significand, exponent]`.
struct DecimalTemplate;

impl Template for DecimalTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<Decimal>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Decimal>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Array
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(3)
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let d = *borrow_target::<Decimal>(self, value)?;
        let packer = out.packer();
        packer.write_bool(d.negative)?;
        packer.write_u64(d.significand)?;
        packer.write_i32(d.exponent)
    }

    fn read_data(
        &self,
        _shell: Option<&ObjectRef>,
        size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        expect_size(self, size, 3)?;
        let unpacker = input.unpacker();
        let negative = unpacker.read_bool()?;
        let significand = unpacker.read_u64()?;
        let exponent = unpacker.read_i32()?;
        Ok(Value::object(Decimal::new(negative, significand, exponent)))
    }
}

/// Timestamps as signed milliseconds from the Unix epoch.
struct TimestampTemplate;

impl Template for TimestampTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<SystemTime>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<SystemTime>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Primitive
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let time = *borrow_target::<SystemTime>(self, value)?;
        let millis = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()),
            Err(before) => i64::try_from(before.duration().as_millis()).map(|m| -m),
        }
        .map_err(|_| Error::UnsupportedValue("timestamp out of range".into()))?;
        out.packer().write_i64(millis)
    }

    fn read_data(
        &self,
        _shell: Option<&ObjectRef>,
        _size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        let millis = input.unpacker().read_i64()?;
        let offset = Duration::from_millis(millis.unsigned_abs());
        let time = if millis >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        }
        .ok_or_else(|| Error::UnsupportedValue(format!("timestamp {millis}ms out of range")))?;
        Ok(Value::object(time))
    }
}

/// A heterogeneous list, each element written as a nested value.
struct ListTemplate;

impl Template for ListTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<Vec<Value>>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Vec<Value>>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Array
    }

    fn space_required(&self, value: &Value) -> Result<usize> {
        Ok(borrow_target::<Vec<Value>>(self, value)?.len())
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let items = borrow_target::<Vec<Value>>(self, value)?;
        for item in items.iter() {
            out.write_value(item)?;
        }
        Ok(())
    }

    fn pre_create(&self, size: usize) -> Option<ObjectRef> {
        Some(ObjectRef::new(Vec::<Value>::with_capacity(size)))
    }

    fn read_data(
        &self,
        shell: Option<&ObjectRef>,
        size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        let obj = shell
            .cloned()
            .unwrap_or_else(|| ObjectRef::new(Vec::<Value>::with_capacity(size)));
        for _ in 0..size {
            let item = input.read_value()?;
            borrow_shell::<Vec<Value>>(self, &obj)?.push(item);
        }
        Ok(Value::Object(obj))
    }
}

/// A map with arbitrary keys and values.
struct ValueMapTemplate;

impl Template for ValueMapTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<ValueMap>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<ValueMap>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Map
    }

    fn space_required(&self, value: &Value) -> Result<usize> {
        Ok(borrow_target::<ValueMap>(self, value)?.len() * 2)
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let map = borrow_target::<ValueMap>(self, value)?;
        for (key, item) in map.iter() {
            out.write_value(key)?;
            out.write_value(item)?;
        }
        Ok(())
    }

    fn pre_create(&self, size: usize) -> Option<ObjectRef> {
        Some(ObjectRef::new(ValueMap::with_capacity(size / 2)))
    }

    fn read_data(
        &self,
        shell: Option<&ObjectRef>,
        size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        let obj = shell
            .cloned()
            .unwrap_or_else(|| ObjectRef::new(ValueMap::with_capacity(size / 2)));
        for _ in 0..size / 2 {
            let key = input.read_value()?;
            let item = input.read_value()?;
            borrow_shell::<ValueMap>(self, &obj)?.push(key, item);
        }
        Ok(Value::Object(obj))
    }
}

/// A sorted map with plain string keys.
struct StringMapTemplate;

impl Template for StringMapTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<BTreeMap<String, Value>>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<BTreeMap<String, Value>>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Map
    }

    fn space_required(&self, value: &Value) -> Result<usize> {
        Ok(borrow_target::<BTreeMap<String, Value>>(self, value)?.len() * 2)
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let map = borrow_target::<BTreeMap<String, Value>>(self, value)?;
        for (key, item) in map.iter() {
            out.packer().write_str(key)?;
            out.write_value(item)?;
        }
        Ok(())
    }

    fn pre_create(&self, _size: usize) -> Option<ObjectRef> {
        Some(ObjectRef::new(BTreeMap::<String, Value>::new()))
    }

    fn read_data(
        &self,
        shell: Option<&ObjectRef>,
        size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        let obj = shell
            .cloned()
            .unwrap_or_else(|| ObjectRef::new(BTreeMap::<String, Value>::new()));
        for _ in 0..size / 2 {
            let key = input.unpacker().read_str()?;
            let item = input.read_value()?;
            borrow_shell::<BTreeMap<String, Value>>(self, &obj)?.insert(key, item);
        }
        Ok(Value::Object(obj))
    }
}

/// Last-resort fallback for objects no template claims.
///
/// Writes `[nil, module path, simple name]`. On read, a type registered
/// under that name yields a fresh default instance; otherwise the result
/// is an [`UnknownType`] placeholder.
struct UnknownTypeTemplate;

impl Template for UnknownTypeTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<UnknownType>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<UnknownType>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Array
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(3)
    }

    fn is_fallback(&self) -> bool {
        true
    }

    fn accepts(&self, value: &Value) -> bool {
        value.as_object().is_some()
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let obj = value.as_object().ok_or_else(|| type_mismatch(self, value))?;
        let (package, name) = match obj.borrow::<UnknownType>() {
            Some(unknown) => (unknown.package.clone(), unknown.name.clone()),
            None => {
                warn!(type_name = obj.type_name(), "writing object of unregistered type");
                let wire = out.translator().to_wire(obj.type_name());
                let (package, name) = split_type_name(&wire);
                (package.to_owned(), name.to_owned())
            }
        };
        let packer = out.packer();
        packer.write_nil()?;
        packer.write_str(&package)?;
        packer.write_str(&name)
    }

    fn read_data(
        &self,
        _shell: Option<&ObjectRef>,
        size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        expect_size(self, size, 3)?;
        let unpacker = input.unpacker();
        unpacker.read_nil()?;
        let package = unpacker.read_str()?;
        let name = unpacker.read_str()?;

        let type_name = input.translator().from_wire(&join_type_name(&package, &name));
        let schema = input.schema();
        let restored = schema
            .id_of_name(&type_name)
            .and_then(|id| schema.template(id).ok())
            .and_then(|template| template.pre_create(0));
        if let Some(obj) = restored {
            return Ok(Value::Object(obj));
        }
        let (package, name) = split_type_name(&type_name);
        Ok(Value::object(UnknownType {
            package: package.to_owned(),
            name: name.to_owned(),
        }))
    }
}
