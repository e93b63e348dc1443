// ABOUTME: The in-memory object graph: scalar values, shared strings and object handles.
// ABOUTME: Objects live behind shared, interior-mutable handles so graphs may share and cycle.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

struct ObjectCell {
    handle: u64,
    type_id: TypeId,
    type_name: &'static str,
    value: RefCell<Box<dyn Any>>,
}

/// A shared handle to one object of any `'static` type.
///
/// Clones refer to the same object. Every object receives a process-unique
/// handle when it is wrapped; identity tracking keys on that handle.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectCell>);

impl ObjectRef {
    /// Wrap a value in a new object.
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(ObjectCell {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: RefCell::new(Box::new(value)),
        }))
    }

    /// The process-unique identity of this object.
    #[must_use]
    pub fn handle(&self) -> u64 {
        self.0.handle
    }

    /// The concrete type of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.0.type_id
    }

    /// The full path of the wrapped value's type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.type_id == TypeId::of::<T>()
    }

    /// True if both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrow the object as `T`. Returns None if the type differs.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently mutably borrowed.
    #[must_use]
    pub fn borrow<T: Any>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.0.value.borrow(), |b| (**b).downcast_ref::<T>()).ok()
    }

    /// Mutably borrow the object as `T`. Returns None if the type differs.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently borrowed.
    #[must_use]
    pub fn borrow_mut<T: Any>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.0.value.borrow_mut(), |b| (**b).downcast_mut::<T>()).ok()
    }

    /// Clone the wrapped value out of the object.
    #[must_use]
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.borrow::<T>().map(|v| v.clone())
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef<{}>#{}", self.0.type_name, self.0.handle)
    }
}

/// One node of an object graph.
///
/// Scalars are plain values and never shared. Strings are shared by
/// content. Everything else is an [`ObjectRef`].
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    String(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    /// Wrap any value as a new object.
    pub fn object<T: Any>(value: T) -> Self {
        Value::Object(ObjectRef::new(value))
    }

    /// Wrap a list of values as a new list object.
    pub fn list(items: Vec<Value>) -> Self {
        Value::object(items)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The runtime type used for template lookup. None for null.
    #[must_use]
    pub fn type_id(&self) -> Option<TypeId> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => TypeId::of::<bool>(),
            Value::I8(_) => TypeId::of::<i8>(),
            Value::I16(_) => TypeId::of::<i16>(),
            Value::I32(_) => TypeId::of::<i32>(),
            Value::I64(_) => TypeId::of::<i64>(),
            Value::U8(_) => TypeId::of::<u8>(),
            Value::U16(_) => TypeId::of::<u16>(),
            Value::U32(_) => TypeId::of::<u32>(),
            Value::U64(_) => TypeId::of::<u64>(),
            Value::F32(_) => TypeId::of::<f32>(),
            Value::F64(_) => TypeId::of::<f64>(),
            Value::Char(_) => TypeId::of::<char>(),
            Value::String(_) => TypeId::of::<str>(),
            Value::Object(obj) => obj.type_id(),
        })
    }

    /// The runtime type name of this value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Char(_) => "char",
            Value::String(_) => "str",
            Value::Object(obj) => obj.type_name(),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// If this is an integer that fits, returns it as i64.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(n) => Some(i64::from(n)),
            Value::I16(n) => Some(i64::from(n)),
            Value::I32(n) => Some(i64::from(n)),
            Value::I64(n) => Some(n),
            Value::U8(n) => Some(i64::from(n)),
            Value::U16(n) => Some(i64::from(n)),
            Value::U32(n) => Some(i64::from(n)),
            Value::U64(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(f) => Some(f64::from(f)),
            Value::F64(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// True if both values are the same object, or equal non-objects.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => self == other,
        }
    }
}

/// Scalars and strings compare by value; objects compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I8(n) => write!(f, "{n}i8"),
            Value::I16(n) => write!(f, "{n}i16"),
            Value::I32(n) => write!(f, "{n}i32"),
            Value::I64(n) => write!(f, "{n}i64"),
            Value::U8(n) => write!(f, "{n}u8"),
            Value::U16(n) => write!(f, "{n}u16"),
            Value::U32(n) => write!(f, "{n}u32"),
            Value::U64(n) => write!(f, "{n}u64"),
            Value::F32(n) => write!(f, "{n}f32"),
            Value::F64(n) => write!(f, "{n}f64"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::I8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Rc::from(v))
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An arbitrary-size integer as far as the wire allows.
///
/// Values outside the 64-bit wire range cannot be packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BigInt(pub i128);

/// A map with arbitrary keys, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
}

impl ValueMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or replace the value for `key`. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Append an entry without checking for an existing key.
    pub(crate) fn push(&mut self, key: Value, value: Value) {
        self.entries.push((key, value));
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up an entry by string key.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// The element type of an [`ObjectArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementType {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ElementType {
    #[must_use]
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// An array of objects of one element type, possibly nested.
///
/// `depth` 1 holds elements directly; depth `n` holds object arrays of
/// depth `n - 1`. The template is chosen by the element type alone.
#[derive(Debug, Clone)]
pub struct ObjectArray {
    pub element: ElementType,
    pub depth: usize,
    pub items: Vec<Value>,
}

impl ObjectArray {
    /// A one-dimensional array of `T` elements.
    #[must_use]
    pub fn of<T: Any + ?Sized>(items: Vec<Value>) -> Self {
        Self::nested::<T>(1, items)
    }

    /// An array of `depth` dimensions whose ultimate element type is `T`.
    #[must_use]
    pub fn nested<T: Any + ?Sized>(depth: usize, items: Vec<Value>) -> Self {
        Self {
            element: ElementType::of::<T>(),
            depth: depth.max(1),
            items,
        }
    }
}

/// Placeholder for an object whose type could not be written or restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownType {
    /// Module path of the original type
    pub package: String,
    /// Simple name of the original type
    pub name: String,
}
