// ABOUTME: Integration tests for object-graph packing through the public Codec API.
// ABOUTME: Covers scalars, sharing, string merging, cycles, completion hooks and unknown types.

use objpack::template::{borrow_shell, borrow_target};
use objpack::{
    BigInt, Codec, CodecConfig, ContainerShape, Decimal, ElementType, Error, ObjectArray,
    ObjectPacker, ObjectRef, ObjectUnpacker, Result, SchemaManager, SerdeTemplate, Template,
    TemplateRegistry, UnknownType, Value, ValueMap, FORMAT_VERSION,
};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn round_trip(value: &Value) -> Value {
    let codec = Codec::default();
    codec.unpack(&codec.pack(value).unwrap()).unwrap()
}

#[derive(Default)]
struct Node {
    label: String,
    next: Value,
    linked_at_completion: bool,
}

struct NodeTemplate;

thread_local! {
    /// Labels of nodes whose completion hook ran on this thread, in order.
    static COMPLETED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn take_completed() -> Vec<String> {
    COMPLETED.with(|done| done.take())
}

impl Template for NodeTemplate {
    fn target_type(&self) -> TypeId {
        TypeId::of::<Node>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Node>()
    }

    fn shape(&self) -> ContainerShape {
        ContainerShape::Array
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(2)
    }

    fn write_data(&self, value: &Value, out: &mut ObjectPacker<'_>) -> Result<()> {
        let node = borrow_target::<Node>(self, value)?;
        out.write_value(&Value::from(node.label.as_str()))?;
        out.write_value(&node.next)
    }

    fn pre_create(&self, _size: usize) -> Option<ObjectRef> {
        Some(ObjectRef::new(Node::default()))
    }

    fn read_data(
        &self,
        shell: Option<&ObjectRef>,
        _size: usize,
        input: &mut ObjectUnpacker<'_>,
    ) -> Result<Value> {
        let obj = shell.cloned().unwrap_or_else(|| ObjectRef::new(Node::default()));
        let label = input.read_value()?;
        borrow_shell::<Node>(self, &obj)?.label = label.as_str().unwrap_or_default().to_owned();
        let next = input.read_value()?;
        borrow_shell::<Node>(self, &obj)?.next = next;
        Ok(Value::Object(obj))
    }

    fn has_completion_hook(&self) -> bool {
        true
    }

    fn complete(&self, value: &Value) -> Result<()> {
        let Some(obj) = value.as_object() else {
            return Ok(());
        };
        let linked = obj.borrow::<Node>().is_some_and(|node| {
            node.next
                .as_object()
                .and_then(|next| next.borrow::<Node>().map(|n| !n.next.is_null()))
                .unwrap_or(false)
        });
        if let Some(mut node) = obj.borrow_mut::<Node>() {
            node.linked_at_completion = linked;
            COMPLETED.with(|done| done.borrow_mut().push(node.label.clone()));
        }
        Ok(())
    }
}

fn node_codec() -> Codec {
    let mut registry = TemplateRegistry::new();
    registry.register(NodeTemplate);
    Codec::new(registry)
}

fn node(label: &str) -> ObjectRef {
    ObjectRef::new(Node {
        label: label.into(),
        ..Node::default()
    })
}

#[test]
fn scalar_boundaries_round_trip() {
    let values = [
        Value::Bool(true),
        Value::Bool(false),
        Value::I8(i8::MIN),
        Value::I8(i8::MAX),
        Value::I16(i16::MIN),
        Value::I32(i32::MIN),
        Value::I32(-33),
        Value::I64(i64::MIN),
        Value::I64(i64::MAX),
        Value::U8(u8::MAX),
        Value::U16(u16::MAX),
        Value::U32(u32::MAX),
        Value::U64(u64::MAX),
        Value::F32(f32::MIN_POSITIVE),
        Value::F64(-0.0),
        Value::F64(f64::INFINITY),
        Value::Char('\u{10ffff}'),
        Value::from(""),
        Value::from("x".repeat(70_000)),
    ];
    for value in values {
        assert_eq!(round_trip(&value), value, "{value:?}");
    }
}

#[test]
fn nan_round_trips_bit_exact() {
    let back = round_trip(&Value::F64(f64::NAN));
    assert!(matches!(back, Value::F64(f) if f.is_nan()));
}

#[test]
fn equal_strings_merge_to_one_encoding() {
    let list = Value::list(vec![Value::from("ab"), Value::from(String::from("ab"))]);
    let bytes = Codec::default().pack(&list).unwrap();
    assert_eq!(
        bytes,
        vec![
            0xf1, 0xf1, // format 1, schema 1
            0x92, 0x0a, 0x92, // list envelope, list ID 26, two items
            0x92, 0xfd, 0xa2, b'a', b'b', // string envelope, string ID 13, "ab"
            0xee, // back-reference to position 2
        ]
    );
}

#[test]
fn shared_objects_keep_identity() {
    let shared = Value::object(vec![1i32, 2, 3]);
    let mut map = ValueMap::new();
    map.insert("a", shared.clone());
    map.insert("b", shared);
    let back = round_trip(&Value::object(map));

    let map = back.as_object().unwrap().get::<ValueMap>().unwrap();
    let a = map.get_str("a").unwrap();
    let b = map.get_str("b").unwrap();
    assert!(a.same(b));
    assert_eq!(a.as_object().unwrap().get::<Vec<i32>>(), Some(vec![1, 2, 3]));
}

#[test]
fn distinct_equal_objects_stay_distinct() {
    let list = Value::list(vec![Value::object(vec![1i64]), Value::object(vec![1i64])]);
    let back = round_trip(&list);
    let items = back.as_object().unwrap().get::<Vec<Value>>().unwrap();
    assert!(!items[0].same(&items[1]));
}

#[test]
fn cycle_resolves_to_pre_created_instance() {
    let a = node("a");
    let b = node("b");
    a.borrow_mut::<Node>().unwrap().next = Value::Object(b.clone());
    b.borrow_mut::<Node>().unwrap().next = Value::Object(a.clone());

    let codec = node_codec();
    let back = codec.unpack(&codec.pack(&Value::Object(a)).unwrap()).unwrap();

    let a = back.as_object().unwrap();
    let b = a.borrow::<Node>().unwrap().next.clone();
    let b = b.as_object().unwrap();
    assert_eq!(b.borrow::<Node>().unwrap().label, "b");
    let back_to_a = b.borrow::<Node>().unwrap().next.clone();
    assert!(back_to_a.as_object().unwrap().ptr_eq(a));
}

#[test]
fn completion_runs_after_whole_graph() {
    let a = node("a");
    let b = node("b");
    a.borrow_mut::<Node>().unwrap().next = Value::Object(b.clone());
    b.borrow_mut::<Node>().unwrap().next = Value::Object(a.clone());

    let codec = node_codec();
    let bytes = codec.pack(&Value::Object(a)).unwrap();
    take_completed();
    let back = codec.unpack(&bytes).unwrap();
    assert_eq!(take_completed(), ["a", "b"]);
    let a = back.as_object().unwrap();
    let b = a.borrow::<Node>().unwrap().next.clone();
    // b finished reading before a's link was set, yet its hook saw it
    assert!(b.as_object().unwrap().borrow::<Node>().unwrap().linked_at_completion);
    assert!(a.borrow::<Node>().unwrap().linked_at_completion);
}

#[test]
fn completion_follows_registration_order() {
    let a = node("a");
    let b = node("b");
    let c = node("c");
    a.borrow_mut::<Node>().unwrap().next = Value::Object(b.clone());
    b.borrow_mut::<Node>().unwrap().next = Value::Object(c);

    let codec = node_codec();
    let bytes = codec.pack(&Value::Object(a)).unwrap();
    take_completed();
    codec.unpack(&bytes).unwrap();
    // c finishes reading first but was registered last
    assert_eq!(take_completed(), ["a", "b", "c"]);
}

#[test]
fn self_reference() {
    let a = node("loop");
    a.borrow_mut::<Node>().unwrap().next = Value::Object(a.clone());
    let codec = node_codec();
    let back = codec.unpack(&codec.pack(&Value::Object(a)).unwrap()).unwrap();
    let a = back.as_object().unwrap();
    let next = a.borrow::<Node>().unwrap().next.clone();
    assert!(next.as_object().unwrap().ptr_eq(a));
}

#[test]
fn builtin_object_types_round_trip() {
    let time = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
    let before_epoch = UNIX_EPOCH - Duration::from_millis(86_400_000);
    let mut sorted = BTreeMap::new();
    sorted.insert("k".to_string(), Value::from(1u8));

    let list = Value::list(vec![
        Value::object(BigInt(-5)),
        Value::object(BigInt(i128::from(u64::MAX))),
        Value::object(Decimal::new(true, 12345, -2)),
        Value::object(time),
        Value::object(before_epoch),
        Value::object(vec![true, false]),
        Value::object(vec![0u8, 255]),
        Value::object(vec![1.5f32]),
        Value::object(vec!['a', 'é']),
        Value::object(sorted.clone()),
    ]);
    let back = round_trip(&list);
    let items = back.as_object().unwrap().get::<Vec<Value>>().unwrap();

    let obj = |i: usize| items[i].as_object().unwrap().clone();
    assert_eq!(obj(0).get::<BigInt>(), Some(BigInt(-5)));
    assert_eq!(obj(1).get::<BigInt>(), Some(BigInt(i128::from(u64::MAX))));
    assert_eq!(obj(2).get::<Decimal>(), Some(Decimal::new(true, 12345, -2)));
    assert_eq!(obj(3).get::<SystemTime>(), Some(time));
    assert_eq!(obj(4).get::<SystemTime>(), Some(before_epoch));
    assert_eq!(obj(5).get::<Vec<bool>>(), Some(vec![true, false]));
    assert_eq!(obj(6).get::<Vec<u8>>(), Some(vec![0, 255]));
    assert_eq!(obj(7).get::<Vec<f32>>(), Some(vec![1.5]));
    assert_eq!(obj(8).get::<Vec<char>>(), Some(vec!['a', 'é']));
    let back_sorted = obj(9).get::<BTreeMap<String, Value>>().unwrap();
    assert_eq!(back_sorted.get("k"), Some(&Value::U8(1)));
}

#[test]
fn oversized_big_integer_is_rejected() {
    let err = Codec::default()
        .pack(&Value::object(BigInt(i128::MAX)))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedValue(_)));
}

#[test]
fn nested_object_arrays() {
    let inner = Value::object(ObjectArray::of::<Node>(vec![Value::Object(node("x"))]));
    let outer = ObjectArray::nested::<Node>(2, vec![inner.clone(), inner]);

    let codec = node_codec();
    let back = codec.unpack(&codec.pack(&Value::object(outer)).unwrap()).unwrap();
    let outer = back.as_object().unwrap().get::<ObjectArray>().unwrap();
    assert_eq!(outer.depth, 2);
    assert_eq!(outer.element, ElementType::of::<Node>());
    assert!(outer.items[0].same(&outer.items[1]));
    let inner = outer.items[0].as_object().unwrap().get::<ObjectArray>().unwrap();
    assert_eq!(inner.depth, 1);
    let x = inner.items[0].as_object().unwrap();
    assert_eq!(x.borrow::<Node>().unwrap().label, "x");
}

#[test]
fn object_array_of_unregistered_type_fails() {
    struct Unregistered;
    let array = ObjectArray::of::<Unregistered>(Vec::new());
    assert!(matches!(
        Codec::default().pack(&Value::object(array)),
        Err(Error::UnresolvedTemplate(_))
    ));
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Widget {
    size: u8,
}

#[test]
fn unregistered_type_reads_back_as_unknown() {
    let bytes = Codec::default().pack(&Value::object(Widget { size: 3 })).unwrap();
    let back = Codec::default().unpack(&bytes).unwrap();
    let unknown = back.as_object().unwrap().get::<UnknownType>().unwrap();
    assert_eq!(
        unknown,
        UnknownType {
            package: "object_graph".into(),
            name: "Widget".into(),
        }
    );

    // An unknown placeholder writes the same names again
    let again = Codec::default().pack(&back).unwrap();
    assert_eq!(again, bytes);
}

#[test]
fn unknown_type_restored_when_reader_knows_it() {
    let bytes = Codec::default().pack(&Value::object(Widget { size: 3 })).unwrap();

    let mut registry = TemplateRegistry::new();
    registry.register(SerdeTemplate::<Widget>::new().with_default_shell());
    let back = Codec::new(registry).unpack(&bytes).unwrap();
    let widget = back.as_object().unwrap();
    // the data itself was never written, so the instance is fresh
    assert_eq!(widget.borrow::<Widget>().unwrap().size, 0);
}

#[test]
fn concurrent_schema_requests_share_one_build() {
    let mut registry = TemplateRegistry::new();
    registry.register(NodeTemplate);
    let manager = Arc::new(SchemaManager::new(registry));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.schema(FORMAT_VERSION, 7).unwrap())
        })
        .collect();
    let schemas: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(schemas.iter().all(|s| Arc::ptr_eq(s, &schemas[0])));
}

#[test]
fn codecs_share_schemas_across_threads() {
    let codec = node_codec().with_config(CodecConfig {
        schema_id: 3,
        ..CodecConfig::default()
    });
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let codec = codec.clone();
            std::thread::spawn(move || {
                let value = Value::object(node(&format!("n{i}")));
                let back = codec.unpack(&codec.pack(&value).unwrap()).unwrap();
                let label = back.as_object().unwrap().borrow::<Node>().unwrap().label.clone();
                label
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!("n{i}"));
    }
}

#[test]
fn unsupported_format_version_fails() {
    let mut bytes = Codec::default().pack(&Value::Null).unwrap();
    bytes[0] = 0xf2; // format 2
    assert!(matches!(
        Codec::default().unpack(&bytes),
        Err(Error::UnsupportedValue(_))
    ));
}

#[test]
fn truncated_stream_fails() {
    let bytes = Codec::default().pack(&Value::from("truncate me")).unwrap();
    assert_eq!(
        Codec::default().unpack(&bytes[..bytes.len() - 2]),
        Err(Error::TruncatedInput)
    );
}
