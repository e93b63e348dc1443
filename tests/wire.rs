// ABOUTME: Integration tests for the byte layout of object streams and the serde bridge.
// ABOUTME: Checks headers, smallest encodings, size guards, malformed input and name translation.

use objpack::{
    from_slice, limits, pack, to_vec, unpack, Codec, CodecConfig, Error, LimitKind,
    SchemaManager, SerdeTemplate, TemplateRegistry, TypeNameTranslator, UnknownType,
    UnpackerConfig, Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn scalar_payload(value: Value) -> Vec<u8> {
    let bytes = pack(&value).unwrap();
    // header, envelope marker, template ID
    bytes[4..].to_vec()
}

#[test]
fn smallest_integer_encodings() {
    let cases: &[(Value, &[u8])] = &[
        (Value::I64(0), &[0x00]),
        (Value::I64(127), &[0x7f]),
        (Value::I64(128), &[0xcc, 0x80]),
        (Value::I64(255), &[0xcc, 0xff]),
        (Value::I64(256), &[0xcd, 0x01, 0x00]),
        (Value::I64(32767), &[0xcd, 0x7f, 0xff]),
        (Value::I64(32768), &[0xcd, 0x80, 0x00]),
        (Value::I64(65536), &[0xce, 0x00, 0x01, 0x00, 0x00]),
        (Value::I64(-1), &[0xff]),
        (Value::I64(-32), &[0xe0]),
        (Value::I64(-33), &[0xd0, 0xdf]),
        (Value::I64(-129), &[0xd1, 0xff, 0x7f]),
        (
            Value::U64(u64::MAX),
            &[0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
        ),
    ];
    for (value, expected) in cases {
        assert_eq!(scalar_payload(value.clone()), *expected, "{value:?}");
        assert_eq!(unpack(&pack(value).unwrap()).unwrap(), *value);
    }
}

#[test]
fn floats_are_big_endian() {
    assert_eq!(scalar_payload(Value::F32(1.0)), [0xca, 0x3f, 0x80, 0x00, 0x00]);
    assert_eq!(
        scalar_payload(Value::F64(-2.0)),
        [0xcb, 0xc0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn header_carries_schema_id() {
    let codec = Codec::default().with_config(CodecConfig {
        schema_id: 300,
        ..CodecConfig::default()
    });
    let bytes = codec.pack(&Value::Null).unwrap();
    // 300 - 16 = 284
    assert_eq!(bytes, vec![0xf1, 0xcd, 0x01, 0x1c, 0xf0]);
    assert_eq!(Codec::default().unpack(&bytes).unwrap(), Value::Null);
}

#[test]
fn string_tiers() {
    let short = scalar_payload(Value::from("x".repeat(31)));
    assert_eq!(short[0], 0xbf);
    let medium = scalar_payload(Value::from("x".repeat(32)));
    assert_eq!(medium[..3], [0xda, 0x00, 0x20]);
    let long = scalar_payload(Value::from("x".repeat(65536)));
    assert_eq!(long[..5], [0xdb, 0x00, 0x01, 0x00, 0x00]);
}

#[test]
fn oversized_declarations_fail_before_reading_content() {
    // string envelope declaring a 4 GiB raw with no content following
    let raw = [0xf1, 0xf1, 0x92, 0xfd, 0xdb, 0xff, 0xff, 0xff, 0xff];
    assert_eq!(
        unpack(&raw),
        Err(Error::SizeLimitExceeded {
            kind: LimitKind::Raw,
            declared: u64::from(u32::MAX),
            limit: limits::MAX_RAW_LEN,
        })
    );

    // list envelope declaring 4 Gi elements
    let array = [0xf1, 0xf1, 0x92, 0x0a, 0xdd, 0xff, 0xff, 0xff, 0xff];
    assert!(matches!(
        unpack(&array),
        Err(Error::SizeLimitExceeded {
            kind: LimitKind::Array,
            ..
        })
    ));
}

#[test]
fn configured_limits_apply_to_codec() {
    let list = Value::list((0..limits::MIN_ARRAY_LEN as i64 + 1).map(Value::I64).collect());
    let bytes = pack(&list).unwrap();

    let strict = Codec::default().with_config(CodecConfig {
        unpacker: UnpackerConfig::default().with_max_array_len(0),
        ..CodecConfig::default()
    });
    assert!(matches!(
        strict.unpack(&bytes),
        Err(Error::SizeLimitExceeded {
            kind: LimitKind::Array,
            ..
        })
    ));
    assert!(Codec::default().unpack(&bytes).is_ok());
}

#[test]
fn stream_schema_ids_do_not_grow_the_cache() {
    let manager = Arc::new(SchemaManager::default().with_cache_limit(8));
    let codec = Codec::with_manager(Arc::clone(&manager));
    for schema_id in 17..=143u8 {
        // format 1, schema ID as a positive fixnum, null
        let stream = [0xf1, schema_id - 16, 0xf0];
        assert_eq!(codec.unpack(&stream).unwrap(), Value::Null);
    }
    assert_eq!(manager.cached(), 8);
}

#[test]
fn deep_wire_nesting_fails_cleanly() {
    // list envelopes nested inside each other far past the object limit
    let mut stream = vec![0xf1, 0xf1];
    for _ in 0..100_000 {
        stream.extend([0x92, 0x0a, 0x91]);
    }
    stream.push(0xf0);
    // the limit admits more levels than a default test-thread stack holds
    let result = std::thread::Builder::new()
        .stack_size(32 * 1024 * 1024)
        .spawn(move || unpack(&stream).err())
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(result, Some(Error::MaxDepthExceeded));
}

#[test]
fn malformed_input() {
    assert_eq!(unpack(&[0xf1, 0xf1, 0xc1]), Err(Error::MalformedTag(0xc1)));
    assert_eq!(unpack(&[0xf1]), Err(Error::TruncatedInput));
    assert_eq!(unpack(&[]), Err(Error::TruncatedInput));
    // a positive template ID must sit inside an envelope
    assert!(matches!(
        unpack(&[0xf1, 0xf1, 0x05]),
        Err(Error::UnexpectedType(_))
    ));
    // envelope whose payload claims more elements than it has
    assert!(unpack(&[0xf1, 0xf1, 0x92, 0x0a, 0x92, 0xf0]).is_err());
}

#[test]
fn reference_to_future_position_fails() {
    // list at position 1 whose only item points at position 2
    assert_eq!(
        unpack(&[0xf1, 0xf1, 0x92, 0x0a, 0x91, 0xee]),
        Err(Error::InvalidReference(2))
    );
}

#[test]
fn trailing_bytes() {
    let mut bytes = pack(&Value::from(true)).unwrap();
    bytes.push(0xc0);
    assert_eq!(unpack(&bytes), Err(Error::TrailingBytes));

    let lenient = Codec::default().with_config(CodecConfig {
        allow_trailing_bytes: true,
        ..CodecConfig::default()
    });
    assert_eq!(lenient.unpack(&bytes).unwrap(), Value::Bool(true));
}

#[test]
fn stream_reader_leaves_the_rest() {
    let codec = Codec::default();
    let mut buf = codec.pack(&Value::from("first")).unwrap();
    buf.extend(codec.pack(&Value::from("second")).unwrap());

    let mut cursor = std::io::Cursor::new(buf);
    assert_eq!(codec.unpack_from_reader(&mut cursor).unwrap(), Value::from("first"));
    assert_eq!(codec.unpack_from_reader(&mut cursor).unwrap(), Value::from("second"));
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Gadget {
    id: u32,
}

/// Maps this test crate's module path onto a fixed wire package.
struct LegacyNames;

impl TypeNameTranslator for LegacyNames {
    fn to_wire(&self, type_name: &str) -> String {
        type_name.replacen("wire::", "legacy::", 1)
    }

    fn from_wire(&self, wire_name: &str) -> String {
        wire_name.replacen("legacy::", "wire::", 1)
    }
}

#[test]
fn translator_renames_unknown_types() {
    let writer = Codec::default().with_translator(Arc::new(LegacyNames));
    let bytes = writer.pack(&Value::object(Gadget { id: 9 })).unwrap();
    assert!(bytes.windows(6).any(|w| w == b"legacy"));

    // without the translator the names stay as written
    let back = Codec::default().unpack(&bytes).unwrap();
    assert_eq!(
        back.as_object().unwrap().get::<UnknownType>(),
        Some(UnknownType {
            package: "legacy".into(),
            name: "Gadget".into(),
        })
    );

    let mut registry = TemplateRegistry::new();
    registry.register(SerdeTemplate::<Gadget>::new().with_default_shell());
    let reader = Codec::new(registry).with_translator(Arc::new(LegacyNames));
    let back = reader.unpack(&bytes).unwrap();
    assert!(back.as_object().unwrap().is::<Gadget>());
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    celsius: f32,
    tags: Vec<String>,
}

#[test]
fn serde_bridge_layout() {
    let bytes = to_vec(&Reading {
        sensor: "t".into(),
        celsius: 1.0,
        tags: vec![],
    })
    .unwrap();
    assert_eq!(
        bytes,
        vec![
            0x83, // map of 3
            0xa6, b's', b'e', b'n', b's', b'o', b'r', 0xa1, b't', //
            0xa7, b'c', b'e', b'l', b's', b'i', b'u', b's', 0xca, 0x3f, 0x80, 0x00, 0x00, //
            0xa4, b't', b'a', b'g', b's', 0x90,
        ]
    );
    let back: Reading = from_slice(&bytes).unwrap();
    assert_eq!(back.sensor, "t");
}

#[test]
fn serde_reads_foreign_map_order() {
    // keys in a different order, plus one the struct does not know
    let mut bytes = vec![0x84];
    bytes.extend([0xa4, b't', b'a', b'g', b's', 0x91, 0xa1, b'a']);
    bytes.extend([0xa5, b'e', b'x', b't', b'r', b'a', 0xc3]);
    bytes.extend([0xa7, b'c', b'e', b'l', b's', b'i', b'u', b's', 0x05]);
    bytes.extend([0xa6, b's', b'e', b'n', b's', b'o', b'r', 0xa0]);
    let back: Reading = from_slice(&bytes).unwrap();
    assert_eq!(
        back,
        Reading {
            sensor: String::new(),
            celsius: 5.0,
            tags: vec!["a".into()],
        }
    );
}
