// ABOUTME: Serde Deserializer reading any deserializable type straight off the wire codec.
// ABOUTME: Mirrors ser.rs: maps for structs, raw values for strings and bytes, tagged enums.

use crate::error::{Error, Result};
use crate::types::tag;
use crate::unpacker::{Event, Unpacker, UnpackerConfig};
use serde::de::{self, DeserializeOwned, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use std::io::Read;

/// A serde Deserializer over an [`Unpacker`].
///
/// Decoded strings and bytes are owned, so targets must implement
/// [`DeserializeOwned`].
pub struct Deserializer<'a, R: Read> {
    unpacker: &'a mut Unpacker<R>,
}

impl<'a, R: Read> Deserializer<'a, R> {
    pub fn new(unpacker: &'a mut Unpacker<R>) -> Self {
        Self { unpacker }
    }
}

/// Deserialize a value from a complete byte slice.
///
/// # Errors
///
/// Returns an error if:
/// - The data is malformed or truncated
/// - A declared length exceeds the default limits
/// - The data doesn't match the expected type `T`
/// - There are trailing bytes after the value
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    from_slice_with_config(data, UnpackerConfig::default())
}

/// Deserialize a value from a complete byte slice with custom limits.
///
/// # Errors
///
/// As [`from_slice`], with the limits taken from `config`.
pub fn from_slice_with_config<T: DeserializeOwned>(data: &[u8], config: UnpackerConfig) -> Result<T> {
    let mut unpacker = Unpacker::with_config(data, config);
    let value = T::deserialize(&mut Deserializer::new(&mut unpacker))?;
    if !unpacker.finish()?.is_empty() {
        return Err(Error::TrailingBytes);
    }
    Ok(value)
}

/// Deserialize one value from a reader. Bytes after the value are left unread.
///
/// # Errors
///
/// Returns an error if the data is malformed, truncated, exceeds the default
/// limits, or doesn't match `T`.
pub fn from_reader<R: Read, T: DeserializeOwned>(reader: R) -> Result<T> {
    let mut unpacker = Unpacker::new(reader);
    let value = T::deserialize(&mut Deserializer::new(&mut unpacker))?;
    unpacker.finish()?;
    Ok(value)
}

impl<'de, R: Read> de::Deserializer<'de> for &mut Deserializer<'_, R> {
    type Error = Error;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.unpacker.read_event()? {
            Event::Nil => visitor.visit_unit(),
            Event::Bool(b) => visitor.visit_bool(b),
            Event::I8(n) => visitor.visit_i64(i64::from(n)),
            Event::I16(n) => visitor.visit_i64(i64::from(n)),
            Event::I32(n) => visitor.visit_i64(i64::from(n)),
            Event::I64(n) => visitor.visit_i64(n),
            Event::U8(n) => visitor.visit_u64(u64::from(n)),
            Event::U16(n) => visitor.visit_u64(u64::from(n)),
            Event::U32(n) => visitor.visit_u64(u64::from(n)),
            Event::U64(n) => visitor.visit_u64(n),
            Event::F32(f) => visitor.visit_f32(f),
            Event::F64(f) => visitor.visit_f64(f),
            Event::EmptyRaw => visitor.visit_str(""),
            // Raw values carry no text/binary marker; valid UTF-8 reads as text
            Event::Raw(bytes) => match String::from_utf8(bytes) {
                Ok(s) => visitor.visit_string(s),
                Err(err) => visitor.visit_byte_buf(err.into_bytes()),
            },
            Event::ArrayBegin(len) => {
                let value = visitor.visit_seq(SeqDeserializer::new(&mut *self, len))?;
                self.unpacker.read_array_end(true)?;
                Ok(value)
            }
            Event::MapBegin(len) => {
                let value = visitor.visit_map(MapDeserializer::new(&mut *self, len))?;
                self.unpacker.read_map_end(true)?;
                Ok(value)
            }
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(self.unpacker.read_bool()?)
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i8(self.unpacker.read_i8()?)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i16(self.unpacker.read_i16()?)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i32(self.unpacker.read_i32()?)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i64(self.unpacker.read_i64()?)
    }

    fn deserialize_i128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i128(self.unpacker.read_i128()?)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u8(self.unpacker.read_u8()?)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u16(self.unpacker.read_u16()?)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u32(self.unpacker.read_u32()?)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u64(self.unpacker.read_u64()?)
    }

    fn deserialize_u128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u128(u128::from(self.unpacker.read_u64()?))
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f32(self.unpacker.read_f32()?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f64(self.unpacker.read_f64()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let s = self.unpacker.read_str()?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(Error::UnexpectedType(format!(
                "expected a single character, got {} bytes",
                s.len()
            ))),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.unpacker.read_str()?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.unpacker.read_str()?)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.unpacker.read_raw()?)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.unpacker.read_raw()?)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.unpacker.try_read_nil()? {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.unpacker.read_nil()?;
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let len = self.unpacker.read_array_begin()?;
        let value = visitor.visit_seq(SeqDeserializer::new(&mut *self, len))?;
        self.unpacker.read_array_end(true)?;
        Ok(value)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let len = self.unpacker.read_map_begin()?;
        let value = visitor.visit_map(MapDeserializer::new(&mut *self, len))?;
        self.unpacker.read_map_end(true)?;
        Ok(value)
    }

    /// Structs are normally maps, but positional arrays are accepted too.
    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_any(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let code = self.unpacker.peek_tag()?;
        if tag::is_raw(code) {
            visitor.visit_enum(UnitVariantDeserializer::new(self))
        } else if tag::is_map(code) {
            let len = self.unpacker.read_map_begin()?;
            if len != 1 {
                return Err(Error::UnexpectedType(format!(
                    "expected an enum as a single-entry map, got {len} entries"
                )));
            }
            let value = visitor.visit_enum(EnumDeserializer::new(&mut *self))?;
            self.unpacker.read_map_end(true)?;
            Ok(value)
        } else {
            Err(Error::unexpected("string or map for enum", code))
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_any(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.unpacker.skip()?;
        visitor.visit_unit()
    }
}

struct SeqDeserializer<'a, 'b, R: Read> {
    de: &'a mut Deserializer<'b, R>,
    remaining: usize,
}

impl<'a, 'b, R: Read> SeqDeserializer<'a, 'b, R> {
    fn new(de: &'a mut Deserializer<'b, R>, remaining: usize) -> Self {
        SeqDeserializer { de, remaining }
    }
}

impl<'de, R: Read> SeqAccess<'de> for SeqDeserializer<'_, '_, R> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct MapDeserializer<'a, 'b, R: Read> {
    de: &'a mut Deserializer<'b, R>,
    remaining: usize,
}

impl<'a, 'b, R: Read> MapDeserializer<'a, 'b, R> {
    fn new(de: &'a mut Deserializer<'b, R>, remaining: usize) -> Self {
        MapDeserializer { de, remaining }
    }
}

impl<'de, R: Read> MapAccess<'de> for MapDeserializer<'_, '_, R> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct UnitVariantDeserializer<'a, 'b, R: Read> {
    de: &'a mut Deserializer<'b, R>,
}

impl<'a, 'b, R: Read> UnitVariantDeserializer<'a, 'b, R> {
    fn new(de: &'a mut Deserializer<'b, R>) -> Self {
        UnitVariantDeserializer { de }
    }
}

impl<'de, R: Read> de::EnumAccess<'de> for UnitVariantDeserializer<'_, '_, R> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let variant = seed.deserialize(&mut *self.de)?;
        Ok((variant, self))
    }
}

impl<'de, R: Read> de::VariantAccess<'de> for UnitVariantDeserializer<'_, '_, R> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, _seed: T) -> Result<T::Value> {
        Err(Error::Custom("expected unit variant".into()))
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value> {
        Err(Error::Custom("expected unit variant".into()))
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value> {
        Err(Error::Custom("expected unit variant".into()))
    }
}

struct EnumDeserializer<'a, 'b, R: Read> {
    de: &'a mut Deserializer<'b, R>,
}

impl<'a, 'b, R: Read> EnumDeserializer<'a, 'b, R> {
    fn new(de: &'a mut Deserializer<'b, R>) -> Self {
        EnumDeserializer { de }
    }
}

impl<'de, R: Read> de::EnumAccess<'de> for EnumDeserializer<'_, '_, R> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let variant = seed.deserialize(&mut *self.de)?;
        Ok((variant, self))
    }
}

impl<'de, R: Read> de::VariantAccess<'de> for EnumDeserializer<'_, '_, R> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Err(Error::Custom("expected newtype, tuple, or struct variant".into()))
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(&mut *self.de)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_seq(&mut *self.de, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_map(&mut *self.de, visitor)
    }
}
