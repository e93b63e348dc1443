// ABOUTME: Serde Serializer writing any serializable type straight onto the wire codec.
// ABOUTME: No template IDs or object tracking; structs become maps keyed by field name.

use crate::error::{Error, Result};
use crate::packer::Packer;
use serde::ser::{self, Serialize};
use std::io::Write;

/// A serde Serializer over a [`Packer`].
///
/// Sequences and maps must report their length up front, since every wire
/// container declares its size in its header.
pub struct Serializer<'a, W: Write> {
    packer: &'a mut Packer<W>,
}

impl<'a, W: Write> Serializer<'a, W> {
    pub fn new(packer: &'a mut Packer<W>) -> Self {
        Self { packer }
    }
}

fn known_len(len: Option<usize>, what: &str) -> Result<usize> {
    len.ok_or_else(|| Error::Custom(format!("{what} length must be known before writing")))
}

impl<W: Write> ser::Serializer for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.packer.write_bool(v)
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.packer.write_i8(v)
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.packer.write_i16(v)
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.packer.write_i32(v)
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.packer.write_i64(v)
    }

    fn serialize_i128(self, v: i128) -> Result<()> {
        if let Ok(n) = i64::try_from(v) {
            self.packer.write_i64(n)
        } else if let Ok(n) = u64::try_from(v) {
            self.packer.write_u64(n)
        } else {
            Err(Error::UnsupportedValue(format!("{v} does not fit in 64 bits")))
        }
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.packer.write_u8(v)
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.packer.write_u16(v)
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.packer.write_u32(v)
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.packer.write_u64(v)
    }

    fn serialize_u128(self, v: u128) -> Result<()> {
        let n = u64::try_from(v)
            .map_err(|_| Error::UnsupportedValue(format!("{v} does not fit in 64 bits")))?;
        self.packer.write_u64(n)
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.packer.write_f32(v)
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.packer.write_f64(v)
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.packer.write_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.packer.write_str(v)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.packer.write_raw(v)
    }

    fn serialize_none(self) -> Result<()> {
        self.packer.write_nil()
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.packer.write_nil()
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.packer.write_nil()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.packer.write_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.packer.begin_map(1)?;
        self.packer.write_str(variant)?;
        value.serialize(&mut *self)?;
        self.packer.end_map(true)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        self.packer.begin_array(known_len(len, "sequence")?)?;
        Ok(self)
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.packer.begin_array(len)?;
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.packer.begin_array(len)?;
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.packer.begin_map(1)?;
        self.packer.write_str(variant)?;
        self.packer.begin_array(len)?;
        Ok(self)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap> {
        self.packer.begin_map(known_len(len, "map")?)?;
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        self.packer.begin_map(len)?;
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        self.packer.begin_map(1)?;
        self.packer.write_str(variant)?;
        self.packer.begin_map(len)?;
        Ok(self)
    }
}

impl<W: Write> ser::SerializeSeq for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.packer.end_array(true)
    }
}

impl<W: Write> ser::SerializeTuple for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.packer.end_array(true)
    }
}

impl<W: Write> ser::SerializeTupleStruct for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.packer.end_array(true)
    }
}

impl<W: Write> ser::SerializeTupleVariant for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.packer.end_array(true)?;
        self.packer.end_map(true)
    }
}

impl<W: Write> ser::SerializeMap for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        key.serialize(&mut **self)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.packer.end_map(true)
    }
}

impl<W: Write> ser::SerializeStruct for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.packer.write_str(key)?;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.packer.end_map(true)
    }
}

impl<W: Write> ser::SerializeStructVariant for &mut Serializer<'_, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.packer.write_str(key)?;
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        self.packer.end_map(true)?;
        self.packer.end_map(true)
    }
}
