// ABOUTME: Wire encoder writing one value at a time with the narrowest tag.
// ABOUTME: Tracks open arrays/maps so every container holds exactly its declared count.

use crate::error::{Error, Result};
use crate::types::tag;
use std::io::Write;

/// A wire encoder that writes to a byte sink.
///
/// The packer tracks container state so that every array or map receives
/// exactly the number of values it declared.
pub struct Packer<W: Write> {
    writer: W,
    /// Stack of open containers, innermost last
    containers: Vec<ContainerState>,
}

#[derive(Clone, Copy, Debug)]
struct ContainerState {
    is_map: bool,
    /// Values still owed to this container (maps count keys and values)
    remaining: usize,
}

impl<W: Write> Packer<W> {
    /// Create a new packer that writes to the given sink.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            containers: Vec::new(),
        }
    }

    /// Consume the packer and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Get a reference to the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Current container nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.containers.len()
    }

    /// Values still owed to the innermost open container, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> {
        self.containers.last().map(|c| c.remaining)
    }

    /// Account for one value in the innermost container.
    #[inline]
    fn consume_slot(&mut self) -> Result<()> {
        if let Some(container) = self.containers.last_mut() {
            if container.remaining == 0 {
                let kind = if container.is_map { "map" } else { "array" };
                return Err(Error::ContainerImbalance(format!(
                    "{kind} already holds its declared number of values"
                )));
            }
            container.remaining -= 1;
        }
        Ok(())
    }

    /// Write a single byte.
    #[inline]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.writer.write_all(&[byte])?;
        Ok(())
    }

    /// Write multiple bytes.
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    #[inline]
    fn write_tagged(&mut self, code: u8, payload: &[u8]) -> Result<()> {
        self.write_byte(code)?;
        self.write_bytes(payload)
    }

    /// Encode nil.
    pub fn write_nil(&mut self) -> Result<()> {
        self.consume_slot()?;
        self.write_byte(tag::NIL)
    }

    /// Encode a boolean.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.consume_slot()?;
        self.write_byte(if value { tag::TRUE } else { tag::FALSE })
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_i64(i64::from(value))
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_i64(i64::from(value))
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_i64(i64::from(value))
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_u64(u64::from(value))
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_u64(u64::from(value))
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_u64(u64::from(value))
    }

    /// Encode a signed integer using the narrowest representation.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.consume_slot()?;
        self.write_signed_int(value)
    }

    /// Encode an unsigned integer using the narrowest representation.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.consume_slot()?;
        self.write_unsigned_int(value)
    }

    /// Encode a 32-bit float.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.consume_slot()?;
        self.write_tagged(tag::FLOAT32, &value.to_bits().to_be_bytes())
    }

    /// Encode a 64-bit float.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.consume_slot()?;
        self.write_tagged(tag::FLOAT64, &value.to_bits().to_be_bytes())
    }

    /// Encode a raw byte string.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.consume_slot()?;
        let len = bytes.len();
        if len <= tag::FIX_RAW_MAX {
            self.write_byte(tag::FIXRAW | len as u8)?;
        } else {
            self.write_length(tag::RAW16, tag::RAW32, len, "raw")?;
        }
        self.write_bytes(bytes)
    }

    /// Encode a string as a UTF-8 raw value.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_raw(value.as_bytes())
    }

    /// Begin an array of exactly `len` values.
    pub fn begin_array(&mut self, len: usize) -> Result<()> {
        self.consume_slot()?;
        if len <= tag::FIX_CONTAINER_MAX {
            self.write_byte(tag::FIXARRAY | len as u8)?;
        } else {
            self.write_length(tag::ARRAY16, tag::ARRAY32, len, "array")?;
        }
        self.containers.push(ContainerState {
            is_map: false,
            remaining: len,
        });
        Ok(())
    }

    /// Begin a map of exactly `pairs` key-value pairs.
    pub fn begin_map(&mut self, pairs: usize) -> Result<()> {
        self.consume_slot()?;
        if pairs <= tag::FIX_CONTAINER_MAX {
            self.write_byte(tag::FIXMAP | pairs as u8)?;
        } else {
            self.write_length(tag::MAP16, tag::MAP32, pairs, "map")?;
        }
        let remaining = pairs.checked_mul(2).ok_or_else(|| {
            Error::UnsupportedValue(format!("map of {pairs} pairs is too large"))
        })?;
        self.containers.push(ContainerState {
            is_map: true,
            remaining,
        });
        Ok(())
    }

    /// End the innermost array.
    ///
    /// With `check`, values still owed are an error; without it they are
    /// padded with nil.
    pub fn end_array(&mut self, check: bool) -> Result<()> {
        self.end_container(false, check)
    }

    /// End the innermost map. See [`Packer::end_array`].
    pub fn end_map(&mut self, check: bool) -> Result<()> {
        self.end_container(true, check)
    }

    fn end_container(&mut self, is_map: bool, check: bool) -> Result<()> {
        let kind = if is_map { "map" } else { "array" };
        let container = *self
            .containers
            .last()
            .ok_or_else(|| Error::ContainerImbalance(format!("end of {kind} without begin")))?;

        if container.is_map != is_map {
            return Err(Error::ContainerImbalance(format!(
                "end of {kind} while another container kind is open"
            )));
        }

        if container.remaining > 0 {
            if check {
                return Err(Error::ContainerImbalance(format!(
                    "{kind} closed with {} values missing",
                    container.remaining
                )));
            }
            for _ in 0..container.remaining {
                self.write_byte(tag::NIL)?;
            }
        }

        self.containers.pop();
        Ok(())
    }

    /// Finish encoding and ensure all containers are closed.
    pub fn finish(mut self) -> Result<W> {
        if !self.containers.is_empty() {
            return Err(Error::ContainerImbalance(format!(
                "{} containers left open",
                self.containers.len()
            )));
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    // -------------------------------------------------------------------------
    // Internal encoding methods
    // -------------------------------------------------------------------------

    fn write_length(&mut self, code16: u8, code32: u8, len: usize, kind: &str) -> Result<()> {
        if let Ok(len) = u16::try_from(len) {
            return self.write_tagged(code16, &len.to_be_bytes());
        }
        match u32::try_from(len) {
            Ok(len) => self.write_tagged(code32, &len.to_be_bytes()),
            Err(_) => Err(Error::UnsupportedValue(format!(
                "{kind} length {len} does not fit a 32-bit length field"
            ))),
        }
    }

    /// Write an unsigned integer using the optimal encoding.
    #[allow(clippy::cast_possible_truncation)]
    fn write_unsigned_int(&mut self, value: u64) -> Result<()> {
        if value <= u64::from(tag::POSITIVE_FIXNUM_MAX) {
            self.write_byte(value as u8)
        } else if value <= u64::from(u8::MAX) {
            self.write_tagged(tag::UINT8, &[value as u8])
        } else if value <= u64::from(u16::MAX) {
            self.write_tagged(tag::UINT16, &(value as u16).to_be_bytes())
        } else if value <= u64::from(u32::MAX) {
            self.write_tagged(tag::UINT32, &(value as u32).to_be_bytes())
        } else {
            self.write_tagged(tag::UINT64, &value.to_be_bytes())
        }
    }

    /// Write a signed integer using the optimal encoding.
    ///
    /// Non-negative values take the unsigned path so that e.g. 128 needs
    /// only a uint8 rather than an int16.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    fn write_signed_int(&mut self, value: i64) -> Result<()> {
        if value >= 0 {
            return self.write_unsigned_int(value as u64);
        }
        if value >= -32 {
            // Negative fixnum: the two's complement byte is the tag
            return self.write_byte(value as u8);
        }
        if value >= i64::from(i8::MIN) {
            self.write_tagged(tag::INT8, &[value as u8])
        } else if value >= i64::from(i16::MIN) {
            self.write_tagged(tag::INT16, &(value as i16).to_be_bytes())
        } else if value >= i64::from(i32::MIN) {
            self.write_tagged(tag::INT32, &(value as i32).to_be_bytes())
        } else {
            self.write_tagged(tag::INT64, &value.to_be_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<F: FnOnce(&mut Packer<&mut Vec<u8>>) -> Result<()>>(f: F) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut packer = Packer::new(&mut buf);
        f(&mut packer).unwrap();
        packer.finish().unwrap();
        buf
    }

    #[test]
    fn test_smallest_integer_encodings() {
        assert_eq!(encode(|p| p.write_i64(0)), vec![0x00]);
        assert_eq!(encode(|p| p.write_i64(127)), vec![0x7f]);
        assert_eq!(encode(|p| p.write_i64(128)), vec![0xcc, 0x80]);
        assert_eq!(encode(|p| p.write_i64(255)), vec![0xcc, 0xff]);
        assert_eq!(encode(|p| p.write_i64(32767)), vec![0xcd, 0x7f, 0xff]);
        assert_eq!(encode(|p| p.write_i64(32768)), vec![0xcd, 0x80, 0x00]);
        assert_eq!(encode(|p| p.write_i64(65536)), vec![0xce, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(encode(|p| p.write_i64(-1)), vec![0xff]);
        assert_eq!(encode(|p| p.write_i64(-32)), vec![0xe0]);
        assert_eq!(encode(|p| p.write_i64(-33)), vec![0xd0, 0xdf]);
        assert_eq!(encode(|p| p.write_i64(-129)), vec![0xd1, 0xff, 0x7f]);
        assert_eq!(
            encode(|p| p.write_i64(i64::MIN)),
            vec![0xd3, 0x80, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            encode(|p| p.write_u64(u64::MAX)),
            vec![0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(encode(|p| p.write_nil()), vec![0xc0]);
        assert_eq!(encode(|p| p.write_bool(false)), vec![0xc2]);
        assert_eq!(encode(|p| p.write_bool(true)), vec![0xc3]);
        assert_eq!(encode(|p| p.write_f32(1.0)), vec![0xca, 0x3f, 0x80, 0x00, 0x00]);
        assert_eq!(
            encode(|p| p.write_f64(1.0)),
            vec![0xcb, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_raw_tiers() {
        assert_eq!(encode(|p| p.write_raw(&[])), vec![0xa0]);
        assert_eq!(encode(|p| p.write_str("hi")), vec![0xa2, b'h', b'i']);

        let bytes = encode(|p| p.write_raw(&[7u8; 31]));
        assert_eq!(bytes[0], 0xbf);

        let bytes = encode(|p| p.write_raw(&[7u8; 32]));
        assert_eq!(&bytes[..3], &[0xda, 0x00, 0x20]);
        assert_eq!(bytes.len(), 35);

        let bytes = encode(|p| p.write_raw(&vec![0u8; 65536]));
        assert_eq!(&bytes[..5], &[0xdb, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_container_headers() {
        let bytes = encode(|p| {
            p.begin_array(2)?;
            p.write_i64(1)?;
            p.write_i64(2)?;
            p.end_array(true)
        });
        assert_eq!(bytes, vec![0x92, 0x01, 0x02]);

        let bytes = encode(|p| {
            p.begin_map(1)?;
            p.write_str("a")?;
            p.write_i64(1)?;
            p.end_map(true)
        });
        assert_eq!(bytes, vec![0x81, 0xa1, b'a', 0x01]);

        let bytes = encode(|p| {
            p.begin_array(16)?;
            p.end_array(false)
        });
        assert_eq!(&bytes[..3], &[0xdc, 0x00, 0x10]);
        assert_eq!(bytes.len(), 3 + 16);
    }

    #[test]
    fn test_strict_end_with_missing_values() {
        let mut buf = Vec::new();
        let mut packer = Packer::new(&mut buf);
        packer.begin_array(3).unwrap();
        packer.write_i64(1).unwrap();
        packer.write_i64(2).unwrap();
        assert!(matches!(
            packer.end_array(true),
            Err(Error::ContainerImbalance(_))
        ));
    }

    #[test]
    fn test_lenient_end_pads_with_nil() {
        let bytes = encode(|p| {
            p.begin_array(3)?;
            p.write_i64(1)?;
            p.write_i64(2)?;
            p.end_array(false)
        });
        assert_eq!(bytes, vec![0x93, 0x01, 0x02, 0xc0]);
    }

    #[test]
    fn test_overfilled_container() {
        let mut buf = Vec::new();
        let mut packer = Packer::new(&mut buf);
        packer.begin_array(1).unwrap();
        packer.write_nil().unwrap();
        assert!(matches!(packer.write_nil(), Err(Error::ContainerImbalance(_))));
    }

    #[test]
    fn test_mismatched_end() {
        let mut buf = Vec::new();
        let mut packer = Packer::new(&mut buf);
        assert!(matches!(
            packer.end_array(true),
            Err(Error::ContainerImbalance(_))
        ));
        packer.begin_map(0).unwrap();
        assert!(matches!(
            packer.end_array(true),
            Err(Error::ContainerImbalance(_))
        ));
        packer.end_map(true).unwrap();
    }

    #[test]
    fn test_finish_with_open_container() {
        let mut buf = Vec::new();
        let mut packer = Packer::new(&mut buf);
        packer.begin_array(0).unwrap();
        assert!(matches!(packer.finish(), Err(Error::ContainerImbalance(_))));
    }
}
