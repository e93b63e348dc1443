// ABOUTME: Wire decoder dispatching each tag into a decode event or a typed read.
// ABOUTME: Enforces raw/array/map size guards before allocating and caps container nesting.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

use crate::error::{Error, LimitKind, Result};
use crate::types::{limits, tag};
use std::io::Read;

/// Validate and convert bytes to a UTF-8 string.
/// Uses simdutf8 for SIMD-accelerated validation when the feature is enabled.
#[cfg(feature = "simd-utf8")]
#[inline]
fn validate_utf8(bytes: Vec<u8>) -> Result<String> {
    simdutf8::basic::from_utf8(&bytes).map_err(|_| Error::InvalidUtf8)?;
    // Validated above
    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

#[cfg(not(feature = "simd-utf8"))]
#[inline]
fn validate_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

/// Size guards applied to every length declaration read from the wire,
/// and the nesting guard applied to every container opened.
///
/// Length limits set below the safety floor are clamped up to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackerConfig {
    max_raw_len: usize,
    max_array_len: usize,
    max_map_len: usize,
    max_depth: usize,
}

impl Default for UnpackerConfig {
    fn default() -> Self {
        Self {
            max_raw_len: limits::MAX_RAW_LEN,
            max_array_len: limits::MAX_ARRAY_LEN,
            max_map_len: limits::MAX_MAP_LEN,
            max_depth: limits::MAX_DEPTH,
        }
    }
}

impl UnpackerConfig {
    /// Maximum raw length in bytes.
    #[must_use]
    pub fn max_raw_len(&self) -> usize {
        self.max_raw_len
    }

    /// Maximum array length in elements.
    #[must_use]
    pub fn max_array_len(&self) -> usize {
        self.max_array_len
    }

    /// Maximum map length in key-value pairs.
    #[must_use]
    pub fn max_map_len(&self) -> usize {
        self.max_map_len
    }

    /// Maximum container nesting.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn with_max_raw_len(mut self, len: usize) -> Self {
        self.max_raw_len = len.max(limits::MIN_RAW_LEN);
        self
    }

    #[must_use]
    pub fn with_max_array_len(mut self, len: usize) -> Self {
        self.max_array_len = len.max(limits::MIN_ARRAY_LEN);
        self
    }

    #[must_use]
    pub fn with_max_map_len(mut self, len: usize) -> Self {
        self.max_map_len = len.max(limits::MIN_MAP_LEN);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// One decoded wire value.
///
/// Fixnums decode as `I8`. Containers only report their size; their
/// elements follow as further events.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Nil,
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
    Raw(Vec<u8>),
    EmptyRaw,
    ArrayBegin(usize),
    MapBegin(usize),
}

impl Event {
    /// The value as an i64 if this is an integer event that fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Event::I8(v) => Some(i64::from(v)),
            Event::I16(v) => Some(i64::from(v)),
            Event::I32(v) => Some(i64::from(v)),
            Event::I64(v) => Some(v),
            Event::U8(v) => Some(i64::from(v)),
            Event::U16(v) => Some(i64::from(v)),
            Event::U32(v) => Some(i64::from(v)),
            Event::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// True for every integer event.
    #[must_use]
    pub fn is_int(&self) -> bool {
        matches!(
            self,
            Event::I8(_)
                | Event::I16(_)
                | Event::I32(_)
                | Event::I64(_)
                | Event::U8(_)
                | Event::U16(_)
                | Event::U32(_)
                | Event::U64(_)
        )
    }
}

/// An integer read off the wire before narrowing.
#[derive(Clone, Copy)]
enum Int {
    Signed(i64),
    Unsigned(u64),
}

/// Container state for tracking nesting while reading.
#[derive(Clone, Copy, Debug)]
struct ContainerState {
    is_map: bool,
    /// Values still to be read (maps count keys and values)
    remaining: usize,
}

/// A wire decoder that reads from a byte source.
pub struct Unpacker<R: Read> {
    reader: R,
    config: UnpackerConfig,
    /// Tag byte read ahead by a peek
    peeked: Option<u8>,
    containers: Vec<ContainerState>,
}

impl<R: Read> Unpacker<R> {
    /// Create a new unpacker with default limits.
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, UnpackerConfig::default())
    }

    /// Create a new unpacker with custom limits.
    pub fn with_config(reader: R, config: UnpackerConfig) -> Self {
        Self {
            reader,
            config,
            peeked: None,
            containers: Vec::new(),
        }
    }

    /// Get the unpacker configuration.
    #[must_use]
    pub fn config(&self) -> &UnpackerConfig {
        &self.config
    }

    /// Current container nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.containers.len()
    }

    /// Values still to be read from the innermost open container, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> {
        self.containers.last().map(|c| c.remaining)
    }

    // =========================================================================
    // Byte access
    // =========================================================================

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    fn next_tag(&mut self) -> Result<u8> {
        if let Some(code) = self.peeked.take() {
            return Ok(code);
        }
        let [code] = self.read_array::<1>()?;
        Ok(code)
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&mut self) -> Result<u8> {
        if let Some(code) = self.peeked {
            return Ok(code);
        }
        let [code] = self.read_array::<1>()?;
        self.peeked = Some(code);
        Ok(code)
    }

    /// Read the tag of the next value and account for it in its container.
    #[inline]
    fn begin_value(&mut self) -> Result<u8> {
        if let Some(container) = self.containers.last() {
            if container.remaining == 0 {
                let kind = if container.is_map { "map" } else { "array" };
                return Err(Error::ContainerImbalance(format!(
                    "read past the end of the current {kind}"
                )));
            }
        }
        let code = self.next_tag()?;
        if let Some(container) = self.containers.last_mut() {
            container.remaining -= 1;
        }
        Ok(code)
    }

    // =========================================================================
    // Event dispatch
    // =========================================================================

    /// Decode the next value into an event.
    ///
    /// Array and map events open a container; its elements are read with
    /// further calls and it must be closed with `read_array_end` or
    /// `read_map_end`.
    pub fn read_event(&mut self) -> Result<Event> {
        let code = self.begin_value()?;
        self.event_for_tag(code)
    }

    fn event_for_tag(&mut self, code: u8) -> Result<Event> {
        if tag::is_positive_fixnum(code) || tag::is_negative_fixnum(code) {
            return Ok(Event::I8(code as i8));
        }
        if tag::is_fixraw(code) {
            let len = usize::from(code & 0x1f);
            return self.raw_event(len);
        }
        if tag::is_fixarray(code) {
            let len = usize::from(code & 0x0f);
            self.open_container(false, len)?;
            return Ok(Event::ArrayBegin(len));
        }
        if tag::is_fixmap(code) {
            let len = usize::from(code & 0x0f);
            self.open_container(true, len)?;
            return Ok(Event::MapBegin(len));
        }

        match code {
            tag::NIL => Ok(Event::Nil),
            tag::FALSE => Ok(Event::Bool(false)),
            tag::TRUE => Ok(Event::Bool(true)),
            tag::FLOAT32 => Ok(Event::F32(f32::from_bits(u32::from_be_bytes(
                self.read_array()?,
            )))),
            tag::FLOAT64 => Ok(Event::F64(f64::from_bits(u64::from_be_bytes(
                self.read_array()?,
            )))),
            tag::UINT8 => Ok(Event::U8(u8::from_be_bytes(self.read_array()?))),
            tag::UINT16 => Ok(Event::U16(u16::from_be_bytes(self.read_array()?))),
            tag::UINT32 => Ok(Event::U32(u32::from_be_bytes(self.read_array()?))),
            tag::UINT64 => Ok(Event::U64(u64::from_be_bytes(self.read_array()?))),
            tag::INT8 => Ok(Event::I8(i8::from_be_bytes(self.read_array()?))),
            tag::INT16 => Ok(Event::I16(i16::from_be_bytes(self.read_array()?))),
            tag::INT32 => Ok(Event::I32(i32::from_be_bytes(self.read_array()?))),
            tag::INT64 => Ok(Event::I64(i64::from_be_bytes(self.read_array()?))),
            tag::RAW16 | tag::RAW32 => {
                let len = self.read_length(code == tag::RAW16)?;
                self.raw_event(len)
            }
            tag::ARRAY16 | tag::ARRAY32 => {
                let len = self.read_length(code == tag::ARRAY16)?;
                self.open_container(false, len)?;
                Ok(Event::ArrayBegin(len))
            }
            tag::MAP16 | tag::MAP32 => {
                let len = self.read_length(code == tag::MAP16)?;
                self.open_container(true, len)?;
                Ok(Event::MapBegin(len))
            }
            _ => Err(Error::MalformedTag(code)),
        }
    }

    fn raw_event(&mut self, len: usize) -> Result<Event> {
        if len == 0 {
            return Ok(Event::EmptyRaw);
        }
        Ok(Event::Raw(self.read_raw_body(len)?))
    }

    /// Read a 16- or 32-bit length field.
    fn read_length(&mut self, short: bool) -> Result<usize> {
        if short {
            Ok(usize::from(u16::from_be_bytes(self.read_array()?)))
        } else {
            let len = u32::from_be_bytes(self.read_array()?);
            usize::try_from(len).map_err(|_| Error::SizeLimitExceeded {
                kind: LimitKind::Raw,
                declared: u64::from(len),
                limit: usize::MAX,
            })
        }
    }

    fn check_limit(&self, kind: LimitKind, len: usize) -> Result<()> {
        let limit = match kind {
            LimitKind::Raw => self.config.max_raw_len,
            LimitKind::Array => self.config.max_array_len,
            LimitKind::Map => self.config.max_map_len,
        };
        if len > limit {
            return Err(Error::SizeLimitExceeded {
                kind,
                declared: len as u64,
                limit,
            });
        }
        Ok(())
    }

    fn read_raw_body(&mut self, len: usize) -> Result<Vec<u8>> {
        self.check_limit(LimitKind::Raw, len)?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn open_container(&mut self, is_map: bool, len: usize) -> Result<()> {
        if self.containers.len() >= self.config.max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        let remaining = if is_map {
            self.check_limit(LimitKind::Map, len)?;
            len * 2
        } else {
            self.check_limit(LimitKind::Array, len)?;
            len
        };
        self.containers.push(ContainerState { is_map, remaining });
        Ok(())
    }

    // =========================================================================
    // Typed reads
    // =========================================================================

    /// Read a nil.
    pub fn read_nil(&mut self) -> Result<()> {
        match self.begin_value()? {
            tag::NIL => Ok(()),
            code => Err(Error::unexpected("nil", code)),
        }
    }

    /// Consume the next value only if it is nil.
    pub fn try_read_nil(&mut self) -> Result<bool> {
        if self.peek_tag()? == tag::NIL {
            self.begin_value()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Read a boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.begin_value()? {
            tag::TRUE => Ok(true),
            tag::FALSE => Ok(false),
            code => Err(Error::unexpected("boolean", code)),
        }
    }

    fn read_int(&mut self) -> Result<Int> {
        let code = self.begin_value()?;
        if !tag::is_int(code) {
            return Err(Error::unexpected("integer", code));
        }
        match self.event_for_tag(code)? {
            Event::I8(v) => Ok(Int::Signed(i64::from(v))),
            Event::I16(v) => Ok(Int::Signed(i64::from(v))),
            Event::I32(v) => Ok(Int::Signed(i64::from(v))),
            Event::I64(v) => Ok(Int::Signed(v)),
            Event::U8(v) => Ok(Int::Unsigned(u64::from(v))),
            Event::U16(v) => Ok(Int::Unsigned(u64::from(v))),
            Event::U32(v) => Ok(Int::Unsigned(u64::from(v))),
            Event::U64(v) => Ok(Int::Unsigned(v)),
            _ => Err(Error::unexpected("integer", code)),
        }
    }

    /// Read any integer that fits an i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        match self.read_int()? {
            Int::Signed(v) => Ok(v),
            Int::Unsigned(v) => i64::try_from(v)
                .map_err(|_| Error::UnsupportedValue(format!("{v} does not fit i64"))),
        }
    }

    /// Read any non-negative integer.
    pub fn read_u64(&mut self) -> Result<u64> {
        match self.read_int()? {
            Int::Unsigned(v) => Ok(v),
            Int::Signed(v) => u64::try_from(v)
                .map_err(|_| Error::UnsupportedValue(format!("{v} does not fit u64"))),
        }
    }

    /// Read any integer as an i128, never failing on range.
    pub fn read_i128(&mut self) -> Result<i128> {
        match self.read_int()? {
            Int::Signed(v) => Ok(i128::from(v)),
            Int::Unsigned(v) => Ok(i128::from(v)),
        }
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        narrow(self.read_i64()?, "i8")
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        narrow(self.read_i64()?, "i16")
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        narrow(self.read_i64()?, "i32")
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        narrow(self.read_u64()?, "u8")
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        narrow(self.read_u64()?, "u16")
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        narrow(self.read_u64()?, "u32")
    }

    /// Read a float64, float32 or integer as an f64.
    #[allow(clippy::cast_precision_loss)]
    pub fn read_f64(&mut self) -> Result<f64> {
        let code = self.peek_tag()?;
        match code {
            tag::FLOAT64 => {
                self.begin_value()?;
                Ok(f64::from_bits(u64::from_be_bytes(self.read_array()?)))
            }
            tag::FLOAT32 => {
                self.begin_value()?;
                Ok(f64::from(f32::from_bits(u32::from_be_bytes(
                    self.read_array()?,
                ))))
            }
            _ if tag::is_int(code) => match self.read_int()? {
                Int::Signed(v) => Ok(v as f64),
                Int::Unsigned(v) => Ok(v as f64),
            },
            _ => {
                self.begin_value()?;
                Err(Error::unexpected("float", code))
            }
        }
    }

    /// Read a float32, float64 or integer as an f32.
    pub fn read_f32(&mut self) -> Result<f32> {
        if self.peek_tag()? == tag::FLOAT32 {
            self.begin_value()?;
            return Ok(f32::from_bits(u32::from_be_bytes(self.read_array()?)));
        }
        Ok(self.read_f64()? as f32)
    }

    /// Read a raw byte string.
    pub fn read_raw(&mut self) -> Result<Vec<u8>> {
        let code = self.begin_value()?;
        let len = if tag::is_fixraw(code) {
            usize::from(code & 0x1f)
        } else if code == tag::RAW16 || code == tag::RAW32 {
            self.read_length(code == tag::RAW16)?
        } else {
            return Err(Error::unexpected("raw", code));
        };
        if len == 0 {
            return Ok(Vec::new());
        }
        self.read_raw_body(len)
    }

    /// Read a raw value as a UTF-8 string.
    pub fn read_str(&mut self) -> Result<String> {
        validate_utf8(self.read_raw()?)
    }

    /// Read an array header and open it. Returns the element count.
    pub fn read_array_begin(&mut self) -> Result<usize> {
        let code = self.begin_value()?;
        let len = if tag::is_fixarray(code) {
            usize::from(code & 0x0f)
        } else if code == tag::ARRAY16 || code == tag::ARRAY32 {
            self.read_length(code == tag::ARRAY16)?
        } else {
            return Err(Error::unexpected("array", code));
        };
        self.open_container(false, len)?;
        Ok(len)
    }

    /// Read a map header and open it. Returns the pair count.
    pub fn read_map_begin(&mut self) -> Result<usize> {
        let code = self.begin_value()?;
        let len = if tag::is_fixmap(code) {
            usize::from(code & 0x0f)
        } else if code == tag::MAP16 || code == tag::MAP32 {
            self.read_length(code == tag::MAP16)?
        } else {
            return Err(Error::unexpected("map", code));
        };
        self.open_container(true, len)?;
        Ok(len)
    }

    /// Close the innermost array.
    ///
    /// With `check`, unread elements are an error; without it they are
    /// skipped.
    pub fn read_array_end(&mut self, check: bool) -> Result<()> {
        self.close_container(false, check)
    }

    /// Close the innermost map. See [`Unpacker::read_array_end`].
    pub fn read_map_end(&mut self, check: bool) -> Result<()> {
        self.close_container(true, check)
    }

    fn close_container(&mut self, is_map: bool, check: bool) -> Result<()> {
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
                    "{kind} closed with {} values unread",
                    container.remaining
                )));
            }
            for _ in 0..container.remaining {
                self.skip()?;
            }
        }

        self.containers.pop();
        Ok(())
    }

    /// Consume one complete value without materializing it.
    ///
    /// Containers are skipped together with all their descendants.
    pub fn skip(&mut self) -> Result<()> {
        let code = self.begin_value()?;
        let mut pending = self.skip_payload(code)?;
        while pending > 0 {
            pending -= 1;
            let code = self.next_tag()?;
            pending += self.skip_payload(code)?;
        }
        Ok(())
    }

    /// Discard the payload that follows a tag. Returns how many nested
    /// values follow it.
    fn skip_payload(&mut self, code: u8) -> Result<usize> {
        if tag::is_positive_fixnum(code) || tag::is_negative_fixnum(code) {
            return Ok(0);
        }
        if tag::is_fixraw(code) {
            self.discard(usize::from(code & 0x1f))?;
            return Ok(0);
        }
        if tag::is_fixarray(code) {
            return Ok(usize::from(code & 0x0f));
        }
        if tag::is_fixmap(code) {
            return Ok(usize::from(code & 0x0f) * 2);
        }

        match code {
            tag::NIL | tag::FALSE | tag::TRUE => Ok(0),
            tag::UINT8 | tag::INT8 => self.discard(1).map(|()| 0),
            tag::UINT16 | tag::INT16 => self.discard(2).map(|()| 0),
            tag::UINT32 | tag::INT32 | tag::FLOAT32 => self.discard(4).map(|()| 0),
            tag::UINT64 | tag::INT64 | tag::FLOAT64 => self.discard(8).map(|()| 0),
            tag::RAW16 | tag::RAW32 => {
                let len = self.read_length(code == tag::RAW16)?;
                self.check_limit(LimitKind::Raw, len)?;
                self.discard(len).map(|()| 0)
            }
            tag::ARRAY16 | tag::ARRAY32 => {
                let len = self.read_length(code == tag::ARRAY16)?;
                self.check_limit(LimitKind::Array, len)?;
                Ok(len)
            }
            tag::MAP16 | tag::MAP32 => {
                let len = self.read_length(code == tag::MAP16)?;
                self.check_limit(LimitKind::Map, len)?;
                Ok(len * 2)
            }
            _ => Err(Error::MalformedTag(code)),
        }
    }

    fn discard(&mut self, len: usize) -> Result<()> {
        let copied = std::io::copy(
            &mut (&mut self.reader).take(len as u64),
            &mut std::io::sink(),
        )?;
        if copied < len as u64 {
            return Err(Error::TruncatedInput);
        }
        Ok(())
    }

    /// Finish decoding and check that every container was closed.
    pub fn finish(self) -> Result<R> {
        if !self.containers.is_empty() {
            return Err(Error::ContainerImbalance(format!(
                "{} containers left open",
                self.containers.len()
            )));
        }
        Ok(self.reader)
    }
}

fn narrow<T, U>(value: U, name: &str) -> Result<T>
where
    T: TryFrom<U>,
    U: Copy + std::fmt::Display,
{
    T::try_from(value).map_err(|_| Error::UnsupportedValue(format!("{value} does not fit {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpacker(data: &[u8]) -> Unpacker<&[u8]> {
        Unpacker::new(data)
    }

    #[test]
    fn test_read_fixnums() {
        assert_eq!(unpacker(&[0x00]).read_event().unwrap(), Event::I8(0));
        assert_eq!(unpacker(&[0x7f]).read_event().unwrap(), Event::I8(127));
        assert_eq!(unpacker(&[0xff]).read_event().unwrap(), Event::I8(-1));
        assert_eq!(unpacker(&[0xe0]).read_event().unwrap(), Event::I8(-32));
    }

    #[test]
    fn test_read_sized_ints() {
        assert_eq!(unpacker(&[0xcc, 0x80]).read_event().unwrap(), Event::U8(128));
        assert_eq!(
            unpacker(&[0xcd, 0x80, 0x00]).read_event().unwrap(),
            Event::U16(32768)
        );
        assert_eq!(unpacker(&[0xd0, 0xdf]).read_event().unwrap(), Event::I8(-33));
        assert_eq!(
            unpacker(&[0xd1, 0xff, 0x7f]).read_event().unwrap(),
            Event::I16(-129)
        );
        assert_eq!(unpacker(&[0xcc, 0xff]).read_i64().unwrap(), 255);
        assert_eq!(unpacker(&[0xd0, 0xdf]).read_i32().unwrap(), -33);
    }

    #[test]
    fn test_narrowing_overflow() {
        assert!(matches!(
            unpacker(&[0xcc, 0xff]).read_i8(),
            Err(Error::UnsupportedValue(_))
        ));
        assert!(matches!(
            unpacker(&[0xff]).read_u64(),
            Err(Error::UnsupportedValue(_))
        ));
        assert!(matches!(
            unpacker(&[0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).read_i64(),
            Err(Error::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_read_nil_bool() {
        assert_eq!(unpacker(&[0xc0]).read_event().unwrap(), Event::Nil);
        assert!(unpacker(&[0xc3]).read_bool().unwrap());
        assert!(!unpacker(&[0xc2]).read_bool().unwrap());
        assert!(matches!(
            unpacker(&[0xc3]).read_nil(),
            Err(Error::UnexpectedType(_))
        ));
    }

    #[test]
    fn test_try_read_nil_leaves_other_values() {
        let mut dec = unpacker(&[0x05, 0xc0]);
        assert!(!dec.try_read_nil().unwrap());
        assert_eq!(dec.read_i64().unwrap(), 5);
        assert!(dec.try_read_nil().unwrap());
    }

    #[test]
    fn test_read_raw() {
        assert_eq!(unpacker(&[0xa0]).read_event().unwrap(), Event::EmptyRaw);
        assert_eq!(
            unpacker(&[0xa2, b'h', b'i']).read_event().unwrap(),
            Event::Raw(b"hi".to_vec())
        );
        assert_eq!(unpacker(&[0xda, 0x00, 0x01, b'x']).read_str().unwrap(), "x");
        assert!(matches!(
            unpacker(&[0xa1, 0xff]).read_str(),
            Err(Error::InvalidUtf8)
        ));
    }

    #[test]
    fn test_read_floats() {
        assert_eq!(
            unpacker(&[0xca, 0x3f, 0x80, 0x00, 0x00]).read_event().unwrap(),
            Event::F32(1.0)
        );
        assert_eq!(
            unpacker(&[0xcb, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0]).read_f64().unwrap(),
            1.0
        );
        assert_eq!(unpacker(&[0x03]).read_f64().unwrap(), 3.0);
    }

    #[test]
    fn test_malformed_tags() {
        for code in [0xc1u8, 0xc4, 0xc9, 0xd4, 0xd9] {
            assert!(matches!(
                unpacker(&[code]).read_event(),
                Err(Error::MalformedTag(c)) if c == code
            ));
        }
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            unpacker(&[0xcd, 0x01]).read_event(),
            Err(Error::TruncatedInput)
        ));
        assert!(matches!(
            unpacker(&[0xa3, b'a']).read_event(),
            Err(Error::TruncatedInput)
        ));
        assert!(matches!(unpacker(&[]).read_event(), Err(Error::TruncatedInput)));
    }

    #[test]
    fn test_array_read_past_end() {
        let mut dec = unpacker(&[0x91, 0x01, 0x02]);
        assert_eq!(dec.read_array_begin().unwrap(), 1);
        assert_eq!(dec.read_i64().unwrap(), 1);
        assert!(matches!(dec.read_i64(), Err(Error::ContainerImbalance(_))));
    }

    #[test]
    fn test_strict_and_lenient_end() {
        let data = [0x93, 0x01, 0x92, 0x02, 0x03, 0xa1, b'x', 0x07];
        let mut dec = unpacker(&data);
        assert_eq!(dec.read_array_begin().unwrap(), 3);
        assert_eq!(dec.read_i64().unwrap(), 1);
        assert!(matches!(
            dec.read_array_end(true),
            Err(Error::ContainerImbalance(_))
        ));

        let mut dec = unpacker(&data);
        dec.read_array_begin().unwrap();
        dec.read_i64().unwrap();
        dec.read_array_end(false).unwrap();
        assert_eq!(dec.read_i64().unwrap(), 7);
        dec.finish().unwrap();
    }

    #[test]
    fn test_map_counts_pairs() {
        let data = [0x81, 0xa1, b'a', 0x01];
        let mut dec = unpacker(&data);
        assert_eq!(dec.read_map_begin().unwrap(), 1);
        assert_eq!(dec.remaining(), Some(2));
        assert_eq!(dec.read_str().unwrap(), "a");
        assert_eq!(dec.read_i64().unwrap(), 1);
        dec.read_map_end(true).unwrap();
        dec.finish().unwrap();
    }

    #[test]
    fn test_skip_nested() {
        // [[1, "ab"], {"k": [nil]}], then 9
        let data = [
            0x92, 0x92, 0x01, 0xa2, b'a', b'b', 0x81, 0xa1, b'k', 0x91, 0xc0, 0x09,
        ];
        let mut dec = unpacker(&data);
        dec.skip().unwrap();
        assert_eq!(dec.read_i64().unwrap(), 9);
        assert_eq!(dec.depth(), 0);
    }

    #[test]
    fn test_size_limits() {
        let config = UnpackerConfig::default()
            .with_max_array_len(0)
            .with_max_map_len(0)
            .with_max_raw_len(0);
        assert_eq!(config.max_array_len(), limits::MIN_ARRAY_LEN);
        assert_eq!(config.max_map_len(), limits::MIN_MAP_LEN);
        assert_eq!(config.max_raw_len(), limits::MIN_RAW_LEN);

        let mut dec = Unpacker::with_config(&[0xdd, 0x00, 0x01, 0x00, 0x00][..], config);
        assert!(matches!(
            dec.read_event(),
            Err(Error::SizeLimitExceeded {
                kind: LimitKind::Array,
                declared: 65536,
                limit: 16
            })
        ));

        let mut dec = Unpacker::with_config(&[0xde, 0x00, 0x11][..], config);
        assert!(matches!(
            dec.read_map_begin(),
            Err(Error::SizeLimitExceeded {
                kind: LimitKind::Map,
                ..
            })
        ));

        let mut dec = Unpacker::with_config(&[0xdb, 0xff, 0xff, 0xff, 0xff][..], config);
        assert!(matches!(
            dec.read_raw(),
            Err(Error::SizeLimitExceeded {
                kind: LimitKind::Raw,
                ..
            })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let config = UnpackerConfig::default().with_max_depth(3);
        let mut dec = Unpacker::with_config(&[0x91, 0x81, 0xa1, b'k', 0x91, 0x91, 0xc0][..], config);
        assert_eq!(dec.read_event().unwrap(), Event::ArrayBegin(1));
        assert_eq!(dec.read_event().unwrap(), Event::MapBegin(1));
        assert_eq!(dec.read_event().unwrap(), Event::Raw(b"k".to_vec()));
        assert_eq!(dec.read_event().unwrap(), Event::ArrayBegin(1));
        assert_eq!(dec.read_event(), Err(Error::MaxDepthExceeded));
    }

    #[test]
    fn test_default_depth_limit() {
        let mut data = vec![0x91; limits::MAX_DEPTH + 1];
        data.push(0xc0);
        let mut dec = Unpacker::new(&data[..]);
        for _ in 0..limits::MAX_DEPTH {
            dec.read_array_begin().unwrap();
        }
        assert_eq!(dec.read_array_begin(), Err(Error::MaxDepthExceeded));
    }

    #[test]
    fn test_skip_is_not_bounded_by_depth() {
        let mut data = vec![0x91; 10_000];
        data.push(0xc0);
        let mut dec = Unpacker::new(&data[..]);
        dec.skip().unwrap();
        assert_eq!(dec.depth(), 0);
    }
}
