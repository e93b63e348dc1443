// ABOUTME: Wire tag constants, default resource limits and the Decimal number type.
// ABOUTME: Tag values follow the MessagePack-style layout used by the packer and unpacker.

/// Leading tag bytes of the wire format.
pub mod tag {
    // Positive fixnum 0x00-0x7f, negative fixnum 0xe0-0xff
    pub const POSITIVE_FIXNUM_MAX: u8 = 0x7f;
    pub const NEGATIVE_FIXNUM_MIN: u8 = 0xe0;

    pub const FIXMAP: u8 = 0x80;
    pub const FIXARRAY: u8 = 0x90;
    pub const FIXRAW: u8 = 0xa0;

    pub const NIL: u8 = 0xc0;
    pub const FALSE: u8 = 0xc2;
    pub const TRUE: u8 = 0xc3;

    pub const FLOAT32: u8 = 0xca;
    pub const FLOAT64: u8 = 0xcb;

    pub const UINT8: u8 = 0xcc;
    pub const UINT16: u8 = 0xcd;
    pub const UINT32: u8 = 0xce;
    pub const UINT64: u8 = 0xcf;

    pub const INT8: u8 = 0xd0;
    pub const INT16: u8 = 0xd1;
    pub const INT32: u8 = 0xd2;
    pub const INT64: u8 = 0xd3;

    pub const RAW16: u8 = 0xda;
    pub const RAW32: u8 = 0xdb;
    pub const ARRAY16: u8 = 0xdc;
    pub const ARRAY32: u8 = 0xdd;
    pub const MAP16: u8 = 0xde;
    pub const MAP32: u8 = 0xdf;

    /// Largest length carried inline by a fixmap/fixarray tag.
    pub const FIX_CONTAINER_MAX: usize = 15;
    /// Largest length carried inline by a fixraw tag.
    pub const FIX_RAW_MAX: usize = 31;

    #[inline]
    pub const fn is_positive_fixnum(code: u8) -> bool {
        code <= POSITIVE_FIXNUM_MAX
    }

    #[inline]
    pub const fn is_negative_fixnum(code: u8) -> bool {
        code >= NEGATIVE_FIXNUM_MIN
    }

    #[inline]
    pub const fn is_fixmap(code: u8) -> bool {
        code & 0xf0 == FIXMAP
    }

    #[inline]
    pub const fn is_fixarray(code: u8) -> bool {
        code & 0xf0 == FIXARRAY
    }

    #[inline]
    pub const fn is_fixraw(code: u8) -> bool {
        code & 0xe0 == FIXRAW
    }

    /// Check if a tag starts a raw byte string of any width.
    #[inline]
    pub const fn is_raw(code: u8) -> bool {
        is_fixraw(code) || code == RAW16 || code == RAW32
    }

    /// Check if a tag starts a map of any width.
    #[inline]
    pub const fn is_map(code: u8) -> bool {
        is_fixmap(code) || code == MAP16 || code == MAP32
    }

    /// Check if a tag starts any integer encoding.
    #[inline]
    pub const fn is_int(code: u8) -> bool {
        is_positive_fixnum(code)
            || is_negative_fixnum(code)
            || (code >= UINT8 && code <= INT64)
    }
}

/// Default size guards and the floors they clamp to.
pub mod limits {
    /// Default maximum raw length in bytes (128 MiB).
    pub const MAX_RAW_LEN: usize = 128 * 1024 * 1024;

    /// Default maximum array length in elements.
    pub const MAX_ARRAY_LEN: usize = 4 * 1024 * 1024;

    /// Default maximum map length in key-value pairs.
    pub const MAX_MAP_LEN: usize = 2 * 1024 * 1024;

    /// Default maximum nesting of wire containers.
    pub const MAX_DEPTH: usize = 512;

    /// Default maximum nesting of objects. Every object opens two wire
    /// containers, its envelope and its payload.
    pub const MAX_OBJECT_DEPTH: usize = MAX_DEPTH / 2;

    /// Default number of schemas a manager keeps built.
    pub const MAX_CACHED_SCHEMAS: usize = 256;

    pub const MIN_RAW_LEN: usize = 32;
    pub const MIN_ARRAY_LEN: usize = 16;
    pub const MIN_MAP_LEN: usize = 16;
}

/// Bias applied to every integer on the object-level index channel.
///
/// With a bias of 16, template IDs 0..=143 and back-references to positions
/// 1..=16 all fit in a single fixnum byte.
pub const INDEX_BIAS: i64 = 16;

/// Wire-format version written at the head of every object stream.
pub const FORMAT_VERSION: u32 = 1;

/// A base-10 decimal number.
///
/// The value is: sign × significand × 10^exponent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    /// The absolute value of the significand
    pub significand: u64,
    /// The base-10 exponent
    pub exponent: i32,
    /// True when the value is negative
    pub negative: bool,
}

impl Decimal {
    #[inline]
    pub const fn new(negative: bool, significand: u64, exponent: i32) -> Self {
        Self {
            significand,
            exponent,
            negative,
        }
    }
}
