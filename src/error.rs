// ABOUTME: Error types for the wire codec, the object layer and schema construction.
// ABOUTME: Every variant is terminal for the pass that produced it.

use std::fmt;

/// The result type for objpack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which size guard rejected a length declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Raw,
    Array,
    Map,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Raw => write!(f, "raw"),
            LimitKind::Array => write!(f, "array"),
            LimitKind::Map => write!(f, "map"),
        }
    }
}

/// Errors that can occur while packing, unpacking or building a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unrecognized leading byte.
    MalformedTag(u8),

    /// The value read does not match what the caller asked for.
    UnexpectedType(String),

    /// A container was closed with elements remaining (strict mode),
    /// overfilled, or closed without a matching begin.
    ContainerImbalance(String),

    /// A declared raw/array/map length exceeds the configured guard.
    SizeLimitExceeded {
        kind: LimitKind,
        declared: u64,
        limit: usize,
    },

    /// Containers or objects nested deeper than the configured limit.
    MaxDepthExceeded,

    /// A value cannot be represented on the wire or in the requested type.
    UnsupportedValue(String),

    /// No exact or fallback template for a type, or no template for an ID.
    UnresolvedTemplate(String),

    /// Duplicate main-template claim or ID collision during schema build.
    SchemaConflict(String),

    /// The source ran out of bytes in the middle of a value.
    TruncatedInput,

    /// Bytes remain after the top-level value of a complete buffer.
    TrailingBytes,

    /// A back-reference points at a position that was never produced
    /// or whose object is still being constructed.
    InvalidReference(usize),

    /// A raw value read as a string is not valid UTF-8.
    InvalidUtf8,

    /// I/O error from the underlying sink or source.
    Io(String),

    /// Custom error message (for serde integration).
    Custom(String),
}

impl Error {
    /// Returns a stable snake-case name for the error kind.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::MalformedTag(_) => "malformed_tag",
            Error::UnexpectedType(_) => "unexpected_type",
            Error::ContainerImbalance(_) => "container_imbalance",
            Error::SizeLimitExceeded { .. } => "size_limit_exceeded",
            Error::MaxDepthExceeded => "max_depth_exceeded",
            Error::UnsupportedValue(_) => "unsupported_value",
            Error::UnresolvedTemplate(_) => "unresolved_template",
            Error::SchemaConflict(_) => "schema_conflict",
            Error::TruncatedInput => "truncated_input",
            Error::TrailingBytes => "trailing_bytes",
            Error::InvalidReference(_) => "invalid_reference",
            Error::InvalidUtf8 => "invalid_utf8",
            Error::Io(_) => "io_error",
            Error::Custom(_) => "custom",
        }
    }

    pub(crate) fn unexpected(expected: &str, tag: u8) -> Self {
        Error::UnexpectedType(format!("expected {expected}, got tag 0x{tag:02x}"))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedTag(tag) => write!(f, "malformed tag: 0x{tag:02x}"),
            Error::UnexpectedType(msg) => write!(f, "unexpected type: {msg}"),
            Error::ContainerImbalance(msg) => write!(f, "container imbalance: {msg}"),
            Error::SizeLimitExceeded {
                kind,
                declared,
                limit,
            } => write!(f, "{kind} length {declared} exceeds limit {limit}"),
            Error::MaxDepthExceeded => write!(f, "maximum nesting depth exceeded"),
            Error::UnsupportedValue(msg) => write!(f, "unsupported value: {msg}"),
            Error::UnresolvedTemplate(msg) => write!(f, "unresolved template: {msg}"),
            Error::SchemaConflict(msg) => write!(f, "schema conflict: {msg}"),
            Error::TruncatedInput => write!(f, "unexpected end of input"),
            Error::TrailingBytes => write!(f, "trailing bytes after value"),
            Error::InvalidReference(pos) => write!(f, "invalid back-reference to position {pos}"),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8 sequence"),
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::TruncatedInput
        } else {
            Error::Io(err.to_string())
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
