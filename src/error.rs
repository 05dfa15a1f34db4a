// src/error.rs

/// The wire-level format code a value was tagged with, carried in a few
/// `BejError` variants so callers can tell what the dictionary expected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormatCode {
    Set,
    Array,
    Null,
    Integer,
    Enum,
    String,
    Real,
    Boolean,
    PropertyAnnotation,
    ResourceLink,
    Unknown(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BejError {
    /// The `L` byte of an NNINT was outside `[0, 8]`.
    InvalidNnint(u8),

    /// A read ran past the end of the available bytes.
    UnexpectedEof,

    /// An SFL declared a payload length longer than the bytes remaining in
    /// its containing payload.
    LengthOverrun { declared: usize, available: usize },

    /// The outer (or a nested) payload had bytes left over after its
    /// declared element/property count was fully consumed.
    TrailingData(usize),

    /// The 7-byte file header's magic did not match `frame::FILE_MAGIC`.
    InvalidMagic,

    /// A sequence number (with its selector) was not found in the expected
    /// dictionary subset.
    SequenceNotFound { sequence: u16, selector: u8 },

    /// A property name had no matching child entry during encode.
    NameNotFound,

    /// An ENUM payload's sequence number had no matching child entry.
    UnknownEnumValue(u16),

    /// An ENUM JSON string had no matching child entry by name.
    UnknownEnumName,

    /// A JSON value's type disagreed with the dictionary entry's format code.
    TypeMismatch(FormatCode),

    /// The dictionary named a recognized format code this codec deliberately
    /// does not give semantics to (REAL, PROPERTY_ANNOTATION, RESOURCE_LINK).
    UnsupportedFormat(FormatCode),

    /// The dictionary buffer was smaller than the 12-byte header.
    HeaderTooSmall,

    /// A child pointer/count pair described a range outside the dictionary
    /// buffer, or not aligned to the 10-byte entry stride.
    ChildRangeOutOfBounds,

    /// A dictionary entry's format nibble did not match any known format code.
    InvalidFormatCode(u8),

    /// The root JSON value passed to `encode` was not an object.
    RootNotObject,

    /// The outer SFL's format code was not SET.
    RootNotSet,

    /// Recursion (sets-of-sets, nested arrays) exceeded `dictionary::MAX_NESTING_DEPTH`.
    ExceededMaxDepth(usize),

    /// An ARRAY dictionary entry did not have exactly one element-archetype
    /// child (`child_count == 0xFFFF`).
    MissingArchetype,

    /// Generic I/O failure loading a dictionary file.
    #[cfg(feature = "std")]
    Io,
}

// Manual implementation of Display for no_std environments.
impl core::fmt::Display for BejError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidNnint(l) => write!(f, "invalid NNINT length byte: {}", l),
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::LengthOverrun { declared, available } => write!(
                f,
                "payload length {} exceeds {} bytes available",
                declared, available
            ),
            Self::TrailingData(n) => write!(f, "trailing data: {} bytes left after parse", n),
            Self::InvalidMagic => write!(f, "invalid BEJ file header magic"),
            Self::SequenceNotFound { sequence, selector } => write!(
                f,
                "sequence {} (selector {}) not found in dictionary",
                sequence, selector
            ),
            Self::NameNotFound => write!(f, "property name not found in dictionary"),
            Self::UnknownEnumValue(v) => write!(f, "unknown enum sequence: {}", v),
            Self::UnknownEnumName => write!(f, "unknown enum name"),
            Self::TypeMismatch(fmt_code) => {
                write!(f, "JSON type disagrees with dictionary format {:?}", fmt_code)
            }
            Self::UnsupportedFormat(fmt_code) => {
                write!(f, "recognized but unsupported format code: {:?}", fmt_code)
            }
            Self::HeaderTooSmall => write!(f, "dictionary buffer smaller than header"),
            Self::ChildRangeOutOfBounds => write!(f, "dictionary child range out of bounds"),
            Self::InvalidFormatCode(c) => write!(f, "invalid dictionary format code: {}", c),
            Self::RootNotObject => write!(f, "root JSON value is not an object"),
            Self::RootNotSet => write!(f, "outer SFL format is not SET"),
            Self::ExceededMaxDepth(d) => write!(f, "nesting depth {} exceeds limit", d),
            Self::MissingArchetype => write!(f, "array entry missing element archetype child"),
            #[cfg(feature = "std")]
            Self::Io => write!(f, "I/O error"),
        }
    }
}

// Enable standard Error trait if the "std" feature is on.
#[cfg(feature = "std")]
impl std::error::Error for BejError {}
