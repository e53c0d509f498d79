//! Error taxonomy for value conversion and call protocols

use core::fmt;

use super::jit::JitError;
use super::types::ValueKind;

/// Failure to decode one UTF-8 scalar into a UTF-16 code unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf16Error {
    /// Bad or missing continuation byte, empty input or trailing bytes
    InvalidSequence,
    /// Four-byte sequence; needs a surrogate pair
    SurrogatePair,
    /// Value in the surrogate range or a stray continuation byte
    Encoding,
}

impl fmt::Display for Utf16Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSequence => write!(f, "invalid multibyte sequence"),
            Self::SurrogatePair => write!(f, "surrogate pair"),
            Self::Encoding => write!(f, "encoding error"),
        }
    }
}

impl std::error::Error for Utf16Error {}

/// Conversion failure between a script value and a native value
#[derive(Debug)]
pub enum ConversionError {
    TypeMismatch { expected: &'static str, found: String },
    Overflow { target: ValueKind, value: i64 },
    Char8TooLong,
    Char8Multibyte,
    Char16TooLong,
    Char16(Utf16Error),
    InvalidUtf8,
    MissingMetatable { expected: &'static str },
    Field { field: String, found: String },
    MatrixElement { row: usize, column: usize },
    MatrixShape,
    Element { index: usize, source: Box<ConversionError> },
    MixedArray { kinds: Vec<&'static str> },
    UnsupportedAny { found: String },
    Constructor { name: &'static str, message: String },
    MissingPrototype,
    Script(mlua::Error),
    Generation(JitError),
}

impl ConversionError {
    pub fn type_mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "{} expected, got {}", expected, found)
            }
            Self::Overflow { target, value } => {
                write!(f, "overflow error: {} does not fit in {}", value, target)
            }
            Self::Char8TooLong => write!(f, "char8: length bigger than 1"),
            Self::Char8Multibyte => write!(f, "char8: multibyte character"),
            Self::Char16TooLong => write!(f, "char16: length bigger than 3"),
            Self::Char16(e) => write!(f, "char16: {}", e),
            Self::InvalidUtf8 => write!(f, "string is not valid utf-8"),
            Self::MissingMetatable { expected } => {
                write!(f, "{} expected, got table (missing metatable)", expected)
            }
            Self::Field { field, found } => {
                write!(f, "field '{}' number expected, got {}", field, found)
            }
            Self::MatrixElement { row, column } => {
                write!(f, "matrix element ({}, {}) must be number", row + 1, column + 1)
            }
            Self::MatrixShape => write!(f, "matrix 'm' field must be a 4x4 table"),
            Self::Element { index, source } => {
                write!(f, "element #{}: {}", index, source)
            }
            Self::MixedArray { kinds } => {
                write!(f, "table should contain one supported type, but contains: [")?;
                for (i, kind) in kinds.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}'", kind)?;
                }
                write!(f, "]")
            }
            Self::UnsupportedAny { found } => {
                write!(f, "any does not support script type {}", found)
            }
            Self::Constructor { name, message } => {
                write!(f, "failed to create {}: {}", name, message)
            }
            Self::MissingPrototype => write!(f, "function value has no prototype"),
            Self::Script(e) => write!(f, "{}", e),
            Self::Generation(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConversionError {}

impl From<mlua::Error> for ConversionError {
    fn from(e: mlua::Error) -> Self {
        Self::Script(e)
    }
}

impl From<JitError> for ConversionError {
    fn from(e: JitError) -> Self {
        Self::Generation(e)
    }
}

impl From<ConversionError> for mlua::Error {
    fn from(e: ConversionError) -> Self {
        match e {
            ConversionError::Script(inner) => inner,
            other => mlua::Error::runtime(other.to_string()),
        }
    }
}

/// Failure of a script → native call
#[derive(Debug)]
pub enum CallError {
    ArgCountMismatch { function: String, expected: usize, got: usize },
    Param { function: String, index: usize, source: ConversionError },
    Return { function: String, source: ConversionError },
    ContextGone { function: String },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArgCountMismatch { function, expected, got } => write!(
                f,
                "wrong number of parameters to '{}': {} when {} required",
                function, got, expected
            ),
            Self::Param { function, index, source } => {
                write!(f, "bad parameter #{} to '{}' ({})", index, function, source)
            }
            Self::Return { function, source } => {
                write!(f, "bad return value from '{}' ({})", function, source)
            }
            Self::ContextGone { function } => {
                write!(f, "'{}' called after its script context was shut down", function)
            }
        }
    }
}

impl std::error::Error for CallError {}

impl From<CallError> for mlua::Error {
    fn from(e: CallError) -> Self {
        mlua::Error::runtime(e.to_string())
    }
}

/// Signature table and marshaller disagree about a value; unrecoverable.
#[cold]
pub fn invariant_violation(site: &str, kind: ValueKind, found: ValueKind) -> ! {
    tracing::error!(
        event = "invariant_violation",
        site = site,
        expected = %kind,
        found = %found,
        "Value kind does not match its declared slot, aborting"
    );
    std::process::abort()
}
