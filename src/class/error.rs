use nom::error::ErrorKind;
use thiserror::Error;

/// Failure to decode a class file. Fatal for the load attempt that produced the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("class file truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("unknown constant pool tag {tag} at byte {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },
    #[error("invalid modified utf-8 string at byte {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("{remaining} unexpected trailing bytes after class attributes")]
    TrailingBytes { remaining: usize },
    #[error("malformed class file at byte {offset} ({kind})")]
    Malformed { offset: usize, kind: String },
    #[error(transparent)]
    BadConstant(#[from] ConstantPoolError),
}

/// Failed constant pool lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstantPoolError {
    #[error("constant pool index {index} out of range 1..{count}")]
    OutOfRange { index: u16, count: u16 },
    #[error("constant pool index {index} is the unusable upper half of a long or double")]
    Unusable { index: u16 },
    #[error("constant pool index {index}: expected {expected}, found {found}")]
    Mismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
}

/// Error type threaded through the nom parsers. Records how much input was left so that the
/// byte offset can be reported once the total length is known.
#[derive(Debug)]
pub(crate) struct DecodeError {
    remaining: usize,
    kind: DecodeErrorKind,
}

#[derive(Debug)]
pub(crate) enum DecodeErrorKind {
    Nom(ErrorKind),
    InvalidMagic(u32),
    UnknownConstantTag(u8),
    InvalidUtf8,
}

impl DecodeError {
    pub(crate) fn new(input: &[u8], kind: DecodeErrorKind) -> Self {
        DecodeError {
            remaining: input.len(),
            kind,
        }
    }

    pub(crate) fn into_parse_error(self, total: usize) -> ParseError {
        let offset = total.saturating_sub(self.remaining);
        match self.kind {
            DecodeErrorKind::Nom(ErrorKind::Eof) => ParseError::Truncated { offset },
            DecodeErrorKind::Nom(kind) => ParseError::Malformed {
                offset,
                kind: kind.description().to_string(),
            },
            DecodeErrorKind::InvalidMagic(magic) => ParseError::InvalidMagic(magic),
            // the tag byte itself was already consumed
            DecodeErrorKind::UnknownConstantTag(tag) => ParseError::UnknownConstantTag {
                tag,
                offset: offset.saturating_sub(1),
            },
            DecodeErrorKind::InvalidUtf8 => ParseError::InvalidUtf8 { offset },
        }
    }
}

impl nom::error::ParseError<&[u8]> for DecodeError {
    fn from_error_kind(input: &[u8], kind: ErrorKind) -> Self {
        DecodeError::new(input, DecodeErrorKind::Nom(kind))
    }

    fn append(_: &[u8], _: ErrorKind, other: Self) -> Self {
        other
    }
}
