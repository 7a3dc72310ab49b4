//! Error type shared by every chunk, packet and buffer operation.

use crate::chunk::SchemaId;

pub type Result<T, E = ChunkError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk is immutable")]
    ImmutabilityViolation,

    #[error("empty chunk is not allowed")]
    EmptyAccess,

    #[error("incomplete chunk is not allowed")]
    IncompleteNotAllowed,

    #[error("incorrect chunk is not allowed")]
    IncorrectNotAllowed,

    #[error("improperly represented chunk is not allowed")]
    ImproperRepresentationNotAllowed,

    #[error("implicit serialization of {0} content is disabled")]
    ImplicitConversionDisabled(&'static str),

    #[error("no serializer registered for {0}")]
    UnknownSerializerKind(SchemaId),

    #[error("serializer for {0} is already registered")]
    DuplicateRegistration(SchemaId),

    #[error("serializer for {0} is not registered")]
    MissingRegistration(SchemaId),

    #[error("range {offset}+{length} exceeds available length {available}")]
    BoundsViolation {
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("cannot push {side}: {popped} bytes already popped on that side")]
    PoppedRegion { side: &'static str, popped: usize },

    #[error("length must be given to read {0} backward from bytes")]
    LengthRequired(SchemaId),

    #[error("expected {expected} chunk, found {actual}")]
    WrongShape {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("malformed {schema}: {reason}")]
    Malformed { schema: SchemaId, reason: String },
}

impl ChunkError {
    /// True for errors that only say "the requested chunk is not there in
    /// the requested form", as opposed to misuse of the API.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ChunkError::EmptyAccess
                | ChunkError::IncompleteNotAllowed
                | ChunkError::IncorrectNotAllowed
                | ChunkError::ImproperRepresentationNotAllowed
        )
    }
}

/// Turns an unavailable result into `None` instead of an error.
///
/// ```
/// # use chunkwire_core::{AllowNull, ChunkError, Result};
/// let missing: Result<u8> = Err(ChunkError::EmptyAccess);
/// assert_eq!(missing.allow_null(), Ok(None));
/// ```
pub trait AllowNull<T> {
    fn allow_null(self) -> Result<Option<T>>;
}

impl<T> AllowNull<T> for Result<T> {
    fn allow_null(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_unavailable() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
