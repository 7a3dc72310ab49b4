//! Peeking: typed access to a range of a chunk, converting through the
//! serializer registry when the natural form is not what the caller wants.

use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, OnceLock};

use super::{check_range, Body, Chunk, ChunkKind, Fields, SchemaId, Structured};
use crate::error::{ChunkError, Result};
use crate::serializer::SerializerRegistry;

/// What a peek may return besides a complete, correct, properly represented
/// chunk obtained without serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PeekFlags(u8);

impl PeekFlags {
    pub const NONE: Self = Self(0);
    pub const ALLOW_INCOMPLETE: Self = Self(1 << 0);
    pub const ALLOW_INCORRECT: Self = Self(1 << 1);
    pub const ALLOW_IMPROPERLY_REPRESENTED: Self = Self(1 << 2);
    pub const ALLOW_SERIALIZATION: Self = Self(1 << 3);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PeekFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PeekFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// The form a peek should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Target {
    /// Whatever is most specific for the range.
    #[default]
    Any,
    Placeholder,
    Raw,
    Structured(SchemaId),
}

/// A peek request: target form, optional length and allowances.
///
/// Without a length the natural element at the cursor is used: the chunk
/// starting there going forward, or the chunk ending there going backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Peek {
    target: Target,
    length: Option<usize>,
    flags: PeekFlags,
}

impl Peek {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn placeholder() -> Self {
        Self::to(Target::Placeholder)
    }

    pub fn raw() -> Self {
        Self::to(Target::Raw)
    }

    pub fn fields<T: Fields>() -> Self {
        Self::to(Target::Structured(T::SCHEMA))
    }

    pub fn to(target: Target) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn flags(mut self, flags: PeekFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn requested_length(&self) -> Option<usize> {
        self.length
    }

    pub fn allowed(&self) -> PeekFlags {
        self.flags
    }
}

impl Chunk {
    /// Peeks forward from `offset`.
    pub fn peek(
        self: &Arc<Self>,
        offset: usize,
        request: Peek,
        registry: &SerializerRegistry,
    ) -> Result<Arc<Chunk>> {
        let total = self.len();
        check_range(offset, request.length.unwrap_or(0), total)?;
        if offset == total || request.length == Some(0) {
            return Err(ChunkError::EmptyAccess);
        }
        let natural = || {
            let (element, local) = self.element_at(offset);
            element.len() - local
        };
        let found = match request.target {
            Target::Any => self.slice_unchecked(offset, request.length.unwrap_or_else(natural)),
            Target::Placeholder => {
                let slice = self.slice_unchecked(offset, request.length.unwrap_or_else(natural));
                if slice.kind() == ChunkKind::Placeholder {
                    slice
                } else {
                    Arc::new(Chunk::with_state(
                        Body::Placeholder {
                            length: slice.len(),
                        },
                        slice.combined_state().derived(),
                    ))
                }
            }
            Target::Raw => self.peek_raw(
                offset,
                request.length.unwrap_or_else(natural),
                request.flags,
                registry,
            )?,
            Target::Structured(schema) => {
                self.peek_structured(offset, request.length, schema, request.flags, registry)?
            }
        };
        check_allowed(&found, request.flags)?;
        Ok(found)
    }

    /// Peeks backward so that the result ends at `end`.
    pub fn peek_back(
        self: &Arc<Self>,
        end: usize,
        request: Peek,
        registry: &SerializerRegistry,
    ) -> Result<Arc<Chunk>> {
        check_range(end, 0, self.len())?;
        if end == 0 || request.length == Some(0) {
            return Err(ChunkError::EmptyAccess);
        }
        let length = match request.length {
            Some(length) => {
                if length > end {
                    return Err(ChunkError::BoundsViolation {
                        offset: 0,
                        length,
                        available: end,
                    });
                }
                length
            }
            None => {
                let (element, local_end) = self.element_ending_at(end);
                match request.target {
                    Target::Structured(schema) => {
                        if element.schema() == Some(schema) && local_end == element.len() {
                            local_end
                        } else {
                            return Err(ChunkError::LengthRequired(schema));
                        }
                    }
                    _ => local_end,
                }
            }
        };
        self.peek(end - length, request.length(length), registry)
    }

    fn peek_raw(
        self: &Arc<Self>,
        offset: usize,
        length: usize,
        flags: PeekFlags,
        registry: &SerializerRegistry,
    ) -> Result<Arc<Chunk>> {
        let slice = self.slice_unchecked(offset, length);
        if slice.kind() == ChunkKind::Raw {
            return Ok(slice);
        }
        if !slice.is_byte_content() {
            require_serialization(&slice, flags, registry)?;
        }
        let bytes = registry.serialize(&slice)?;
        Ok(Arc::new(Chunk::with_state(
            Body::Raw { bytes },
            slice.combined_state().derived(),
        )))
    }

    fn peek_structured(
        self: &Arc<Self>,
        offset: usize,
        length: Option<usize>,
        schema: SchemaId,
        flags: PeekFlags,
        registry: &SerializerRegistry,
    ) -> Result<Arc<Chunk>> {
        let (element, local) = self.element_at(offset);
        if local == 0 {
            if element.schema() == Some(schema) {
                match length {
                    None => return Ok(element),
                    Some(l) if l == element.len() => return Ok(element),
                    Some(l) if l < element.len() => return Ok(element.truncated(l)),
                    Some(_) => {}
                }
            }
            if let Body::View {
                base,
                offset: 0,
                length: view_length,
            } = &element.body
            {
                let wanted = length.unwrap_or(*view_length);
                if base.schema() == Some(schema) && wanted <= *view_length {
                    return Ok(base.truncated(wanted).marked_by(&element.state));
                }
            }
        }

        let length = length.unwrap_or(self.len() - offset);
        let source = self.slice_unchecked(offset, length);
        if !source.is_byte_content() {
            require_serialization(&source, flags, registry)?;
        }
        let bytes = registry.serialize(&source)?;
        let mut chunk = registry.deserialize(schema, bytes)?;
        let source_state = source.combined_state();
        chunk.state.correct &= source_state.correct;
        chunk.state.complete &= source_state.complete;
        Ok(chunk.freeze())
    }

    /// Same-kind record cut down to its first `length` bytes.
    fn truncated(self: &Arc<Self>, length: usize) -> Arc<Chunk> {
        if length == self.len() {
            return Arc::clone(self);
        }
        let Body::Structured(s) = &self.body else {
            return self.slice_unchecked(0, length);
        };
        let mut state = self.state.derived();
        state.complete = false;
        Arc::new(Chunk::with_state(
            Body::Structured(Structured {
                fields: s.fields.clone(),
                length,
                cache: OnceLock::new(),
            }),
            state,
        ))
    }
}

fn require_serialization(
    source: &Chunk,
    flags: PeekFlags,
    registry: &SerializerRegistry,
) -> Result<()> {
    if flags.contains(PeekFlags::ALLOW_SERIALIZATION) || registry.implicit_serialization() {
        Ok(())
    } else {
        Err(ChunkError::ImplicitConversionDisabled(source.kind().name()))
    }
}

fn check_allowed(found: &Chunk, flags: PeekFlags) -> Result<()> {
    let state = found.combined_state();
    if !state.complete && !flags.contains(PeekFlags::ALLOW_INCOMPLETE) {
        return Err(ChunkError::IncompleteNotAllowed);
    }
    if !state.correct && !flags.contains(PeekFlags::ALLOW_INCORRECT) {
        return Err(ChunkError::IncorrectNotAllowed);
    }
    if !state.properly_represented && !flags.contains(PeekFlags::ALLOW_IMPROPERLY_REPRESENTED) {
        return Err(ChunkError::ImproperRepresentationNotAllowed);
    }
    Ok(())
}
