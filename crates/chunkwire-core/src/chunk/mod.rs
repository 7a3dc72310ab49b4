//! The chunk model: placeholders, raw bytes, views, sequences and
//! structured records, plus the four state flags every chunk carries.
//!
//! Chunks are shared as `Arc<Chunk>` once frozen. Any operation that would
//! change a chunk needs `&mut Chunk`, obtained either by owning a fresh chunk
//! or through [`Chunk::make_mut`].

mod fields;
mod peek;
mod sequence;
mod slice;

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};

use crate::error::{ChunkError, Result};

pub use fields::{DynFields, Fields, SchemaId};
pub use peek::{Peek, PeekFlags, Target};
pub(crate) use sequence::concat;

// ── State ─────────────────────────────────────────────────────────────────────

/// Per-chunk flags. Every flag only ever moves away from its default
/// except through [`Chunk::make_mut`], which hands out a mutable chunk again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkState {
    pub mutable: bool,
    pub complete: bool,
    pub correct: bool,
    pub properly_represented: bool,
}

impl Default for ChunkState {
    fn default() -> Self {
        Self {
            mutable: true,
            complete: true,
            correct: true,
            properly_represented: true,
        }
    }
}

impl ChunkState {
    /// State of a chunk derived from this one by slicing or conversion.
    pub(crate) fn derived(&self) -> Self {
        Self {
            mutable: false,
            ..*self
        }
    }

    pub(crate) fn same_content_flags(&self, other: &Self) -> bool {
        self.complete == other.complete
            && self.correct == other.correct
            && self.properly_represented == other.properly_represented
    }

    pub(crate) fn combine(&self, other: &Self) -> Self {
        Self {
            mutable: self.mutable,
            complete: self.complete && other.complete,
            correct: self.correct && other.correct,
            properly_represented: self.properly_represented && other.properly_represented,
        }
    }
}

// ── Shapes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Placeholder,
    Raw,
    View,
    Sequence,
    Structured,
}

impl ChunkKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChunkKind::Placeholder => "placeholder",
            ChunkKind::Raw => "raw",
            ChunkKind::View => "view",
            ChunkKind::Sequence => "sequence",
            ChunkKind::Structured => "structured",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Body {
    Placeholder {
        length: usize,
    },
    Raw {
        bytes: Bytes,
    },
    /// Never points at another view.
    View {
        base: Arc<Chunk>,
        offset: usize,
        length: usize,
    },
    /// Children are contiguous, non-empty and already merged.
    Sequence {
        children: Vec<Arc<Chunk>>,
        length: usize,
    },
    Structured(Structured),
}

#[derive(Debug, Clone)]
pub(crate) struct Structured {
    pub(crate) fields: Box<dyn DynFields>,
    pub(crate) length: usize,
    /// Last serialized form. Cleared on every field mutation.
    pub(crate) cache: OnceLock<Bytes>,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub(crate) state: ChunkState,
    pub(crate) body: Body,
}

// ── Construction ──────────────────────────────────────────────────────────────

impl Chunk {
    pub(crate) fn with_state(body: Body, state: ChunkState) -> Self {
        Self { state, body }
    }

    fn new(body: Body) -> Self {
        Self::with_state(body, ChunkState::default())
    }

    /// `length` bytes of unspecified content.
    pub fn placeholder(length: usize) -> Self {
        Self::new(Body::Placeholder { length })
    }

    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Self::new(Body::Raw {
            bytes: bytes.into(),
        })
    }

    pub fn structured<T: Fields>(fields: T) -> Self {
        Self::from_dyn(Box::new(fields))
    }

    pub fn from_dyn(fields: Box<dyn DynFields>) -> Self {
        let length = fields.field_length();
        Self::new(Body::Structured(Structured {
            fields,
            length,
            cache: OnceLock::new(),
        }))
    }

    /// A zero-length sequence.
    pub fn empty() -> Self {
        Self::new(Body::Sequence {
            children: Vec::new(),
            length: 0,
        })
    }

    /// A view onto `[offset, offset + length)` of `base`. Views of views are
    /// flattened onto the innermost base.
    pub fn view(base: Arc<Chunk>, offset: usize, length: usize) -> Result<Self> {
        check_range(offset, length, base.len())?;
        Ok(match &base.body {
            Body::View {
                base: inner,
                offset: inner_offset,
                ..
            } => Self::new(Body::View {
                base: Arc::clone(inner),
                offset: inner_offset + offset,
                length,
            }),
            _ => Self::new(Body::View {
                base,
                offset,
                length,
            }),
        })
    }

    /// Marks the chunk immutable and shares it.
    pub fn freeze(mut self) -> Arc<Chunk> {
        self.state.mutable = false;
        Arc::new(self)
    }

    /// Freezes a chunk that is already behind an `Arc`. When other handles
    /// exist the chunk is copied and the copy frozen.
    pub(crate) fn frozen(mut this: Arc<Chunk>) -> Arc<Chunk> {
        if this.is_mutable() {
            Arc::make_mut(&mut this).state.mutable = false;
        }
        this
    }

    /// A mutable copy. Children and view bases stay shared; they are
    /// immutable already.
    pub fn dup(&self) -> Chunk {
        let mut copy = self.clone();
        copy.state.mutable = true;
        copy
    }

    /// Mutable access to a shared chunk. Reclaims the chunk in place when
    /// `this` is the only handle and duplicates it otherwise.
    pub fn make_mut(this: &mut Arc<Chunk>) -> &mut Chunk {
        if Arc::strong_count(this) > 1 {
            tracing::trace!(
                kind = this.kind().name(),
                length = this.len(),
                "duplicating shared chunk for mutation"
            );
        }
        let chunk = Arc::make_mut(this);
        chunk.state.mutable = true;
        chunk
    }
}

pub(crate) fn check_range(offset: usize, length: usize, available: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= available => Ok(()),
        _ => Err(ChunkError::BoundsViolation {
            offset,
            length,
            available,
        }),
    }
}

// ── Accessors ─────────────────────────────────────────────────────────────────

impl Chunk {
    pub fn len(&self) -> usize {
        match &self.body {
            Body::Placeholder { length } => *length,
            Body::Raw { bytes } => bytes.len(),
            Body::View { length, .. } => *length,
            Body::Sequence { length, .. } => *length,
            Body::Structured(s) => s.length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ChunkKind {
        match &self.body {
            Body::Placeholder { .. } => ChunkKind::Placeholder,
            Body::Raw { .. } => ChunkKind::Raw,
            Body::View { .. } => ChunkKind::View,
            Body::Sequence { .. } => ChunkKind::Sequence,
            Body::Structured(_) => ChunkKind::Structured,
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Own flags folded with those of every chunk this one is made of.
    pub fn combined_state(&self) -> ChunkState {
        match &self.body {
            Body::Sequence { children, .. } => children
                .iter()
                .fold(self.state, |acc, child| acc.combine(&child.combined_state())),
            Body::View { base, .. } => self.state.combine(&base.combined_state()),
            _ => self.state,
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.state.mutable
    }

    pub fn is_immutable(&self) -> bool {
        !self.state.mutable
    }

    pub fn is_complete(&self) -> bool {
        self.state.complete
    }

    pub fn is_incomplete(&self) -> bool {
        !self.state.complete
    }

    pub fn is_correct(&self) -> bool {
        self.state.correct
    }

    pub fn is_incorrect(&self) -> bool {
        !self.state.correct
    }

    pub fn is_properly_represented(&self) -> bool {
        self.state.properly_represented
    }

    pub fn is_improperly_represented(&self) -> bool {
        !self.state.properly_represented
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            Body::Raw { bytes } => Some(bytes),
            _ => None,
        }
    }

    pub fn fields<T: Fields>(&self) -> Option<&T> {
        self.dyn_fields()?.as_any().downcast_ref::<T>()
    }

    pub fn dyn_fields(&self) -> Option<&dyn DynFields> {
        match &self.body {
            Body::Structured(s) => Some(s.fields.as_ref()),
            _ => None,
        }
    }

    pub fn schema(&self) -> Option<SchemaId> {
        self.dyn_fields().map(|f| f.schema_id())
    }

    /// Children of a sequence; empty for every other shape.
    pub fn children(&self) -> &[Arc<Chunk>] {
        match &self.body {
            Body::Sequence { children, .. } => children,
            _ => &[],
        }
    }

    /// `(base, offset)` of a view.
    pub fn view_base(&self) -> Option<(&Arc<Chunk>, usize)> {
        match &self.body {
            Body::View { base, offset, .. } => Some((base, *offset)),
            _ => None,
        }
    }

    /// True when converting this chunk to bytes needs no serializer.
    pub(crate) fn is_byte_content(&self) -> bool {
        match &self.body {
            Body::Raw { .. } => true,
            Body::Sequence { children, .. } => children.iter().all(|c| c.is_byte_content()),
            Body::View { base, .. } => base.is_byte_content(),
            Body::Placeholder { .. } | Body::Structured(_) => false,
        }
    }
}

// ── Mutation ──────────────────────────────────────────────────────────────────

impl Chunk {
    fn check_mutable(&self) -> Result<()> {
        if self.state.mutable {
            Ok(())
        } else {
            Err(ChunkError::ImmutabilityViolation)
        }
    }

    fn wrong_shape(&self, expected: &'static str) -> ChunkError {
        ChunkError::WrongShape {
            expected,
            actual: self.kind().name(),
        }
    }

    pub fn mark_immutable(&mut self) {
        self.state.mutable = false;
    }

    pub fn mark_incomplete(&mut self) {
        self.state.complete = false;
    }

    pub fn mark_incorrect(&mut self) {
        self.state.correct = false;
    }

    pub fn mark_improperly_represented(&mut self) {
        self.state.properly_represented = false;
    }

    /// Changes the length of a placeholder, or the declared length of a
    /// structured record.
    pub fn set_length(&mut self, new_length: usize) -> Result<()> {
        self.check_mutable()?;
        match &mut self.body {
            Body::Placeholder { length } => {
                *length = new_length;
                Ok(())
            }
            Body::Structured(s) => {
                s.length = new_length;
                s.cache = OnceLock::new();
                Ok(())
            }
            _ => Err(self.wrong_shape("placeholder or structured")),
        }
    }

    pub fn set_byte(&mut self, index: usize, value: u8) -> Result<()> {
        self.check_mutable()?;
        let Body::Raw { bytes } = &mut self.body else {
            return Err(self.wrong_shape("raw"));
        };
        check_range(index, 1, bytes.len())?;
        let mut edited = BytesMut::from(&bytes[..]);
        edited[index] = value;
        *bytes = edited.freeze();
        Ok(())
    }

    pub fn set_bytes(&mut self, new_bytes: impl Into<Bytes>) -> Result<()> {
        self.check_mutable()?;
        let Body::Raw { bytes } = &mut self.body else {
            return Err(self.wrong_shape("raw"));
        };
        *bytes = new_bytes.into();
        Ok(())
    }

    /// Mutable access to the fields of a structured record. Drops the cached
    /// serialized form.
    pub fn fields_mut<T: Fields>(&mut self) -> Result<&mut T> {
        self.check_mutable()?;
        let actual = self.kind().name();
        let Body::Structured(s) = &mut self.body else {
            return Err(ChunkError::WrongShape {
                expected: T::SCHEMA.name(),
                actual,
            });
        };
        s.cache = OnceLock::new();
        let schema = s.fields.schema_id();
        s.fields
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(ChunkError::WrongShape {
                expected: T::SCHEMA.name(),
                actual: schema.name(),
            })
    }
}

// ── Display ───────────────────────────────────────────────────────────────────

const DISPLAY_BYTES: usize = 16;

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Body::Placeholder { length } => write!(f, "Placeholder(len = {length})")?,
            Body::Raw { bytes } => {
                let shown = &bytes[..bytes.len().min(DISPLAY_BYTES)];
                let ellipsis = if bytes.len() > DISPLAY_BYTES { ".." } else { "" };
                write!(
                    f,
                    "Raw(len = {}, {}{ellipsis})",
                    bytes.len(),
                    hex::encode(shown)
                )?
            }
            Body::View {
                base,
                offset,
                length,
            } => write!(f, "View(offset = {offset}, len = {length}, base = {base})")?,
            Body::Sequence { children, .. } => {
                f.write_str("Sequence[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str("]")?
            }
            Body::Structured(s) => write!(f, "{:?}(len = {})", s.fields, s.length)?,
        }
        if self.is_incomplete() {
            f.write_str(" incomplete")?;
        }
        if self.is_incorrect() {
            f.write_str(" incorrect")?;
        }
        if self.is_improperly_represented() {
            f.write_str(" improper")?;
        }
        Ok(())
    }
}
