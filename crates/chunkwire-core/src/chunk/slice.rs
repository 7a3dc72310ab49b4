//! Natural slicing: sub-ranges of a chunk in their most specific form,
//! without ever converting between structured and byte representations.

use std::sync::Arc;

use super::sequence::concat;
use super::{check_range, Body, Chunk, ChunkState};
use crate::error::Result;

impl Chunk {
    /// `[offset, offset + length)` of this chunk in its most specific form:
    /// the chunk itself for the full range, a smaller placeholder or raw
    /// chunk, a child of a sequence, or a view onto a structured record.
    pub fn slice(self: &Arc<Self>, offset: usize, length: usize) -> Result<Arc<Chunk>> {
        check_range(offset, length, self.len())?;
        Ok(self.slice_unchecked(offset, length))
    }

    /// Callers guarantee `offset + length <= self.len()`.
    pub(crate) fn slice_unchecked(self: &Arc<Self>, offset: usize, length: usize) -> Arc<Chunk> {
        if offset == 0 && length == self.len() {
            return Arc::clone(self);
        }
        let state = self.state.derived();
        if length == 0 {
            return Arc::new(Chunk::with_state(Chunk::empty().body, state));
        }
        match &self.body {
            Body::Placeholder { .. } => {
                Arc::new(Chunk::with_state(Body::Placeholder { length }, state))
            }
            Body::Raw { bytes } => Arc::new(Chunk::with_state(
                Body::Raw {
                    bytes: bytes.slice(offset..offset + length),
                },
                state,
            )),
            Body::View {
                base,
                offset: base_offset,
                ..
            } => {
                if self.state.same_content_flags(&base.state) {
                    base.slice_unchecked(base_offset + offset, length)
                } else {
                    Arc::new(Chunk::with_state(
                        Body::View {
                            base: Arc::clone(base),
                            offset: base_offset + offset,
                            length,
                        },
                        state,
                    ))
                }
            }
            Body::Sequence { children, .. } => {
                slice_children(children, offset, length).marked_by(&self.state)
            }
            Body::Structured(_) => Arc::new(Chunk::with_state(
                Body::View {
                    base: Arc::clone(self),
                    offset,
                    length,
                },
                state,
            )),
        }
    }

    /// The leaf chunk covering `offset` and the offset inside it. Only
    /// sequences are descended into. Requires `offset < self.len()`.
    pub(crate) fn element_at(self: &Arc<Self>, offset: usize) -> (Arc<Chunk>, usize) {
        if let Body::Sequence { children, .. } = &self.body {
            let mut start = 0;
            for child in children {
                let end = start + child.len();
                if offset < end {
                    let (element, local) = child.element_at(offset - start);
                    return (element.marked_by(&self.state), local);
                }
                start = end;
            }
        }
        (Arc::clone(self), offset)
    }

    /// The leaf chunk ending at or spanning `end` and the end offset inside
    /// it. Requires `0 < end <= self.len()`.
    pub(crate) fn element_ending_at(self: &Arc<Self>, end: usize) -> (Arc<Chunk>, usize) {
        if let Body::Sequence { children, .. } = &self.body {
            let mut start = 0;
            for child in children {
                let child_end = start + child.len();
                if end <= child_end {
                    let (element, local_end) = child.element_ending_at(end - start);
                    return (element.marked_by(&self.state), local_end);
                }
                start = child_end;
            }
        }
        (Arc::clone(self), end)
    }

    /// This chunk with the incomplete, incorrect and improperly represented
    /// marks of `outer` added. Shared as is when it already carries them.
    pub(crate) fn marked_by(self: &Arc<Self>, outer: &ChunkState) -> Arc<Chunk> {
        let state = self.state.combine(outer);
        if state.same_content_flags(&self.state) {
            return Arc::clone(self);
        }
        let mut copy = Chunk::clone(self);
        copy.state = state.derived();
        Arc::new(copy)
    }
}

fn slice_children(children: &[Arc<Chunk>], offset: usize, length: usize) -> Arc<Chunk> {
    let end = offset + length;
    let mut parts = Vec::new();
    let mut start = 0;
    for child in children {
        let child_end = start + child.len();
        if child_end > offset && start < end {
            if start <= offset && end <= child_end {
                return child.slice_unchecked(offset - start, length);
            }
            let from = offset.max(start) - start;
            let to = end.min(child_end) - start;
            parts.push(child.slice_unchecked(from, to - from));
        }
        if child_end >= end {
            break;
        }
        start = child_end;
    }
    concat(parts)
}
