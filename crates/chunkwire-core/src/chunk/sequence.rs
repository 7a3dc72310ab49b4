//! Sequence construction and the merge rules applied whenever chunks are
//! placed next to each other.

use std::sync::Arc;

use bytes::BytesMut;

use super::{Body, Chunk, ChunkState};
use crate::error::Result;

impl Chunk {
    /// A sequence of `children`, merged as they are inserted.
    pub fn sequence<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Arc<Chunk>>,
    {
        let mut merged = Vec::new();
        for child in children {
            append_merged(&mut merged, child);
        }
        let length = merged.iter().map(|c| c.len()).sum();
        Chunk::with_state(
            Body::Sequence {
                children: merged,
                length,
            },
            ChunkState::default(),
        )
    }

    pub fn push_back(&mut self, chunk: Arc<Chunk>) -> Result<()> {
        self.check_mutable()?;
        let Body::Sequence { children, length } = &mut self.body else {
            return Err(self.wrong_shape("sequence"));
        };
        *length += chunk.len();
        append_merged(children, chunk);
        Ok(())
    }

    pub fn push_front(&mut self, chunk: Arc<Chunk>) -> Result<()> {
        self.check_mutable()?;
        let Body::Sequence { children, length } = &mut self.body else {
            return Err(self.wrong_shape("sequence"));
        };
        *length += chunk.len();
        prepend_merged(children, chunk);
        Ok(())
    }
}

/// Joins `parts` into the most specific chunk: a single merged chunk when
/// everything collapses, a sequence otherwise.
pub(crate) fn concat<I>(parts: I) -> Arc<Chunk>
where
    I: IntoIterator<Item = Arc<Chunk>>,
{
    let mut merged = Vec::new();
    for part in parts {
        append_merged(&mut merged, part);
    }
    if merged.len() == 1 {
        return merged.swap_remove(0);
    }
    let length = merged.iter().map(|c| c.len()).sum();
    Arc::new(Chunk::with_state(
        Body::Sequence {
            children: merged,
            length,
        },
        ChunkState::default().derived(),
    ))
}

/// Only clean sequences are flattened; a sequence carrying its own
/// incomplete/incorrect/improper mark stays a child so the mark survives.
fn flattenable(chunk: &Chunk) -> Option<&[Arc<Chunk>]> {
    match &chunk.body {
        Body::Sequence { children, .. }
            if chunk.state.same_content_flags(&ChunkState::default()) =>
        {
            Some(children)
        }
        _ => None,
    }
}

pub(crate) fn append_merged(children: &mut Vec<Arc<Chunk>>, chunk: Arc<Chunk>) {
    if chunk.is_empty() {
        return;
    }
    if let Some(inner) = flattenable(&chunk) {
        for child in inner {
            append_merged(children, Arc::clone(child));
        }
        return;
    }
    if let Some(last) = children.last_mut() {
        if let Some(merged) = merge_pair(last, &chunk) {
            *last = merged;
            return;
        }
    }
    children.push(chunk);
}

fn prepend_merged(children: &mut Vec<Arc<Chunk>>, chunk: Arc<Chunk>) {
    if chunk.is_empty() {
        return;
    }
    if let Some(inner) = flattenable(&chunk) {
        for child in inner.iter().rev() {
            prepend_merged(children, Arc::clone(child));
        }
        return;
    }
    if let Some(first) = children.first_mut() {
        if let Some(merged) = merge_pair(&chunk, first) {
            *first = merged;
            return;
        }
    }
    children.insert(0, chunk);
}

/// Merges `a` followed by `b` into one chunk when the shapes allow it.
fn merge_pair(a: &Arc<Chunk>, b: &Arc<Chunk>) -> Option<Arc<Chunk>> {
    if !a.state.same_content_flags(&b.state) {
        return None;
    }
    let state = a.state.derived();
    match (&a.body, &b.body) {
        (Body::Placeholder { length: x }, Body::Placeholder { length: y }) => Some(Arc::new(
            Chunk::with_state(Body::Placeholder { length: x + y }, state),
        )),
        (Body::Raw { bytes: x }, Body::Raw { bytes: y }) => {
            let mut joined = BytesMut::with_capacity(x.len() + y.len());
            joined.extend_from_slice(x);
            joined.extend_from_slice(y);
            Some(Arc::new(Chunk::with_state(
                Body::Raw {
                    bytes: joined.freeze(),
                },
                state,
            )))
        }
        (
            Body::View {
                base: first_base,
                offset: first_offset,
                length: first_length,
            },
            Body::View {
                base: second_base,
                offset: second_offset,
                length: second_length,
            },
        ) if Arc::ptr_eq(first_base, second_base)
            && first_offset + first_length == *second_offset =>
        {
            tracing::trace!(
                offset = first_offset,
                length = first_length + second_length,
                "merging adjacent views"
            );
            let length = first_length + second_length;
            if a.state.same_content_flags(&first_base.state) {
                Some(first_base.slice_unchecked(*first_offset, length))
            } else {
                Some(Arc::new(Chunk::with_state(
                    Body::View {
                        base: Arc::clone(first_base),
                        offset: *first_offset,
                        length,
                    },
                    state,
                )))
            }
        }
        _ => None,
    }
}
