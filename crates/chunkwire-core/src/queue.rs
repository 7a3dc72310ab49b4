//! FIFO of chunks. Pushed chunks are merged at the tail; pops cut from the
//! head in the requested form.

use std::sync::Arc;

use crate::chunk::{concat, Chunk, Peek};
use crate::error::Result;
use crate::serializer::SerializerRegistry;

#[derive(Debug, Clone)]
pub struct ChunkQueue {
    registry: Arc<SerializerRegistry>,
    content: Arc<Chunk>,
    pushed_length: usize,
    popped_length: usize,
}

impl ChunkQueue {
    pub fn new(registry: Arc<SerializerRegistry>) -> Self {
        Self {
            registry,
            content: Chunk::empty().freeze(),
            pushed_length: 0,
            popped_length: 0,
        }
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Bytes pushed over the queue's lifetime.
    pub fn pushed_length(&self) -> usize {
        self.pushed_length
    }

    /// Bytes popped or cleared over the queue's lifetime.
    pub fn popped_length(&self) -> usize {
        self.popped_length
    }

    pub fn push(&mut self, chunk: Arc<Chunk>) {
        self.pushed_length += chunk.len();
        self.content = concat([Arc::clone(&self.content), Chunk::frozen(chunk)]);
    }

    pub fn peek(&self, request: Peek) -> Result<Arc<Chunk>> {
        self.peek_at(0, request)
    }

    /// Peeks `offset` bytes past the head without removing anything.
    pub fn peek_at(&self, offset: usize, request: Peek) -> Result<Arc<Chunk>> {
        self.content.peek(offset, request, &self.registry)
    }

    pub fn has(&self, request: Peek) -> bool {
        self.peek(request).is_ok()
    }

    /// Removes `length` bytes from the head in their natural form.
    pub fn pop(&mut self, length: usize) -> Result<Arc<Chunk>> {
        self.pop_as(Peek::any().length(length))
    }

    /// Removes the head in the requested form.
    pub fn pop_as(&mut self, request: Peek) -> Result<Arc<Chunk>> {
        let chunk = self.peek(request)?;
        let remaining = self.len() - chunk.len();
        self.content = self.content.slice_unchecked(chunk.len(), remaining);
        self.popped_length += chunk.len();
        tracing::trace!(
            length = chunk.len(),
            kind = chunk.kind().name(),
            remaining,
            "popped from chunk queue"
        );
        Ok(chunk)
    }

    /// Drops everything queued; it counts as popped.
    pub fn clear(&mut self) {
        self.popped_length += self.len();
        self.content = Chunk::empty().freeze();
    }
}
