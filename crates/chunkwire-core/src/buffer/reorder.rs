use std::sync::Arc;

use super::ChunkBuffer;
use crate::chunk::Chunk;
use crate::error::{ChunkError, Result};

/// Releases stream data in order, starting at a moving expected offset.
#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    buffer: ChunkBuffer,
    expected_offset: usize,
}

impl ReorderBuffer {
    pub fn new(expected_offset: usize) -> Self {
        Self {
            buffer: ChunkBuffer::new(),
            expected_offset,
        }
    }

    pub fn expected_offset(&self) -> usize {
        self.expected_offset
    }

    /// Skips ahead to `offset`, dropping anything buffered before it.
    pub fn set_expected_offset(&mut self, offset: usize) -> Result<()> {
        if offset < self.expected_offset {
            return Err(ChunkError::BoundsViolation {
                offset,
                length: 0,
                available: self.expected_offset,
            });
        }
        self.buffer
            .clear(self.expected_offset, offset - self.expected_offset);
        self.expected_offset = offset;
        Ok(())
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    /// Buffers `chunk` at stream offset `offset`. The part before the
    /// expected offset was delivered already and is dropped.
    pub fn replace(&mut self, offset: usize, chunk: Arc<Chunk>) {
        let end = offset.saturating_add(chunk.len());
        if end <= self.expected_offset {
            tracing::trace!(offset, length = chunk.len(), "ignoring already delivered data");
            return;
        }
        if offset < self.expected_offset {
            let skip = self.expected_offset - offset;
            let fresh = chunk.slice_unchecked(skip, end - self.expected_offset);
            self.buffer.replace(self.expected_offset, fresh);
        } else {
            self.buffer.replace(offset, chunk);
        }
    }

    /// Length of the contiguous data at the expected offset.
    pub fn available_data_length(&self) -> usize {
        match self.buffer.regions().first() {
            Some(first) if first.start_offset() == self.expected_offset => first.data().len(),
            _ => 0,
        }
    }

    /// Removes the contiguous data at the expected offset and moves past it.
    pub fn pop_available_data(&mut self) -> Option<Arc<Chunk>> {
        let first = self.buffer.regions().first()?;
        if first.start_offset() != self.expected_offset {
            return None;
        }
        let data = Arc::clone(first.data());
        self.buffer.clear(self.expected_offset, data.len());
        self.expected_offset += data.len();
        Some(data)
    }
}
