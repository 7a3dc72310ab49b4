use std::sync::Arc;

use super::ChunkBuffer;
use crate::chunk::Chunk;
use crate::error::{ChunkError, Result};

/// Collects pieces of a payload whose total length is known up front.
#[derive(Debug, Clone)]
pub struct ReassemblyBuffer {
    buffer: ChunkBuffer,
    expected_length: usize,
}

impl ReassemblyBuffer {
    pub fn new(expected_length: usize) -> Self {
        Self {
            buffer: ChunkBuffer::new(),
            expected_length,
        }
    }

    pub fn expected_length(&self) -> usize {
        self.expected_length
    }

    pub fn set_expected_length(&mut self, expected_length: usize) {
        self.expected_length = expected_length;
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    pub fn replace(&mut self, offset: usize, chunk: Arc<Chunk>) {
        self.buffer.replace(offset, chunk);
    }

    pub fn clear(&mut self, offset: usize, length: usize) {
        self.buffer.clear(offset, length);
    }

    /// One region starting at 0 and exactly `expected_length` long. A zero
    /// expected length never completes.
    pub fn is_complete(&self) -> bool {
        match self.buffer.regions() {
            [only] => {
                self.expected_length > 0
                    && only.start_offset() == 0
                    && only.data().len() == self.expected_length
            }
            _ => false,
        }
    }

    /// Bytes of `[0, expected_length)` not covered yet.
    pub fn missing_length(&self) -> usize {
        let covered: usize = self
            .buffer
            .regions()
            .iter()
            .map(|r| {
                let end = r.end_offset().min(self.expected_length);
                end.saturating_sub(r.start_offset())
            })
            .sum();
        self.expected_length - covered
    }

    pub fn reassembled_data(&self) -> Result<Arc<Chunk>> {
        if !self.is_complete() {
            return Err(ChunkError::IncompleteNotAllowed);
        }
        self.buffer
            .region_data(0)
            .cloned()
            .ok_or(ChunkError::IncompleteNotAllowed)
    }
}
