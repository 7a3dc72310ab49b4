//! Packet: one root chunk plus header and trailer pop cursors.
//!
//! ```text
//!  0            header_pop           trailer_pop          total
//!  |  popped     |        data          |     popped        |
//!  |  headers    |       region         |     trailers      |
//! ```
//!
//! Header operations work forward from `header_pop`, trailer operations
//! backward from `trailer_pop`. `0 <= header_pop <= trailer_pop <= total`
//! holds after every operation.

use std::fmt;
use std::sync::Arc;

use crate::chunk::{concat, Chunk, Peek, PeekFlags};
use crate::error::{ChunkError, Result};
use crate::serializer::SerializerRegistry;

#[derive(Debug, Clone)]
pub struct Packet {
    registry: Arc<SerializerRegistry>,
    content: Arc<Chunk>,
    front_popped: usize,
    back_popped: usize,
}

impl Packet {
    pub fn new(registry: Arc<SerializerRegistry>) -> Self {
        Self::with_content(registry, Chunk::empty().freeze())
    }

    pub fn with_content(registry: Arc<SerializerRegistry>, content: Arc<Chunk>) -> Self {
        Self {
            registry,
            content: Chunk::frozen(content),
            front_popped: 0,
            back_popped: 0,
        }
    }

    pub fn registry(&self) -> &Arc<SerializerRegistry> {
        &self.registry
    }

    pub fn content(&self) -> &Arc<Chunk> {
        &self.content
    }

    pub fn total_length(&self) -> usize {
        self.content.len()
    }

    pub fn data_length(&self) -> usize {
        self.total_length() - self.front_popped - self.back_popped
    }

    pub fn header_pop_offset(&self) -> usize {
        self.front_popped
    }

    pub fn trailer_pop_offset(&self) -> usize {
        self.total_length() - self.back_popped
    }

    pub fn set_header_pop_offset(&mut self, offset: usize) -> Result<()> {
        let limit = self.trailer_pop_offset();
        if offset > limit {
            return Err(ChunkError::BoundsViolation {
                offset,
                length: 0,
                available: limit,
            });
        }
        self.front_popped = offset;
        Ok(())
    }

    pub fn set_trailer_pop_offset(&mut self, offset: usize) -> Result<()> {
        let total = self.total_length();
        if offset < self.front_popped || offset > total {
            return Err(ChunkError::BoundsViolation {
                offset,
                length: 0,
                available: total,
            });
        }
        self.back_popped = total - offset;
        Ok(())
    }

    /// An O(1) copy sharing the root chunk.
    pub fn dup(&self) -> Packet {
        self.clone()
    }

    fn data_region(&self) -> Arc<Chunk> {
        self.content
            .slice_unchecked(self.front_popped, self.data_length())
    }

    // ── Building ──────────────────────────────────────────────────────────────

    /// Prepends `chunk` to the whole packet. No header may be popped yet.
    pub fn push_header(&mut self, chunk: Arc<Chunk>) -> Result<()> {
        if self.front_popped > 0 {
            return Err(ChunkError::PoppedRegion {
                side: "header",
                popped: self.front_popped,
            });
        }
        self.content = concat([Chunk::frozen(chunk), Arc::clone(&self.content)]);
        Ok(())
    }

    /// Appends `chunk` to the whole packet. No trailer may be popped yet.
    pub fn push_trailer(&mut self, chunk: Arc<Chunk>) -> Result<()> {
        if self.back_popped > 0 {
            return Err(ChunkError::PoppedRegion {
                side: "trailer",
                popped: self.back_popped,
            });
        }
        self.content = concat([Arc::clone(&self.content), Chunk::frozen(chunk)]);
        Ok(())
    }

    /// Adds `chunk` at the end of the data region.
    pub fn append(&mut self, chunk: Arc<Chunk>) {
        self.splice_in(self.trailer_pop_offset(), chunk);
    }

    /// Splices `chunk` in at the header cursor; it is the next header.
    pub fn insert_header(&mut self, chunk: Arc<Chunk>) {
        self.splice_in(self.front_popped, chunk);
    }

    /// Splices `chunk` in at the trailer cursor; it is the next trailer.
    pub fn insert_trailer(&mut self, chunk: Arc<Chunk>) {
        self.splice_in(self.trailer_pop_offset(), chunk);
    }

    fn splice_in(&mut self, at: usize, chunk: Arc<Chunk>) {
        let total = self.total_length();
        self.content = concat([
            self.content.slice_unchecked(0, at),
            Chunk::frozen(chunk),
            self.content.slice_unchecked(at, total - at),
        ]);
    }

    fn splice_out(&mut self, at: usize, length: usize) {
        let total = self.total_length();
        let end = at + length;
        self.content = concat([
            self.content.slice_unchecked(0, at),
            self.content.slice_unchecked(end, total - end),
        ]);
    }

    /// Drops popped headers and trailers and resets both cursors.
    pub fn trim(&mut self) {
        self.content = self.data_region();
        self.front_popped = 0;
        self.back_popped = 0;
    }

    // ── Headers ───────────────────────────────────────────────────────────────

    pub fn peek_header(&self, request: Peek) -> Result<Arc<Chunk>> {
        self.data_region().peek(0, request, &self.registry)
    }

    pub fn has_header(&self, request: Peek) -> bool {
        self.peek_header(request).is_ok()
    }

    pub fn pop_header(&mut self, request: Peek) -> Result<Arc<Chunk>> {
        let header = self.peek_header(request)?;
        self.front_popped += header.len();
        Ok(header)
    }

    /// Cuts the next header out of the packet and hands it back mutable,
    /// without copying when nothing else holds it.
    pub fn remove_header(&mut self, request: Peek) -> Result<Arc<Chunk>> {
        let mut header = self.peek_header(request)?;
        self.splice_out(self.front_popped, header.len());
        Chunk::make_mut(&mut header);
        Ok(header)
    }

    // ── Trailers ──────────────────────────────────────────────────────────────

    pub fn peek_trailer(&self, request: Peek) -> Result<Arc<Chunk>> {
        let data = self.data_region();
        data.peek_back(data.len(), request, &self.registry)
    }

    pub fn has_trailer(&self, request: Peek) -> bool {
        self.peek_trailer(request).is_ok()
    }

    pub fn pop_trailer(&mut self, request: Peek) -> Result<Arc<Chunk>> {
        let trailer = self.peek_trailer(request)?;
        self.back_popped += trailer.len();
        Ok(trailer)
    }

    pub fn remove_trailer(&mut self, request: Peek) -> Result<Arc<Chunk>> {
        let mut trailer = self.peek_trailer(request)?;
        self.splice_out(self.trailer_pop_offset() - trailer.len(), trailer.len());
        Chunk::make_mut(&mut trailer);
        Ok(trailer)
    }

    // ── Data ──────────────────────────────────────────────────────────────────

    /// Peeks anywhere in the packet, ignoring the cursors.
    pub fn peek_at(&self, offset: usize, request: Peek) -> Result<Arc<Chunk>> {
        self.content.peek(offset, request, &self.registry)
    }

    /// `length` bytes of the data region starting at `offset`, in their
    /// natural form.
    pub fn peek_data_at(&self, offset: usize, length: usize) -> Result<Arc<Chunk>> {
        self.data_region()
            .peek(offset, Peek::any().length(length), &self.registry)
    }

    /// The data region as one raw chunk.
    pub fn peek_data_bytes(&self) -> Result<Arc<Chunk>> {
        let data = self.data_region();
        data.peek(
            0,
            Peek::raw()
                .length(data.len())
                .flags(PeekFlags::ALLOW_SERIALIZATION),
            &self.registry,
        )
    }

    /// The whole packet, popped parts included, as one raw chunk.
    pub fn peek_all_bytes(&self) -> Result<Arc<Chunk>> {
        self.content.peek(
            0,
            Peek::raw()
                .length(self.total_length())
                .flags(PeekFlags::ALLOW_SERIALIZATION),
            &self.registry,
        )
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet(total = {}, header_pop = {}, trailer_pop = {}, content = {})",
            self.total_length(),
            self.header_pop_offset(),
            self.trailer_pop_offset(),
            self.content
        )
    }
}
