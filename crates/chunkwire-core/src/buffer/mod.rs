//! Sparse byte-addressed buffers built from chunks.
//!
//! [`ChunkBuffer`] keeps disjoint regions sorted by offset. Regions that end
//! up byte-adjacent are merged with the chunk merge rules, so two regions
//! always have a gap between them.

mod reassembly;
mod reorder;

pub use reassembly::ReassemblyBuffer;
pub use reorder::ReorderBuffer;

use std::sync::Arc;

use crate::chunk::{concat, Chunk};

/// One contiguous run of data.
#[derive(Debug, Clone)]
pub struct Region {
    offset: usize,
    data: Arc<Chunk>,
}

impl Region {
    pub fn start_offset(&self) -> usize {
        self.offset
    }

    pub fn end_offset(&self) -> usize {
        self.offset + self.data.len()
    }

    pub fn data(&self) -> &Arc<Chunk> {
        &self.data
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChunkBuffer {
    regions: Vec<Region>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region_start_offset(&self, index: usize) -> Option<usize> {
        self.regions.get(index).map(Region::start_offset)
    }

    pub fn region_data(&self, index: usize) -> Option<&Arc<Chunk>> {
        self.regions.get(index).map(Region::data)
    }

    /// Writes `chunk` at `offset`. Whatever was stored in that range is
    /// dropped; neighbours are truncated or split around it. Offsets end at
    /// `usize::MAX`; anything past it is cut off.
    pub fn replace(&mut self, offset: usize, chunk: Arc<Chunk>) {
        let room = usize::MAX - offset;
        if chunk.is_empty() || room == 0 {
            return;
        }
        let mut data = Chunk::frozen(chunk);
        if data.len() > room {
            tracing::warn!(offset, length = data.len(), "write runs past the offset space");
            data = data.slice_unchecked(0, room);
        }
        self.clear(offset, data.len());
        let index = self.regions.partition_point(|r| r.offset < offset);
        tracing::trace!(offset, length = data.len(), index, "replacing buffer range");
        self.regions.insert(index, Region { offset, data });
        self.merge_with_next(index);
        if index > 0 {
            self.merge_with_next(index - 1);
        }
    }

    /// Removes `[offset, offset + length)`. Regions inside it are dropped,
    /// regions crossing its ends are cut.
    pub fn clear(&mut self, offset: usize, length: usize) {
        if length == 0 {
            return;
        }
        let end = offset.saturating_add(length);
        let mut kept = Vec::with_capacity(self.regions.len() + 1);
        for region in self.regions.drain(..) {
            let (start, stop) = (region.start_offset(), region.end_offset());
            if stop <= offset || start >= end {
                kept.push(region);
                continue;
            }
            if start < offset {
                kept.push(Region {
                    offset: start,
                    data: region.data.slice_unchecked(0, offset - start),
                });
            }
            if stop > end {
                kept.push(Region {
                    offset: end,
                    data: region.data.slice_unchecked(end - start, stop - end),
                });
            }
        }
        self.regions = kept;
    }

    /// Merges region `index` with its successor when they touch.
    fn merge_with_next(&mut self, index: usize) {
        let touching = match (self.regions.get(index), self.regions.get(index + 1)) {
            (Some(left), Some(right)) => left.end_offset() == right.offset,
            _ => false,
        };
        if touching {
            let right = self.regions.remove(index + 1);
            let left = &mut self.regions[index];
            left.data = concat([Arc::clone(&left.data), right.data]);
            tracing::trace!(
                offset = left.offset,
                length = left.data.len(),
                kind = left.data.kind().name(),
                "merged adjacent regions"
            );
        }
    }
}
