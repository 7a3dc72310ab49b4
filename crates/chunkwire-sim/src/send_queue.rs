//! Sender side: application data waiting to be segmented and acknowledged.

use std::sync::Arc;

use chunkwire_core::{Chunk, ChunkQueue, Packet, Peek, SerializerRegistry};

use crate::wire::SegmentHeader;
use crate::SimError;

/// Holds stream bytes from the oldest unacknowledged sequence number to the
/// end of what the application has written.
#[derive(Debug)]
pub struct SendQueue {
    registry: Arc<SerializerRegistry>,
    queue: ChunkQueue,
    begin_seq: u32,
}

impl SendQueue {
    pub fn new(registry: Arc<SerializerRegistry>, initial_seq: u32) -> Self {
        Self {
            queue: ChunkQueue::new(Arc::clone(&registry)),
            registry,
            begin_seq: initial_seq,
        }
    }

    pub fn buffer_start_seq(&self) -> u32 {
        self.begin_seq
    }

    pub fn buffer_end_seq(&self) -> u32 {
        self.begin_seq
            .saturating_add(u32::try_from(self.queue.len()).unwrap_or(u32::MAX))
    }

    /// Bytes written but not yet acknowledged.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn enqueue(&mut self, data: Arc<Chunk>) {
        tracing::trace!(length = data.len(), end_seq = self.buffer_end_seq(), "enqueue app data");
        self.queue.push(data);
    }

    /// Builds a segment carrying `[from_seq, from_seq + length)`. The payload
    /// shares the queued chunks; nothing is copied.
    pub fn create_segment(&self, from_seq: u32, length: u16, flags: u8) -> Result<Packet, SimError> {
        let to_seq = from_seq.checked_add(u32::from(length)).filter(|&to| {
            from_seq >= self.begin_seq && to <= self.buffer_end_seq() && length > 0
        });
        let Some(to_seq) = to_seq else {
            return Err(SimError::OutOfWindow {
                from: from_seq,
                to: from_seq.saturating_add(u32::from(length)),
                begin: self.begin_seq,
                end: self.buffer_end_seq(),
            });
        };
        let offset = (from_seq - self.begin_seq) as usize;
        let payload = self
            .queue
            .peek_at(offset, Peek::any().length(usize::from(length)))?;

        let mut segment = Packet::new(Arc::clone(&self.registry));
        segment.append(payload);
        segment.push_header(Chunk::structured(SegmentHeader::new(from_seq, length, flags)).freeze())?;
        tracing::trace!(from_seq, to_seq, "created segment");
        Ok(segment)
    }

    /// Drops acknowledged data before `seq`.
    pub fn discard_up_to(&mut self, seq: u32) -> Result<(), SimError> {
        if seq < self.begin_seq || seq > self.buffer_end_seq() {
            return Err(SimError::OutOfWindow {
                from: self.begin_seq,
                to: seq,
                begin: self.begin_seq,
                end: self.buffer_end_seq(),
            });
        }
        let length = (seq - self.begin_seq) as usize;
        if length > 0 {
            self.queue.pop(length)?;
            self.begin_seq = seq;
        }
        Ok(())
    }
}
