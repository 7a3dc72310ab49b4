//! Receiver side: segments in, in-order stream data out.

use std::sync::Arc;

use chunkwire_core::{Chunk, ChunkError, Packet, Peek, ReorderBuffer};

use crate::wire::{SegmentHeader, WIRE_VERSION};
use crate::SimError;

#[derive(Debug)]
pub struct ReceiveQueue {
    initial_seq: u32,
    buffer: ReorderBuffer,
    duplicate_bytes: usize,
    delivered_bytes: usize,
    fin_seq: Option<u32>,
}

impl ReceiveQueue {
    pub fn new(initial_seq: u32) -> Self {
        Self {
            initial_seq,
            buffer: ReorderBuffer::new(0),
            duplicate_bytes: 0,
            delivered_bytes: 0,
            fin_seq: None,
        }
    }

    /// Next sequence number expected in order.
    pub fn rcv_nxt(&self) -> u32 {
        self.initial_seq
            .saturating_add(u32::try_from(self.buffer.expected_offset()).unwrap_or(u32::MAX))
    }

    /// Payload bytes received again after they were already delivered.
    pub fn duplicate_bytes(&self) -> usize {
        self.duplicate_bytes
    }

    pub fn delivered_bytes(&self) -> usize {
        self.delivered_bytes
    }

    /// True once everything up to the FIN segment has been delivered.
    pub fn is_finished(&self) -> bool {
        self.fin_seq.is_some_and(|end| self.rcv_nxt() == end)
    }

    /// Pops the segment header and buffers the payload. Returns the new
    /// `rcv_nxt`.
    pub fn insert_segment(&mut self, mut segment: Packet) -> Result<u32, SimError> {
        let header = segment.pop_header(Peek::fields::<SegmentHeader>())?;
        let fields = *header
            .fields::<SegmentHeader>()
            .ok_or(ChunkError::WrongShape {
                expected: "sim.segment",
                actual: header.kind().name(),
            })?;
        if fields.version != WIRE_VERSION {
            return Err(SimError::UnknownVersion(fields.version));
        }
        let declared = fields.payload_len();
        if segment.data_length() != declared {
            return Err(SimError::LengthMismatch {
                declared,
                actual: segment.data_length(),
            });
        }
        let seq = fields.seq();
        let end_seq = seq.checked_add(declared as u32);
        let Some(end_seq) = end_seq.filter(|_| seq >= self.initial_seq) else {
            return Err(SimError::OutOfWindow {
                from: seq,
                to: seq.saturating_add(declared as u32),
                begin: self.initial_seq,
                end: self.rcv_nxt(),
            });
        };
        if fields.is_fin() {
            self.fin_seq = Some(end_seq);
        }
        if declared == 0 {
            return Ok(self.rcv_nxt());
        }

        let offset = (seq - self.initial_seq) as usize;
        let expected = self.buffer.expected_offset();
        let stale = expected.saturating_sub(offset).min(declared);
        if stale > 0 {
            self.duplicate_bytes += stale;
            tracing::debug!(seq, stale, "segment repeats delivered data");
        }
        let payload = segment.peek_data_at(0, declared)?;
        self.buffer.replace(offset, payload);
        Ok(self.rcv_nxt())
    }

    /// Removes the next run of in-order data, if any.
    pub fn extract_available(&mut self) -> Option<Arc<Chunk>> {
        let data = self.buffer.pop_available_data()?;
        self.delivered_bytes += data.len();
        Some(data)
    }
}
