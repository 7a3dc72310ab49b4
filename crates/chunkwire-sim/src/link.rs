//! A point-to-point link that fragments, reorders and duplicates packets,
//! and the receiver-side defragmenter.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use chunkwire_core::config::TransferConfig;
use chunkwire_core::{Chunk, ChunkError, Packet, Peek, ReassemblyBuffer, SerializerRegistry};

use crate::wire::FragmentHeader;
use crate::SimError;

/// Running totals of link activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub packets_sent: u64,
    pub fragments_sent: u64,
    pub duplicated_fragments: u64,
    pub bytes_on_wire: u64,
}

#[derive(Debug)]
pub struct Link {
    registry: Arc<SerializerRegistry>,
    fragment_bytes: usize,
    reorder_window: usize,
    duplicate_percent: u8,
    serialize_on_wire: bool,
    rng: StdRng,
    next_packet_id: u32,
    in_flight: VecDeque<Packet>,
    stats: LinkStats,
}

impl Link {
    pub fn new(config: &TransferConfig, registry: Arc<SerializerRegistry>) -> Self {
        Self {
            registry,
            fragment_bytes: config.fragment_bytes.max(1),
            reorder_window: config.reorder_window.max(1),
            duplicate_percent: config.duplicate_percent.min(100),
            serialize_on_wire: config.serialize_on_wire,
            rng: StdRng::seed_from_u64(config.seed),
            next_packet_id: 0,
            in_flight: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Fragments waiting for delivery.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Cuts `packet` into fragments and puts them on the wire. Fragments
    /// carry structured chunks as they are unless the link serializes.
    pub fn send(&mut self, packet: &Packet) -> Result<(), SimError> {
        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);

        let content = if self.serialize_on_wire {
            packet.peek_all_bytes()?
        } else {
            Arc::clone(packet.content())
        };
        let total = content.len();
        let mut offset = 0;
        while offset < total {
            let length = self.fragment_bytes.min(total - offset);
            let piece = content.slice(offset, length)?;
            let mut fragment = Packet::with_content(Arc::clone(&self.registry), piece);
            let header = FragmentHeader::new(packet_id, offset as u32, total as u32);
            fragment.push_header(Chunk::structured(header).freeze())?;
            if self.serialize_on_wire {
                let bytes = fragment.peek_all_bytes()?;
                fragment = Packet::with_content(Arc::clone(&self.registry), bytes);
            }
            self.put_on_wire(fragment);
            offset += length;
        }
        self.stats.packets_sent += 1;
        tracing::trace!(packet_id, total, "packet sent");
        Ok(())
    }

    fn put_on_wire(&mut self, fragment: Packet) {
        self.stats.fragments_sent += 1;
        self.stats.bytes_on_wire += fragment.total_length() as u64;
        if self.rng.gen_range(0..100u8) < self.duplicate_percent {
            self.stats.duplicated_fragments += 1;
            self.stats.bytes_on_wire += fragment.total_length() as u64;
            self.in_flight.push_back(fragment.dup());
        }
        self.in_flight.push_back(fragment);
    }

    /// Delivers one fragment, picked at random among the oldest
    /// `reorder_window` in flight.
    pub fn receive(&mut self) -> Option<Packet> {
        if self.in_flight.is_empty() {
            return None;
        }
        let window = self.reorder_window.min(self.in_flight.len());
        let index = self.rng.gen_range(0..window);
        self.in_flight.remove(index)
    }
}

/// Completed packet ids remembered so that late duplicates are recognised.
pub const COMPLETED_WINDOW: usize = 1024;

/// Packets reassembled at once. Starting another drops the oldest.
pub const MAX_PENDING: usize = 64;

#[derive(Debug)]
struct PendingPacket {
    buffer: ReassemblyBuffer,
    started: u64,
}

/// Collects fragments per packet id until each packet is whole.
#[derive(Debug)]
pub struct Defragmenter {
    registry: Arc<SerializerRegistry>,
    pending: HashMap<u32, PendingPacket>,
    completed: HashSet<u32>,
    completed_order: VecDeque<u32>,
    completed_window: usize,
    max_pending: usize,
    packets_started: u64,
    late_fragments: u64,
    dropped_packets: u64,
}

impl Defragmenter {
    pub fn new(registry: Arc<SerializerRegistry>) -> Self {
        Self::with_limits(registry, COMPLETED_WINDOW, MAX_PENDING)
    }

    pub fn with_limits(
        registry: Arc<SerializerRegistry>,
        completed_window: usize,
        max_pending: usize,
    ) -> Self {
        Self {
            registry,
            pending: HashMap::new(),
            completed: HashSet::new(),
            completed_order: VecDeque::new(),
            completed_window: completed_window.max(1),
            max_pending: max_pending.max(1),
            packets_started: 0,
            late_fragments: 0,
            dropped_packets: 0,
        }
    }

    /// Packets still missing fragments.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Completed packet ids currently remembered.
    pub fn remembered(&self) -> usize {
        self.completed.len()
    }

    /// Fragments that arrived after their packet was already complete.
    pub fn late_fragments(&self) -> u64 {
        self.late_fragments
    }

    /// Partial packets given up on, either evicted for newer ones or
    /// discarded after an inconsistent fragment.
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    /// Takes one fragment; returns the packet it completes, if any.
    ///
    /// A fragment that does not fit the packet length it declares, or that
    /// disagrees with earlier fragments about that length, discards the
    /// partial packet and fails with [`SimError::InconsistentFragment`].
    pub fn insert_fragment(&mut self, mut fragment: Packet) -> Result<Option<Packet>, SimError> {
        let header = fragment.pop_header(Peek::fields::<FragmentHeader>())?;
        let fields = *header
            .fields::<FragmentHeader>()
            .ok_or(ChunkError::WrongShape {
                expected: "sim.fragment",
                actual: header.kind().name(),
            })?;
        let packet_id = fields.packet_id();
        if self.completed.contains(&packet_id) {
            self.late_fragments += 1;
            tracing::trace!(packet_id, "fragment of a completed packet dropped");
            return Ok(None);
        }

        let (offset, length, total) = (fields.offset(), fragment.data_length(), fields.total_len());
        let fits = length > 0 && offset.checked_add(length).is_some_and(|end| end <= total);
        let agrees = self
            .pending
            .get(&packet_id)
            .map_or(true, |p| p.buffer.expected_length() == total);
        if !fits || !agrees {
            if self.pending.remove(&packet_id).is_some() {
                self.dropped_packets += 1;
            }
            tracing::debug!(packet_id, offset, length, total, "inconsistent fragment");
            return Err(SimError::InconsistentFragment {
                packet_id,
                offset,
                length,
                total,
            });
        }

        if !self.pending.contains_key(&packet_id) && self.pending.len() >= self.max_pending {
            self.evict_oldest();
        }
        let data = fragment.peek_data_at(0, length)?;
        let entry = match self.pending.entry(packet_id) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                self.packets_started += 1;
                slot.insert(PendingPacket {
                    buffer: ReassemblyBuffer::new(total),
                    started: self.packets_started,
                })
            }
        };
        entry.buffer.replace(offset, data);
        if !entry.buffer.is_complete() {
            return Ok(None);
        }

        let content = entry.buffer.reassembled_data()?;
        self.pending.remove(&packet_id);
        self.remember_completed(packet_id);
        tracing::trace!(packet_id, length = content.len(), "packet reassembled");
        Ok(Some(Packet::with_content(Arc::clone(&self.registry), content)))
    }

    fn remember_completed(&mut self, packet_id: u32) {
        self.completed.insert(packet_id);
        self.completed_order.push_back(packet_id);
        while self.completed_order.len() > self.completed_window {
            if let Some(oldest) = self.completed_order.pop_front() {
                self.completed.remove(&oldest);
            }
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, p)| p.started)
            .map(|(id, _)| *id);
        if let Some(packet_id) = oldest {
            self.pending.remove(&packet_id);
            self.dropped_packets += 1;
            tracing::debug!(packet_id, "partial packet evicted");
        }
    }
}
