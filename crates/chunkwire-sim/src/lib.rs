//! chunkwire-sim — a segmenting stream transport over a lossy, reordering
//! link, built on chunkwire-core packets, queues and buffers.

pub mod link;
pub mod receive_queue;
pub mod send_queue;
pub mod transfer;
pub mod wire;

pub use link::{Defragmenter, Link, LinkStats};
pub use receive_queue::ReceiveQueue;
pub use send_queue::SendQueue;
pub use transfer::TransferReport;

use chunkwire_core::config::SerializationConfig;
use chunkwire_core::{ChunkError, SerializerRegistry};

/// Errors of the demo transport itself. Chunk errors pass through.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("sequence range {from}..{to} is outside the send buffer {begin}..{end}")]
    OutOfWindow { from: u32, to: u32, begin: u32, end: u32 },

    #[error("segment declares {declared} payload bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown segment version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("fragment {offset}+{length} does not fit packet {packet_id} of {total} bytes")]
    InconsistentFragment {
        packet_id: u32,
        offset: usize,
        length: usize,
        total: usize,
    },
}

/// A registry with the transport's wire records registered.
pub fn registry(config: &SerializationConfig) -> Result<SerializerRegistry, ChunkError> {
    let mut registry = SerializerRegistry::from_config(config);
    registry.register_wire::<wire::SegmentHeader>()?;
    registry.register_wire::<wire::FragmentHeader>()?;
    Ok(registry)
}
