//! On-wire records of the demo transport.
//!
//! Both headers are #[repr(C, packed)] with zerocopy derives, so the struct
//! is its own network image. Multi-byte fields are big endian.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::network_endian::{U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use chunkwire_core::{Fields, SchemaId};

/// Current wire version. Segments carrying anything else are refused.
pub const WIRE_VERSION: u8 = 0x01;

/// Flag bit: last segment of the stream.
pub const FLAG_FIN: u8 = 0x01;

// ── Segment Header ────────────────────────────────────────────────────────────

/// Precedes every segment payload.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct SegmentHeader {
    /// Stream sequence number of the first payload byte.
    pub seq: U32,

    /// Payload bytes following this header.
    pub payload_len: U16,

    /// Bit flags:
    ///   bit    0: FIN
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,

    pub version: u8,
}

assert_eq_size!(SegmentHeader, [u8; 8]);

impl SegmentHeader {
    pub fn new(seq: u32, payload_len: u16, flags: u8) -> Self {
        Self {
            seq: U32::new(seq),
            payload_len: U16::new(payload_len),
            flags,
            version: WIRE_VERSION,
        }
    }

    pub fn seq(&self) -> u32 {
        self.seq.get()
    }

    pub fn payload_len(&self) -> usize {
        usize::from(self.payload_len.get())
    }

    pub fn is_fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }
}

impl Fields for SegmentHeader {
    const SCHEMA: SchemaId = SchemaId::new("sim.segment");

    fn chunk_length(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

// ── Fragment Header ───────────────────────────────────────────────────────────

/// Precedes every piece of a segment crossing the link.
///
/// Wire size: 12 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FragmentHeader {
    /// Link-assigned id shared by all fragments of one segment.
    pub packet_id: U32,

    /// Offset of this piece inside the segment.
    pub offset: U32,

    /// Length of the whole segment.
    pub total_len: U32,
}

assert_eq_size!(FragmentHeader, [u8; 12]);

impl FragmentHeader {
    pub fn new(packet_id: u32, offset: u32, total_len: u32) -> Self {
        Self {
            packet_id: U32::new(packet_id),
            offset: U32::new(offset),
            total_len: U32::new(total_len),
        }
    }

    pub fn packet_id(&self) -> u32 {
        self.packet_id.get()
    }

    pub fn offset(&self) -> usize {
        self.offset.get() as usize
    }

    pub fn total_len(&self) -> usize {
        self.total_len.get() as usize
    }
}

impl Fields for FragmentHeader {
    const SCHEMA: SchemaId = SchemaId::new("sim.fragment");

    fn chunk_length(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
