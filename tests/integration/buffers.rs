use std::sync::Arc;

use anyhow::{Context, Result};
use chunkwire_core::{
    Chunk, ChunkBuffer, ChunkKind, ChunkQueue, Packet, Peek, ReassemblyBuffer, ReorderBuffer,
};

use crate::*;

// ── Queue ─────────────────────────────────────────────────────────────────────

#[test]
fn queue_pops_in_the_pushed_kind() -> Result<()> {
    let registry = registry();

    let mut placeholders = ChunkQueue::new(Arc::clone(&registry));
    let ten = Chunk::placeholder(10).freeze();
    for _ in 0..3 {
        placeholders.push(Arc::clone(&ten));
    }
    for _ in 0..2 {
        assert_eq!(placeholders.pop(15)?.kind(), ChunkKind::Placeholder);
    }
    assert!(placeholders.is_empty());

    let mut runs = ChunkQueue::new(Arc::clone(&registry));
    let bytes = Chunk::raw(counting(10)).freeze();
    for _ in 0..3 {
        runs.push(Arc::clone(&bytes));
    }
    for _ in 0..2 {
        assert_eq!(runs.pop(15)?.kind(), ChunkKind::Raw);
    }
    assert_eq!(runs.pushed_length(), 30);
    assert_eq!(runs.popped_length(), 30);
    Ok(())
}

#[test]
fn queue_reassembles_a_header_pushed_in_halves() -> Result<()> {
    let registry = registry();
    let header = app(42);
    let mut queue = ChunkQueue::new(Arc::clone(&registry));
    queue.push(header.slice(0, 5)?);
    assert!(!queue.has(Peek::fields::<AppHeader>()));
    queue.push(header.slice(5, 5)?);
    assert!(queue.has(Peek::fields::<AppHeader>()));

    let popped = queue.pop_as(Peek::fields::<AppHeader>())?;
    assert_eq!(popped.fields::<AppHeader>().context("app")?.some_data, 42);
    assert!(queue.is_empty());
    Ok(())
}

// ── Sparse buffers ────────────────────────────────────────────────────────────

#[test]
fn chunk_buffer_overwrites_and_merges() {
    let mut buffer = ChunkBuffer::new();
    buffer.replace(0, Chunk::raw(vec![1u8; 10]).freeze());
    buffer.replace(20, Chunk::raw(vec![3u8; 10]).freeze());
    assert_eq!(buffer.num_regions(), 2);

    buffer.replace(5, Chunk::raw(vec![2u8; 15]).freeze());
    assert_eq!(buffer.num_regions(), 1);
    let data = buffer.region_data(0).unwrap();
    assert_eq!(data.kind(), ChunkKind::Raw);
    let bytes = data.bytes().unwrap();
    assert_eq!(bytes.len(), 30);
    assert_eq!((bytes[4], bytes[5], bytes[19], bytes[20]), (1, 2, 2, 3));
}

/// An IP packet cut into three fragments and reassembled in reverse
/// order comes back with the header record itself.
#[test]
fn reassembly_in_reverse_order_restores_the_header() -> Result<()> {
    let registry = registry();
    let header = ip();
    let original = packet_of(&registry, &[Arc::clone(&header), Chunk::raw(counting(20)).freeze()]);
    let content = original.content();

    let mut buffer = ReassemblyBuffer::new(original.total_length());
    for (offset, length) in [(20, 20), (10, 10), (0, 10)] {
        assert!(!buffer.is_complete());
        buffer.replace(offset, content.slice(offset, length)?);
    }
    assert!(buffer.is_complete());
    assert_eq!(buffer.missing_length(), 0);

    let mut rebuilt = Packet::with_content(Arc::clone(&registry), buffer.reassembled_data()?);
    let popped = rebuilt.pop_header(Peek::fields::<IpHeader>())?;
    assert!(Arc::ptr_eq(&popped, &header));
    assert_eq!(rebuilt.peek_data_bytes()?.bytes().context("payload")?[..], counting(20)[..]);
    Ok(())
}

/// Fragments that travelled as bytes reassemble into one byte run, and the
/// header is parsed from it.
#[test]
fn reassembly_of_serialized_fragments() -> Result<()> {
    let registry = registry();
    let original = packet_of(&registry, &[ip(), Chunk::raw(counting(20)).freeze()]);
    let wire = original.peek_all_bytes()?;

    let mut buffer = ReassemblyBuffer::new(wire.len());
    buffer.replace(16, wire.slice(16, 24)?);
    assert_eq!(buffer.missing_length(), 16);
    buffer.replace(0, wire.slice(0, 16)?);

    let data = buffer.reassembled_data()?;
    assert_eq!(data.kind(), ChunkKind::Raw);
    let mut rebuilt = Packet::with_content(Arc::clone(&registry), data);
    let popped = rebuilt.pop_header(Peek::fields::<IpHeader>())?;
    assert_eq!(popped.fields::<IpHeader>().context("ip")?.protocol, PROTOCOL_TCP);
    assert_eq!(rebuilt.data_length(), 20);
    assert_eq!(registry.stats().deserialize_calls(), 1);
    Ok(())
}

#[test]
fn reorder_buffer_releases_a_mixed_stream_in_order() -> Result<()> {
    let stream = Chunk::sequence([
        Chunk::placeholder(12).freeze(),
        Chunk::raw(counting(12)).freeze(),
        Chunk::placeholder(12).freeze(),
    ])
    .freeze();

    let mut buffer = ReorderBuffer::new(1000);
    buffer.replace(1024, stream.slice(24, 12)?);
    buffer.replace(1006, stream.slice(6, 12)?);
    assert_eq!(buffer.available_data_length(), 0);
    assert!(buffer.pop_available_data().is_none());

    buffer.replace(1000, stream.slice(0, 6)?);
    let head = buffer.pop_available_data().context("head")?;
    assert_eq!(head.len(), 18);
    assert_eq!(buffer.expected_offset(), 1018);

    // Overlaps the delivered part; only the tail is kept.
    buffer.replace(1012, stream.slice(12, 12)?);
    let rest = buffer.pop_available_data().context("rest")?;
    assert_eq!(rest.len(), 18);
    assert_eq!(buffer.expected_offset(), 1036);
    let kinds: Vec<_> = rest.children().iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, [ChunkKind::Raw, ChunkKind::Placeholder]);
    assert!(buffer.buffer().is_empty());
    Ok(())
}
