use std::sync::Arc;

use anyhow::{Context, Result};
use chunkwire_core::{AllowNull, Chunk, ChunkError, ChunkKind, Packet, Peek, PeekFlags};

use crate::*;

/// Link framing around a packet keeps the inner chunks as they were.
#[test]
fn encapsulated_chunks_survive_framing() -> Result<()> {
    let registry = registry();
    let mut packet = packet_of(
        &registry,
        &[Chunk::placeholder(10).freeze(), Chunk::raw(counting(10)).freeze()],
    );
    packet.push_header(Chunk::structured(EthernetHeader { ether_type: 0x0800 }).freeze())?;
    packet.push_trailer(Chunk::structured(EthernetTrailer { fcs: 0xdead_beef }).freeze())?;
    assert_eq!(packet.total_length(), 38);

    let header = packet.pop_header(Peek::fields::<EthernetHeader>())?;
    let trailer = packet.pop_trailer(Peek::fields::<EthernetTrailer>())?;
    assert_eq!(header.fields::<EthernetHeader>().context("header")?.ether_type, 0x0800);
    assert_eq!(trailer.fields::<EthernetTrailer>().context("trailer")?.fcs, 0xdead_beef);

    let first = packet.peek_data_at(0, 10)?;
    let second = packet.peek_data_at(10, 10)?;
    assert_eq!(first.kind(), ChunkKind::Placeholder);
    assert_eq!(second.kind(), ChunkKind::Raw);
    assert_eq!(packet.peek_data_bytes()?.len(), 20);
    Ok(())
}

/// Chunks taken from other packets are carried by reference.
#[test]
fn aggregated_packets_keep_their_chunks() -> Result<()> {
    let registry = registry();
    let first = packet_of(&registry, &[Chunk::placeholder(10).freeze()]);
    let second = packet_of(&registry, &[Chunk::raw(counting(10)).freeze()]);

    let mut aggregate = packet_of(&registry, &[ip()]);
    aggregate.append(first.peek_at(0, Peek::any().length(first.total_length()))?);
    aggregate.append(second.peek_at(0, Peek::any().length(second.total_length()))?);

    aggregate.pop_header(Peek::fields::<IpHeader>())?;
    let a = aggregate.peek_data_at(0, 10)?;
    let b = aggregate.peek_data_at(10, 10)?;
    assert_eq!(a.kind(), ChunkKind::Placeholder);
    assert_eq!(b.kind(), ChunkKind::Raw);
    assert_eq!(&b.bytes().context("raw bytes")?[..], &counting(10)[..]);
    assert!(Arc::ptr_eq(&a, first.content()));
    Ok(())
}

/// A fragment straddling two chunks of another packet is split along
/// their boundary.
#[test]
fn fragment_of_another_packet_keeps_boundaries() -> Result<()> {
    let registry = registry();
    let original = packet_of(
        &registry,
        &[Chunk::placeholder(10).freeze(), Chunk::raw(counting(10)).freeze()],
    );
    let mut fragment = packet_of(&registry, &[ip()]);
    fragment.append(original.peek_at(7, Peek::any().length(10))?);
    assert_eq!(fragment.total_length(), 30);

    let header = fragment.pop_header(Peek::fields::<IpHeader>())?;
    assert_eq!(header.fields::<IpHeader>().context("ip")?.protocol, PROTOCOL_TCP);

    let data = fragment.peek_data_at(0, fragment.data_length())?;
    assert_eq!(data.len(), 10);
    let head = data.peek(0, Peek::any().length(3), &registry)?;
    let tail = data.peek(3, Peek::any().length(7), &registry)?;
    assert_eq!((head.kind(), head.len()), (ChunkKind::Placeholder, 3));
    assert_eq!(tail.kind(), ChunkKind::Raw);
    assert_eq!(&tail.bytes().context("raw bytes")?[..], &counting(7)[..]);
    Ok(())
}

/// One record type, several variants, read back both as stored and after
/// a trip through bytes.
#[test]
fn polymorphic_options_with_and_without_serialization() -> Result<()> {
    let registry = registry();
    let mut packet = packet_of(
        &registry,
        &[
            Chunk::structured(Tlv::Bool(true)).freeze(),
            Chunk::structured(Tlv::Int(42)).freeze(),
        ],
    );
    let wire = packet.peek_all_bytes()?;
    assert_eq!(&wire.bytes().context("wire bytes")?[..], &[1, 3, 1, 2, 4, 0, 42]);

    let mut reparsed = Packet::with_content(Arc::clone(&registry), wire);
    for packet in [&mut packet, &mut reparsed] {
        let first = packet.pop_header(Peek::fields::<Tlv>())?;
        assert_eq!(first.len(), 3);
        assert_eq!(first.fields::<Tlv>(), Some(&Tlv::Bool(true)));
        let second = packet.pop_header(Peek::fields::<Tlv>())?;
        assert_eq!(second.len(), 4);
        assert_eq!(second.fields::<Tlv>(), Some(&Tlv::Int(42)));
        assert_eq!(packet.data_length(), 0);
    }
    Ok(())
}

#[test]
fn header_reads_as_fields_and_as_bytes() -> Result<()> {
    let registry = registry();
    let packet = packet_of(&registry, &[app(42)]);
    let as_bytes = Peek::raw()
        .length(10)
        .flags(PeekFlags::ALLOW_SERIALIZATION);

    let fields = packet.peek_header(Peek::fields::<AppHeader>())?;
    let bytes = packet.peek_header(as_bytes)?;
    assert_eq!(fields.len(), 10);
    assert_eq!(bytes.len(), 10);

    let reparsed = Packet::with_content(Arc::clone(&registry), packet.peek_all_bytes()?);
    let fields_again = reparsed.peek_header(Peek::fields::<AppHeader>())?;
    let bytes_again = reparsed.peek_header(Peek::raw().length(10))?;
    assert_eq!(fields_again.fields::<AppHeader>(), fields.fields::<AppHeader>());
    assert_eq!(bytes_again.bytes(), bytes.bytes());
    Ok(())
}

#[test]
fn implicit_conversion_is_refused_by_default() -> Result<()> {
    let registry = registry();
    let header = app(42);
    let mut split = Packet::new(Arc::clone(&registry));
    split.append(header.peek(
        0,
        Peek::raw().length(5).flags(PeekFlags::ALLOW_SERIALIZATION),
        &registry,
    )?);
    split.append(header.slice(5, 5)?);
    let request = Peek::fields::<AppHeader>().length(10);
    assert!(matches!(
        split.peek_header(request),
        Err(ChunkError::ImplicitConversionDisabled(_))
    ));
    let rebuilt = split.peek_header(request.flags(PeekFlags::ALLOW_SERIALIZATION))?;
    assert_eq!(rebuilt.fields::<AppHeader>(), Some(&AppHeader { some_data: 42 }));

    let other = packet_of(&registry, &[ip()]);
    assert!(matches!(
        other.peek_header(Peek::fields::<AppHeader>()),
        Err(ChunkError::ImplicitConversionDisabled("structured"))
    ));
    Ok(())
}

/// Adjacent pieces of one record, or of one byte run, merge back.
#[test]
fn adjacent_pieces_merge_back() -> Result<()> {
    let registry = registry();
    let header = app(42);
    let whole = packet_of(&registry, &[Arc::clone(&header)]);
    let mut halves = Packet::new(Arc::clone(&registry));
    halves.append(whole.peek_at(0, Peek::any().length(5))?);
    halves.append(whole.peek_at(5, Peek::any().length(5))?);
    let merged = halves.peek_header(Peek::any())?;
    assert!(Arc::ptr_eq(&merged, &header));
    assert!(merged.is_complete());

    let placeholders = packet_of(
        &registry,
        &[Chunk::placeholder(5).freeze(), Chunk::placeholder(5).freeze()],
    );
    let joined = placeholders.peek_at(0, Peek::any().length(10))?;
    assert_eq!((joined.kind(), joined.len()), (ChunkKind::Placeholder, 10));

    let runs = packet_of(
        &registry,
        &[Chunk::raw(counting(5)).freeze(), Chunk::raw(counting(5)).freeze()],
    );
    let joined = runs.peek_at(0, Peek::any().length(10))?;
    assert_eq!(joined.kind(), ChunkKind::Raw);
    assert_eq!(&joined.bytes().context("raw")?[..], &[0, 1, 2, 3, 4, 0, 1, 2, 3, 4]);
    assert_eq!(runs.peek_all_bytes()?.bytes(), joined.bytes());
    Ok(())
}

#[test]
fn sequence_slices_take_the_most_specific_form() -> Result<()> {
    let header = app(42);
    let sequence = Chunk::sequence([
        Chunk::placeholder(10).freeze(),
        Chunk::raw(counting(10)).freeze(),
        Arc::clone(&header),
    ])
    .freeze();

    assert_eq!(sequence.slice(0, 10)?.kind(), ChunkKind::Placeholder);
    assert_eq!(sequence.slice(10, 10)?.kind(), ChunkKind::Raw);
    assert!(Arc::ptr_eq(&sequence.slice(20, 10)?, &header));

    assert_eq!(sequence.slice(0, 5)?.kind(), ChunkKind::Placeholder);
    let raw = sequence.slice(15, 5)?;
    assert_eq!(&raw.bytes().context("raw")?[..], &[5, 6, 7, 8, 9]);
    let view = sequence.slice(20, 5)?;
    assert_eq!(view.kind(), ChunkKind::View);
    let (base, offset) = view.view_base().context("view base")?;
    assert!(Arc::ptr_eq(base, &header));
    assert_eq!(offset, 0);

    let spanning = sequence.slice(5, 10)?;
    assert_eq!(spanning.kind(), ChunkKind::Sequence);
    assert_eq!(spanning.children().len(), 2);
    Ok(())
}

#[test]
fn views_of_one_record_rebuild_it_inside_a_sequence() -> Result<()> {
    let registry = registry();
    let header = app(42);
    let sequence = Chunk::sequence([header.slice(0, 5)?, header.slice(5, 5)?]).freeze();
    let found = sequence.peek(0, Peek::fields::<AppHeader>(), &registry)?;
    assert!(Arc::ptr_eq(&found, &header));
    Ok(())
}

#[test]
fn pops_cut_merged_content_in_its_own_kind() -> Result<()> {
    let registry = registry();
    let mut placeholders = packet_of(
        &registry,
        &[
            Chunk::placeholder(10).freeze(),
            Chunk::placeholder(10).freeze(),
            Chunk::placeholder(10).freeze(),
        ],
    );
    for _ in 0..2 {
        let chunk = placeholders.pop_header(Peek::any().length(15))?;
        assert_eq!((chunk.kind(), chunk.len()), (ChunkKind::Placeholder, 15));
    }

    let mut runs = packet_of(
        &registry,
        &[
            Chunk::raw(counting(10)).freeze(),
            Chunk::raw(counting(10)).freeze(),
            Chunk::raw(counting(10)).freeze(),
        ],
    );
    let first = runs.pop_header(Peek::any().length(15))?;
    let second = runs.pop_header(Peek::any().length(15))?;
    assert_eq!(&first.bytes().context("raw")?[10..], &[0, 1, 2, 3, 4]);
    assert_eq!(&second.bytes().context("raw")?[..5], &[5, 6, 7, 8, 9]);
    Ok(())
}

/// Chunks are cloned, possibly marked incorrect, and re-packed. The marks
/// travel with the chunks and readers must opt in to see them.
#[test]
fn bit_errors_mark_chunks_incorrect() -> Result<()> {
    const BIT_ERROR_RATE: f64 = 1e-2;
    let draws = [0.1, 0.7, 0.9];

    let registry = registry();
    let mut received = packet_of(
        &registry,
        &[Chunk::placeholder(10).freeze(), Chunk::raw(counting(10)).freeze(), app(42)],
    );
    let mut corrupted = Packet::new(Arc::clone(&registry));
    let mut index = 0;
    while let Some(chunk) = received.pop_header(Peek::any()).allow_null()? {
        let mut clone = chunk.dup();
        let bits = i32::try_from(chunk.len() * 8)?;
        if draws[index] >= (1.0 - BIT_ERROR_RATE).powi(bits) {
            clone.mark_incorrect();
        }
        corrupted.append(clone.freeze());
        index += 1;
    }
    assert_eq!(index, 3);

    let tolerant = Peek::any().flags(PeekFlags::ALLOW_INCORRECT);
    assert!(corrupted.pop_header(tolerant)?.is_correct());
    assert_eq!(
        corrupted.peek_header(Peek::any()).unwrap_err(),
        ChunkError::IncorrectNotAllowed
    );
    assert!(corrupted.pop_header(tolerant)?.is_incorrect());
    assert!(corrupted.pop_header(tolerant)?.is_incorrect());
    Ok(())
}

#[test]
fn duplicated_packet_shares_its_chunks() {
    let registry = registry();
    let chunk = Chunk::placeholder(10).freeze();
    let packet = packet_of(&registry, &[Arc::clone(&chunk)]);
    let copy = packet.dup();
    assert_eq!(copy.total_length(), 10);
    assert_eq!(Arc::strong_count(&chunk), 3);
}

#[test]
fn iteration_from_both_ends() -> Result<()> {
    let registry = registry();
    let chunks = [Chunk::placeholder(10).freeze(), Chunk::raw(counting(10)).freeze(), app(42)];

    let mut forward = packet_of(&registry, &chunks);
    let mut kinds = Vec::new();
    while let Some(chunk) = forward.pop_header(Peek::any()).allow_null()? {
        kinds.push(chunk.kind());
    }
    assert_eq!(kinds, [ChunkKind::Placeholder, ChunkKind::Raw, ChunkKind::Structured]);

    let mut backward = packet_of(&registry, &chunks);
    let mut kinds = Vec::new();
    while let Some(chunk) = backward.pop_trailer(Peek::any()).allow_null()? {
        kinds.push(chunk.kind());
    }
    assert_eq!(kinds, [ChunkKind::Structured, ChunkKind::Raw, ChunkKind::Placeholder]);
    Ok(())
}

/// A removed header is edited and put back; the packet re-serializes with
/// the new value.
#[test]
fn removed_header_is_edited_and_reinserted() -> Result<()> {
    let registry = registry();
    let mut packet = packet_of(&registry, &[ip(), Chunk::raw(counting(4)).freeze()]);

    let mut header = packet.remove_header(Peek::fields::<IpHeader>())?;
    assert_eq!(packet.total_length(), 4);
    Chunk::make_mut(&mut header).fields_mut::<IpHeader>()?.protocol = 17;
    packet.insert_header(header);

    let bytes = packet.peek_all_bytes()?;
    let bytes = bytes.bytes().context("wire bytes")?;
    assert_eq!(bytes.len(), 24);
    assert_eq!(bytes[9], 17);
    assert_eq!(&bytes[20..], &counting(4)[..]);
    Ok(())
}

#[test]
fn headers_cannot_be_pushed_after_a_pop() -> Result<()> {
    let registry = registry();
    let mut packet = packet_of(&registry, &[ip(), Chunk::placeholder(8).freeze()]);
    packet.pop_header(Peek::fields::<IpHeader>())?;
    assert!(matches!(
        packet.push_header(ip()),
        Err(ChunkError::PoppedRegion { side: "header", popped: 20 })
    ));
    packet.trim();
    packet.push_header(ip())?;
    assert_eq!(packet.total_length(), 28);
    Ok(())
}
