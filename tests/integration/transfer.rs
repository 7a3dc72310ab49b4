use std::sync::Arc;

use anyhow::{Context, Result};
use chunkwire_core::config::{SerializationConfig, TransferConfig};
use chunkwire_core::{Chunk, ChunkwireConfig, Packet, SerializerRegistry};
use chunkwire_sim::transfer::{self, INITIAL_SEQ};
use chunkwire_sim::wire::FLAG_FIN;
use chunkwire_sim::{ReceiveQueue, SendQueue, SimError};

fn sim_registry() -> Result<Arc<SerializerRegistry>> {
    let registry =
        chunkwire_sim::registry(&SerializationConfig::default()).context("register wire records")?;
    Ok(Arc::new(registry))
}

fn config(seed: u64, serialize_on_wire: bool) -> TransferConfig {
    TransferConfig {
        seed,
        message_bytes: 20_000,
        segment_bytes: 1000,
        fragment_bytes: 300,
        reorder_window: 6,
        duplicate_percent: 10,
        serialize_on_wire,
        placeholder_payload: false,
    }
}

#[test]
fn transfers_arrive_intact_across_seeds() -> Result<()> {
    for seed in [1, 7, 42, 0x00c0_ffee] {
        for serialize_on_wire in [false, true] {
            let report = transfer::run(&config(seed, serialize_on_wire), sim_registry()?)
                .with_context(|| format!("seed {seed}, serialize_on_wire {serialize_on_wire}"))?;
            assert!(report.verified(), "seed {seed} delivered a different stream");
            assert_eq!(report.segments_sent, 20);
            assert!(report.link.fragments_sent >= 80);
        }
    }
    Ok(())
}

#[test]
fn in_order_link_without_duplicates_sees_no_stale_data() -> Result<()> {
    let mut config = config(3, true);
    config.reorder_window = 1;
    config.duplicate_percent = 0;
    let report = transfer::run(&config, sim_registry()?)?;
    assert!(report.verified());
    assert_eq!(report.duplicate_bytes, 0);
    assert_eq!(report.late_fragments, 0);
    assert_eq!(report.link.duplicated_fragments, 0);
    Ok(())
}

#[test]
fn every_fragment_duplicated_still_verifies() -> Result<()> {
    let mut config = config(9, false);
    config.duplicate_percent = 100;
    let report = transfer::run(&config, sim_registry()?)?;
    assert!(report.verified());
    assert_eq!(report.link.duplicated_fragments, report.link.fragments_sent);
    assert!(report.late_fragments > 0);
    Ok(())
}

#[test]
fn corrupted_version_byte_is_rejected() -> Result<()> {
    let registry = sim_registry()?;
    let mut send = SendQueue::new(Arc::clone(&registry), INITIAL_SEQ);
    send.enqueue(Chunk::raw(vec![0xabu8; 32]).freeze());
    let segment = send.create_segment(INITIAL_SEQ, 32, FLAG_FIN)?;

    let wire = segment.peek_all_bytes()?;
    let mut bytes = wire.bytes().context("wire bytes")?.to_vec();
    bytes[7] = 0x7f;
    let damaged = Packet::with_content(Arc::clone(&registry), Chunk::raw(bytes).freeze());

    let mut receive = ReceiveQueue::new(INITIAL_SEQ);
    assert!(matches!(
        receive.insert_segment(damaged),
        Err(SimError::UnknownVersion(0x7f))
    ));
    assert!(receive.extract_available().is_none());
    Ok(())
}

#[test]
fn default_config_file_round_trips() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("chunkwire-it-{}", std::process::id()));
    let path = dir.join("config.toml");
    ChunkwireConfig::write_default_if_missing(&path)?;
    let loaded = ChunkwireConfig::from_file(&path)?;
    std::fs::remove_dir_all(&dir)?;

    let defaults = TransferConfig::default();
    assert!(!loaded.serialization.implicit);
    assert_eq!(loaded.transfer.seed, defaults.seed);
    assert_eq!(loaded.transfer.segment_bytes, defaults.segment_bytes);
    assert_eq!(loaded.transfer.fragment_bytes, defaults.fragment_bytes);
    assert_eq!(loaded.transfer.serialize_on_wire, defaults.serialize_on_wire);

    let report = transfer::run(&loaded.transfer, sim_registry()?)?;
    assert!(report.verified());
    Ok(())
}
