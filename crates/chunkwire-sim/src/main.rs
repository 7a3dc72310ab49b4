//! chunkwire-sim — runs one simulated stream transfer and reports on it.

use std::sync::Arc;

use anyhow::{Context, Result};

use chunkwire_core::ChunkwireConfig;
use chunkwire_sim::transfer;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    let config_path = ChunkwireConfig::file_path();
    if let Err(e) = ChunkwireConfig::write_default_if_missing(&config_path) {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ChunkwireConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ChunkwireConfig::default()
    });
    tracing::info!(
        path = %config_path.display(),
        implicit_serialization = config.serialization.implicit,
        "config loaded"
    );

    let registry = chunkwire_sim::registry(&config.serialization)
        .context("failed to register wire records")?;
    let registry = Arc::new(registry);

    let t = &config.transfer;
    tracing::info!(
        seed = t.seed,
        message_bytes = t.message_bytes,
        segment_bytes = t.segment_bytes,
        fragment_bytes = t.fragment_bytes,
        reorder_window = t.reorder_window,
        duplicate_percent = t.duplicate_percent,
        serialize_on_wire = t.serialize_on_wire,
        "transfer starting"
    );

    let report = transfer::run(t, Arc::clone(&registry)).context("transfer failed")?;

    tracing::info!(
        bytes_delivered = report.bytes_delivered,
        segments = report.segments_sent,
        fragments = report.link.fragments_sent,
        duplicated_fragments = report.link.duplicated_fragments,
        late_fragments = report.late_fragments,
        bytes_on_wire = report.link.bytes_on_wire,
        deserialize_calls = report.deserialize_calls,
        serialized_bytes = registry.stats().serialized_bytes(),
        "transfer complete"
    );
    tracing::info!(
        sent = hex::encode(report.sent_digest),
        delivered = hex::encode(report.delivered_digest),
        "stream digests"
    );

    if !report.verified() {
        anyhow::bail!(
            "delivered stream differs: {} of {} bytes, digest {}",
            report.bytes_delivered,
            report.bytes_sent,
            hex::encode(report.delivered_digest)
        );
    }
    println!(
        "{} bytes delivered intact in {} segments ({} fragments, {} duplicated)",
        report.bytes_delivered,
        report.segments_sent,
        report.link.fragments_sent,
        report.link.duplicated_fragments
    );
    Ok(())
}
