//! End-to-end stream transfer: application bytes through the send queue,
//! segments over the link, reassembly and in-order delivery on the far side.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use chunkwire_core::config::TransferConfig;
use chunkwire_core::{Chunk, SerializerRegistry};

use crate::link::{Defragmenter, Link, LinkStats};
use crate::receive_queue::ReceiveQueue;
use crate::send_queue::SendQueue;
use crate::wire::FLAG_FIN;

/// First sequence number of every transfer.
pub const INITIAL_SEQ: u32 = 1000;

/// Application write size used to feed the send queue.
const APP_WRITE_BYTES: usize = 4096;

/// Outcome of one transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub bytes_sent: usize,
    pub bytes_delivered: usize,
    pub segments_sent: u64,
    pub link: LinkStats,
    pub late_fragments: u64,
    pub duplicate_bytes: usize,
    pub deserialize_calls: u64,
    pub sent_digest: [u8; 32],
    pub delivered_digest: [u8; 32],
}

impl TransferReport {
    /// Delivered data is exactly the sent data.
    pub fn verified(&self) -> bool {
        self.bytes_sent == self.bytes_delivered && self.sent_digest == self.delivered_digest
    }
}

fn message(config: &TransferConfig) -> Chunk {
    if config.placeholder_payload {
        return Chunk::placeholder(config.message_bytes);
    }
    let mut bytes = vec![0u8; config.message_bytes];
    StdRng::seed_from_u64(config.seed).fill_bytes(&mut bytes);
    Chunk::raw(bytes)
}

/// Runs one transfer to completion.
pub fn run(config: &TransferConfig, registry: Arc<SerializerRegistry>) -> Result<TransferReport> {
    let segment_bytes = u16::try_from(config.segment_bytes)
        .ok()
        .filter(|&n| n > 0)
        .with_context(|| format!("segment_bytes {} must be 1..=65535", config.segment_bytes))?;

    let message = message(config).freeze();
    let sent_digest = *blake3::hash(&registry.serialize(&message)?).as_bytes();

    let mut send = SendQueue::new(Arc::clone(&registry), INITIAL_SEQ);
    let mut offset = 0;
    while offset < message.len() {
        let length = APP_WRITE_BYTES.min(message.len() - offset);
        send.enqueue(message.slice(offset, length)?);
        offset += length;
    }

    let mut link = Link::new(config, Arc::clone(&registry));
    let mut defrag = Defragmenter::new(Arc::clone(&registry));
    let mut receive = ReceiveQueue::new(INITIAL_SEQ);
    let mut hasher = blake3::Hasher::new();
    let mut segments_sent = 0u64;

    let mut deliver_one = |link: &mut Link, send: &mut SendQueue, hasher: &mut blake3::Hasher| -> Result<()> {
        let Some(fragment) = link.receive() else {
            return Ok(());
        };
        let Some(segment) = defrag.insert_fragment(fragment)? else {
            return Ok(());
        };
        let rcv_nxt = receive.insert_segment(segment)?;
        while let Some(data) = receive.extract_available() {
            hasher.update(&registry.serialize(&data)?);
        }
        send.discard_up_to(rcv_nxt)
            .context("acknowledged data outside the send buffer")?;
        Ok(())
    };

    let end_seq = send.buffer_end_seq();
    let mut seq = INITIAL_SEQ;
    while seq < end_seq {
        let length = u32::from(segment_bytes).min(end_seq - seq) as u16;
        let flags = if seq + u32::from(length) == end_seq { FLAG_FIN } else { 0 };
        let segment = send.create_segment(seq, length, flags)?;
        link.send(&segment)?;
        segments_sent += 1;
        seq += u32::from(length);

        while link.in_flight() > config.reorder_window.max(1) {
            deliver_one(&mut link, &mut send, &mut hasher)?;
        }
    }
    while link.in_flight() > 0 {
        deliver_one(&mut link, &mut send, &mut hasher)?;
    }
    drop(deliver_one);

    if defrag.pending() > 0 {
        bail!("{} packets never completed reassembly", defrag.pending());
    }
    if !message.is_empty() && !receive.is_finished() {
        bail!("stream ended at {} before the FIN at {}", receive.rcv_nxt(), end_seq);
    }

    let report = TransferReport {
        bytes_sent: message.len(),
        bytes_delivered: receive.delivered_bytes(),
        segments_sent,
        link: link.stats(),
        late_fragments: defrag.late_fragments(),
        duplicate_bytes: receive.duplicate_bytes(),
        deserialize_calls: registry.stats().deserialize_calls(),
        sent_digest,
        delivered_digest: *hasher.finalize().as_bytes(),
    };
    tracing::debug!(
        bytes = report.bytes_delivered,
        segments = report.segments_sent,
        fragments = report.link.fragments_sent,
        "transfer finished"
    );
    Ok(report)
}
