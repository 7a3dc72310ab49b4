//! chunkwire-core — packets as trees of shared immutable chunks.
//!
//! A chunk is placeholder, raw bytes, a structured record, a view onto a
//! record, or a sequence of chunks. Packets, queues and buffers share chunks
//! through `Arc` and convert between structured and byte forms only through
//! an explicit [`SerializerRegistry`].

pub mod buffer;
pub mod chunk;
pub mod config;
pub mod error;
pub mod packet;
pub mod queue;
pub mod serializer;
pub mod stream;


pub use buffer::{ChunkBuffer, ReassemblyBuffer, Region, ReorderBuffer};
pub use chunk::{Chunk, ChunkKind, ChunkState, DynFields, Fields, Peek, PeekFlags, SchemaId, Target};
pub use config::ChunkwireConfig;
pub use error::{AllowNull, ChunkError, Result};
pub use packet::Packet;
pub use queue::ChunkQueue;
pub use serializer::{ChunkSerializer, Codec, SerializerRegistry, SerializerStats};
pub use stream::ByteReader;
