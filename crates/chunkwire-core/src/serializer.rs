//! Serializer registry: converts between structured records and bytes.
//!
//! One serializer per [`SchemaId`]. Serialized forms of structured chunks
//! are cached on the chunk, so serializing an unchanged record twice costs
//! one serializer call. Deserialization checks that the consumed bytes
//! round-trip and flags the record otherwise.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{AsBytes, FromBytes};

use crate::chunk::{Body, Chunk, DynFields, Fields, SchemaId};
use crate::config::SerializationConfig;
use crate::error::{ChunkError, Result};
use crate::stream::ByteReader;

// ── Plug-in points ────────────────────────────────────────────────────────────

/// Converts one kind of structured record to and from bytes.
pub trait ChunkSerializer: Send + Sync {
    fn serialize(&self, fields: &dyn DynFields, out: &mut BytesMut) -> Result<()>;

    /// Reads one record. Running out of input is not an error here: the
    /// reader zero-fills and the registry flags the result incomplete.
    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<Box<dyn DynFields>>;
}

/// Records that know their own byte layout.
pub trait Codec: Fields {
    fn encode(&self, out: &mut BytesMut);
    fn decode(input: &mut ByteReader<'_>) -> Result<Self>;
}

fn downcast<T: Fields>(fields: &dyn DynFields) -> Result<&T> {
    fields
        .as_any()
        .downcast_ref::<T>()
        .ok_or(ChunkError::WrongShape {
            expected: T::SCHEMA.name(),
            actual: fields.schema_id().name(),
        })
}

struct CodecSerializer<T>(PhantomData<fn() -> T>);

impl<T: Codec> ChunkSerializer for CodecSerializer<T> {
    fn serialize(&self, fields: &dyn DynFields, out: &mut BytesMut) -> Result<()> {
        downcast::<T>(fields)?.encode(out);
        Ok(())
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<Box<dyn DynFields>> {
        Ok(Box::new(T::decode(input)?))
    }
}

/// Fixed-layout records whose in-memory struct is the wire image.
struct WireSerializer<T>(PhantomData<fn() -> T>);

impl<T: Fields + AsBytes + FromBytes> ChunkSerializer for WireSerializer<T> {
    fn serialize(&self, fields: &dyn DynFields, out: &mut BytesMut) -> Result<()> {
        out.put_slice(downcast::<T>(fields)?.as_bytes());
        Ok(())
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<Box<dyn DynFields>> {
        let raw = input.read_bytes(std::mem::size_of::<T>());
        let record = T::read_from(raw.as_slice()).ok_or_else(|| ChunkError::Malformed {
            schema: T::SCHEMA,
            reason: format!("expected {} bytes", std::mem::size_of::<T>()),
        })?;
        Ok(Box::new(record))
    }
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Running totals of serializer work. Cache hits do not count.
#[derive(Debug, Default)]
pub struct SerializerStats {
    serialized_bytes: AtomicU64,
    deserialized_bytes: AtomicU64,
    serialize_calls: AtomicU64,
    deserialize_calls: AtomicU64,
}

impl SerializerStats {
    pub fn serialized_bytes(&self) -> u64 {
        self.serialized_bytes.load(Ordering::Relaxed)
    }

    pub fn deserialized_bytes(&self) -> u64 {
        self.deserialized_bytes.load(Ordering::Relaxed)
    }

    pub fn serialize_calls(&self) -> u64 {
        self.serialize_calls.load(Ordering::Relaxed)
    }

    pub fn deserialize_calls(&self) -> u64 {
        self.deserialize_calls.load(Ordering::Relaxed)
    }

    fn record_serialize(&self, bytes: usize) {
        self.serialize_calls.fetch_add(1, Ordering::Relaxed);
        self.serialized_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_deserialize(&self, bytes: usize) {
        self.deserialize_calls.fetch_add(1, Ordering::Relaxed);
        self.deserialized_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SerializerRegistry {
    serializers: HashMap<SchemaId, Arc<dyn ChunkSerializer>>,
    /// Lets peeks convert structured or placeholder content to bytes without
    /// asking for it explicitly.
    implicit_serialization: bool,
    stats: SerializerStats,
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemas: Vec<_> = self.serializers.keys().collect();
        schemas.sort();
        f.debug_struct("SerializerRegistry")
            .field("schemas", &schemas)
            .field("implicit_serialization", &self.implicit_serialization)
            .field("stats", &self.stats)
            .finish()
    }
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SerializationConfig) -> Self {
        Self {
            implicit_serialization: config.implicit,
            ..Self::default()
        }
    }

    pub fn register(
        &mut self,
        schema: SchemaId,
        serializer: Arc<dyn ChunkSerializer>,
    ) -> Result<()> {
        if self.serializers.contains_key(&schema) {
            return Err(ChunkError::DuplicateRegistration(schema));
        }
        tracing::debug!(%schema, "serializer registered");
        self.serializers.insert(schema, serializer);
        Ok(())
    }

    pub fn register_codec<T: Codec>(&mut self) -> Result<()> {
        self.register(T::SCHEMA, Arc::new(CodecSerializer::<T>(PhantomData)))
    }

    pub fn register_wire<T: Fields + AsBytes + FromBytes>(&mut self) -> Result<()> {
        self.register(T::SCHEMA, Arc::new(WireSerializer::<T>(PhantomData)))
    }

    pub fn unregister(&mut self, schema: SchemaId) -> Result<()> {
        self.serializers
            .remove(&schema)
            .map(|_| ())
            .ok_or(ChunkError::MissingRegistration(schema))
    }

    pub fn contains(&self, schema: SchemaId) -> bool {
        self.serializers.contains_key(&schema)
    }

    pub fn lookup(&self, schema: SchemaId) -> Result<&dyn ChunkSerializer> {
        self.serializers
            .get(&schema)
            .map(|s| s.as_ref())
            .ok_or(ChunkError::UnknownSerializerKind(schema))
    }

    pub fn implicit_serialization(&self) -> bool {
        self.implicit_serialization
    }

    pub fn set_implicit_serialization(&mut self, enabled: bool) {
        self.implicit_serialization = enabled;
    }

    pub fn stats(&self) -> &SerializerStats {
        &self.stats
    }

    /// Byte form of any chunk. Placeholders read as zeros.
    pub fn serialize(&self, chunk: &Chunk) -> Result<Bytes> {
        match &chunk.body {
            Body::Raw { bytes } => Ok(bytes.clone()),
            Body::Structured(_) => self.serialize_structured(chunk),
            _ => {
                let mut out = BytesMut::with_capacity(chunk.len());
                self.serialize_into(chunk, &mut out)?;
                Ok(out.freeze())
            }
        }
    }

    fn serialize_into(&self, chunk: &Chunk, out: &mut BytesMut) -> Result<()> {
        match &chunk.body {
            Body::Placeholder { length } => out.put_bytes(0, *length),
            Body::Raw { bytes } => out.put_slice(bytes),
            Body::View {
                base,
                offset,
                length,
            } => {
                let whole = self.serialize(base)?;
                out.put_slice(&whole[*offset..*offset + *length]);
            }
            Body::Sequence { children, .. } => {
                for child in children {
                    self.serialize_into(child, out)?;
                }
            }
            Body::Structured(_) => out.put_slice(&self.serialize_structured(chunk)?),
        }
        Ok(())
    }

    fn serialize_structured(&self, chunk: &Chunk) -> Result<Bytes> {
        let Body::Structured(s) = &chunk.body else {
            return Err(ChunkError::WrongShape {
                expected: "structured",
                actual: chunk.kind().name(),
            });
        };
        if let Some(cached) = s.cache.get() {
            return Ok(cached.clone());
        }
        let schema = s.fields.schema_id();
        let serializer = self.lookup(schema)?;
        let mut out = BytesMut::with_capacity(s.length);
        serializer.serialize(s.fields.as_ref(), &mut out)?;
        self.stats.record_serialize(out.len());
        if out.len() != s.length {
            tracing::trace!(
                %schema,
                produced = out.len(),
                declared = s.length,
                "serialized record resized to its declared length"
            );
            out.resize(s.length, 0);
        }
        let bytes = out.freeze();
        Ok(s.cache.get_or_init(|| bytes).clone())
    }

    /// Reads one `schema` record from the front of `bytes`.
    ///
    /// The returned chunk is as long as the bytes consumed. It is flagged
    /// incomplete when the record runs past the end of `bytes`, and
    /// improperly represented when re-serializing it gives different bytes.
    pub fn deserialize(&self, schema: SchemaId, bytes: Bytes) -> Result<Chunk> {
        let serializer = self.lookup(schema)?;
        let mut reader = ByteReader::new(&bytes);
        let fields = serializer.deserialize(&mut reader)?;
        let consumed = reader.position();
        let truncated = reader.is_read_beyond_end();
        self.stats.record_deserialize(consumed);

        let mut chunk = Chunk::from_dyn(fields);
        let Body::Structured(s) = &mut chunk.body else {
            return Err(ChunkError::WrongShape {
                expected: "structured",
                actual: chunk.kind().name(),
            });
        };
        s.length = consumed;
        if truncated {
            chunk.state.complete = false;
            return Ok(chunk);
        }

        let mut check = BytesMut::with_capacity(consumed);
        serializer.serialize(s.fields.as_ref(), &mut check)?;
        let input = bytes.slice(..consumed);
        if check[..] == input[..] {
            let _ = s.cache.set(input);
        } else {
            tracing::debug!(
                %schema,
                input = hex::encode(&input),
                canonical = hex::encode(&check),
                "deserialized record does not round-trip"
            );
            chunk.state.properly_represented = false;
        }
        Ok(chunk)
    }
}
