//! Structured record plumbing: schema identifiers and the field traits that
//! let typed headers live inside a chunk.

use std::any::Any;
use std::fmt;

/// Identifies a kind of structured record and selects its serializer.
///
/// Polymorphic records (several variants sharing one wire prefix) use a
/// single schema whose field type is an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(&'static str);

impl SchemaId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A typed header or trailer record.
pub trait Fields: fmt::Debug + Clone + Send + Sync + 'static {
    const SCHEMA: SchemaId;

    /// Byte length this record occupies in its serialized form.
    fn chunk_length(&self) -> usize;
}

/// Object-safe face of [`Fields`], implemented for every `Fields` type.
pub trait DynFields: fmt::Debug + Send + Sync {
    fn schema_id(&self) -> SchemaId;
    fn field_length(&self) -> usize;
    fn clone_boxed(&self) -> Box<dyn DynFields>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Fields> DynFields for T {
    fn schema_id(&self) -> SchemaId {
        T::SCHEMA
    }

    fn field_length(&self) -> usize {
        self.chunk_length()
    }

    fn clone_boxed(&self) -> Box<dyn DynFields> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn DynFields> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}
