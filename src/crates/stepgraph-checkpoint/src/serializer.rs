//! Serialization protocol for persisted checkpoint fields

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};

/// Protocol for serializing and deserializing checkpoint data
///
/// Durable backends encode the state snapshot, frontier and interrupt
/// payload through this trait so the on-disk format is chosen in one place.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;

    /// Deserialize one stored column of a checkpoint row
    ///
    /// Failures are reported as `Invalid`, naming the column.
    fn loads_column<T: for<'de> Deserialize<'de>>(&self, column: &str, data: &[u8]) -> Result<T> {
        self.loads(data).map_err(|e| {
            CheckpointError::Invalid(format!("corrupt '{}' column: {}", column, e))
        })
    }
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
