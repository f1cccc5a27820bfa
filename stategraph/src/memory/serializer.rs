//! Serializer for checkpoint records (value <-> bytes).
//!
//! Used by persistent Checkpointer implementations. [`MemorySaver`](super::MemorySaver)
//! stores checkpoints as values and does not use a Serializer.

use super::checkpointer::CheckpointError;

/// Serializes and deserializes one kind of checkpoint payload (state or metadata).
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<Vec<u8>, CheckpointError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<T, CheckpointError>;
}

/// JSON serializer. Checkpoint records must stay JSON-compatible for external inspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T> Serializer<T> for JsonSerializer
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec(value).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, CheckpointError> {
        serde_json::from_slice(bytes).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }
}
