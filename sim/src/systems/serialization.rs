//! Serialization utilities for simulation state.

use crate::error::SimError;
use crate::world::{SaveState, Snapshot};

/// Serialize a snapshot to JSON bytes.
pub fn snapshot_to_json(snapshot: &Snapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(snapshot)
}

/// Serialize a snapshot to a JSON string.
pub fn snapshot_to_json_string(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

/// Deserialize a snapshot from a JSON string.
pub fn snapshot_from_json_string(data: &str) -> Result<Snapshot, serde_json::Error> {
    serde_json::from_str(data)
}

/// Serialize a save to pretty JSON.
pub fn save_to_json(state: &SaveState) -> Result<String, SimError> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Parse a save written by [`save_to_json`].
pub fn save_from_json(data: &str) -> Result<SaveState, SimError> {
    Ok(serde_json::from_str(data)?)
}
