//! Event types broadcast by the capture pipeline.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` (camelCase
//! fields, lowercase enum variants) so a front end can forward them over an
//! IPC or websocket boundary unchanged.

use serde::{Deserialize, Serialize};

use crate::stream::state::RunState;

/// Emitted whenever a processed chunk contains at least one glitch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlitchEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Which capture chunk produced the hits (chunk counter, not frames).
    pub chunk_index: u64,
    /// Glitches found in this chunk.
    pub count: usize,
    /// Cumulative glitch tally for the session, including this chunk.
    pub total: u64,
}

/// Emitted for every processed chunk with the meter readout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelEvent {
    pub seq: u64,
    /// Per-channel peak level in dBFS.
    pub peaks_db: Vec<f32>,
    /// True when every channel was below the silence threshold and the
    /// chunk was skipped without analysis.
    pub gated: bool,
}

/// Emitted when the stream's run state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub state: RunState,
    /// Optional human-readable detail (e.g. device error message).
    pub detail: Option<String>,
}
