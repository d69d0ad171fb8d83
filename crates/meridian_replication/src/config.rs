//! Configuration for the replication core.
//!
//! Every struct deserializes with sensible defaults for missing fields so a
//! host can embed them directly in its own configuration file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_max_packet_size() -> usize {
    1450
}

fn default_max_pending_messages() -> usize {
    500
}

fn default_process_interval_ms() -> u64 {
    16
}

fn default_should_send() -> bool {
    true
}

fn default_root_scale() -> f32 {
    16384.0
}

fn default_max_depth() -> usize {
    12
}

fn default_persist_path() -> PathBuf {
    PathBuf::from("data/entities.mrdn")
}

fn default_persist_interval_ms() -> u64 {
    30_000
}

fn default_persist_enabled() -> bool {
    true
}

/// Settings for the outbound edit packet sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Largest datagram handed to the transport, header included
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
    /// Capacity of the bootstrap FIFO shared by single and packable edits
    #[serde(default = "default_max_pending_messages")]
    pub max_pending_messages: usize,
    /// How often the dispatcher task drains and flushes, in milliseconds
    #[serde(default = "default_process_interval_ms")]
    pub process_interval_ms: u64,
    /// When false every submitted edit is discarded
    #[serde(default = "default_should_send")]
    pub should_send: bool,
}

impl SenderConfig {
    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms.max(1))
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            max_packet_size: default_max_packet_size(),
            max_pending_messages: default_max_pending_messages(),
            process_interval_ms: default_process_interval_ms(),
            should_send: default_should_send(),
        }
    }
}

/// Whether this tree hands out entity ids or only mirrors them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeRole {
    /// Assigns ids to token-only entities it receives
    #[default]
    Authority,
    /// Stores whatever arrives as-is
    Replica,
}

/// Geometry and role of an entity tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Edge length of the root cube
    #[serde(default = "default_root_scale")]
    pub root_scale: f32,
    /// Deepest level entities are placed at
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub role: TreeRole,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root_scale: default_root_scale(),
            max_depth: default_max_depth(),
            role: TreeRole::default(),
        }
    }
}

/// Settings for the periodic tree snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistConfig {
    #[serde(default = "default_persist_path")]
    pub path: PathBuf,
    /// Time between change checks, in milliseconds
    #[serde(default = "default_persist_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_persist_enabled")]
    pub enabled: bool,
}

impl PersistConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            path: default_persist_path(),
            interval_ms: default_persist_interval_ms(),
            enabled: default_persist_enabled(),
        }
    }
}
