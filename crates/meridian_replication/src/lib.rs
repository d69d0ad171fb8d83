//! # Meridian Replication
//!
//! Replicates a sparse octree of mutable entities between editors and a set
//! of authoritative servers, each owning a disjoint spatial region.
//!
//! ## Components
//!
//! - [`codec`]: fixed packet header plus the entity and edit-record encodings
//! - [`store`]: the arena octree of entities and its timestamp merge rule
//! - [`jurisdiction`]: the directory and transport seams the sender depends on
//! - [`edit`]: per-destination batching, the bootstrap FIFO and the
//!   dispatcher task
//! - [`persist`]: periodic snapshots of a tree
//!
//! ## Sending edits
//!
//! ```rust,no_run
//! use meridian_replication::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(JurisdictionTable::new());
//!     let (transport, mut outbound) = ChannelTransport::new();
//!     let sender = EditPacketSender::new(directory.clone(), transport, SenderConfig::default());
//!     let (edits, dispatcher) = EditDispatcher::spawn(sender, ShutdownState::new());
//!
//!     // Held in the bootstrap FIFO until a jurisdiction arrives.
//!     let entity = Entity::with_token(CreatorToken(1), Vec3::new(10.0, 2.0, 5.0), 0.5);
//!     edits.submit_edit(PacketType::AddEntity, EditRecord::for_entity(entity, 8, 16384.0))?;
//!     edits.release_queued_messages()?;
//!
//!     let server = ServerId::new();
//!     directory.set_jurisdiction(server, JurisdictionMap::everything());
//!
//!     if let Some(packet) = outbound.recv().await {
//!         println!("{} bytes for {}", packet.packet.len(), packet.server);
//!     }
//!     drop(edits);
//!     dispatcher.await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod edit;
pub mod error;
pub mod jurisdiction;
pub mod persist;
pub mod shutdown;
pub mod store;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

pub use codec::{CodecError, EditRecord, PacketHeader, PacketType};
pub use config::{PersistConfig, SenderConfig, TreeConfig, TreeRole};
pub use edit::{
    DispatchError, EditDispatcher, EditHandle, EditPacketSender, SenderPhase, SenderStats,
};
pub use error::ReplicationError;
pub use jurisdiction::{
    ChannelTransport, EditTransport, JurisdictionMap, JurisdictionTable, OutboundPacket,
    PartitionDirectory,
};
pub use persist::{PersistError, PersistWorker};
pub use shutdown::ShutdownState;
pub use store::{
    Entity, EntityProperties, EntityTree, MergeOutcome, PacketSummary, StoreError, SweepReport,
};
pub use types::*;
pub use utils::usec_timestamp_now;
