//! # Entity Store
//!
//! Entities live in an arena octree, grouped per node by the region their
//! position falls in. The store owns the conflict-resolution rule for
//! server-sourced updates: an incoming copy wins if either its `last_edited`
//! or its `last_updated` stamp is strictly newer than the local one. Local
//! editor changes always win.
//!
//! Not-found is an ordinary outcome here. It is returned, never logged above
//! `trace`.

mod element;
mod entity;
mod octree;
mod tree;

pub use element::{should_overwrite, EntityTreeElement, MergeOutcome};
pub use entity::{Entity, EntityProperties, Identity};
pub use octree::{NodeId, Octree, SpatialElement};
pub use tree::{Applied, EntityTree, PacketSummary, SweepReport, TreeDecode};

use crate::types::EntityKey;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("No entity matches {0}")]
    EntityNotFound(EntityKey),
    #[error("Entity {0} was moved outside the world bounds")]
    OutsideWorld(EntityKey),
}
