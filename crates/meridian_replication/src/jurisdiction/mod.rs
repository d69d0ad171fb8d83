//! # Jurisdiction
//!
//! The edit sender never looks servers up itself. It is handed a
//! [`PartitionDirectory`] that answers which servers own an address, and an
//! [`EditTransport`] that accepts finished packets and knows each server's
//! clock offset. Both are plain traits so tests can supply fakes.

mod map;
mod table;
mod transport;

pub use map::{Containment, JurisdictionMap};
pub use table::JurisdictionTable;
pub use transport::{ChannelTransport, OutboundPacket};

use crate::types::{OctalCode, ServerId};
use bytes::Bytes;
use smallvec::SmallVec;
use std::sync::Arc;

/// Owners of a single address. Usually one, occasionally a few.
pub type Owners = SmallVec<[ServerId; 4]>;

/// Maps spatial addresses to the servers authoritative for them.
///
/// Answers reflect the directory's state at the moment of the call and are
/// never cached by callers.
pub trait PartitionDirectory: Send + Sync {
    /// Servers whose jurisdiction contains `address`.
    fn owners_of(&self, address: &OctalCode) -> Owners;

    /// True once at least one server is known and none of the known servers
    /// is still missing its jurisdiction.
    fn owners_exist(&self) -> bool;
}

/// Non-blocking hand-off of finished packets to the network layer.
pub trait EditTransport: Send + Sync {
    /// Queues `packet` for `server` and returns immediately.
    fn enqueue(&self, server: ServerId, packet: Bytes);

    /// Estimated offset of `server`'s clock relative to ours, in microseconds.
    fn clock_skew_usec(&self, server: ServerId) -> i64;
}

impl<T: PartitionDirectory + ?Sized> PartitionDirectory for Arc<T> {
    fn owners_of(&self, address: &OctalCode) -> Owners {
        (**self).owners_of(address)
    }

    fn owners_exist(&self) -> bool {
        (**self).owners_exist()
    }
}

impl<T: EditTransport + ?Sized> EditTransport for Arc<T> {
    fn enqueue(&self, server: ServerId, packet: Bytes) {
        (**self).enqueue(server, packet)
    }

    fn clock_skew_usec(&self, server: ServerId) -> i64 {
        (**self).clock_skew_usec(server)
    }
}
