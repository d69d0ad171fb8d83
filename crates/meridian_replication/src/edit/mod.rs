//! # Edit Packet Batching and Dispatch
//!
//! Outbound entity edits are routed to the servers whose jurisdiction holds
//! each record's address and concatenated into one packet per destination.
//! A destination's buffer is flushed when the next record has a different
//! packet type, when the record would push it past the maximum packet size,
//! or on an explicit release.
//!
//! Until the directory knows every server's jurisdiction the sender is
//! bootstrapping: edits wait in a bounded FIFO that drops its oldest entry
//! on overflow, and a release request is remembered until routing starts.

mod buffer;
mod dispatcher;
mod pending;
mod sender;

pub use buffer::EditPacketBuffer;
pub use dispatcher::{DispatchError, EditCommand, EditDispatcher, EditHandle};
pub use pending::{PendingEdit, PendingEdits};
pub use sender::{EditPacketSender, SenderPhase, SenderStats};
