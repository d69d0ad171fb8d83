use crate::codec::{EditRecord, PacketType};
use crate::types::OctalCode;
use bytes::Bytes;
use std::collections::VecDeque;

/// An edit held back while no jurisdictions are known.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingEdit {
    /// Complete packet sent as-is to the owners of `address`
    Single { address: OctalCode, packet: Bytes },
    /// Record replayed through batching once owners are known
    Packable {
        packet_type: PacketType,
        record: EditRecord,
    },
}

/// Bounded FIFO shared by single and packable edits. When full, the oldest
/// entry of either kind is dropped to make room.
#[derive(Debug)]
pub struct PendingEdits {
    entries: VecDeque<PendingEdit>,
    capacity: usize,
}

impl PendingEdits {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Queues `edit` and returns whatever was dropped to keep the bound. With
    /// a capacity of zero nothing is ever retained.
    pub fn push(&mut self, edit: PendingEdit) -> Option<PendingEdit> {
        if self.capacity == 0 {
            return Some(edit);
        }
        let dropped = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(edit);
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the queue, returning singles first and then packables, each
    /// in their original order.
    pub fn drain(&mut self) -> (Vec<PendingEdit>, Vec<PendingEdit>) {
        self.entries
            .drain(..)
            .partition(|edit| matches!(edit, PendingEdit::Single { .. }))
    }
}
