//! Jurisdiction-aware batching of outbound entity edits.

use super::buffer::EditPacketBuffer;
use super::pending::{PendingEdit, PendingEdits};
use crate::codec::{EditRecord, PacketHeader, PacketType, COUNT_SIZE, HEADER_SIZE};
use crate::config::SenderConfig;
use crate::jurisdiction::{EditTransport, PartitionDirectory};
use crate::types::{OctalCode, ServerId};
use crate::utils::usec_timestamp_now;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

/// Whether routing information is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    /// No usable jurisdictions yet; edits wait in the pending FIFO
    Bootstrapping,
    /// Edits are routed and batched as they arrive
    Active,
}

/// Running totals kept by an [`EditPacketSender`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    /// Pending edits pushed out of the bootstrap FIFO
    pub edits_dropped_overflow: u64,
    /// Edits whose address no known server owns
    pub edits_dropped_unowned: u64,
    /// Records too large to fit any packet
    pub edits_dropped_oversize: u64,
    /// Records submitted under a type that cannot be batched
    pub edits_dropped_unpackable: u64,
}

/// Batches edit records into per-destination packets.
///
/// The sender owns every buffer and the pending FIFO outright; it is driven
/// from a single context (see [`super::EditDispatcher`]). It never blocks:
/// finished packets are handed to the [`EditTransport`] and forgotten.
pub struct EditPacketSender<D, T> {
    directory: D,
    transport: T,
    config: SenderConfig,
    phase: SenderPhase,
    pending: PendingEdits,
    buffers: HashMap<ServerId, EditPacketBuffer>,
    sequence: u16,
    release_pending: bool,
    stats: SenderStats,
}

impl<D: PartitionDirectory, T: EditTransport> EditPacketSender<D, T> {
    pub fn new(directory: D, transport: T, config: SenderConfig) -> Self {
        Self {
            directory,
            transport,
            pending: PendingEdits::new(config.max_pending_messages),
            config,
            phase: SenderPhase::Bootstrapping,
            buffers: HashMap::new(),
            sequence: 0,
            release_pending: false,
            stats: SenderStats::default(),
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn phase(&self) -> SenderPhase {
        self.phase
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn should_send(&self) -> bool {
        self.config.should_send
    }

    /// While disabled every submitted edit is discarded.
    pub fn set_should_send(&mut self, should_send: bool) {
        self.config.should_send = should_send;
    }

    /// Number of edits waiting for jurisdictions.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True if anything is waiting in the pending FIFO or a partial buffer.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.buffers.values().any(|buffer| !buffer.is_empty())
    }

    fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// Re-reads the directory and handles a phase change. Returns true when
    /// edits can be routed.
    fn refresh_phase(&mut self) -> bool {
        let owners_exist = self.directory.owners_exist();
        match (self.phase, owners_exist) {
            (SenderPhase::Bootstrapping, true) => {
                self.phase = SenderPhase::Active;
                info!(pending = self.pending.len(), "📡 Jurisdictions known, routing edits");
                self.drain_pending();
                if self.release_pending {
                    self.release_pending = false;
                    self.flush_all();
                }
            }
            (SenderPhase::Active, false) => {
                self.phase = SenderPhase::Bootstrapping;
                warn!("⏸️ Jurisdictions incomplete, holding edits");
            }
            _ => {}
        }
        owners_exist
    }

    fn drain_pending(&mut self) {
        let (singles, packables) = self.pending.drain();
        for edit in singles.into_iter().chain(packables) {
            match edit {
                PendingEdit::Single { address, packet } => self.send_single(&address, packet),
                PendingEdit::Packable {
                    packet_type,
                    record,
                } => self.route_record(packet_type, &record),
            }
        }
    }

    fn hold(&mut self, edit: PendingEdit) {
        if self.pending.push(edit).is_some() {
            self.stats.edits_dropped_overflow += 1;
            debug!(
                capacity = self.config.max_pending_messages,
                "Pending edit queue full, dropped oldest edit"
            );
        }
    }

    /// Queues one edit record for the servers that own its address.
    ///
    /// Before any jurisdictions are known the record waits in the pending
    /// FIFO instead. Only add and edit packets can carry batched records;
    /// any other type is refused.
    pub fn submit_edit(&mut self, packet_type: PacketType, record: EditRecord) {
        if !self.config.should_send {
            return;
        }
        if !packet_type.is_packable() {
            self.stats.edits_dropped_unpackable += 1;
            warn!(?packet_type, "Refusing to batch a non-packable packet type");
            return;
        }
        if self.refresh_phase() {
            self.route_record(packet_type, &record);
        } else {
            self.hold(PendingEdit::Packable {
                packet_type,
                record,
            });
        }
    }

    /// Sends a pre-formed message body as a packet of its own to every owner
    /// of `address`, bypassing batching.
    pub fn queue_single_message(&mut self, packet_type: PacketType, address: OctalCode, body: &[u8]) {
        if !self.config.should_send {
            return;
        }
        let mut packet = BytesMut::with_capacity(HEADER_SIZE + body.len());
        let sequence = self.next_sequence();
        PacketHeader::new(packet_type, sequence, usec_timestamp_now()).write(&mut packet);
        packet.put_slice(body);
        let packet = packet.freeze();

        if packet.len() > self.config.max_packet_size {
            self.stats.edits_dropped_oversize += 1;
            warn!(
                size = packet.len(),
                max = self.config.max_packet_size,
                "Dropping single message larger than the maximum packet size"
            );
            return;
        }

        if self.refresh_phase() {
            self.send_single(&address, packet);
        } else {
            self.hold(PendingEdit::Single { address, packet });
        }
    }

    fn send_single(&mut self, address: &OctalCode, packet: Bytes) {
        let owners = self.directory.owners_of(address);
        if owners.is_empty() {
            self.stats.edits_dropped_unowned += 1;
            debug!(%address, "No server owns address, dropping message");
            return;
        }
        for server in owners {
            self.stats.packets_sent += 1;
            self.stats.bytes_sent += packet.len() as u64;
            self.transport.enqueue(server, packet.clone());
        }
    }

    fn route_record(&mut self, packet_type: PacketType, record: &EditRecord) {
        let record_len = record.encoded_len();
        let max_packet_size = self.config.max_packet_size;
        if HEADER_SIZE + COUNT_SIZE + record_len > max_packet_size {
            self.stats.edits_dropped_oversize += 1;
            warn!(
                record_len,
                max = max_packet_size,
                "Dropping edit record larger than the maximum packet size"
            );
            return;
        }

        let owners = self.directory.owners_of(&record.address);
        if owners.is_empty() {
            self.stats.edits_dropped_unowned += 1;
            debug!(address = %record.address, "No server owns address, dropping edit");
            return;
        }

        for server in owners {
            let needs_flush = self.buffers.get(&server).is_some_and(|buffer| {
                !buffer.is_empty()
                    && (buffer.packet_type() != Some(packet_type) || !buffer.fits(record_len, max_packet_size))
            });
            if needs_flush {
                self.flush(server);
            }

            let fresh = self.buffers.get(&server).map_or(true, EditPacketBuffer::is_empty);
            let header = fresh.then(|| (self.next_sequence(), usec_timestamp_now()));
            let skew = self.transport.clock_skew_usec(server);

            let buffer = self
                .buffers
                .entry(server)
                .or_insert_with(|| EditPacketBuffer::new(server));
            if let Some((sequence, timestamp)) = header {
                buffer.start(packet_type, sequence, timestamp);
            }
            buffer.append(record, skew);
            trace!(%server, records = buffer.record_count(), len = buffer.len(), "Buffered edit record");
        }
    }

    fn flush(&mut self, server: ServerId) {
        let Some(packet) = self.buffers.get_mut(&server).and_then(EditPacketBuffer::take) else {
            return;
        };
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += packet.len() as u64;
        trace!(%server, len = packet.len(), "Flushing edit packet");
        self.transport.enqueue(server, packet);
    }

    fn flush_all(&mut self) {
        let servers: Vec<ServerId> = self.buffers.keys().copied().collect();
        for server in servers {
            self.flush(server);
        }
    }

    /// Flushes every partially filled buffer now. Before jurisdictions are
    /// known the request is remembered and honoured on activation.
    pub fn release_queued_messages(&mut self) {
        if self.refresh_phase() {
            self.flush_all();
        } else {
            self.release_pending = true;
            debug!("Release requested before jurisdictions are known, deferring");
        }
    }

    /// Periodic step: picks up newly arrived jurisdictions, which drains the
    /// pending FIFO and honours a deferred release.
    pub fn process(&mut self) {
        self.refresh_phase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jurisdiction::{JurisdictionMap, Owners};
    use crate::store::Entity;
    use crate::types::{EntityId, Vec3};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeDirectory {
        ready: AtomicBool,
        owners: Mutex<Vec<(ServerId, JurisdictionMap)>>,
    }

    impl PartitionDirectory for FakeDirectory {
        fn owners_of(&self, address: &OctalCode) -> Owners {
            self.owners
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, map)| map.contains(address))
                .map(|(server, _)| *server)
                .collect()
        }

        fn owners_exist(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        sent: Mutex<Vec<(ServerId, Bytes)>>,
    }

    impl EditTransport for FakeTransport {
        fn enqueue(&self, server: ServerId, packet: Bytes) {
            self.sent.lock().unwrap().push((server, packet));
        }

        fn clock_skew_usec(&self, _server: ServerId) -> i64 {
            0
        }
    }

    fn record(id: u32) -> EditRecord {
        EditRecord::new(
            OctalCode::from_octants(&[1]),
            Entity::with_id(EntityId(id), Vec3::splat(1.0), 0.5),
        )
    }

    fn sender() -> (
        EditPacketSender<Arc<FakeDirectory>, Arc<FakeTransport>>,
        Arc<FakeDirectory>,
        Arc<FakeTransport>,
        ServerId,
    ) {
        let directory = Arc::new(FakeDirectory::default());
        let transport = Arc::new(FakeTransport::default());
        let server = ServerId::new();
        directory
            .owners
            .lock()
            .unwrap()
            .push((server, JurisdictionMap::everything()));
        let sender = EditPacketSender::new(directory.clone(), transport.clone(), SenderConfig::default());
        (sender, directory, transport, server)
    }

    #[test]
    fn test_should_send_false_discards() {
        let (mut sender, directory, transport, _) = sender();
        directory.ready.store(true, Ordering::SeqCst);
        sender.set_should_send(false);
        sender.submit_edit(PacketType::EditEntity, record(1));
        sender.release_queued_messages();

        assert!(!sender.has_pending());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_release_is_latched_while_bootstrapping() {
        let (mut sender, directory, transport, server) = sender();
        sender.submit_edit(PacketType::EditEntity, record(1));
        sender.release_queued_messages();
        assert_eq!(sender.phase(), SenderPhase::Bootstrapping);
        assert_eq!(sender.pending_len(), 1);

        directory.ready.store(true, Ordering::SeqCst);
        sender.process();

        assert_eq!(sender.phase(), SenderPhase::Active);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, server);
        assert!(!sender.has_pending());
    }

    #[test]
    fn test_unowned_edits_are_dropped() {
        let (mut sender, directory, transport, _) = sender();
        directory.owners.lock().unwrap()[0].1 = JurisdictionMap::new(OctalCode::from_octants(&[6]), vec![]);
        directory.ready.store(true, Ordering::SeqCst);

        sender.submit_edit(PacketType::EditEntity, record(1));
        sender.release_queued_messages();

        assert_eq!(sender.stats().edits_dropped_unowned, 1);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_single_messages_bypass_batching() {
        let (mut sender, directory, transport, _) = sender();
        sender.queue_single_message(PacketType::EraseEntities, OctalCode::root(), &[0, 0]);
        directory.ready.store(true, Ordering::SeqCst);
        sender.queue_single_message(PacketType::EraseEntities, OctalCode::root(), &[0, 0]);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let (first, _) = PacketHeader::read(&sent[0].1).unwrap();
        let (second, _) = PacketHeader::read(&sent[1].1).unwrap();
        assert_eq!(first.packet_type, PacketType::EraseEntities);
        assert_eq!(second.sequence, first.sequence.wrapping_add(1));
    }

    #[test]
    fn test_oversize_record_is_dropped() {
        let (mut sender, directory, transport, _) = sender();
        directory.ready.store(true, Ordering::SeqCst);
        let mut huge = record(1);
        huge.entity.model_url = "x".repeat(4000);

        sender.submit_edit(PacketType::EditEntity, huge);
        sender.release_queued_messages();

        assert_eq!(sender.stats().edits_dropped_oversize, 1);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_non_packable_types_are_refused() {
        let (mut sender, directory, transport, _) = sender();
        directory.ready.store(true, Ordering::SeqCst);

        sender.submit_edit(PacketType::EraseEntities, record(1));
        sender.submit_edit(PacketType::EntityData, record(2));
        sender.release_queued_messages();

        assert_eq!(sender.stats().edits_dropped_unpackable, 2);
        assert!(!sender.has_pending());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_non_packable_types_are_not_held_while_bootstrapping() {
        let (mut sender, _, _, _) = sender();
        sender.submit_edit(PacketType::EraseEntities, record(1));

        assert_eq!(sender.phase(), SenderPhase::Bootstrapping);
        assert_eq!(sender.pending_len(), 0);
        assert_eq!(sender.stats().edits_dropped_unpackable, 1);
    }
}
