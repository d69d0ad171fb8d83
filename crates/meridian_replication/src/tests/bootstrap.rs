use super::support::{decode_edit_packet, record, RecordingTransport};
use crate::codec::{PacketHeader, PacketType};
use crate::config::SenderConfig;
use crate::edit::{EditPacketSender, SenderPhase};
use crate::jurisdiction::{JurisdictionMap, JurisdictionTable, PartitionDirectory};
use crate::types::{EntityId, OctalCode, ServerId};
use proptest::prelude::*;
use std::sync::Arc;

type TestSender = EditPacketSender<Arc<JurisdictionTable>, Arc<RecordingTransport>>;

fn sender(max_pending_messages: usize) -> (TestSender, Arc<JurisdictionTable>, Arc<RecordingTransport>) {
    let directory = Arc::new(JurisdictionTable::new());
    let transport = Arc::new(RecordingTransport::default());
    let config = SenderConfig {
        max_pending_messages,
        ..SenderConfig::default()
    };
    let sender = EditPacketSender::new(directory.clone(), transport.clone(), config);
    (sender, directory, transport)
}

fn sent_ids(transport: &RecordingTransport, server: ServerId) -> Vec<u32> {
    transport
        .packets_for(server)
        .iter()
        .flat_map(|packet| decode_edit_packet(packet).1)
        .map(|record| record.entity.id().map_or(0, |EntityId(id)| id))
        .collect()
}

proptest! {
    #[test]
    fn prop_bootstrap_keeps_most_recent_edits(capacity in 1usize..32, extra in 0usize..32) {
        let submitted = capacity + extra;
        let (mut sender, directory, transport) = sender(capacity);

        for id in 0..submitted as u32 {
            sender.submit_edit(PacketType::EditEntity, record(id, &[3]));
        }
        prop_assert_eq!(sender.pending_len(), capacity);
        prop_assert_eq!(sender.stats().edits_dropped_overflow, extra as u64);

        let server = ServerId::new();
        directory.set_jurisdiction(server, JurisdictionMap::everything());
        sender.release_queued_messages();

        let expected: Vec<u32> = (extra as u32..submitted as u32).collect();
        prop_assert_eq!(sent_ids(&transport, server), expected);
    }
}

#[test]
fn test_nothing_is_sent_while_bootstrapping() {
    let (mut sender, directory, transport) = sender(10);
    let server = ServerId::new();
    directory.register_server(server);

    sender.submit_edit(PacketType::EditEntity, record(1, &[0]));
    sender.release_queued_messages();
    sender.process();

    assert_eq!(sender.phase(), SenderPhase::Bootstrapping);
    assert_eq!(transport.packet_count(), 0);
    assert!(sender.has_pending());
}

#[test]
fn test_drain_sends_singles_before_packables() {
    let (mut sender, directory, transport) = sender(10);
    sender.submit_edit(PacketType::EditEntity, record(1, &[0]));
    sender.queue_single_message(PacketType::EraseEntities, OctalCode::root(), &[0, 1, 0, 0, 0, 9]);
    sender.submit_edit(PacketType::EditEntity, record(2, &[0]));
    sender.release_queued_messages();

    let server = ServerId::new();
    directory.set_jurisdiction(server, JurisdictionMap::everything());
    sender.process();

    let packets = transport.packets_for(server);
    assert_eq!(packets.len(), 2);
    let (first, _) = PacketHeader::read(&packets[0]).unwrap();
    assert_eq!(first.packet_type, PacketType::EraseEntities);
    let (_, records) = decode_edit_packet(&packets[1]);
    assert_eq!(records.len(), 2);
    assert!(!sender.has_pending());
}

#[test]
fn test_losing_a_jurisdiction_returns_to_bootstrapping() {
    let (mut sender, directory, transport) = sender(10);
    let first = ServerId::new();
    directory.set_jurisdiction(first, JurisdictionMap::everything());
    sender.submit_edit(PacketType::EditEntity, record(1, &[0]));
    assert_eq!(sender.phase(), SenderPhase::Active);

    let second = ServerId::new();
    directory.register_server(second);
    assert!(!directory.owners_exist());

    sender.submit_edit(PacketType::EditEntity, record(2, &[0]));
    assert_eq!(sender.phase(), SenderPhase::Bootstrapping);
    assert_eq!(sender.pending_len(), 1);

    directory.set_jurisdiction(second, JurisdictionMap::new(OctalCode::from_octants(&[7]), vec![]));
    sender.release_queued_messages();
    assert_eq!(sender.phase(), SenderPhase::Active);
    assert_eq!(sent_ids(&transport, first), vec![1, 2]);
    assert!(transport.packets_for(second).is_empty());
}
