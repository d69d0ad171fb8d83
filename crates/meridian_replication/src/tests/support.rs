use crate::codec::{read_edit_records, EditRecord, PacketHeader};
use crate::jurisdiction::EditTransport;
use crate::store::Entity;
use crate::types::{CreatorToken, EntityId, OctalCode, ServerId, Vec3};
use bytes::Bytes;
use dashmap::DashMap;
use proptest::prelude::*;
use std::sync::Mutex;

/// Transport that records every packet and serves configurable skews.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(ServerId, Bytes)>>,
    pub skews: DashMap<ServerId, i64>,
}

impl RecordingTransport {
    pub fn packets_for(&self, server: ServerId) -> Vec<Bytes> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == server)
            .map(|(_, packet)| packet.clone())
            .collect()
    }

    pub fn packet_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl EditTransport for RecordingTransport {
    fn enqueue(&self, server: ServerId, packet: Bytes) {
        self.sent.lock().unwrap().push((server, packet));
    }

    fn clock_skew_usec(&self, server: ServerId) -> i64 {
        self.skews.get(&server).map(|skew| *skew).unwrap_or(0)
    }
}

/// Header and records of an edit packet.
pub fn decode_edit_packet(packet: &[u8]) -> (PacketHeader, Vec<EditRecord>) {
    let (header, payload) = PacketHeader::read(packet).unwrap();
    let read = read_edit_records(payload);
    assert!(!read.truncated, "edit packet should decode completely");
    assert_eq!(read.bytes_read, payload.len());
    (header, read.items)
}

pub fn record(id: u32, address: &[u8]) -> EditRecord {
    let mut entity = Entity::with_id(EntityId(id), Vec3::splat(1.0), 0.5);
    entity.last_edited = 1_000_000 + id as u64;
    EditRecord::new(OctalCode::from_octants(address), entity)
}

fn arb_vec3(range: std::ops::Range<f32>) -> impl Strategy<Value = Vec3> {
    (range.clone(), range.clone(), range).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

/// Entities with finite fields positioned inside a 1024-unit world.
pub fn arb_entity() -> impl Strategy<Value = Entity> {
    (
        prop_oneof![
            any::<u32>().prop_map(|id| Entity::with_id(EntityId(id), Vec3::ZERO, 1.0)),
            any::<u32>().prop_map(|token| Entity::with_token(CreatorToken(token), Vec3::ZERO, 1.0)),
        ],
        arb_vec3(0.0..1024.0),
        arb_vec3(-10.0..10.0),
        0.01f32..50.0,
        any::<[u8; 3]>(),
        "[a-z0-9/._-]{0,48}",
        (0.0f32..100.0, 0.0f32..100.0, any::<bool>()),
        (any::<u64>(), any::<u64>()),
    )
        .prop_map(
            |(mut entity, position, velocity, radius, color, url, (age, lifetime, should_die), (edited, updated))| {
                entity.position = position;
                entity.velocity = velocity;
                entity.radius = radius;
                entity.color = color;
                entity.rotation = [0.0, 0.6, 0.0, 0.8];
                entity.model_url = url;
                entity.age = age;
                entity.lifetime = lifetime;
                entity.should_die = should_die;
                entity.last_edited = edited;
                entity.last_updated = updated;
                entity
            },
        )
}
