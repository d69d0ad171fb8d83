//! # Wire Codec
//!
//! Pure, stateless encoding shared byte-for-byte by editors, replicas and
//! entity servers. Every field is fixed width and big-endian.
//!
//! A packet is a [`PacketHeader`] followed by a type-specific payload:
//!
//! | packet | payload |
//! |---|---|
//! | `AddEntity` / `EditEntity` | `u16` count + edit records (octal code + entity) |
//! | `EntityData` | octal code + `u16` count + entities |
//! | `EraseEntities` | `u16` count + `u32` ids |
//! | `AddEntityResponse` | `u32` creator token + `u32` id |
//!
//! Readers never index past the slice they are given. Counted payloads that
//! are cut short decode as far as they can and report the bytes consumed.

mod entity;
mod error;
mod header;
mod octal;

pub use entity::{
    entity_encoded_len, read_add_response, read_edit_records, read_entities, read_entity,
    read_entity_data, read_erase_payload, write_add_response, write_entities, write_entity,
    write_entity_data, write_erase_payload, CountedRead, EditRecord, ENTITY_FIXED_SIZE,
    MAX_ENTITY_RUN, MAX_MODEL_URL_LEN, MIN_ENTITY_SIZE,
};
pub use error::CodecError;
pub use header::{PacketHeader, PacketType, HEADER_SIZE};
pub use octal::{octal_code_len, read_octal_code, write_octal_code};

use crate::types::{CreatorToken, EntityId};
use bytes::{Bytes, BytesMut};

/// Size of the `u16` record count that opens every counted payload.
pub const COUNT_SIZE: usize = 2;

/// Builds a complete `EraseEntities` packet.
pub fn erase_packet(sequence: u16, timestamp: u64, ids: &[EntityId]) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_SIZE + COUNT_SIZE + ids.len() * 4);
    PacketHeader::new(PacketType::EraseEntities, sequence, timestamp).write(&mut out);
    write_erase_payload(ids, &mut out);
    out.freeze()
}

/// Builds a complete `AddEntityResponse` packet.
pub fn add_response_packet(sequence: u16, timestamp: u64, token: CreatorToken, id: EntityId) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_SIZE + 8);
    PacketHeader::new(PacketType::AddEntityResponse, sequence, timestamp).write(&mut out);
    write_add_response(token, id, &mut out);
    out.freeze()
}
