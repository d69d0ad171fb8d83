//! Entity encoding and the payloads built from it.
//!
//! Every integer and float is fixed width and big-endian. An entity is laid
//! out as:
//!
//! | field | size |
//! |---|---|
//! | identity tag (0 = id, 1 = creator token) | 1 |
//! | id or token | 4 |
//! | last_edited | 8 |
//! | last_updated | 8 |
//! | position | 12 |
//! | radius | 4 |
//! | velocity | 12 |
//! | age, lifetime | 8 |
//! | should_die | 1 |
//! | property blob length | 2 |
//! | property blob: color, rotation, url length, url | 21 + url |

use super::error::{ensure_remaining, CodecError};
use super::octal::{octal_code_len, read_octal_code, write_octal_code};
use crate::store::{Entity, Identity};
use crate::types::{CreatorToken, EntityId, OctalCode, Vec3};
use crate::utils::apply_clock_skew;
use bytes::{Buf, BufMut};

const IDENTITY_KNOWN: u8 = 0;
const IDENTITY_TOKEN: u8 = 1;

/// Bytes before the property blob.
pub const ENTITY_FIXED_SIZE: usize = 1 + 4 + 8 + 8 + 12 + 4 + 12 + 4 + 4 + 1 + 2;
const BLOB_FIXED_SIZE: usize = 3 + 16 + 2;

/// Smallest possible encoded entity (empty model URL).
pub const MIN_ENTITY_SIZE: usize = ENTITY_FIXED_SIZE + BLOB_FIXED_SIZE;

/// Longest model URL the blob length can describe; longer URLs are cut at a
/// character boundary.
pub const MAX_MODEL_URL_LEN: usize = u16::MAX as usize - BLOB_FIXED_SIZE;

/// Number of bytes `entity` occupies on the wire.
pub fn entity_encoded_len(entity: &Entity) -> usize {
    MIN_ENTITY_SIZE + truncate_utf8(&entity.model_url, MAX_MODEL_URL_LEN).len()
}

pub fn write_entity<B: BufMut>(entity: &Entity, out: &mut B) {
    match entity.identity() {
        Identity::Confirmed { id, .. } => {
            out.put_u8(IDENTITY_KNOWN);
            out.put_u32(id.0);
        }
        Identity::Pending(token) => {
            out.put_u8(IDENTITY_TOKEN);
            out.put_u32(token.0);
        }
    }
    out.put_u64(entity.last_edited);
    out.put_u64(entity.last_updated);
    put_vec3(out, entity.position);
    out.put_f32(entity.radius);
    put_vec3(out, entity.velocity);
    out.put_f32(entity.age);
    out.put_f32(entity.lifetime);
    out.put_u8(entity.should_die as u8);

    let url = truncate_utf8(&entity.model_url, MAX_MODEL_URL_LEN);
    out.put_u16((BLOB_FIXED_SIZE + url.len()) as u16);
    out.put_slice(&entity.color);
    for component in entity.rotation {
        out.put_f32(component);
    }
    out.put_u16(url.len() as u16);
    out.put_slice(url.as_bytes());
}

/// Decodes one entity from the front of `data`, returning it and the number of
/// bytes it occupied. Nothing is consumed on error.
pub fn read_entity(data: &[u8]) -> Result<(Entity, usize), CodecError> {
    ensure_remaining(data, ENTITY_FIXED_SIZE)?;
    let mut buf = data;

    let tag = buf.get_u8();
    let raw_identity = buf.get_u32();
    let last_edited = buf.get_u64();
    let last_updated = buf.get_u64();
    let position = get_vec3(&mut buf);
    let radius = buf.get_f32();

    let mut entity = match tag {
        IDENTITY_KNOWN => Entity::with_id(EntityId(raw_identity), position, radius),
        IDENTITY_TOKEN => Entity::with_token(CreatorToken(raw_identity), position, radius),
        other => return Err(CodecError::UnknownIdentityTag(other)),
    };
    entity.last_edited = last_edited;
    entity.last_updated = last_updated;
    entity.velocity = get_vec3(&mut buf);
    entity.age = buf.get_f32();
    entity.lifetime = buf.get_f32();
    entity.should_die = buf.get_u8() != 0;

    let blob_len = buf.get_u16() as usize;
    ensure_remaining(buf, blob_len)?;
    let mut blob = &buf[..blob_len];
    ensure_remaining(blob, BLOB_FIXED_SIZE)?;
    blob.copy_to_slice(&mut entity.color);
    for component in entity.rotation.iter_mut() {
        *component = blob.get_f32();
    }
    let url_len = blob.get_u16() as usize;
    ensure_remaining(blob, url_len)?;
    entity.model_url = std::str::from_utf8(&blob[..url_len])
        .map_err(|_| CodecError::InvalidUtf8)?
        .to_string();

    Ok((entity, ENTITY_FIXED_SIZE + blob_len))
}

// ============================================================================
// Edit records
// ============================================================================

/// A single entity edit addressed to the region it falls in.
#[derive(Debug, Clone, PartialEq)]
pub struct EditRecord {
    /// Region used to pick the authoritative server(s)
    pub address: OctalCode,
    pub entity: Entity,
}

impl EditRecord {
    pub fn new(address: OctalCode, entity: Entity) -> Self {
        Self { address, entity }
    }

    /// Builds a record addressed to the depth-`depth` region holding the
    /// entity's position.
    pub fn for_entity(entity: Entity, depth: usize, root_scale: f32) -> Self {
        let address = OctalCode::for_point(entity.position, depth, root_scale);
        Self { address, entity }
    }

    pub fn encoded_len(&self) -> usize {
        octal_code_len(&self.address) + entity_encoded_len(&self.entity)
    }

    pub fn write<B: BufMut>(&self, out: &mut B) {
        write_octal_code(&self.address, out);
        write_entity(&self.entity, out);
    }

    /// Writes the record with its `last_edited` stamp shifted into the
    /// receiving server's clock.
    pub fn write_with_skew<B: BufMut>(&self, skew_usec: i64, out: &mut B) {
        write_octal_code(&self.address, out);
        if skew_usec == 0 {
            write_entity(&self.entity, out);
        } else {
            let mut corrected = self.entity.clone();
            corrected.last_edited = apply_clock_skew(corrected.last_edited, skew_usec);
            write_entity(&corrected, out);
        }
    }

    pub fn read(data: &[u8]) -> Result<(Self, usize), CodecError> {
        let (address, code_len) = read_octal_code(data)?;
        let (entity, entity_len) = read_entity(&data[code_len..])?;
        Ok((Self { address, entity }, code_len + entity_len))
    }
}

/// Outcome of reading a counted run of items that may be cut short.
#[derive(Debug, Clone, PartialEq)]
pub struct CountedRead<T> {
    pub items: Vec<T>,
    /// Bytes of the input actually consumed, count prefix included
    pub bytes_read: usize,
    /// The count promised more items than could be decoded
    pub truncated: bool,
}

/// Reads a `u16` count followed by up to that many items, stopping at the
/// first item that would overrun `data`.
pub(crate) fn read_counted<T>(
    data: &[u8],
    mut read_item: impl FnMut(&[u8]) -> Result<(T, usize), CodecError>,
) -> CountedRead<T> {
    if data.len() < 2 {
        return CountedRead {
            items: Vec::new(),
            bytes_read: 0,
            truncated: true,
        };
    }
    let count = u16::from_be_bytes([data[0], data[1]]) as usize;
    let mut bytes_read = 2;
    let mut items = Vec::with_capacity(count.min(64));

    for _ in 0..count {
        match read_item(&data[bytes_read..]) {
            Ok((item, used)) => {
                items.push(item);
                bytes_read += used;
            }
            Err(_) => {
                return CountedRead {
                    items,
                    bytes_read,
                    truncated: true,
                };
            }
        }
    }

    CountedRead {
        items,
        bytes_read,
        truncated: false,
    }
}

/// Reads an edit packet payload: `u16` record count followed by records.
pub fn read_edit_records(payload: &[u8]) -> CountedRead<EditRecord> {
    read_counted(payload, EditRecord::read)
}

// ============================================================================
// Element data
// ============================================================================

/// Most entities one counted run can carry.
pub const MAX_ENTITY_RUN: usize = u16::MAX as usize;

/// Writes the `u16` count and every entity, the encoding shared by element
/// persistence and entity-data packets. Callers split longer sequences into
/// runs of at most [`MAX_ENTITY_RUN`]; anything past that is not written.
pub fn write_entities<'a, B: BufMut>(entities: impl ExactSizeIterator<Item = &'a Entity>, out: &mut B) {
    let count = entities.len().min(MAX_ENTITY_RUN);
    out.put_u16(count as u16);
    for entity in entities.take(count) {
        write_entity(entity, out);
    }
}

/// Reads a counted run of entities. Partial reads are reported, not failed.
pub fn read_entities(data: &[u8]) -> CountedRead<Entity> {
    read_counted(data, read_entity)
}

/// Entity-data payload: the element's address followed by its entities.
pub fn write_entity_data<'a, B: BufMut>(
    address: &OctalCode,
    entities: impl ExactSizeIterator<Item = &'a Entity>,
    out: &mut B,
) {
    write_octal_code(address, out);
    write_entities(entities, out);
}

pub fn read_entity_data(payload: &[u8]) -> Result<(OctalCode, CountedRead<Entity>), CodecError> {
    let (address, code_len) = read_octal_code(payload)?;
    let mut read = read_entities(&payload[code_len..]);
    read.bytes_read += code_len;
    Ok((address, read))
}

// ============================================================================
// Erase and confirmation payloads
// ============================================================================

pub fn write_erase_payload<B: BufMut>(ids: &[EntityId], out: &mut B) {
    let count = ids.len().min(u16::MAX as usize);
    out.put_u16(count as u16);
    for id in &ids[..count] {
        out.put_u32(id.0);
    }
}

pub fn read_erase_payload(payload: &[u8]) -> CountedRead<EntityId> {
    read_counted(payload, |data| {
        ensure_remaining(data, 4)?;
        let mut buf = data;
        Ok((EntityId(buf.get_u32()), 4))
    })
}

pub fn write_add_response<B: BufMut>(token: CreatorToken, id: EntityId, out: &mut B) {
    out.put_u32(token.0);
    out.put_u32(id.0);
}

pub fn read_add_response(payload: &[u8]) -> Result<(CreatorToken, EntityId), CodecError> {
    ensure_remaining(payload, 8)?;
    let mut buf = payload;
    Ok((CreatorToken(buf.get_u32()), EntityId(buf.get_u32())))
}

fn put_vec3<B: BufMut>(out: &mut B, v: Vec3) {
    out.put_f32(v.x);
    out.put_f32(v.y);
    out.put_f32(v.z);
}

fn get_vec3(buf: &mut &[u8]) -> Vec3 {
    Vec3::new(buf.get_f32(), buf.get_f32(), buf.get_f32())
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
