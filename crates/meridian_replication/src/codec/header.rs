//! Fixed packet header: type, sequence number, origin timestamp.

use super::error::{ensure_remaining, CodecError};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Size in bytes of every packet header: `u8` type, `u16` sequence, `u64` timestamp.
pub const HEADER_SIZE: usize = 1 + 2 + 8;

/// Kinds of packet exchanged between editors, replicas and entity servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Server to replica: one element's worth of entities
    EntityData,
    /// Editor to server: creation of new entities
    AddEntity,
    /// Editor to server: changes to existing entities
    EditEntity,
    /// Editor to server, or server to replica: entity removal by id
    EraseEntities,
    /// Server to editor: creator token confirmed with a server id
    AddEntityResponse,
}

impl PacketType {
    pub fn to_byte(self) -> u8 {
        match self {
            PacketType::EntityData => 1,
            PacketType::AddEntity => 2,
            PacketType::EditEntity => 3,
            PacketType::EraseEntities => 4,
            PacketType::AddEntityResponse => 5,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            1 => Ok(PacketType::EntityData),
            2 => Ok(PacketType::AddEntity),
            3 => Ok(PacketType::EditEntity),
            4 => Ok(PacketType::EraseEntities),
            5 => Ok(PacketType::AddEntityResponse),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }

    /// Edit records of this type may be concatenated into a shared packet.
    pub fn is_packable(self) -> bool {
        matches!(self, PacketType::AddEntity | PacketType::EditEntity)
    }
}

/// Header written at the front of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    /// Diagnostic counter, wraps
    pub sequence: u16,
    /// Origin time in microseconds, before any clock-skew correction
    pub timestamp: u64,
}

impl PacketHeader {
    pub fn new(packet_type: PacketType, sequence: u16, timestamp: u64) -> Self {
        Self {
            packet_type,
            sequence,
            timestamp,
        }
    }

    pub fn write<B: BufMut>(&self, out: &mut B) {
        out.put_u8(self.packet_type.to_byte());
        out.put_u16(self.sequence);
        out.put_u64(self.timestamp);
    }

    /// Reads a header from the front of `data`, returning it together with the
    /// remaining payload.
    pub fn read(data: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        ensure_remaining(data, HEADER_SIZE)?;
        let mut buf = data;
        let packet_type = PacketType::from_byte(buf.get_u8())?;
        let sequence = buf.get_u16();
        let timestamp = buf.get_u64();
        Ok((
            Self {
                packet_type,
                sequence,
                timestamp,
            },
            buf,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_layout_is_big_endian() {
        let mut out = BytesMut::new();
        PacketHeader::new(PacketType::EditEntity, 0x0102, 0x0A0B_0C0D_0E0F_1011).write(&mut out);
        assert_eq!(out.len(), HEADER_SIZE);
        assert_eq!(
            &out[..],
            &[3, 0x01, 0x02, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11]
        );
    }

    #[test]
    fn test_header_read_returns_payload() {
        let mut out = BytesMut::new();
        PacketHeader::new(PacketType::EraseEntities, 7, 99).write(&mut out);
        out.extend_from_slice(&[0xAA, 0xBB]);

        let (header, payload) = PacketHeader::read(&out).expect("header should parse");
        assert_eq!(header.packet_type, PacketType::EraseEntities);
        assert_eq!(header.sequence, 7);
        assert_eq!(header.timestamp, 99);
        assert_eq!(payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_header_rejects_short_and_unknown() {
        assert!(matches!(
            PacketHeader::read(&[3, 0, 1]),
            Err(CodecError::Truncated { needed: HEADER_SIZE, remaining: 3 })
        ));
        let bogus = [42u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(PacketHeader::read(&bogus), Err(CodecError::UnknownPacketType(42)));
    }
}
