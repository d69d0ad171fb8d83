use crate::codec::{EditRecord, PacketHeader, PacketType, COUNT_SIZE, HEADER_SIZE};
use crate::types::ServerId;
use bytes::{BufMut, Bytes, BytesMut};

/// Outbound packet being assembled for one destination server.
///
/// Holds a header and a `u16` record count that is patched in place as
/// records are appended. Every record in the buffer shares one packet type.
#[derive(Debug)]
pub struct EditPacketBuffer {
    destination: ServerId,
    packet_type: Option<PacketType>,
    bytes: BytesMut,
    record_count: u16,
}

impl EditPacketBuffer {
    pub fn new(destination: ServerId) -> Self {
        Self {
            destination,
            packet_type: None,
            bytes: BytesMut::new(),
            record_count: 0,
        }
    }

    pub fn destination(&self) -> ServerId {
        self.destination
    }

    /// Type of the records currently buffered, `None` when empty.
    pub fn packet_type(&self) -> Option<PacketType> {
        self.packet_type
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn record_count(&self) -> u16 {
        self.record_count
    }

    /// Current packet length, header and count included.
    pub fn len(&self) -> usize {
        if self.packet_type.is_none() {
            HEADER_SIZE + COUNT_SIZE
        } else {
            self.bytes.len()
        }
    }

    /// True if a record of `record_len` bytes can be appended without the
    /// packet exceeding `max_packet_size`.
    pub fn fits(&self, record_len: usize, max_packet_size: usize) -> bool {
        self.record_count < u16::MAX && self.len() + record_len <= max_packet_size
    }

    /// Discards any content and writes a fresh header for `packet_type`.
    pub fn start(&mut self, packet_type: PacketType, sequence: u16, timestamp: u64) {
        self.bytes.clear();
        PacketHeader::new(packet_type, sequence, timestamp).write(&mut self.bytes);
        self.bytes.put_u16(0);
        self.packet_type = Some(packet_type);
        self.record_count = 0;
    }

    /// Appends `record`, shifting its edit stamp by `skew_usec`. The buffer
    /// must have been started.
    pub fn append(&mut self, record: &EditRecord, skew_usec: i64) {
        record.write_with_skew(skew_usec, &mut self.bytes);
        self.record_count += 1;
        self.bytes[HEADER_SIZE..HEADER_SIZE + COUNT_SIZE].copy_from_slice(&self.record_count.to_be_bytes());
    }

    /// Takes the finished packet, leaving the buffer empty and untyped.
    pub fn take(&mut self) -> Option<Bytes> {
        if self.is_empty() {
            return None;
        }
        self.packet_type = None;
        self.record_count = 0;
        Some(self.bytes.split().freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_edit_records;
    use crate::store::Entity;
    use crate::types::{EntityId, Vec3};

    fn record(id: u32) -> EditRecord {
        EditRecord::for_entity(Entity::with_id(EntityId(id), Vec3::splat(1.0), 0.5), 4, 16.0)
    }

    #[test]
    fn test_count_is_patched_in_place() {
        let mut buffer = EditPacketBuffer::new(ServerId::new());
        assert!(buffer.take().is_none());

        buffer.start(PacketType::EditEntity, 7, 1_000);
        buffer.append(&record(1), 0);
        buffer.append(&record(2), 0);
        assert_eq!(buffer.len(), HEADER_SIZE + COUNT_SIZE + 2 * record(1).encoded_len());

        let packet = buffer.take().unwrap();
        let (header, payload) = PacketHeader::read(&packet).unwrap();
        assert_eq!(header.sequence, 7);
        assert_eq!(header.packet_type, PacketType::EditEntity);

        let read = read_edit_records(payload);
        assert!(!read.truncated);
        assert_eq!(read.items, vec![record(1), record(2)]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.packet_type(), None);
    }

    #[test]
    fn test_fits_accounts_for_header() {
        let buffer = EditPacketBuffer::new(ServerId::new());
        let len = record(1).encoded_len();
        assert!(buffer.fits(len, HEADER_SIZE + COUNT_SIZE + len));
        assert!(!buffer.fits(len, HEADER_SIZE + COUNT_SIZE + len - 1));
    }
}
