use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::{Cell, Error, LinkOptions, NeighborId, Result};

/// Maximum number of cells carried by a single update packet
pub const MAX_CELLS_PER_PACKET: usize = 20;

/// Bytes occupied by kind, neighbor identifier and cell count
const FIXED_FIELDS_SIZE: usize = 1 + 8 + 1;

/// Bytes occupied by one encoded cell
const CELL_SIZE: usize = 1 + 2 + 2;

/// Kind of a schedule update message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Carries cells to stage for the next schedule
    Update = 0,
    /// Marks the end of a distribution round
    UpdateComplete = 1,
}

impl UpdateKind {
    fn from_byte(byte: u8) -> Result<UpdateKind> {
        match byte {
            0 => Ok(UpdateKind::Update),
            1 => Ok(UpdateKind::UpdateComplete),
            other => Err(Error::codec(format!("Unknown update kind: {}", other))),
        }
    }
}

/// A schedule update payload.
///
/// Wire layout, in order: kind (1 byte), neighbor identifier (8 bytes),
/// cell count (1 byte), then each cell as link options (1 byte),
/// timeslot (2 bytes LE) and channel (2 bytes LE). There is no length
/// prefix beyond the cell count; callers must validate the datagram
/// length against [`UpdatePacket::size_needed`] before trusting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePacket {
    /// Message kind
    pub kind: UpdateKind,
    /// Neighbor the cells refer to
    pub neighbor: NeighborId,
    /// Cells to add, in order
    pub cells: Vec<Cell>,
}

impl UpdatePacket {
    /// Creates an update packet carrying cells for a neighbor
    pub fn update(neighbor: NeighborId, cells: Vec<Cell>) -> Self {
        UpdatePacket {
            kind: UpdateKind::Update,
            neighbor,
            cells,
        }
    }

    /// Creates an update-complete marker packet
    pub fn complete() -> Self {
        UpdatePacket {
            kind: UpdateKind::UpdateComplete,
            neighbor: NeighborId::new([0; 8]),
            cells: Vec::new(),
        }
    }

    /// Returns the exact number of bytes `encode` will produce
    pub fn size_needed(&self) -> usize {
        FIXED_FIELDS_SIZE + CELL_SIZE * self.cells.len()
    }

    /// Encodes the packet into a fresh buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.size_needed());
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Encodes the packet, appending to `dst`.
    ///
    /// Fails without writing anything if the cell count exceeds
    /// [`MAX_CELLS_PER_PACKET`].
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.cells.len() > MAX_CELLS_PER_PACKET {
            return Err(Error::capacity(format!(
                "Update packet holds {} cells, maximum is {}",
                self.cells.len(),
                MAX_CELLS_PER_PACKET
            )));
        }

        dst.put_u8(self.kind as u8);
        dst.put_slice(self.neighbor.as_bytes());
        dst.put_u8(self.cells.len() as u8);
        for cell in &self.cells {
            dst.put_u8(cell.link_options.bits());
            dst.put_u16_le(cell.timeslot);
            dst.put_u16_le(cell.channel);
        }
        Ok(())
    }

    /// Decodes a packet from raw bytes.
    ///
    /// Fails with a truncation error if the slice is shorter than the
    /// length implied by its own cell-count field.
    pub fn decode(src: &[u8]) -> Result<UpdatePacket> {
        if src.len() < FIXED_FIELDS_SIZE {
            return Err(Error::codec(format!(
                "Truncated packet: {} bytes, need at least {}",
                src.len(),
                FIXED_FIELDS_SIZE
            )));
        }

        let mut buf = src;
        let kind = UpdateKind::from_byte(buf.get_u8())?;
        let mut neighbor = [0u8; 8];
        buf.copy_to_slice(&mut neighbor);
        let cell_count = buf.get_u8() as usize;

        if cell_count > MAX_CELLS_PER_PACKET {
            return Err(Error::codec(format!(
                "Cell count {} exceeds the maximum of {}",
                cell_count, MAX_CELLS_PER_PACKET
            )));
        }
        if buf.remaining() < CELL_SIZE * cell_count {
            return Err(Error::codec(format!(
                "Truncated packet: cell count {} implies {} more bytes, got {}",
                cell_count,
                CELL_SIZE * cell_count,
                buf.remaining()
            )));
        }

        let mut cells = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            let link_options = LinkOptions(buf.get_u8());
            let timeslot = buf.get_u16_le();
            let channel = buf.get_u16_le();
            cells.push(Cell::new(link_options, timeslot, channel));
        }

        Ok(UpdatePacket {
            kind,
            neighbor: NeighborId::new(neighbor),
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> UpdatePacket {
        UpdatePacket::update(
            NeighborId::new([0, 2, 0, 2, 0, 2, 0, 2]),
            vec![
                Cell::new(LinkOptions::TX, 5, 3),
                Cell::new(LinkOptions::RX | LinkOptions::SHARED, 11, 1),
            ],
        )
    }

    #[test]
    fn test_round_trip() {
        let packet = sample_packet();
        let bytes = packet.encode().unwrap();
        let decoded = UpdatePacket::decode(&bytes).unwrap();

        assert_eq!(decoded.kind, packet.kind);
        assert_eq!(decoded.neighbor, packet.neighbor);
        assert_eq!(decoded.cells, packet.cells);
    }

    #[test]
    fn test_size_needed_matches_encoded_length() {
        let packet = sample_packet();
        assert_eq!(packet.encode().unwrap().len(), packet.size_needed());

        let complete = UpdatePacket::complete();
        assert_eq!(complete.encode().unwrap().len(), complete.size_needed());
    }

    #[test]
    fn test_wire_layout() {
        let packet = UpdatePacket::update(
            NeighborId::new([1, 2, 3, 4, 5, 6, 7, 8]),
            vec![Cell::new(LinkOptions::TX, 0x0105, 0x0003)],
        );
        let bytes = packet.encode().unwrap();

        assert_eq!(bytes[0], 0); // kind
        assert_eq!(&bytes[1..9], &[1, 2, 3, 4, 5, 6, 7, 8]); // neighbor
        assert_eq!(bytes[9], 1); // cell count
        assert_eq!(bytes[10], 0x01); // link options
        assert_eq!(&bytes[11..13], &[0x05, 0x01]); // timeslot LE
        assert_eq!(&bytes[13..15], &[0x03, 0x00]); // channel LE
    }

    #[test]
    fn test_decode_truncated_packet() {
        let packet = sample_packet();
        let bytes = packet.encode().unwrap();

        // Cell count promises two cells but the last byte is missing
        let err = UpdatePacket::decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(err, Err(Error::Codec(_))));

        // Shorter than the fixed fields
        let err = UpdatePacket::decode(&bytes[..5]);
        assert!(matches!(err, Err(Error::Codec(_))));
    }

    #[test]
    fn test_encode_rejects_too_many_cells() {
        let cells = vec![Cell::new(LinkOptions::TX, 0, 0); MAX_CELLS_PER_PACKET + 1];
        let packet = UpdatePacket::update(NeighborId::new([0; 8]), cells);
        assert!(matches!(packet.encode(), Err(Error::Capacity(_))));
    }

    #[test]
    fn test_decode_rejects_excessive_cell_count() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(0);
        bytes.put_slice(&[0; 8]);
        bytes.put_u8(MAX_CELLS_PER_PACKET as u8 + 1);
        bytes.put_slice(&[0; CELL_SIZE * (MAX_CELLS_PER_PACKET + 1)]);

        assert!(matches!(UpdatePacket::decode(&bytes), Err(Error::Codec(_))));
    }
}
