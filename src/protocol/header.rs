use crate::core::{Error, Result};

/// Maximum representable sequence number (6-bit field)
pub const SEQUENCE_NUMBER_MAX: u8 = 0b0011_1111;

const PACKET_TYPE_SHIFT: u8 = 6;
const PACKET_TYPE_MASK: u8 = 0b1100_0000;
const SEQUENCE_NUMBER_MASK: u8 = 0b0011_1111;

/// Frame type carried in the two high bits of the header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Data frame that must be acknowledged
    Data = 0,
    /// Data frame that is not acknowledged
    DataNoAck = 1,
    /// Acknowledgment frame
    Ack = 2,
}

impl PacketType {
    fn from_bits(bits: u8) -> Result<PacketType> {
        match bits {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::DataNoAck),
            2 => Ok(PacketType::Ack),
            other => Err(Error::codec(format!("Unknown packet type tag: {}", other))),
        }
    }
}

/// Packs a packet type and sequence number into a single header byte.
///
/// The header has the following structure:
///
/// ```text
/// 0b01 000111
///   ^  ^^^^^^
///   |  |
///   |  +-- Sequence number (low 6 bits)
///   +----- Packet type (high 2 bits)
/// ```
///
/// Fails without writing anything if the sequence number does not fit in
/// the 6-bit field.
pub fn encode(packet_type: PacketType, sequence_number: u8) -> Result<u8> {
    if sequence_number > SEQUENCE_NUMBER_MAX {
        return Err(Error::sequence(format!(
            "The sequence number {} is greater than the maximum sequence number {}",
            sequence_number, SEQUENCE_NUMBER_MAX
        )));
    }
    Ok(((packet_type as u8) << PACKET_TYPE_SHIFT) | sequence_number)
}

/// Unpacks a header byte into its packet type and sequence number
pub fn decode(header: u8) -> Result<(PacketType, u8)> {
    let packet_type = PacketType::from_bits((header & PACKET_TYPE_MASK) >> PACKET_TYPE_SHIFT)?;
    Ok((packet_type, header & SEQUENCE_NUMBER_MASK))
}

/// Advances a sequence number, wrapping within the 6-bit space
pub fn next_sequence(sequence_number: u8) -> u8 {
    if sequence_number >= SEQUENCE_NUMBER_MAX {
        0
    } else {
        sequence_number + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_valid_pairs() {
        for packet_type in [PacketType::Data, PacketType::DataNoAck, PacketType::Ack] {
            for seq in 0..=SEQUENCE_NUMBER_MAX {
                let header = encode(packet_type, seq).unwrap();
                assert_eq!(decode(header).unwrap(), (packet_type, seq));
            }
        }
    }

    #[test]
    fn test_encode_rejects_out_of_range_sequence() {
        let err = encode(PacketType::Data, SEQUENCE_NUMBER_MAX + 1);
        assert!(matches!(err, Err(Error::Sequence(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_type_tag() {
        // Tag 0b11 is unassigned
        let err = decode(0b1100_0001);
        assert!(matches!(err, Err(Error::Codec(_))));
    }

    #[test]
    fn test_known_layout() {
        // Ack with sequence number 7 must be 0b10_000111
        assert_eq!(encode(PacketType::Ack, 7).unwrap(), 0b1000_0111);
    }

    #[test]
    fn test_next_sequence_wraps() {
        assert_eq!(next_sequence(0), 1);
        assert_eq!(next_sequence(SEQUENCE_NUMBER_MAX - 1), SEQUENCE_NUMBER_MAX);
        assert_eq!(next_sequence(SEQUENCE_NUMBER_MAX), 0);
    }
}
