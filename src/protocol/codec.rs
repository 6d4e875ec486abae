use bytes::{Buf, Bytes, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, Result};
use super::header::{self, PacketType};

/// A typed frame, decoded from one datagram.
///
/// Demultiplexing by packet type happens here, at the transport
/// boundary, so components downstream only ever see tagged variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Acknowledged data frame
    Data {
        /// Sequence number assigned by the sender
        sequence_number: u8,
        /// Payload bytes following the header
        payload: Bytes,
    },
    /// Unacknowledged data frame
    DataNoAck {
        /// Payload bytes following the header
        payload: Bytes,
    },
    /// Acknowledgment for a data frame
    Ack {
        /// Sequence number being acknowledged
        sequence_number: u8,
    },
}

/// Frame codec: one datagram in, one typed frame out
#[derive(Clone, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new frame codec
    pub fn new() -> Self {
        FrameCodec
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        let header = src.get_u8();
        let (packet_type, sequence_number) = header::decode(header)?;
        let payload = src.split_to(src.len()).freeze();

        let frame = match packet_type {
            PacketType::Data => Frame::Data {
                sequence_number,
                payload,
            },
            PacketType::DataNoAck => Frame::DataNoAck { payload },
            PacketType::Ack => Frame::Ack { sequence_number },
        };
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        match item {
            Frame::Data {
                sequence_number,
                payload,
            } => {
                dst.put_u8(header::encode(PacketType::Data, sequence_number)?);
                dst.extend_from_slice(&payload);
            }
            Frame::DataNoAck { payload } => {
                dst.put_u8(header::encode(PacketType::DataNoAck, 0)?);
                dst.extend_from_slice(&payload);
            }
            Frame::Ack { sequence_number } => {
                dst.put_u8(header::encode(PacketType::Ack, sequence_number)?);
            }
        }
        Ok(())
    }
}
