use std::net::SocketAddr;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::{Error, Result, MAX_PACKET_SIZE};
use crate::protocol::header::next_sequence;
use crate::protocol::{AckHandle, Frame, UpdateKind, UpdatePacket};

/// Largest update payload worth buffering: a full frame minus its header
const MAX_UPDATE_PAYLOAD: usize = MAX_PACKET_SIZE - 1;

/// Fixed-capacity buffer of decoded updates awaiting the next swap.
///
/// Appended to by the receiver, drained in arrival order by the swap
/// controller; excess updates are dropped, never queued.
#[derive(Debug)]
pub struct PendingUpdateBuffer {
    updates: Vec<UpdatePacket>,
    capacity: usize,
}

impl PendingUpdateBuffer {
    /// Creates an empty buffer holding at most `capacity` updates
    pub fn new(capacity: usize) -> Self {
        PendingUpdateBuffer {
            updates: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an update, failing when the buffer is full
    pub fn push(&mut self, packet: UpdatePacket) -> Result<()> {
        if self.updates.len() >= self.capacity {
            return Err(Error::capacity(format!(
                "Pending update buffer is full ({} updates)",
                self.capacity
            )));
        }
        self.updates.push(packet);
        Ok(())
    }

    /// Takes all buffered updates, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<UpdatePacket> {
        std::mem::take(&mut self.updates)
    }

    /// Drops all buffered updates
    pub fn clear(&mut self) {
        self.updates.clear();
    }

    /// Returns the number of buffered updates
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Returns whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Returns the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Event surfaced to the node loop after a frame is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// An update was appended to the pending buffer
    UpdateBuffered,
    /// An update-complete marker arrived; the guard timer should be armed
    CompleteReceived,
}

/// Demultiplexes inbound frames and batches update payloads.
///
/// Ack frames are forwarded to the delivery engine; data frames pass
/// through duplicate suppression against a single upstream sender, get
/// acknowledged, and their payloads are decoded and buffered. The
/// receiver applies nothing itself.
pub struct UpdateReceiver {
    /// Channel to the transport, for outgoing acks
    frame_tx: mpsc::Sender<(Frame, SocketAddr)>,
    /// Ack path into the local delivery engine
    ack: AckHandle,
    /// Sequence number the next data frame is expected to carry
    expected_sequence_number: u8,
    /// Updates awaiting the next swap
    buffer: PendingUpdateBuffer,
}

impl UpdateReceiver {
    /// Creates a receiver with the given pending-buffer capacity
    pub fn new(
        frame_tx: mpsc::Sender<(Frame, SocketAddr)>,
        ack: AckHandle,
        pending_capacity: usize,
    ) -> Self {
        UpdateReceiver {
            frame_tx,
            ack,
            expected_sequence_number: 1,
            buffer: PendingUpdateBuffer::new(pending_capacity),
        }
    }

    /// Returns the pending update buffer
    pub fn buffer_mut(&mut self) -> &mut PendingUpdateBuffer {
        &mut self.buffer
    }

    /// Handles one inbound frame from `peer`
    pub async fn handle_frame(
        &mut self,
        frame: Frame,
        peer: SocketAddr,
    ) -> Result<Option<ReceiverEvent>> {
        match frame {
            Frame::Ack { sequence_number } => {
                self.ack.deliver(sequence_number);
                Ok(None)
            }

            Frame::DataNoAck { payload } => Ok(self.process_payload(&payload)),

            Frame::Data {
                sequence_number,
                payload,
            } => {
                if sequence_number == self.expected_sequence_number {
                    self.send_ack(sequence_number, peer).await?;
                    self.expected_sequence_number = next_sequence(sequence_number);
                    return Ok(self.process_payload(&payload));
                }
                if sequence_number > self.expected_sequence_number
                    && self.expected_sequence_number != 0
                {
                    // A later packet arrived first; wait for the
                    // missing ones instead of acking out of order
                    warn!(
                        peer = %peer,
                        expected = self.expected_sequence_number,
                        sequence_number,
                        "Sequence number is ahead of the expected one, waiting"
                    );
                    return Ok(None);
                }
                // Already processed; the ack may have been lost, so
                // send it again but do not reprocess the payload
                debug!(
                    peer = %peer,
                    sequence_number,
                    "Already received this sequence number, re-sending the ack"
                );
                self.send_ack(sequence_number, peer).await?;
                Ok(None)
            }
        }
    }

    fn process_payload(&mut self, payload: &[u8]) -> Option<ReceiverEvent> {
        if payload.len() > MAX_UPDATE_PAYLOAD {
            warn!(
                len = payload.len(),
                max = MAX_UPDATE_PAYLOAD,
                "Dropping update larger than the storable packet size"
            );
            return None;
        }
        let packet = match UpdatePacket::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping malformed update payload: {}", e);
                return None;
            }
        };

        match packet.kind {
            UpdateKind::Update => match self.buffer.push(packet) {
                Ok(()) => {
                    debug!(buffered = self.buffer.len(), "Buffered schedule update");
                    Some(ReceiverEvent::UpdateBuffered)
                }
                Err(e) => {
                    warn!("Dropping update: {}", e);
                    None
                }
            },
            UpdateKind::UpdateComplete => {
                debug!("Received update-complete marker");
                Some(ReceiverEvent::CompleteReceived)
            }
        }
    }

    async fn send_ack(&self, sequence_number: u8, peer: SocketAddr) -> Result<()> {
        self.frame_tx
            .send((Frame::Ack { sequence_number }, peer))
            .await
            .map_err(|e| Error::transport(format!("Failed to queue ack: {}", e)))
    }
}
