use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::core::{Error, Result};
use super::codec::Frame;
use super::header::next_sequence;

/// Acks buffered while the engine is between polls; anything beyond
/// this is dropped, as duplicates carry no information
const ACK_CHANNEL_CAPACITY: usize = 1;

/// Configuration for the reliable delivery engine
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Maximum number of retransmissions per payload
    pub max_retries: u32,
    /// Delay before an unacknowledged payload is retransmitted
    pub retry_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            max_retries: 4,
            retry_timeout: Duration::from_secs(4),
        }
    }
}

/// Observable state of the delivery engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// No payload pending
    Idle,
    /// A payload is in flight, waiting for its acknowledgment
    AwaitingAck,
}

/// Per-peer sender state
#[derive(Debug)]
struct ConnectionState {
    /// Payload currently in flight, if any
    pending_payload: Option<Bytes>,
    /// Sequence number the next send will be stamped with
    next_sequence_number: u8,
    /// Retransmissions left for the pending payload
    retries_remaining: u32,
    /// Highest sequence number acknowledged so far
    highest_acked: Option<u8>,
}

impl ConnectionState {
    fn new() -> Self {
        ConnectionState {
            pending_payload: None,
            next_sequence_number: 1,
            retries_remaining: 0,
            highest_acked: None,
        }
    }
}

/// Outcome of a reliable send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The peer acknowledged the payload
    Acked,
    /// The retry bound was reached without an acknowledgment
    RetriesExhausted,
}

/// Handle used by the receive path to feed acknowledgments to the engine
#[derive(Clone)]
pub struct AckHandle {
    ack_tx: mpsc::Sender<u8>,
}

impl AckHandle {
    /// Delivers an acknowledged sequence number to the engine.
    ///
    /// An ack that arrives while no send is waiting for it is dropped.
    pub fn deliver(&self, sequence_number: u8) {
        match self.ack_tx.try_send(sequence_number) {
            Ok(()) => {}
            Err(TrySendError::Full(seq)) | Err(TrySendError::Closed(seq)) => {
                debug!(sequence_number = seq, "Dropping ack, no send is waiting for it");
            }
        }
    }
}

/// Reliable delivery engine for a single peer.
///
/// Sends one payload at a time as a `Data` frame, retransmitting on a
/// timer until the matching ack arrives or the retry bound is reached.
/// There is no pipelining: a second send can only start once the
/// previous one has returned to idle.
pub struct DeliveryEngine {
    /// Peer every payload is sent to
    peer: SocketAddr,
    /// Channel to the transport
    frame_tx: mpsc::Sender<(Frame, SocketAddr)>,
    /// Incoming acknowledgments
    ack_rx: mpsc::Receiver<u8>,
    /// Sender-side connection state
    connection: ConnectionState,
    /// Configuration
    config: DeliveryConfig,
}

impl DeliveryEngine {
    /// Creates a new engine for `peer`, returning the handle the
    /// receive path uses to deliver acks
    pub fn new(
        peer: SocketAddr,
        frame_tx: mpsc::Sender<(Frame, SocketAddr)>,
        config: DeliveryConfig,
    ) -> (Self, AckHandle) {
        let (ack_tx, ack_rx) = mpsc::channel(ACK_CHANNEL_CAPACITY);
        let engine = DeliveryEngine {
            peer,
            frame_tx,
            ack_rx,
            connection: ConnectionState::new(),
            config,
        };
        (engine, AckHandle { ack_tx })
    }

    /// Returns the current engine state
    pub fn state(&self) -> DeliveryState {
        match self.connection.pending_payload {
            Some(_) => DeliveryState::AwaitingAck,
            None => DeliveryState::Idle,
        }
    }

    /// Returns the sequence number the next send will use
    pub fn next_sequence_number(&self) -> u8 {
        self.connection.next_sequence_number
    }

    /// Returns the highest sequence number acked so far
    pub fn highest_acked(&self) -> Option<u8> {
        self.connection.highest_acked
    }

    /// Sends a payload and waits until it is acknowledged or the retry
    /// bound is reached.
    ///
    /// Retry exhaustion is an outcome, not an error: the pending payload
    /// is abandoned and the sequence number is not advanced, so the next
    /// send reuses it.
    pub async fn send(&mut self, payload: Bytes) -> Result<SendOutcome> {
        // Acks left over from a previous exchange are stale
        while self.ack_rx.try_recv().is_ok() {}

        let sequence_number = self.connection.next_sequence_number;
        self.connection.pending_payload = Some(payload.clone());
        self.connection.retries_remaining = self.config.max_retries;

        debug!(
            peer = %self.peer,
            sequence_number,
            len = payload.len(),
            "Sending data frame"
        );
        self.transmit(sequence_number, payload.clone()).await?;
        let mut deadline = Instant::now() + self.config.retry_timeout;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    if self.connection.retries_remaining == 0 {
                        warn!(
                            peer = %self.peer,
                            sequence_number,
                            retries = self.config.max_retries,
                            "Payload was not acked after the configured retries, giving up"
                        );
                        self.connection.pending_payload = None;
                        return Ok(SendOutcome::RetriesExhausted);
                    }
                    debug!(peer = %self.peer, sequence_number, "Retransmission timer expired, resending");
                    self.connection.retries_remaining -= 1;
                    self.transmit(sequence_number, payload.clone()).await?;
                    deadline = Instant::now() + self.config.retry_timeout;
                }

                ack = self.ack_rx.recv() => {
                    let Some(acked) = ack else {
                        return Err(Error::transport("Ack channel closed"));
                    };
                    if acked == sequence_number {
                        debug!(peer = %self.peer, sequence_number, "Received the expected ack");
                        self.connection.highest_acked = Some(acked);
                        self.connection.next_sequence_number = next_sequence(sequence_number);
                        self.connection.pending_payload = None;
                        return Ok(SendOutcome::Acked);
                    }
                    if acked > sequence_number && sequence_number != 0 {
                        // Stale ack for an earlier packet; the one we
                        // want may still be on its way
                        debug!(
                            peer = %self.peer,
                            expected = sequence_number,
                            acked,
                            "Ack is ahead of the pending sequence number, keeping the timer"
                        );
                        continue;
                    }
                    if self.connection.retries_remaining == 0 {
                        warn!(
                            peer = %self.peer,
                            sequence_number,
                            retries = self.config.max_retries,
                            "Payload was not acked after the configured retries, giving up"
                        );
                        self.connection.pending_payload = None;
                        return Ok(SendOutcome::RetriesExhausted);
                    }
                    debug!(
                        peer = %self.peer,
                        expected = sequence_number,
                        acked,
                        "Unexpected ack, resending without waiting for the timer"
                    );
                    self.connection.retries_remaining -= 1;
                    self.transmit(sequence_number, payload.clone()).await?;
                    deadline = Instant::now() + self.config.retry_timeout;
                }
            }
        }
    }

    async fn transmit(&self, sequence_number: u8, payload: Bytes) -> Result<()> {
        let frame = Frame::Data {
            sequence_number,
            payload,
        };
        self.frame_tx
            .send((frame, self.peer))
            .await
            .map_err(|e| Error::transport(format!("Failed to queue frame: {}", e)))
    }
}
