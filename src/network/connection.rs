use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::core::{Error, Result};
use crate::protocol::{Frame, FrameCodec};

/// Receive buffer size; generous compared to the largest legal frame so
/// oversized datagrams are decoded (and then rejected) rather than
/// silently truncated
const RECV_BUFFER_SIZE: usize = 2048;

/// Capacity of the outbound and inbound frame channels
const CHANNEL_CAPACITY: usize = 64;

/// Handle for queueing outbound frames
#[derive(Clone)]
pub struct ConnectionHandle {
    frame_tx: mpsc::Sender<(Frame, SocketAddr)>,
}

impl ConnectionHandle {
    /// Queues a frame for transmission to a peer
    pub async fn send_frame(&self, frame: Frame, addr: SocketAddr) -> Result<()> {
        self.frame_tx
            .send((frame, addr))
            .await
            .map_err(|e| Error::transport(format!("Failed to queue frame: {}", e)))
    }

    /// Returns the raw channel sender, for components wired by channel
    pub fn sender(&self) -> mpsc::Sender<(Frame, SocketAddr)> {
        self.frame_tx.clone()
    }
}

/// Datagram transport for protocol frames.
///
/// Owns the UDP socket and the frame codec; the run loop moves frames
/// between the socket and a pair of channels. Malformed datagrams are
/// dropped and logged, never terminating the loop.
pub struct UdpConnection {
    /// UDP socket for communication
    socket: UdpSocket,
    /// Frame codec
    codec: FrameCodec,
    /// Outbound frames queued by handles
    outbound_rx: mpsc::Receiver<(Frame, SocketAddr)>,
    /// Kept so `handle` can be called after construction
    outbound_tx: mpsc::Sender<(Frame, SocketAddr)>,
    /// Decoded inbound frames
    inbound_tx: mpsc::Sender<(Frame, SocketAddr)>,
}

impl UdpConnection {
    /// Binds a socket and returns the connection together with the
    /// channel inbound frames are dispatched on
    pub async fn bind(
        bind_addr: SocketAddr,
    ) -> Result<(Self, mpsc::Receiver<(Frame, SocketAddr)>)> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| Error::transport(format!("Failed to bind socket: {}", e)))?;

        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let connection = UdpConnection {
            socket,
            codec: FrameCodec::new(),
            outbound_rx,
            outbound_tx,
            inbound_tx,
        };
        Ok((connection, inbound_rx))
    }

    /// Returns a handle for queueing outbound frames
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            frame_tx: self.outbound_tx.clone(),
        }
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::transport(format!("Failed to get local address: {}", e)))
    }

    /// Runs the transport loop until the inbound consumer goes away
    pub async fn run(mut self) -> Result<()> {
        let mut send_buffer = BytesMut::new();
        let mut recv_buffer = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                Some((frame, addr)) = self.outbound_rx.recv() => {
                    send_buffer.clear();
                    if let Err(e) = self.codec.encode(frame, &mut send_buffer) {
                        warn!(peer = %addr, "Dropping unencodable frame: {}", e);
                        continue;
                    }
                    if let Err(e) = self.socket.send_to(&send_buffer, addr).await {
                        warn!(peer = %addr, "Failed to send frame: {}", e);
                    }
                }

                result = self.socket.recv_from(&mut recv_buffer) => {
                    let (len, addr) = match result {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("Failed to receive datagram: {}", e);
                            continue;
                        }
                    };
                    let mut datagram = BytesMut::from(&recv_buffer[..len]);
                    match self.codec.decode(&mut datagram) {
                        Ok(Some(frame)) => {
                            if self.inbound_tx.send((frame, addr)).await.is_err() {
                                debug!("Inbound consumer dropped, stopping transport loop");
                                return Ok(());
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(peer = %addr, "Dropping malformed datagram: {}", e);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_frame_delivery_between_endpoints() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let (conn_a, _inbound_a) = UdpConnection::bind(addr).await.unwrap();
        let (conn_b, mut inbound_b) = UdpConnection::bind(addr).await.unwrap();
        let addr_b = conn_b.local_addr().unwrap();

        let handle_a = conn_a.handle();
        let task_a = tokio::spawn(conn_a.run());
        let task_b = tokio::spawn(conn_b.run());

        let frame = Frame::Data {
            sequence_number: 1,
            payload: Bytes::from_static(&[0, 1, 2, 3]),
        };
        assert_ok!(handle_a.send_frame(frame.clone(), addr_b).await);

        let (received, _) = timeout(Duration::from_secs(5), inbound_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, frame);

        task_a.abort();
        task_b.abort();
    }
}
