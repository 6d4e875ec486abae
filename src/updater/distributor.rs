use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::{Cell, Error, NeighborId, Result};
use crate::protocol::{
    AckHandle, DeliveryConfig, DeliveryEngine, Frame, SendOutcome, UpdatePacket,
    MAX_CELLS_PER_PACKET,
};

/// Root-side view of the whole network's schedule: for every
/// destination node, the cells it must install per neighbor
#[derive(Debug, Default)]
pub struct NetworkSchedule {
    nodes: HashMap<SocketAddr, HashMap<NeighborId, Vec<Cell>>>,
}

impl NetworkSchedule {
    /// Creates an empty schedule
    pub fn new() -> Self {
        NetworkSchedule::default()
    }

    /// Adds a cell for `node` towards `neighbor`
    pub fn add_cell(&mut self, node: SocketAddr, neighbor: NeighborId, cell: Cell) {
        self.nodes
            .entry(node)
            .or_default()
            .entry(neighbor)
            .or_default()
            .push(cell);
    }

    /// Returns the destination nodes that have cells scheduled
    pub fn nodes(&self) -> Vec<SocketAddr> {
        self.nodes.keys().copied().collect()
    }

    /// Serializes a node's cells into update packets, chunked so no
    /// packet exceeds [`MAX_CELLS_PER_PACKET`]
    pub fn packets_for(&self, node: SocketAddr) -> Result<Vec<UpdatePacket>> {
        let cells_by_neighbor = self.nodes.get(&node).ok_or_else(|| {
            Error::schedule(format!("The node {} has no schedule associated with it", node))
        })?;

        let mut packets = Vec::new();
        for (neighbor, cells) in cells_by_neighbor {
            for chunk in cells.chunks(MAX_CELLS_PER_PACKET) {
                packets.push(UpdatePacket::update(*neighbor, chunk.to_vec()));
            }
        }
        Ok(packets)
    }
}

/// Routes inbound acks to the delivery engine of the peer they came from
#[derive(Clone, Default)]
pub struct AckRouter {
    routes: Arc<Mutex<HashMap<SocketAddr, AckHandle>>>,
}

impl AckRouter {
    /// Creates an empty router
    pub fn new() -> Self {
        AckRouter::default()
    }

    /// Registers the ack handle for a peer
    pub fn register(&self, peer: SocketAddr, handle: AckHandle) {
        self.routes.lock().unwrap().insert(peer, handle);
    }

    /// Delivers an acked sequence number to the engine for `peer`
    pub fn deliver(&self, peer: SocketAddr, sequence_number: u8) {
        match self.routes.lock().unwrap().get(&peer) {
            Some(handle) => handle.deliver(sequence_number),
            None => {
                debug!(peer = %peer, sequence_number, "Dropping ack from unknown peer");
            }
        }
    }
}

/// Per-node outcome of a distribution round
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Nodes that acked their whole round, update-complete included
    pub delivered: Vec<SocketAddr>,
    /// Nodes abandoned after retry exhaustion or a transport error
    pub failed: Vec<SocketAddr>,
}

/// Sends a network schedule to every node, reliably.
///
/// Each node gets its `Update` packets followed by one
/// `UpdateComplete`, carried by a per-peer delivery engine so a single
/// payload is in flight per node. A node that stops acking is abandoned
/// for the round and the remaining nodes are still served.
pub struct Distributor {
    /// Channel to the transport
    frame_tx: mpsc::Sender<(Frame, SocketAddr)>,
    /// Delivery configuration shared by all engines
    config: DeliveryConfig,
    /// One delivery engine per destination node
    engines: HashMap<SocketAddr, DeliveryEngine>,
    /// Ack dispatch for the transport's receive path
    router: AckRouter,
}

impl Distributor {
    /// Creates a distributor sending frames through `frame_tx`
    pub fn new(frame_tx: mpsc::Sender<(Frame, SocketAddr)>, config: DeliveryConfig) -> Self {
        Distributor {
            frame_tx,
            config,
            engines: HashMap::new(),
            router: AckRouter::new(),
        }
    }

    /// Returns the router inbound ack frames must be fed through
    pub fn router(&self) -> AckRouter {
        self.router.clone()
    }

    /// Distributes the schedule to every node it names
    pub async fn distribute(&mut self, schedule: &NetworkSchedule) -> DistributionReport {
        let mut report = DistributionReport::default();

        for node in schedule.nodes() {
            match self.distribute_to(node, schedule).await {
                Ok(true) => report.delivered.push(node),
                Ok(false) => {
                    warn!(node = %node, "Node stopped acking, abandoning its round");
                    report.failed.push(node);
                }
                Err(e) => {
                    warn!(node = %node, "Failed to distribute the schedule: {}", e);
                    report.failed.push(node);
                }
            }
        }

        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Distribution round finished"
        );
        report
    }

    async fn distribute_to(
        &mut self,
        node: SocketAddr,
        schedule: &NetworkSchedule,
    ) -> Result<bool> {
        let mut packets = schedule.packets_for(node)?;
        packets.push(UpdatePacket::complete());
        debug!(node = %node, packets = packets.len(), "Sending schedule update round");

        let engine = self.engine_for(node);
        for packet in packets {
            let payload = packet.encode()?;
            match engine.send(payload).await? {
                SendOutcome::Acked => {}
                SendOutcome::RetriesExhausted => return Ok(false),
            }
        }
        Ok(true)
    }

    fn engine_for(&mut self, node: SocketAddr) -> &mut DeliveryEngine {
        let (frame_tx, config, router) = (&self.frame_tx, &self.config, &self.router);
        self.engines.entry(node).or_insert_with(|| {
            let (engine, ack) = DeliveryEngine::new(node, frame_tx.clone(), config.clone());
            router.register(node, ack);
            engine
        })
    }
}
