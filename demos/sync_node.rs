use std::time::Duration;

use schedsync::core::{Cell, Config, LinkOptions, NeighborId};
use schedsync::network::UdpConnection;
use schedsync::protocol::{DeliveryConfig, DeliveryEngine, Frame};
use schedsync::updater::{Distributor, NetworkSchedule, SlotframeStore, SyncNode};
use tokio::time::timeout;

#[tokio::main]
async fn main() -> schedsync::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Short intervals so the demo finishes quickly; a deployment would
    // keep the defaults (4 s retries, 1 h guard)
    let mut config = Config::default();
    config.bind_addr = "127.0.0.1:0".parse().unwrap();
    config.guard_delay = Duration::from_secs(2);

    // Mesh node: transport loop + schedule sync event loop
    let (node_conn, node_inbound) = UdpConnection::bind(config.bind_addr).await?;
    let node_addr = node_conn.local_addr()?;
    let node_handle = node_conn.handle();
    tokio::spawn(node_conn.run());

    let (_engine, ack) = DeliveryEngine::new(
        config.root_addr,
        node_handle.sender(),
        DeliveryConfig::default(),
    );
    let mut node = SyncNode::new(
        &config,
        SlotframeStore::new(),
        node_inbound,
        node_handle.sender(),
        ack,
    )?;
    println!("Node listening on {}", node_addr);

    let node_task = tokio::spawn(async move {
        // Give the node enough time to receive the round and swap
        let _ = timeout(Duration::from_secs(5), node.run()).await;
        node
    });

    // Root node: transport loop + distributor, with inbound acks routed
    // to the per-node delivery engines
    let (root_conn, mut root_inbound) = UdpConnection::bind("127.0.0.1:0".parse().unwrap()).await?;
    let root_addr = root_conn.local_addr()?;
    let root_handle = root_conn.handle();
    tokio::spawn(root_conn.run());

    let mut distributor = Distributor::new(
        root_handle.sender(),
        DeliveryConfig {
            max_retries: 4,
            retry_timeout: Duration::from_secs(1),
        },
    );
    let router = distributor.router();
    tokio::spawn(async move {
        while let Some((frame, addr)) = root_inbound.recv().await {
            if let Frame::Ack { sequence_number } = frame {
                router.deliver(addr, sequence_number);
            }
        }
    });
    println!("Root distributing from {}", root_addr);

    // A small schedule: three cells towards one neighbor
    let neighbor = NeighborId::new([0, 2, 0, 2, 0, 2, 0, 2]);
    let mut schedule = NetworkSchedule::new();
    schedule.add_cell(node_addr, neighbor, Cell::new(LinkOptions::TX, 3, 1));
    schedule.add_cell(node_addr, neighbor, Cell::new(LinkOptions::RX, 4, 1));
    schedule.add_cell(
        node_addr,
        neighbor,
        Cell::new(LinkOptions::TX | LinkOptions::SHARED, 7, 2),
    );

    let report = distributor.distribute(&schedule).await;
    println!(
        "Distribution round finished: {} delivered, {} failed",
        report.delivered.len(),
        report.failed.len()
    );

    // The swap happens once the guard interval has passed
    let node = node_task.await.expect("node task panicked");
    let active = node.schedule().active();
    println!("Active slotframe after the swap: handle {}", active.value());
    let slotframe = node
        .schedule()
        .store()
        .slotframe(active)
        .expect("active slotframe must exist");
    for link in slotframe.links() {
        println!(
            "  link to {}: timeslot {}, channel {}, options {:#06b}",
            link.neighbor,
            link.timeslot,
            link.channel,
            link.options.bits()
        );
    }

    Ok(())
}
