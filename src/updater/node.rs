use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::core::{Config, Result};
use crate::protocol::{AckHandle, Frame};
use super::receiver::{ReceiverEvent, UpdateReceiver};
use super::store::ScheduleStore;
use super::swap::SwapController;

/// Schedule synchronization node.
///
/// Single-task event loop tying the pieces together: inbound frames go
/// through the update receiver, an update-complete marker arms the
/// guard timer, and the timer's expiry triggers the schedule swap. All
/// shared state is owned here, so no locking is needed: the buffer
/// writer and drainer can never run concurrently.
pub struct SyncNode<S> {
    /// Inbound frames from the transport
    frame_rx: mpsc::Receiver<(Frame, SocketAddr)>,
    /// Frame demux and update batching
    receiver: UpdateReceiver,
    /// Schedule swap controller
    swap: SwapController<S>,
    /// Delay between update-complete and the swap
    guard_delay: Duration,
    /// Expiry of the armed guard timer, if any
    guard_deadline: Option<Instant>,
}

impl<S: ScheduleStore> SyncNode<S> {
    /// Creates a node, allocating its initial active schedule
    pub fn new(
        config: &Config,
        store: S,
        frame_rx: mpsc::Receiver<(Frame, SocketAddr)>,
        frame_tx: mpsc::Sender<(Frame, SocketAddr)>,
        ack: AckHandle,
    ) -> Result<Self> {
        let swap = SwapController::new(store, config.slotframe_length)?;
        let receiver = UpdateReceiver::new(frame_tx, ack, config.pending_capacity);
        Ok(SyncNode {
            frame_rx,
            receiver,
            swap,
            guard_delay: config.guard_delay,
            guard_deadline: None,
        })
    }

    /// Returns the swap controller, giving access to the live schedule
    pub fn schedule(&self) -> &SwapController<S> {
        &self.swap
    }

    /// Runs the event loop until the transport goes away
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.guard_deadline {
                None => {
                    let Some((frame, peer)) = self.frame_rx.recv().await else {
                        return Ok(());
                    };
                    self.handle_frame(frame, peer).await?;
                }
                Some(deadline) => {
                    tokio::select! {
                        received = self.frame_rx.recv() => {
                            let Some((frame, peer)) = received else {
                                return Ok(());
                            };
                            self.handle_frame(frame, peer).await?;
                        }

                        _ = sleep_until(deadline) => {
                            self.guard_deadline = None;
                            if let Err(e) = self.swap.swap(self.receiver.buffer_mut()) {
                                error!("Schedule swap failed, keeping the old schedule: {}", e);
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame, peer: SocketAddr) -> Result<()> {
        if let Some(ReceiverEvent::CompleteReceived) =
            self.receiver.handle_frame(frame, peer).await?
        {
            if self.guard_deadline.is_some() {
                debug!("Guard timer already armed, ignoring extra update-complete");
            } else {
                info!(delay = ?self.guard_delay, "Update round complete, arming the swap guard timer");
                self.guard_deadline = Some(Instant::now() + self.guard_delay);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Cell, LinkOptions, NeighborId, SlotframeHandle};
    use crate::protocol::{DeliveryConfig, DeliveryEngine, UpdatePacket};
    use crate::updater::store::{ScheduleStore, SlotframeStore};
    use tokio::time::timeout;

    fn peer() -> SocketAddr {
        "127.0.0.1:3000".parse().unwrap()
    }

    fn test_config(pending_capacity: usize) -> Config {
        Config {
            guard_delay: Duration::from_secs(1),
            pending_capacity,
            ..Config::default()
        }
    }

    fn update_frame(sequence_number: u8, timeslot: u16) -> Frame {
        Frame::Data {
            sequence_number,
            payload: UpdatePacket::update(
                NeighborId::new([0, 2, 0, 2, 0, 2, 0, 2]),
                vec![Cell::new(LinkOptions::TX, timeslot, 3)],
            )
            .encode()
            .unwrap(),
        }
    }

    fn complete_frame(sequence_number: u8) -> Frame {
        Frame::Data {
            sequence_number,
            payload: UpdatePacket::complete().encode().unwrap(),
        }
    }

    async fn run_until_idle(node: &mut SyncNode<SlotframeStore>) {
        // The inbound channel stays open, so run() only stops when the
        // test's deadline cancels it; paused time skips straight there
        let _ = timeout(Duration::from_secs(60), node.run()).await;
    }

    fn test_node(
        pending_capacity: usize,
    ) -> (
        SyncNode<SlotframeStore>,
        mpsc::Sender<(Frame, SocketAddr)>,
        mpsc::Receiver<(Frame, SocketAddr)>,
    ) {
        let (in_tx, in_rx) = mpsc::channel(32);
        let (out_tx, out_rx) = mpsc::channel(32);
        let (_engine, ack) = DeliveryEngine::new(peer(), out_tx.clone(), DeliveryConfig::default());
        let node = SyncNode::new(
            &test_config(pending_capacity),
            SlotframeStore::new(),
            in_rx,
            out_tx,
            ack,
        )
        .unwrap();
        (node, in_tx, out_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_then_complete_swap_after_guard() {
        let (mut node, in_tx, _out_rx) = test_node(16);

        for seq in 1..=3u8 {
            in_tx.send((update_frame(seq, seq as u16), peer())).await.unwrap();
        }
        in_tx.send((complete_frame(4), peer())).await.unwrap();

        run_until_idle(&mut node).await;

        // All three updates applied, in arrival order, to one fresh handle
        assert_eq!(node.schedule().active(), SlotframeHandle(2));
        assert_eq!(node.schedule().store().active(), Some(SlotframeHandle(2)));
        assert_eq!(node.schedule().store().slotframe_count(), 1);

        let links = node
            .schedule()
            .store()
            .slotframe(SlotframeHandle(2))
            .unwrap()
            .links();
        let timeslots: Vec<u16> = links.iter().map(|l| l.timeslot).collect();
        assert_eq!(timeslots, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflowing_updates_are_dropped() {
        let (mut node, in_tx, _out_rx) = test_node(2);

        for seq in 1..=3u8 {
            in_tx.send((update_frame(seq, seq as u16), peer())).await.unwrap();
        }
        in_tx.send((complete_frame(4), peer())).await.unwrap();

        run_until_idle(&mut node).await;

        // Capacity 2: only the retained updates made it into the swap
        let links = node
            .schedule()
            .store()
            .slotframe(node.schedule().active())
            .unwrap()
            .links();
        let timeslots: Vec<u16> = links.iter().map(|l| l.timeslot).collect();
        assert_eq!(timeslots, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_swap_without_complete() {
        let (mut node, in_tx, _out_rx) = test_node(16);

        in_tx.send((update_frame(1, 1), peer())).await.unwrap();

        run_until_idle(&mut node).await;

        assert_eq!(node.schedule().active(), SlotframeHandle(1));
        assert!(node
            .schedule()
            .store()
            .slotframe(SlotframeHandle(1))
            .unwrap()
            .links()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_complete_does_not_rearm_guard() {
        let (mut node, in_tx, _out_rx) = test_node(16);

        in_tx.send((update_frame(1, 1), peer())).await.unwrap();
        in_tx.send((complete_frame(2), peer())).await.unwrap();
        in_tx.send((complete_frame(3), peer())).await.unwrap();

        run_until_idle(&mut node).await;

        // Exactly one swap happened
        assert_eq!(node.schedule().active(), SlotframeHandle(2));
        assert_eq!(node.schedule().store().slotframe_count(), 1);
    }
}
