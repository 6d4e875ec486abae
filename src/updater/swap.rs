use tracing::{info, warn};

use crate::core::{Result, SlotframeHandle};
use super::receiver::PendingUpdateBuffer;
use super::store::{apply_cells, ScheduleStore};

/// Builds a fresh schedule from buffered updates and swaps it in.
///
/// Owns the active slotframe handle. During a swap a second, staging
/// handle exists briefly; at every other moment exactly one slotframe
/// is allocated and active.
pub struct SwapController<S> {
    /// Schedule store the slotframes live in
    store: S,
    /// Handle of the slotframe slot execution currently follows
    active: SlotframeHandle,
    /// Length of newly created slotframes
    slotframe_length: u16,
}

impl<S: ScheduleStore> SwapController<S> {
    /// Creates the controller along with the initial active slotframe
    pub fn new(mut store: S, slotframe_length: u16) -> Result<Self> {
        let active = SlotframeHandle(1);
        store.create(active, slotframe_length)?;
        store.activate(active)?;
        Ok(SwapController {
            store,
            active,
            slotframe_length,
        })
    }

    /// Returns the handle of the active slotframe
    pub fn active(&self) -> SlotframeHandle {
        self.active
    }

    /// Returns the underlying schedule store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the active schedule with one built from the buffered
    /// updates, applied in arrival order.
    ///
    /// If the staging slotframe cannot be allocated the old schedule
    /// stays active and the buffered round is discarded; there is no
    /// retry. The buffer is empty when this returns, in every case.
    pub fn swap(&mut self, buffer: &mut PendingUpdateBuffer) -> Result<()> {
        let staging = self.active.counterpart();

        if let Err(e) = self.store.create(staging, self.slotframe_length) {
            buffer.clear();
            return Err(e);
        }

        let updates = buffer.drain();
        let mut applied = 0;
        for packet in &updates {
            applied += apply_cells(&mut self.store, staging, packet);
        }

        if let Err(e) = self.store.activate(staging) {
            if let Err(remove_err) = self.store.remove(staging) {
                warn!("Failed to discard the staging slotframe: {}", remove_err);
            }
            return Err(e);
        }
        if let Err(e) = self.store.remove(self.active) {
            warn!(
                handle = self.active.value(),
                "Failed to remove the old slotframe: {}", e
            );
        }

        let old = self.active;
        self.active = staging;
        info!(
            old = old.value(),
            active = self.active.value(),
            updates = updates.len(),
            cells = applied,
            "Swapped in a new schedule"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Cell, LinkOptions, NeighborId};
    use crate::protocol::UpdatePacket;
    use crate::updater::store::SlotframeStore;

    fn neighbor() -> NeighborId {
        NeighborId::new([0, 2, 0, 2, 0, 2, 0, 2])
    }

    fn buffered(timeslots: &[u16]) -> PendingUpdateBuffer {
        let mut buffer = PendingUpdateBuffer::new(16);
        for &timeslot in timeslots {
            buffer
                .push(UpdatePacket::update(
                    neighbor(),
                    vec![Cell::new(LinkOptions::TX, timeslot, 3)],
                ))
                .unwrap();
        }
        buffer
    }

    #[test]
    fn test_swap_applies_buffered_updates_in_order() {
        let mut controller = SwapController::new(SlotframeStore::new(), 21).unwrap();
        assert_eq!(controller.active(), SlotframeHandle(1));

        let mut buffer = buffered(&[4, 7, 9]);
        controller.swap(&mut buffer).unwrap();

        assert!(buffer.is_empty());
        assert_eq!(controller.active(), SlotframeHandle(2));
        assert_eq!(controller.store().active(), Some(SlotframeHandle(2)));

        // The old slotframe is gone; exactly one exists
        assert_eq!(controller.store().slotframe_count(), 1);
        assert!(controller.store().slotframe(SlotframeHandle(1)).is_none());

        let links = controller
            .store()
            .slotframe(SlotframeHandle(2))
            .unwrap()
            .links();
        let timeslots: Vec<u16> = links.iter().map(|l| l.timeslot).collect();
        assert_eq!(timeslots, vec![4, 7, 9]);
    }

    #[test]
    fn test_swap_alternates_handles() {
        let mut controller = SwapController::new(SlotframeStore::new(), 21).unwrap();

        controller.swap(&mut buffered(&[1])).unwrap();
        assert_eq!(controller.active(), SlotframeHandle(2));

        controller.swap(&mut buffered(&[2])).unwrap();
        assert_eq!(controller.active(), SlotframeHandle(1));
        assert_eq!(controller.store().slotframe_count(), 1);
    }

    #[test]
    fn test_allocation_failure_keeps_old_schedule() {
        let mut store = SlotframeStore::new();
        // Occupy the staging handle so the swap allocation fails
        store.create(SlotframeHandle(2), 21).unwrap();

        let mut controller = SwapController::new(store, 21).unwrap();
        let mut buffer = buffered(&[4]);

        assert!(controller.swap(&mut buffer).is_err());

        // Old schedule stays active and the round is discarded
        assert_eq!(controller.active(), SlotframeHandle(1));
        assert_eq!(controller.store().active(), Some(SlotframeHandle(1)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_swap_skips_conflicting_cells() {
        let mut controller = SwapController::new(SlotframeStore::new(), 21).unwrap();

        // Both updates claim timeslot 4, channel 3
        let mut buffer = buffered(&[4, 4]);
        controller.swap(&mut buffer).unwrap();

        let links = controller
            .store()
            .slotframe(controller.active())
            .unwrap()
            .links();
        assert_eq!(links.len(), 1);
    }
}
