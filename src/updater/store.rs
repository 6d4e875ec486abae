use std::collections::HashMap;

use tracing::warn;

use crate::core::{Error, LinkKind, LinkOptions, NeighborId, Result, SlotframeHandle};
use crate::protocol::UpdatePacket;

/// Schedule store collaborator contract.
///
/// The MAC layer executing slots sits behind this trait; the in-memory
/// [`SlotframeStore`] stands in for it on nodes and in tests.
pub trait ScheduleStore {
    /// Creates an empty slotframe under `handle`
    fn create(&mut self, handle: SlotframeHandle, length: u16) -> Result<()>;

    /// Adds a link to a slotframe
    fn add_cell(
        &mut self,
        handle: SlotframeHandle,
        options: LinkOptions,
        kind: LinkKind,
        neighbor: NeighborId,
        timeslot: u16,
        channel: u16,
    ) -> Result<()>;

    /// Removes a slotframe and all its links
    fn remove(&mut self, handle: SlotframeHandle) -> Result<()>;

    /// Marks a slotframe as the one slot execution follows
    fn activate(&mut self, handle: SlotframeHandle) -> Result<()>;

    /// Returns the currently active slotframe, if any
    fn active(&self) -> Option<SlotframeHandle>;
}

/// A link installed in a slotframe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledLink {
    /// Link options
    pub options: LinkOptions,
    /// Link kind
    pub kind: LinkKind,
    /// Neighbor the link communicates with
    pub neighbor: NeighborId,
    /// Timeslot offset
    pub timeslot: u16,
    /// Channel offset
    pub channel: u16,
}

/// An in-memory slotframe
#[derive(Debug, Clone)]
pub struct Slotframe {
    /// Length in timeslots
    pub length: u16,
    links: Vec<ScheduledLink>,
}

impl Slotframe {
    /// Returns the installed links, in insertion order
    pub fn links(&self) -> &[ScheduledLink] {
        &self.links
    }
}

/// In-memory schedule store
#[derive(Debug, Default)]
pub struct SlotframeStore {
    slotframes: HashMap<SlotframeHandle, Slotframe>,
    active: Option<SlotframeHandle>,
}

impl SlotframeStore {
    /// Creates an empty store
    pub fn new() -> Self {
        SlotframeStore::default()
    }

    /// Returns a slotframe by handle
    pub fn slotframe(&self, handle: SlotframeHandle) -> Option<&Slotframe> {
        self.slotframes.get(&handle)
    }

    /// Returns the number of slotframes currently allocated
    pub fn slotframe_count(&self) -> usize {
        self.slotframes.len()
    }
}

impl ScheduleStore for SlotframeStore {
    fn create(&mut self, handle: SlotframeHandle, length: u16) -> Result<()> {
        if self.slotframes.contains_key(&handle) {
            return Err(Error::schedule(format!(
                "Slotframe {} already exists",
                handle.value()
            )));
        }
        self.slotframes.insert(
            handle,
            Slotframe {
                length,
                links: Vec::new(),
            },
        );
        Ok(())
    }

    fn add_cell(
        &mut self,
        handle: SlotframeHandle,
        options: LinkOptions,
        kind: LinkKind,
        neighbor: NeighborId,
        timeslot: u16,
        channel: u16,
    ) -> Result<()> {
        let slotframe = self.slotframes.get_mut(&handle).ok_or_else(|| {
            Error::schedule(format!("No slotframe with handle {}", handle.value()))
        })?;
        if slotframe
            .links
            .iter()
            .any(|link| link.timeslot == timeslot && link.channel == channel)
        {
            return Err(Error::schedule(format!(
                "Slot (timeslot {}, channel {}) is already occupied",
                timeslot, channel
            )));
        }
        slotframe.links.push(ScheduledLink {
            options,
            kind,
            neighbor,
            timeslot,
            channel,
        });
        Ok(())
    }

    fn remove(&mut self, handle: SlotframeHandle) -> Result<()> {
        if self.slotframes.remove(&handle).is_none() {
            return Err(Error::schedule(format!(
                "No slotframe with handle {}",
                handle.value()
            )));
        }
        if self.active == Some(handle) {
            self.active = None;
        }
        Ok(())
    }

    fn activate(&mut self, handle: SlotframeHandle) -> Result<()> {
        if !self.slotframes.contains_key(&handle) {
            return Err(Error::schedule(format!(
                "No slotframe with handle {}",
                handle.value()
            )));
        }
        self.active = Some(handle);
        Ok(())
    }

    fn active(&self) -> Option<SlotframeHandle> {
        self.active
    }
}

/// Applies every cell of an update packet to a slotframe.
///
/// Per-cell failures are logged and the remaining cells are still
/// attempted; atomicity is provided only at the swap boundary. Returns
/// the number of cells actually added.
pub fn apply_cells<S>(store: &mut S, handle: SlotframeHandle, packet: &UpdatePacket) -> usize
where
    S: ScheduleStore + ?Sized,
{
    let mut applied = 0;
    for cell in &packet.cells {
        match store.add_cell(
            handle,
            cell.link_options,
            LinkKind::Normal,
            packet.neighbor,
            cell.timeslot,
            cell.channel,
        ) {
            Ok(()) => applied += 1,
            Err(e) => {
                warn!(neighbor = %packet.neighbor, "Error while adding a new link: {}", e);
            }
        }
    }
    applied
}
