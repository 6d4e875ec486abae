//! Schedule update module
//!
//! This module turns reliably delivered update messages into schedule
//! changes: buffering on the receive side, the guard-timed atomic swap,
//! the schedule store contract, and the root-side distributor.

pub mod distributor;
pub mod node;
pub mod receiver;
pub mod store;
pub mod swap;

pub use self::distributor::{AckRouter, DistributionReport, Distributor, NetworkSchedule};
pub use self::node::SyncNode;
pub use self::receiver::{PendingUpdateBuffer, ReceiverEvent, UpdateReceiver};
pub use self::store::{apply_cells, ScheduleStore, ScheduledLink, Slotframe, SlotframeStore};
pub use self::swap::SwapController;
