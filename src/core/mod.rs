//! Core types and traits for the schedule synchronization protocol
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    Cell,
    Config,
    LinkKind,
    LinkOptions,
    NeighborId,
    SlotframeHandle,
};

/// Default port the root node distributes schedules from
pub const DEFAULT_ROOT_PORT: u16 = 3000;

/// Default port mesh nodes listen on
pub const DEFAULT_NODE_PORT: u16 = 8765;

/// Maximum frame size in bytes (header plus payload)
pub const MAX_PACKET_SIZE: usize = 256;
