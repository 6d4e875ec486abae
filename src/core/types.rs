use std::fmt;
use std::net::SocketAddr;
use std::ops::BitOr;
use std::time::Duration;

use serde::{Serialize, Deserialize};

/// Opaque identifier of a schedule neighbor.
///
/// Eight bytes on the wire; whether they encode a link-layer or a
/// network-layer address is the caller's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NeighborId(pub [u8; 8]);

impl NeighborId {
    /// Creates a neighbor identifier from raw bytes
    pub fn new(bytes: [u8; 8]) -> Self {
        NeighborId(bytes)
    }

    /// Returns the raw bytes of the identifier
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for NeighborId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}:{:02x}{:02x}:{:02x}{:02x}:{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// Bitmask of link options for a scheduled cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOptions(pub u8);

impl LinkOptions {
    /// Transmit option
    pub const TX: LinkOptions = LinkOptions(0x01);
    /// Receive option
    pub const RX: LinkOptions = LinkOptions(0x02);
    /// Shared (contention-based) option
    pub const SHARED: LinkOptions = LinkOptions(0x04);
    /// Time-keeping option
    pub const TIME_KEEPING: LinkOptions = LinkOptions(0x08);

    /// Empty option set
    pub fn none() -> Self {
        LinkOptions(0)
    }

    /// Returns whether all options in `other` are set
    pub fn contains(&self, other: LinkOptions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the raw bitmask
    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for LinkOptions {
    type Output = LinkOptions;

    fn bitor(self, rhs: LinkOptions) -> LinkOptions {
        LinkOptions(self.0 | rhs.0)
    }
}

/// Kind of a scheduled link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    /// Advertising link (enhanced beacons)
    Advertising,
    /// Normal data link
    Normal,
}

/// A single schedule cell: a (timeslot, channel) assignment with options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Link options for this cell
    pub link_options: LinkOptions,
    /// Timeslot offset within the slotframe
    pub timeslot: u16,
    /// Channel offset
    pub channel: u16,
}

impl Cell {
    /// Creates a new cell
    pub fn new(link_options: LinkOptions, timeslot: u16, channel: u16) -> Self {
        Cell {
            link_options,
            timeslot,
            channel,
        }
    }
}

/// Handle identifying a slotframe in the schedule store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotframeHandle(pub u16);

impl SlotframeHandle {
    /// Returns the handle's numeric value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Returns the alternate handle used for staging a swap.
    ///
    /// Handles alternate between 1 and 2 so that at most two slotframes
    /// ever exist at the same time.
    pub fn counterpart(&self) -> SlotframeHandle {
        SlotframeHandle((self.0 % 2) + 1)
    }
}

/// Configuration for a schedule synchronization node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local address to bind to
    pub bind_addr: SocketAddr,
    /// Address of the root node distributing the schedule
    pub root_addr: SocketAddr,
    /// Maximum number of retransmissions per payload
    pub max_retries: u32,
    /// Delay before a pending payload is retransmitted
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub retry_timeout: Duration,
    /// Guard interval between an update-complete message and the swap
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub guard_delay: Duration,
    /// Capacity of the pending update buffer
    pub pending_capacity: usize,
    /// Length (in timeslots) of slotframes built from updates
    pub slotframe_length: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: format!("0.0.0.0:{}", super::DEFAULT_NODE_PORT).parse().unwrap(),
            root_addr: format!("127.0.0.1:{}", super::DEFAULT_ROOT_PORT).parse().unwrap(),
            max_retries: 4,
            retry_timeout: Duration::from_secs(4),
            guard_delay: Duration::from_secs(3600),
            pending_capacity: 16,
            slotframe_length: 21,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_options() {
        let options = LinkOptions::TX | LinkOptions::SHARED;
        assert!(options.contains(LinkOptions::TX));
        assert!(options.contains(LinkOptions::SHARED));
        assert!(!options.contains(LinkOptions::RX));
        assert_eq!(options.bits(), 0x05);
    }

    #[test]
    fn test_slotframe_handle_counterpart() {
        assert_eq!(SlotframeHandle(1).counterpart(), SlotframeHandle(2));
        assert_eq!(SlotframeHandle(2).counterpart(), SlotframeHandle(1));
    }

    #[test]
    fn test_neighbor_id_display() {
        let id = NeighborId::new([0, 1, 0, 1, 0, 1, 0, 1]);
        assert_eq!(id.to_string(), "0001:0001:0001:0001");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.bind_addr, config.bind_addr);
        assert_eq!(deserialized.max_retries, config.max_retries);
        assert_eq!(deserialized.retry_timeout, config.retry_timeout);
        assert_eq!(deserialized.guard_delay, config.guard_delay);
        assert_eq!(deserialized.pending_capacity, config.pending_capacity);
        assert_eq!(deserialized.slotframe_length, config.slotframe_length);
    }
}
