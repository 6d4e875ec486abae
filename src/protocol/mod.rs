//! Protocol implementation module
//!
//! This module defines the wire format for schedule updates (frame
//! header and update payloads) and the reliable delivery state machine
//! that carries them over the unreliable transport.

pub mod codec;
pub mod header;
pub mod message;
pub mod state;

pub use self::codec::{Frame, FrameCodec};
pub use self::header::{PacketType, SEQUENCE_NUMBER_MAX};
pub use self::message::{UpdateKind, UpdatePacket, MAX_CELLS_PER_PACKET};
pub use self::state::{AckHandle, DeliveryConfig, DeliveryEngine, DeliveryState, SendOutcome};
