//! Network transport module
//!
//! This module moves protocol frames over UDP. It makes no delivery or
//! ordering guarantees; reliability lives in the protocol layer.

mod connection;

pub use self::connection::{ConnectionHandle, UdpConnection};
