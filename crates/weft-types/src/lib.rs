//! Identity types for the weft simulated network.
//!
//! Peer identities are generated here, outside the mocknet core; the core
//! treats them as opaque, comparable values. Protocol identifiers are opaque
//! tokens that application code picks and the network never interprets.

#![forbid(unsafe_code)]

pub mod identifiers;

pub use identifiers::{PeerId, ProtocolId};
