//! Identifier types shared by everything that talks to a mocknet
//!
//! This module provides the identifier types that uniquely name simulated
//! network participants and the application protocols multiplexed between
//! them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one simulated network participant
///
/// Unique within a single mocknet instance. Generation happens here so the
/// network core can stay agnostic about where identities come from; tests
/// usually call [`PeerId::random`], fixtures that need stable ids build them
/// with [`PeerId::from_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Create a fresh random peer ID
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a deterministic peer ID from 16 raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PeerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<PeerId> for Uuid {
    fn from(peer_id: PeerId) -> Self {
        peer_id.0
    }
}

/// Identifier for an application-level protocol
///
/// Opaque token used as a handler-table key; the network core never looks
/// inside it. Conventionally a short path-like name, e.g. `/weft/ping/1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolId(String);

impl ProtocolId {
    /// Create a protocol ID from any string-like value
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// View the protocol ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProtocolId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ProtocolId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_ids_are_unique() {
        let a = PeerId::random();
        let b = PeerId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn test_peer_id_roundtrips_through_uuid() {
        let id = PeerId::random();
        assert_eq!(PeerId::from_uuid(id.uuid()), id);
    }

    #[test]
    fn test_peer_id_from_bytes_is_deterministic() {
        let a = PeerId::from_bytes([7u8; 16]);
        let b = PeerId::from_bytes([7u8; 16]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_protocol_id_compares_by_content() {
        let a = ProtocolId::from("/weft/ping/1");
        let b = ProtocolId::new("/weft/ping/1".to_string());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/weft/ping/1");
    }
}
