//! Mocknet error types
//!
//! Registry-level failures are returned synchronously to the caller and
//! never auto-retried. Stream-level failures reach the blocked reader or
//! writer as `std::io::Error` values carrying [`MocknetError::StreamClosed`]
//! as their source, so protocol code written against the standard I/O
//! traits keeps working unmodified.

use weft_types::{PeerId, ProtocolId};

/// Errors surfaced by mocknet registry and stream operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MocknetError {
    /// Peer identity is already registered with this mocknet
    #[error("peer {0} is already registered")]
    DuplicatePeer(PeerId),

    /// Operation referenced a peer this mocknet has never seen
    #[error("peer {0} is not registered")]
    UnknownPeer(PeerId),

    /// Connection attempted without a declared link for the pair
    #[error("no link between {a} and {b}")]
    NoLink {
        /// First endpoint of the requested pair
        a: PeerId,
        /// Second endpoint of the requested pair
        b: PeerId,
    },

    /// Stream open attempted without an established connection
    #[error("no connection from {local} to {remote}")]
    NoConnection {
        /// Peer that tried to open the stream
        local: PeerId,
        /// Peer the stream was aimed at
        remote: PeerId,
    },

    /// Stream open aimed at a peer with no handler for the protocol
    #[error("peer {peer} has no handler for protocol {protocol}")]
    NoHandler {
        /// Target peer
        peer: PeerId,
        /// Protocol the caller asked for
        protocol: ProtocolId,
    },

    /// I/O attempted on an already-closed stream half
    #[error("stream is closed")]
    StreamClosed,

    /// Operation issued after the owning lifecycle scope ended
    #[error("mocknet is shutting down")]
    ShuttingDown,
}

/// Result alias for mocknet operations
pub type MocknetResult<T> = Result<T, MocknetError>;
