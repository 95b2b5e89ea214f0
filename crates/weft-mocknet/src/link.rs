//! Topology links.

use serde::{Deserialize, Serialize};
use std::fmt;
use weft_types::PeerId;

/// A topology fact: the two endpoints are allowed to connect.
///
/// Links carry no live session state. The pair is unordered; the
/// constructor canonicalizes endpoint order so `Link::new(a, b)` and
/// `Link::new(b, a)` are the same value, which is what makes repeated
/// `link_peers` calls collapse onto one logical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    a: PeerId,
    b: PeerId,
}

impl Link {
    /// Create the canonical link for an unordered peer pair.
    pub fn new(x: PeerId, y: PeerId) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    /// The two endpoints, in canonical order.
    pub fn peers(&self) -> (PeerId, PeerId) {
        (self.a, self.b)
    }

    /// Whether `peer` is one of the endpoints.
    pub fn contains(&self, peer: PeerId) -> bool {
        self.a == peer || self.b == peer
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.a, self.b)
    }
}
