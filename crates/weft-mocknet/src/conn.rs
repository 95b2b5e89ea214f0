//! Established connections between peer pairs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use weft_types::{PeerId, ProtocolId};

use crate::error::{MocknetError, MocknetResult};
use crate::stream::{self, Stream, StreamRegistration, StreamShared};

/// One peernet's entry for a live session with another peer.
///
/// `connect_peers` installs mirrored entries on both peernets; the mirrors
/// share one [`ConnShared`], so closing the connection from either side or
/// tearing down the owning scope reaches every stream of the pair.
#[derive(Clone)]
pub(crate) struct Conn {
    local: PeerId,
    remote: PeerId,
    shared: Arc<ConnShared>,
}

impl Conn {
    /// Build the mirrored entries for a newly established connection.
    pub(crate) fn pair(a: PeerId, b: PeerId) -> (Conn, Conn) {
        let shared = Arc::new(ConnShared::new());
        (
            Conn {
                local: a,
                remote: b,
                shared: shared.clone(),
            },
            Conn {
                local: b,
                remote: a,
                shared,
            },
        )
    }

    /// Open a mirrored stream pair on this connection.
    pub(crate) fn open_stream(&self, protocol: ProtocolId) -> MocknetResult<(Stream, Stream)> {
        self.shared.open_stream(protocol, self.local, self.remote)
    }

    /// Close the connection and force-close all its streams.
    pub(crate) fn close(&self) {
        self.shared.close();
    }
}

/// State shared by the two mirrored [`Conn`] entries.
pub(crate) struct ConnShared {
    closed: AtomicBool,
    next_stream_id: AtomicU64,
    /// Close handles for the currently open streams of this connection.
    streams: Mutex<HashMap<u64, Arc<StreamShared>>>,
}

impl ConnShared {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            next_stream_id: AtomicU64::new(1),
            streams: Mutex::new(HashMap::new()),
        }
    }

    fn open_stream(
        self: &Arc<Self>,
        protocol: ProtocolId,
        local: PeerId,
        remote: PeerId,
    ) -> MocknetResult<(Stream, Stream)> {
        let shared = StreamShared::new();
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut streams = self.streams.lock();
            if self.closed.load(Ordering::SeqCst) {
                return Err(MocknetError::NoConnection { local, remote });
            }
            streams.insert(id, shared.clone());
        }
        let registration = StreamRegistration::new(Arc::downgrade(self), id);
        Ok(stream::pair(protocol, shared, registration))
    }

    /// Force-close every open stream. Idempotent.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let streams: Vec<Arc<StreamShared>> =
            self.streams.lock().drain().map(|(_, s)| s).collect();
        for stream in &streams {
            stream.reset();
        }
    }

    /// Drop the pair's close handle once both halves are gone.
    pub(crate) fn deregister(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    #[cfg(test)]
    fn open_streams(&self) -> usize {
        self.streams.lock().len()
    }
}
