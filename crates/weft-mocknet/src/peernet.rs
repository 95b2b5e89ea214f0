//! Per-peer view of the mocknet.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Weak;

use parking_lot::Mutex;
use tracing::trace;
use weft_types::{PeerId, ProtocolId};

use crate::conn::Conn;
use crate::error::{MocknetError, MocknetResult};
use crate::handler::{self, StreamHandler};
use crate::mocknet::MocknetInner;
use crate::stream::Stream;

/// One peer's local view: its identity, its live connections, and its
/// protocol handler table.
///
/// Application code gets a `Peernet` from [`crate::Mocknet::add_peer`] or
/// [`crate::Mocknet::net`] and uses it the way it would use a real network
/// stack: register handlers, open streams.
pub struct Peernet {
    local: PeerId,
    mocknet: Weak<MocknetInner>,
    conns: Mutex<HashMap<PeerId, Conn>>,
    handlers: Mutex<HashMap<ProtocolId, StreamHandler>>,
}

impl fmt::Debug for Peernet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peernet").field("local", &self.local).finish_non_exhaustive()
    }
}

impl Peernet {
    pub(crate) fn new(local: PeerId, mocknet: Weak<MocknetInner>) -> Self {
        Self {
            local,
            mocknet,
            conns: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// This peernet's identity.
    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    /// Peers this peernet currently holds a live connection to.
    pub fn peers(&self) -> Vec<PeerId> {
        self.conns.lock().keys().copied().collect()
    }

    /// Install or replace the handler invoked for every inbound stream on
    /// `protocol`. Last writer wins; there is no merging.
    pub fn set_handler<F, Fut>(&self, protocol: ProtocolId, handler: F)
    where
        F: Fn(Stream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        trace!("peer {} set handler for {}", self.local, protocol);
        self.handlers
            .lock()
            .insert(protocol, handler::into_handler(handler));
    }

    /// Remove the handler for `protocol`; subsequent stream opens for it
    /// fail with `NoHandler`.
    pub fn remove_handler(&self, protocol: &ProtocolId) {
        self.handlers.lock().remove(protocol);
    }

    /// Open a new stream to `remote` on `protocol`.
    ///
    /// Requires an established connection and a handler registered for
    /// `protocol` on the remote peer; both are checked at call time so a
    /// misconfigured test fails here instead of hanging later. The local
    /// half is returned synchronously; the remote half is delivered to the
    /// handler as its own task, and this call never waits for the handler.
    pub fn new_stream(&self, protocol: ProtocolId, remote: PeerId) -> MocknetResult<Stream> {
        let inner = self.mocknet.upgrade().ok_or(MocknetError::ShuttingDown)?;
        if inner.is_closed() {
            return Err(MocknetError::ShuttingDown);
        }

        let conn = self.conn(remote).ok_or(MocknetError::NoConnection {
            local: self.local,
            remote,
        })?;

        let remote_net = match inner.net(remote) {
            Some(net) => net,
            // Peers are never removed while the registry lives, so a conn
            // entry always has a peernet behind it.
            None => unreachable!("conn references unregistered peer {remote}"),
        };
        let handler = remote_net
            .handler(&protocol)
            .ok_or_else(|| MocknetError::NoHandler {
                peer: remote,
                protocol: protocol.clone(),
            })?;

        let (local_half, remote_half) = conn.open_stream(protocol.clone())?;
        trace!("stream {} -> {} on {}", self.local, remote, protocol);

        inner.tasks().spawn_cancellable(async move {
            handler(remote_half).await;
            trace!("handler for {} on {} finished", remote, protocol);
        });

        Ok(local_half)
    }

    pub(crate) fn handler(&self, protocol: &ProtocolId) -> Option<StreamHandler> {
        self.handlers.lock().get(protocol).cloned()
    }

    pub(crate) fn conn(&self, remote: PeerId) -> Option<Conn> {
        self.conns.lock().get(&remote).cloned()
    }

    /// Conn table handle for the registry's two-sided connect.
    pub(crate) fn conn_table(&self) -> &Mutex<HashMap<PeerId, Conn>> {
        &self.conns
    }

    /// Tear down every connection this peernet participates in.
    pub(crate) fn close_conns(&self) {
        let conns: Vec<Conn> = self.conns.lock().drain().map(|(_, c)| c).collect();
        for conn in &conns {
            conn.close();
        }
    }
}
