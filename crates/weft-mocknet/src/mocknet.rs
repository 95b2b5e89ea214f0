//! The mocknet registry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use weft_types::PeerId;

use crate::conn::Conn;
use crate::error::{MocknetError, MocknetResult};
use crate::lifecycle::{ShutdownSignal, TaskRegistry};
use crate::link::Link;
use crate::peernet::Peernet;

/// The registry owning all peers, links, and topology for one simulated
/// network instance.
///
/// Registries are plain values, not process-wide state: any number of them
/// can coexist, which keeps concurrently running tests isolated. All
/// operations are safe to call from arbitrary concurrent tasks.
#[derive(Clone)]
pub struct Mocknet {
    inner: Arc<MocknetInner>,
}

pub(crate) struct MocknetInner {
    peers: RwLock<HashMap<PeerId, Arc<Peernet>>>,
    links: Mutex<HashSet<Link>>,
    tasks: TaskRegistry,
    closed: AtomicBool,
}

impl MocknetInner {
    pub(crate) fn net(&self, id: PeerId) -> Option<Arc<Peernet>> {
        self.peers.read().get(&id).cloned()
    }

    pub(crate) fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Scope teardown: refuse new work, force-close every connection and
    /// stream, and stop outstanding handler tasks.
    fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("mocknet scope ended, closing all connections");
        let nets: Vec<Arc<Peernet>> = self.peers.read().values().cloned().collect();
        for net in &nets {
            net.close_conns();
        }
        self.tasks.shutdown();
    }
}

impl Mocknet {
    /// Create an empty registry bound to the lifecycle scope behind
    /// `signal`.
    ///
    /// Must be called from within a tokio runtime: the registry spawns a
    /// watcher that tears down all peernets, connections, and streams when
    /// the scope ends.
    pub fn new(signal: ShutdownSignal) -> Self {
        let inner = Arc::new(MocknetInner {
            peers: RwLock::new(HashMap::new()),
            links: Mutex::new(HashSet::new()),
            tasks: TaskRegistry::new(),
            closed: AtomicBool::new(false),
        });
        let watcher = Arc::downgrade(&inner);
        tokio::spawn(async move {
            signal.ended().await;
            if let Some(inner) = watcher.upgrade() {
                inner.close_all();
            }
        });
        Self { inner }
    }

    /// Register a new peer and return its local view.
    pub fn add_peer(&self, id: PeerId) -> MocknetResult<Arc<Peernet>> {
        self.ensure_open()?;
        let mut peers = self.inner.peers.write();
        if peers.contains_key(&id) {
            return Err(MocknetError::DuplicatePeer(id));
        }
        let net = Arc::new(Peernet::new(id, Arc::downgrade(&self.inner)));
        peers.insert(id, net.clone());
        debug!("registered peer {}", id);
        Ok(net)
    }

    /// Record that `a` and `b` may connect. Idempotent per unordered pair.
    pub fn link_peers(&self, a: PeerId, b: PeerId) -> MocknetResult<Link> {
        self.ensure_open()?;
        {
            let peers = self.inner.peers.read();
            for id in [a, b] {
                if !peers.contains_key(&id) {
                    return Err(MocknetError::UnknownPeer(id));
                }
            }
        }
        let link = Link::new(a, b);
        if self.inner.links.lock().insert(link) {
            debug!("linked {}", link);
        }
        Ok(link)
    }

    /// Establish a live connection over an existing link. Idempotent when
    /// the pair is already connected.
    pub fn connect_peers(&self, a: PeerId, b: PeerId) -> MocknetResult<()> {
        self.ensure_open()?;
        let (net_a, net_b) = {
            let peers = self.inner.peers.read();
            let net_a = peers.get(&a).cloned().ok_or(MocknetError::UnknownPeer(a))?;
            let net_b = peers.get(&b).cloned().ok_or(MocknetError::UnknownPeer(b))?;
            (net_a, net_b)
        };
        if !self.inner.links.lock().contains(&Link::new(a, b)) {
            return Err(MocknetError::NoLink { a, b });
        }

        if a == b {
            let mut conns = net_a.conn_table().lock();
            if conns.contains_key(&a) {
                return Ok(());
            }
            let (conn, _mirror) = Conn::pair(a, a);
            conns.insert(a, conn);
            debug!("connected {} to itself", a);
            return Ok(());
        }

        // Lock both conn tables in canonical order so concurrent connects
        // for the same pair stay atomic without deadlocking.
        let (first, second) = if a <= b {
            (&net_a, &net_b)
        } else {
            (&net_b, &net_a)
        };
        let mut first_conns = first.conn_table().lock();
        let mut second_conns = second.conn_table().lock();
        if first_conns.contains_key(&second.local_peer()) {
            return Ok(());
        }
        let (conn_first, conn_second) = Conn::pair(first.local_peer(), second.local_peer());
        first_conns.insert(second.local_peer(), conn_first);
        second_conns.insert(first.local_peer(), conn_second);
        debug!("connected {} and {}", a, b);
        Ok(())
    }

    /// Look up one peer's view.
    pub fn net(&self, id: PeerId) -> Option<Arc<Peernet>> {
        self.inner.net(id)
    }

    /// Snapshot of all registered peers. Order is stable for one snapshot
    /// but carries no meaning.
    pub fn nets(&self) -> Vec<Arc<Peernet>> {
        self.inner.peers.read().values().cloned().collect()
    }

    /// Snapshot of the declared topology.
    pub fn links(&self) -> Vec<Link> {
        self.inner.links.lock().iter().copied().collect()
    }

    /// Convenience: `n` fresh peers with every unordered pair linked, but
    /// nothing connected yet.
    pub fn full_mesh_linked(signal: ShutdownSignal, n: usize) -> MocknetResult<Mocknet> {
        let mn = Mocknet::new(signal);
        for _ in 0..n {
            mn.add_peer(PeerId::random())?;
        }
        let ids: Vec<PeerId> = mn.nets().iter().map(|net| net.local_peer()).collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                mn.link_peers(a, b)?;
            }
        }
        Ok(mn)
    }

    /// Convenience: a fully linked and fully connected mesh of `n` fresh
    /// peers. Returns the first error encountered.
    pub fn full_mesh_connected(signal: ShutdownSignal, n: usize) -> MocknetResult<Mocknet> {
        let mn = Self::full_mesh_linked(signal, n)?;
        let ids: Vec<PeerId> = mn.nets().iter().map(|net| net.local_peer()).collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                mn.connect_peers(a, b)?;
            }
        }
        Ok(mn)
    }

    fn ensure_open(&self) -> MocknetResult<()> {
        if self.inner.is_closed() {
            return Err(MocknetError::ShuttingDown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ShutdownController;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_add_peer_rejects_duplicates() {
        let (_controller, signal) = ShutdownController::new();
        let mn = Mocknet::new(signal);
        let id = PeerId::random();

        mn.add_peer(id).unwrap();
        assert_matches!(mn.add_peer(id), Err(MocknetError::DuplicatePeer(dup)) if dup == id);
    }

    #[tokio::test]
    async fn test_link_requires_registered_peers() {
        let (_controller, signal) = ShutdownController::new();
        let mn = Mocknet::new(signal);
        let known = PeerId::random();
        let unknown = PeerId::random();
        mn.add_peer(known).unwrap();

        assert_matches!(
            mn.link_peers(known, unknown),
            Err(MocknetError::UnknownPeer(id)) if id == unknown
        );
    }

    #[tokio::test]
    async fn test_repeated_links_collapse() {
        let (_controller, signal) = ShutdownController::new();
        let mn = Mocknet::new(signal);
        let a = PeerId::random();
        let b = PeerId::random();
        mn.add_peer(a).unwrap();
        mn.add_peer(b).unwrap();

        let first = mn.link_peers(a, b).unwrap();
        let second = mn.link_peers(b, a).unwrap();
        assert_eq!(first, second);
        assert_eq!(mn.links().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_requires_a_link() {
        let (_controller, signal) = ShutdownController::new();
        let mn = Mocknet::new(signal);
        let a = PeerId::random();
        let b = PeerId::random();
        mn.add_peer(a).unwrap();
        mn.add_peer(b).unwrap();

        assert_matches!(mn.connect_peers(a, b), Err(MocknetError::NoLink { .. }));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (_controller, signal) = ShutdownController::new();
        let mn = Mocknet::new(signal);
        let a = PeerId::random();
        let b = PeerId::random();
        mn.add_peer(a).unwrap();
        mn.add_peer(b).unwrap();
        mn.link_peers(a, b).unwrap();

        mn.connect_peers(a, b).unwrap();
        mn.connect_peers(b, a).unwrap();

        assert_eq!(mn.net(a).unwrap().peers(), vec![b]);
        assert_eq!(mn.net(b).unwrap().peers(), vec![a]);
    }

    #[tokio::test]
    async fn test_registry_refuses_work_after_shutdown() {
        let (controller, signal) = ShutdownController::new();
        let mn = Mocknet::new(signal.clone());
        let a = PeerId::random();
        mn.add_peer(a).unwrap();

        controller.shutdown();
        signal.ended().await;
        // The watcher task runs independently; wait for it to flip the
        // registry closed.
        while !mn.inner.is_closed() {
            tokio::task::yield_now().await;
        }

        assert_matches!(mn.add_peer(PeerId::random()), Err(MocknetError::ShuttingDown));
        assert_matches!(
            mn.link_peers(a, a),
            Err(MocknetError::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn test_full_mesh_linked_declares_all_pairs() {
        let (_controller, signal) = ShutdownController::new();
        let mn = Mocknet::full_mesh_linked(signal, 4).unwrap();
        assert_eq!(mn.nets().len(), 4);
        assert_eq!(mn.links().len(), 6);
        // No connections yet.
        for net in mn.nets() {
            assert!(net.peers().is_empty());
        }
    }
}
