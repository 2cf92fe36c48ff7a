use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cairn_p2p::{PeerConnection, PeerHandler, TransportResult};
use tracing::{debug, info};

/// Admitted peers, keyed by the remote address string.
///
/// The map is only touched under its lock and the lock is never held across
/// an await point.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<String, Arc<PeerConnection>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: &str) -> Option<Arc<PeerConnection>> {
        self.peers.lock().expect("lock poisoned").get(addr).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current peers, cloned out so the caller can do I/O without the lock.
    pub fn snapshot(&self) -> Vec<Arc<PeerConnection>> {
        self.peers
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Addresses of the current peers, sorted.
    pub fn addrs(&self) -> Vec<String> {
        let mut addrs: Vec<_> = self
            .peers
            .lock()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        addrs.sort();
        addrs
    }
}

impl PeerHandler for PeerRegistry {
    fn on_peer(&self, peer: Arc<PeerConnection>) -> TransportResult<()> {
        let addr = peer.remote_addr().to_string();
        let outbound = peer.is_outbound();
        let replaced = self
            .peers
            .lock()
            .expect("lock poisoned")
            .insert(addr.clone(), peer)
            .is_some();
        info!(peer = %addr, outbound, replaced, "peer connected");
        Ok(())
    }

    fn on_peer_closed(&self, peer: &Arc<PeerConnection>) {
        let addr = peer.remote_addr().to_string();
        let mut peers = self.peers.lock().expect("lock poisoned");
        // A newer connection may have taken over the same address.
        if peers.get(&addr).is_some_and(|current| Arc::ptr_eq(current, peer)) {
            peers.remove(&addr);
            drop(peers);
            info!(peer = %addr, "peer disconnected");
        } else {
            debug!(peer = %addr, "stale connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn conn(port: u16) -> Arc<PeerConnection> {
        let (local, _remote) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(local);
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        Arc::new(PeerConnection::new(reader, writer, addr, false))
    }

    #[test]
    fn register_and_lookup() {
        let registry = PeerRegistry::new();
        assert!(registry.is_empty());

        let peer = conn(4000);
        registry.on_peer(Arc::clone(&peer)).unwrap();

        let found = registry.get("127.0.0.1:4000").unwrap();
        assert!(Arc::ptr_eq(&found, &peer));
        assert!(registry.get("127.0.0.1:4001").is_none());
        assert_eq!(registry.addrs(), vec!["127.0.0.1:4000".to_string()]);
    }

    #[test]
    fn concurrent_registrations() {
        let registry = Arc::new(PeerRegistry::new());
        let handles: Vec<_> = (0..32u16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.on_peer(conn(5000 + i)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 32);
        assert_eq!(registry.snapshot().len(), 32);
    }

    #[test]
    fn close_removes_peer() {
        let registry = PeerRegistry::new();
        let peer = conn(4000);
        registry.on_peer(Arc::clone(&peer)).unwrap();
        registry.on_peer_closed(&peer);
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_close_keeps_newer_connection() {
        let registry = PeerRegistry::new();
        let old = conn(4000);
        let new = conn(4000);
        registry.on_peer(Arc::clone(&old)).unwrap();
        registry.on_peer(Arc::clone(&new)).unwrap();
        assert_eq!(registry.len(), 1);

        registry.on_peer_closed(&old);
        let current = registry.get("127.0.0.1:4000").unwrap();
        assert!(Arc::ptr_eq(&current, &new));
    }
}
