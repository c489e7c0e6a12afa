use serde::{Deserialize, Serialize};

/// Identity of one peer on the ring.
///
/// `id` is `hash("host:port")`; two peers with equal ids are treated as the
/// same peer for pointer comparison (possible under a small identifier
/// space, deliberately not special-cased). On the wire a peer is a
/// 3-element array `[id, host, port]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, String, u16)", into = "(u64, String, u16)")]
pub struct Peer {
    pub id: u64,
    pub host: String,
    pub port: u16,
}

impl Peer {
    pub fn new(id: u64, host: impl Into<String>, port: u16) -> Self {
        Self { id, host: host.into(), port }
    }
}

impl From<(u64, String, u16)> for Peer {
    fn from((id, host, port): (u64, String, u16)) -> Self {
        Self { id, host, port }
    }
}

impl From<Peer> for (u64, String, u16) {
    fn from(p: Peer) -> Self {
        (p.id, p.host, p.port)
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}
