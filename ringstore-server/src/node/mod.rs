//! The node core: ring membership and data placement.
//!
//! One [`Node`] holds this peer's identity, its ring pointers, the local
//! key space, and the replication configuration. All mutable state sits
//! behind a single mutex; handlers snapshot what they need under the lock
//! and release it before any network hop.
//!
//! The logic is split by protocol area:
//! - [`membership`] — joining and gracefully departing the ring
//! - [`routing`] — PUT/GET/DELETE custody resolution and forwarding
//! - [`replication`] — the ttl-bounded write chain
//! - [`handoff`] — key ownership transfer on membership change
//! - [`overlay`] — ring-walk inspection

mod handoff;
mod membership;
mod overlay;
mod replication;
mod routing;

use std::sync::Arc;

use parking_lot::Mutex;
use ringstore_sdk::client::{self, TaskGauge};
use ringstore_sdk::message::{NodeInfoReply, Request};
use ringstore_sdk::{Peer, Store};
use serde::de::DeserializeOwned;

use crate::config::Consistency;
use crate::ring::{hash, in_interval};

/// Shared handle to one peer's state. Cheap to clone; every RPC handler
/// task and fire-and-forget sender holds one.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: u64,
    host: String,
    port: u16,
    replication: u32,
    consistency: Consistency,
    state: Mutex<RingState>,
    gauge: TaskGauge,
}

/// Everything that changes after startup, under one lock.
pub(crate) struct RingState {
    pub(crate) successor: Peer,
    pub(crate) predecessor: Peer,
    pub(crate) store: Store,
    pub(crate) uploaded_keys: Vec<String>,
}

impl Node {
    /// Create a peer that is its own ring: successor and predecessor both
    /// point at itself until a join or a NOTIFY says otherwise.
    pub fn new(host: &str, port: u16, replication: u32, consistency: Consistency) -> Self {
        let id = hash(&format!("{host}:{port}"));
        let me = Peer::new(id, host, port);
        tracing::info!(node_id = id, host, port, replication, "node created");
        Self {
            inner: Arc::new(NodeInner {
                id,
                host: host.to_string(),
                port,
                replication,
                consistency,
                state: Mutex::new(RingState {
                    successor: me.clone(),
                    predecessor: me,
                    store: Store::new(),
                    uploaded_keys: Vec::new(),
                }),
                gauge: TaskGauge::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn me(&self) -> Peer {
        Peer::new(self.inner.id, self.inner.host.clone(), self.inner.port)
    }

    /// `host:port`, used as the uploader tag for values this peer inserts
    /// on behalf of a client.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.inner.host, self.inner.port)
    }

    pub(crate) fn replication(&self) -> u32 {
        self.inner.replication
    }

    pub(crate) fn consistency(&self) -> Consistency {
        self.inner.consistency
    }

    pub fn successor(&self) -> Peer {
        self.inner.state.lock().successor.clone()
    }

    pub fn predecessor(&self) -> Peer {
        self.inner.state.lock().predecessor.clone()
    }

    /// Consistent snapshot of both pointers.
    pub(crate) fn pointers(&self) -> (Peer, Peer) {
        let st = self.inner.state.lock();
        (st.successor.clone(), st.predecessor.clone())
    }

    pub fn update_successor(&self, succ: Peer) {
        tracing::info!(node_id = self.id(), new_succ = %succ, "successor updated");
        self.inner.state.lock().successor = succ;
    }

    pub fn update_predecessor(&self, pred: Peer) {
        tracing::info!(node_id = self.id(), new_pred = %pred, "predecessor updated");
        self.inner.state.lock().predecessor = pred;
    }

    /// A peer claims it might be our predecessor; adopt it when it falls
    /// strictly between the current predecessor and us.
    pub fn notify(&self, candidate: Peer) {
        let mut st = self.inner.state.lock();
        if in_interval(candidate.id, st.predecessor.id, self.inner.id, false) {
            tracing::info!(node_id = self.id(), candidate = %candidate, "adopting predecessor");
            st.predecessor = candidate;
        }
    }

    /// Snapshot served to `GET_NODE_INFO`.
    pub fn info(&self) -> NodeInfoReply {
        let st = self.inner.state.lock();
        NodeInfoReply {
            node_id: self.inner.id,
            successor: st.successor.clone(),
            predecessor: st.predecessor.clone(),
            data_store: st.store.clone(),
        }
    }

    /// Custodian of `key_id` and that custodian's predecessor.
    ///
    /// Successor-only forwarding: either the key falls in `(self,
    /// successor]` and the successor is the answer, or the successor gets
    /// asked the same question. A dead or garbled hop degrades to `(our
    /// successor, us)`.
    pub async fn find_successor(&self, key_id: u64) -> (Peer, Peer) {
        let succ = self.successor();
        if in_interval(key_id, self.inner.id, succ.id, true) || succ.id == self.inner.id {
            return (succ, self.me());
        }
        match self
            .call_peer::<ringstore_sdk::message::FindSuccessorReply>(
                &succ,
                &Request::FindSuccessor { key_id },
            )
            .await
        {
            Some(reply) => (reply.successor, reply.predecessor),
            None => (succ, self.me()),
        }
    }

    /// Wait for every fire-and-forget send (and background acquisition)
    /// this node has spawned to finish.
    pub async fn drain(&self) {
        self.inner.gauge.drain().await;
    }

    // ── delivery helpers ─────────────────────────────────────────

    /// Synchronous RPC to a peer. `None` on any socket or decode failure;
    /// callers fall back to their local defaults.
    pub(crate) async fn call_peer<T>(&self, peer: &Peer, req: &Request) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match client::call::<T>(&peer.host, peer.port, req).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(node_id = self.id(), peer = %peer, error = %e, "peer call failed");
                None
            }
        }
    }

    /// Fire-and-forget RPC, tracked for [`Node::drain`].
    pub(crate) fn cast_peer(&self, peer: &Peer, req: Request) {
        client::cast(&peer.host, peer.port, req, &self.inner.gauge);
    }

    /// Deliver a write per the consistency mode: await the ack in strong
    /// mode, detach in eventual mode.
    pub(crate) async fn send_write(&self, peer: &Peer, req: Request) {
        match self.inner.consistency {
            Consistency::Strong => {
                let _ = self.call_peer::<serde_json::Value>(peer, &req).await;
            }
            Consistency::Eventual => self.cast_peer(peer, req),
        }
    }

    /// Run `fut` on a background task tracked by the drain gauge.
    pub(crate) fn spawn_tracked<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let in_flight = self.inner.gauge.enter();
        tokio::spawn(async move {
            fut.await;
            drop(in_flight);
        });
    }

    // ── store access for the protocol modules ────────────────────

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut RingState) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    /// Test-only view of the local store.
    pub fn store_snapshot(&self) -> Store {
        self.inner.state.lock().store.clone()
    }

    /// Test-only view of the keys this peer originated.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.inner.state.lock().uploaded_keys.clone()
    }
}
