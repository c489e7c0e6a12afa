//! Joining and gracefully leaving the ring.

use ringstore_sdk::client;
use ringstore_sdk::message::{FindSuccessorReply, Request, StatusReply};
use ringstore_sdk::Peer;

use crate::config::Consistency;
use crate::ring::hash;

use super::Node;

impl Node {
    /// Enter the ring through a known peer.
    ///
    /// The bootstrap resolves our successor and predecessor; we adopt
    /// them, tell both neighbors about us, and pull the keys we are now
    /// custodian (or replica) for. A dead or garbled bootstrap leaves us
    /// as a single-node ring.
    pub async fn join(&self, bootstrap_host: &str, bootstrap_port: u16) {
        let me = self.me();
        let reply = client::call::<FindSuccessorReply>(
            bootstrap_host,
            bootstrap_port,
            &Request::Join { host: me.host.clone(), port: me.port },
        )
        .await;

        let FindSuccessorReply { successor, predecessor } = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    node_id = self.id(),
                    bootstrap = %format!("{bootstrap_host}:{bootstrap_port}"),
                    error = %e,
                    "join failed, staying a single-node ring"
                );
                self.with_state(|st| {
                    st.successor = me.clone();
                    st.predecessor = me;
                });
                return;
            }
        };

        tracing::info!(
            node_id = self.id(),
            successor = %successor,
            predecessor = %predecessor,
            "joined ring via {bootstrap_host}:{bootstrap_port}"
        );
        self.with_state(|st| {
            st.successor = successor.clone();
            st.predecessor = predecessor.clone();
        });

        self.send_write(
            &predecessor,
            Request::UpdateSuccessor {
                new_succ_id: me.id,
                new_succ_host: me.host.clone(),
                new_succ_port: me.port,
            },
        )
        .await;
        self.send_write(
            &successor,
            Request::UpdatePredecessor {
                new_pred_id: me.id,
                new_pred_host: me.host.clone(),
                new_pred_port: me.port,
            },
        )
        .await;

        // Pull the keys this peer is now responsible for; ttl covers the
        // primary handoff plus the replica-window shift downstream.
        let ttl = self.replication() + 1;
        match self.consistency() {
            Consistency::Strong => self.acquire_keys(self.id(), self.id(), ttl).await,
            Consistency::Eventual => {
                let node = self.clone();
                self.spawn_tracked(async move {
                    node.acquire_keys(node.id(), node.id(), ttl).await;
                });
            }
        }
    }

    /// A new peer knocked on us; locate its place on the ring.
    pub async fn handle_join(&self, host: &str, port: u16) -> (Peer, Peer) {
        let new_id = hash(&format!("{host}:{port}"));
        tracing::info!(node_id = self.id(), joiner = new_id, "peer joining via us");
        self.find_successor(new_id).await
    }

    /// Graceful departure: scrub our uploader tags, unlink ourselves, hand
    /// the key space to the successor chain, and forget everything.
    pub async fn depart(&self) {
        tracing::info!(node_id = self.id(), "departing the ring");

        // 1. Remove every value this peer originated, wherever it was
        //    replicated to.
        let uploaded = self.with_state(|st| st.uploaded_keys.clone());
        let tag = self.endpoint();
        let ttl = self.replication().saturating_sub(1);
        for key in &uploaded {
            let status = self.delete(key, &tag, Some(self.id()), Some(ttl)).await;
            tracing::debug!(node_id = self.id(), key, status = status.as_str(), "uploader tag removed");
        }

        // 2. Link predecessor and successor to each other.
        let (successor, predecessor) = self.pointers();
        if predecessor.id != self.id() {
            self.send_write(
                &predecessor,
                Request::UpdateSuccessor {
                    new_succ_id: successor.id,
                    new_succ_host: successor.host.clone(),
                    new_succ_port: successor.port,
                },
            )
            .await;
        }
        if successor.id != self.id() {
            self.send_write(
                &successor,
                Request::UpdatePredecessor {
                    new_pred_id: predecessor.id,
                    new_pred_host: predecessor.host.clone(),
                    new_pred_port: predecessor.port,
                },
            )
            .await;
        }

        // 3. Push the whole local store to the successor; the ttl lets it
        //    ripple down the replica chain.
        let data = self.with_state(|st| st.store.clone());
        if successor.id != self.id() && !data.is_empty() {
            let ttl = self.replication().max(1);
            let _ = self
                .call_peer::<StatusReply>(
                    &successor,
                    &Request::MoveAllKeys { data_store: data, ttl },
                )
                .await;
        }

        // 4. Nothing of ours remains.
        self.with_state(|st| {
            st.store.clear();
            st.uploaded_keys.clear();
        });
    }
}
