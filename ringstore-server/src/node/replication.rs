//! The chained-write engine.
//!
//! A write settles on the primary and then walks the successor chain,
//! each hop applying locally *before* forwarding, so every replica sees
//! the primary's order. Termination is guarded twice: the ttl budget and
//! the `successor == start` ring-completion check — either alone breaks
//! when the factor exceeds the ring size or the ring is tiny.

use ringstore_sdk::message::{OpStatus, PutValue, Request};

use super::Node;

/// The mutation a chain hop carries.
#[derive(Debug, Clone)]
pub(crate) enum ChainOp {
    Put(PutValue),
    Delete(String),
}

impl ChainOp {
    fn into_request(self, key: &str, start: u64, ttl: Option<u32>) -> Request {
        match self {
            ChainOp::Put(value) => Request::Put {
                key: key.to_string(),
                value,
                start_node_id: Some(start),
                ttl,
            },
            ChainOp::Delete(value) => Request::Delete {
                key: Some(key.to_string()),
                value: Some(value),
                start_node_id: Some(start),
                ttl,
            },
        }
    }
}

impl Node {
    /// Apply one mutation to the local store.
    pub(crate) fn apply_local(&self, key_id: u64, key: &str, op: &ChainOp) -> OpStatus {
        self.with_state(|st| match op {
            ChainOp::Put(value) => {
                st.store.insert(key_id, key, value.clone().into_values());
                OpStatus::Ok
            }
            ChainOp::Delete(value) => {
                if st.store.remove(key_id, key, value) {
                    OpStatus::Ok
                } else {
                    OpStatus::NotFound
                }
            }
        })
    }

    /// This peer is a link inside an ongoing chain: apply, then pass the
    /// write along with one less hop in the budget.
    pub(crate) async fn chain_continue(
        &self,
        start: u64,
        key_id: u64,
        key: &str,
        op: ChainOp,
        ttl: u32,
    ) -> OpStatus {
        let status = self.apply_local(key_id, key, &op);
        let succ = self.successor();
        if succ.id == start {
            tracing::debug!(node_id = self.id(), key, "chain wrapped to origin");
            return status;
        }
        if ttl == 1 {
            tracing::debug!(node_id = self.id(), key, "chain ttl exhausted");
            return status;
        }
        self.send_write(&succ, op.into_request(key, start, Some(ttl - 1)))
            .await;
        status
    }

    /// This peer just applied as primary; push the write to the first
    /// replica with the full budget. The forward is unconditional — a
    /// successor that completes the ring stops the chain on its own hop.
    pub(crate) async fn chain_seed(&self, start: u64, key: &str, op: ChainOp) {
        let succ = self.successor();
        tracing::debug!(
            node_id = self.id(),
            key,
            to = succ.id,
            ttl = self.replication() - 1,
            "seeding replication chain"
        );
        self.send_write(&succ, op.into_request(key, start, Some(self.replication() - 1)))
            .await;
    }
}
