//! Key-ownership handoff when the ring membership changes.

use ringstore_sdk::Store;
use ringstore_sdk::message::{KeysReply, Request};

use crate::ring::in_interval;

use super::Node;

impl Node {
    /// Serve `TRANSFER_KEYS`: hand the caller the slice of our store that
    /// now belongs to the joining peer, then shift our own replication
    /// window one peer clockwise by acquiring from our successor.
    ///
    /// `new_node_id` is the joiner; `next_node_id` bounds the arc we give
    /// away (the previous peer in the cascade, or the joiner itself on
    /// the first hop). A zero ttl is a hard stop.
    pub async fn transfer_keys(
        &self,
        new_node_id: u64,
        next_node_id: Option<u64>,
        ttl: Option<u32>,
    ) -> Store {
        let next = next_node_id.unwrap_or(new_node_id);
        let ttl = ttl.unwrap_or(1);
        if ttl == 0 {
            return Store::new();
        }

        // The slice changes custodian unless we are the joiner ourselves;
        // the last cascade hop keeps its copy (its window still covers it).
        let me = self.id();
        let keys = if new_node_id != me && ttl != 1 {
            self.with_state(|st| st.store.take(|id| in_interval(id, me, next, false)))
        } else {
            self.with_state(|st| st.store.subset(|id| in_interval(id, me, next, false)))
        };
        tracing::info!(
            node_id = me,
            new_node_id,
            next_node_id = next,
            ttl,
            moved = !keys.is_empty(),
            "transferring keys"
        );

        if self.replication() >= 1 {
            let succ = self.successor();
            if succ.id != me {
                self.acquire_keys(new_node_id, me, ttl - 1).await;
            }
        }

        keys
    }

    /// Ask our successor for the keys we now owe (join, or a cascade hop
    /// of someone else's join) and fold them into the local store.
    pub(crate) async fn acquire_keys(&self, new_node_id: u64, next_node_id: u64, ttl: u32) {
        let succ = self.successor();
        let req = Request::TransferKeys {
            new_node_id,
            next_node_id: Some(next_node_id),
            ttl: Some(ttl),
        };
        match self.call_peer::<KeysReply>(&succ, &req).await {
            Some(reply) => {
                if !reply.keys.is_empty() {
                    tracing::info!(node_id = self.id(), from = succ.id, "acquired keys");
                    self.with_state(|st| st.store.merge(reply.keys));
                }
            }
            None => {
                tracing::debug!(node_id = self.id(), from = succ.id, "key acquisition got nothing");
            }
        }
    }

    /// Serve `MOVE_ALL_KEYS`: absorb a departing peer's data, then ripple
    /// the portion our successor replicates one hop down the chain.
    pub async fn move_all_keys(&self, data: Store, ttl: u32) {
        tracing::info!(node_id = self.id(), ttl, "absorbing moved keys");
        self.with_state(|st| st.store.merge(data));

        if ttl > 1 {
            let (succ, me) = (self.successor(), self.id());
            if succ.id != me {
                let subset = self
                    .with_state(|st| st.store.subset(|id| !in_interval(id, me, succ.id, true)));
                if !subset.is_empty() {
                    self.send_write(&succ, Request::MoveAllKeys { data_store: subset, ttl: ttl - 1 })
                        .await;
                }
            }
        }
    }
}
