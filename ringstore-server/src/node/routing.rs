//! Key routing: decide whether an operation lands here, continues a
//! replication chain, or forwards to the custodian.

use std::collections::BTreeMap;

use ringstore_sdk::Store;
use ringstore_sdk::message::{GetAllReply, GetReply, OpStatus, PutValue, Request, StatusReply};

use crate::config::Consistency;
use crate::ring::hash;

use super::Node;
use super::replication::ChainOp;

impl Node {
    /// Insert `value` under `key`, replicating per the configured factor.
    ///
    /// `start_node_id` marks the origin peer (defaults to us, which is
    /// what makes a client-facing call an origin call); a present `ttl`
    /// marks a chain continuation.
    pub async fn put(
        &self,
        key: &str,
        value: PutValue,
        start_node_id: Option<u64>,
        ttl: Option<u32>,
    ) {
        if ttl == Some(0) {
            return;
        }
        let start = start_node_id.unwrap_or_else(|| self.id());
        let key_id = hash(key);

        if let Some(ttl) = ttl {
            if self.replication() >= 1 {
                self.chain_continue(start, key_id, key, ChainOp::Put(value), ttl)
                    .await;
                return;
            }
        }

        let (custodian, _) = self.find_successor(key_id).await;
        if self.id() == start {
            self.with_state(|st| st.uploaded_keys.push(key.to_string()));
        }

        if custodian.id == self.id() {
            tracing::info!(node_id = self.id(), key, key_id, "storing as primary");
            self.apply_local(key_id, key, &ChainOp::Put(value.clone()));
            if self.replication() == 0 {
                return;
            }
            self.chain_seed(start, key, ChainOp::Put(value)).await;
            return;
        }

        tracing::debug!(node_id = self.id(), key, to = custodian.id, "forwarding PUT");
        self.send_write(
            &custodian,
            Request::Put {
                key: key.to_string(),
                value,
                start_node_id: Some(start),
                ttl: None,
            },
        )
        .await;
    }

    /// Look up `key`. Returns the values and the answering node's id, or
    /// `([], -1)` when nothing holds the key.
    pub async fn get(&self, key: &str, start_node_id: Option<u64>, ttl: Option<u32>) -> GetReply {
        let start = start_node_id.unwrap_or_else(|| self.id());
        let key_id = hash(key);

        // Eventual mode serves whatever copy happens to be here; a stale
        // prefix is an accepted answer.
        if self.consistency() == Consistency::Eventual {
            if let Some(value) = self.with_state(|st| st.store.values(key_id, key)) {
                return GetReply { value, id: self.id() as i64 };
            }
        }

        if let Some(ttl) = ttl {
            if self.replication() >= 1 {
                let succ = self.successor();
                if ttl == 1 || succ.id == start {
                    return self.read_local(key_id, key);
                }
                return match self
                    .call_peer::<GetReply>(
                        &succ,
                        &Request::Get {
                            key: key.to_string(),
                            start_node_id: Some(start),
                            ttl: Some(ttl - 1),
                        },
                    )
                    .await
                {
                    Some(reply) => reply,
                    None => GetReply { value: Vec::new(), id: -1 },
                };
            }
        }

        let (custodian, _) = self.find_successor(key_id).await;
        if custodian.id == self.id() {
            // Custodian with replicas: answer from the tail of the chain
            // so strong-mode readers observe fully acknowledged writes.
            let succ = self.successor();
            if self.replication() > 1 && succ.id != start && succ.id != self.id() {
                if let Some(reply) = self
                    .call_peer::<GetReply>(
                        &succ,
                        &Request::Get {
                            key: key.to_string(),
                            start_node_id: Some(start),
                            ttl: Some(self.replication() - 1),
                        },
                    )
                    .await
                {
                    return reply;
                }
            }
            return self.read_local(key_id, key);
        }

        tracing::debug!(node_id = self.id(), key, to = custodian.id, "forwarding GET");
        match self
            .call_peer::<GetReply>(
                &custodian,
                &Request::Get { key: key.to_string(), start_node_id: None, ttl: None },
            )
            .await
        {
            Some(reply) => reply,
            None => GetReply { value: Vec::new(), id: -1 },
        }
    }

    fn read_local(&self, key_id: u64, key: &str) -> GetReply {
        match self.with_state(|st| st.store.values(key_id, key)) {
            Some(value) => GetReply { value, id: self.id() as i64 },
            None => GetReply { value: Vec::new(), id: -1 },
        }
    }

    /// `GET *`: walk the ring once, collecting every peer's store keyed by
    /// node id. `None` when the successor hop fails mid-walk.
    pub async fn get_all(&self, start_node_id: Option<u64>) -> Option<BTreeMap<u64, Store>> {
        let start = start_node_id.unwrap_or_else(|| self.id());
        let succ = self.successor();
        let mine = self.with_state(|st| st.store.clone());
        if succ.id == start {
            return Some(BTreeMap::from([(self.id(), mine)]));
        }
        let reply = self
            .call_peer::<GetAllReply>(
                &succ,
                &Request::Get {
                    key: "*".to_string(),
                    start_node_id: Some(start),
                    ttl: None,
                },
            )
            .await?;
        let mut all = reply.value;
        all.insert(self.id(), mine);
        Some(all)
    }

    /// Remove `value` from `key`'s set. Same routing as PUT.
    pub async fn delete(
        &self,
        key: &str,
        value: &str,
        start_node_id: Option<u64>,
        ttl: Option<u32>,
    ) -> OpStatus {
        if ttl == Some(0) {
            return OpStatus::Ok;
        }
        let start = start_node_id.unwrap_or_else(|| self.id());
        let key_id = hash(key);

        if let Some(ttl) = ttl {
            if self.replication() >= 1 {
                return self
                    .chain_continue(start, key_id, key, ChainOp::Delete(value.to_string()), ttl)
                    .await;
            }
        }

        let (custodian, _) = self.find_successor(key_id).await;
        if custodian.id == self.id() {
            let status = self.apply_local(key_id, key, &ChainOp::Delete(value.to_string()));
            tracing::info!(node_id = self.id(), key, status = status.as_str(), "deleting as primary");
            if self.replication() == 0 {
                return status;
            }
            self.chain_seed(start, key, ChainOp::Delete(value.to_string()))
                .await;
            return status;
        }

        tracing::debug!(node_id = self.id(), key, to = custodian.id, "forwarding DELETE");
        let req = Request::Delete {
            key: Some(key.to_string()),
            value: Some(value.to_string()),
            start_node_id: Some(start),
            ttl: None,
        };
        match self.consistency() {
            Consistency::Strong => match self.call_peer::<StatusReply>(&custodian, &req).await {
                Some(reply) => OpStatus::from_status(&reply.status),
                None => OpStatus::Error,
            },
            Consistency::Eventual => {
                self.cast_peer(&custodian, req);
                OpStatus::Ok
            }
        }
    }
}
