//! Framed TCP front-end.
//!
//! One accepted connection carries one request and gets one response; a
//! task per connection keeps slow peers from blocking each other. The
//! server holds no state of its own beyond the node handle — it decodes,
//! dispatches, encodes. A handler failure becomes the literal `ERROR`
//! payload so no internal error ever crosses the wire.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use ringstore_sdk::frame;
use ringstore_sdk::message::{
    self, FindSuccessorReply, GetAllReply, KeysReply, OpStatus, OverlayReply, Request, StatusReply,
};
use ringstore_sdk::Peer;

use crate::node::Node;

/// The 5-byte payload sent when serving a request fails internally.
const ERROR_PAYLOAD: &[u8] = b"ERROR";

pub struct Server {
    node: Node,
    listener: TcpListener,
    shutdown: Arc<Notify>,
}

impl Server {
    pub fn new(node: Node, listener: TcpListener) -> Self {
        Self { node, listener, shutdown: Arc::new(Notify::new()) }
    }

    /// Handle that stops the accept loop (used by the Ctrl-C path; DEPART
    /// requests stop it from inside).
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Accept until shut down. In-flight connection tasks finish on their
    /// own; only the listener closes here.
    pub async fn run(self) -> Result<()> {
        tracing::info!(node_id = self.node.id(), addr = %self.listener.local_addr()?, "serving");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!(node_id = self.node.id(), "listener stopping");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(node_id = self.node.id(), %peer_addr, "connection accepted");
                            let node = self.node.clone();
                            let shutdown = self.shutdown.clone();
                            tokio::spawn(async move {
                                handle_connection(node, stream, shutdown).await;
                            });
                        }
                        Err(e) => tracing::warn!(node_id = self.node.id(), error = %e, "accept failed"),
                    }
                }
            }
        }
        Ok(())
    }
}

async fn handle_connection(node: Node, mut stream: TcpStream, shutdown: Arc<Notify>) {
    let payload = match frame::read_frame(&mut stream).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(node_id = node.id(), error = %e, "dropping unreadable connection");
            return;
        }
    };

    let (response, departing) = respond(&node, &payload).await;
    if let Err(e) = frame::write_frame(&mut stream, &response).await {
        tracing::debug!(node_id = node.id(), error = %e, "response write failed");
    }
    if departing {
        shutdown.notify_one();
    }
}

/// Decode, dispatch, encode. The bool asks the accept loop to stop (set
/// only by DEPART, after the departure protocol has completed).
async fn respond(node: &Node, payload: &[u8]) -> (Vec<u8>, bool) {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(node_id = node.id(), error = %e, "unparseable request");
            return (ERROR_PAYLOAD.to_vec(), false);
        }
    };
    let cmd = value
        .get("cmd")
        .and_then(|c| c.as_str())
        .unwrap_or("None")
        .to_string();

    let request: Request = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            if !message::is_known_command(&cmd) {
                tracing::warn!(node_id = node.id(), cmd, "unknown command");
                let body = serde_json::json!({ "error": format!("Unknown command '{cmd}'") });
                return (encode(&body), false);
            }
            tracing::warn!(node_id = node.id(), cmd, error = %e, "malformed request");
            return (ERROR_PAYLOAD.to_vec(), false);
        }
    };

    dispatch(node, request).await
}

async fn dispatch(node: &Node, request: Request) -> (Vec<u8>, bool) {
    match request {
        Request::GetNodeInfo => (encode(&node.info()), false),

        Request::FindSuccessor { key_id } => {
            let (successor, predecessor) = node.find_successor(key_id).await;
            (encode(&FindSuccessorReply { successor, predecessor }), false)
        }

        Request::Notify { candidate } => {
            node.notify(candidate);
            (encode(&StatusReply::new("OK")), false)
        }

        Request::Put { key, value, start_node_id, ttl } => {
            node.put(&key, value, start_node_id, ttl).await;
            (encode(&StatusReply::new("OK")), false)
        }

        Request::Get { key, start_node_id, ttl } => {
            if key == "*" {
                return match node.get_all(start_node_id).await {
                    Some(value) => (encode(&GetAllReply { value }), false),
                    None => (ERROR_PAYLOAD.to_vec(), false),
                };
            }
            (encode(&node.get(&key, start_node_id, ttl).await), false)
        }

        Request::Delete { key, value, start_node_id, ttl } => {
            let status = match (key.as_deref(), value.as_deref()) {
                (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => {
                    node.delete(key, value, start_node_id, ttl).await
                }
                _ => OpStatus::WrongParams,
            };
            (encode(&StatusReply::new(status.as_str())), false)
        }

        Request::Join { host, port } => {
            let (successor, predecessor) = node.handle_join(&host, port).await;
            (encode(&FindSuccessorReply { successor, predecessor }), false)
        }

        Request::Depart => {
            node.depart().await;
            (encode(&StatusReply::new("departing")), true)
        }

        Request::UpdateSuccessor { new_succ_id, new_succ_host, new_succ_port } => {
            node.update_successor(Peer::new(new_succ_id, new_succ_host, new_succ_port));
            (encode(&StatusReply::new("OK")), false)
        }

        Request::UpdatePredecessor { new_pred_id, new_pred_host, new_pred_port } => {
            node.update_predecessor(Peer::new(new_pred_id, new_pred_host, new_pred_port));
            (encode(&StatusReply::new("OK")), false)
        }

        Request::TransferKeys { new_node_id, next_node_id, ttl } => {
            let keys = node.transfer_keys(new_node_id, next_node_id, ttl).await;
            (encode(&KeysReply { keys }), false)
        }

        Request::MoveAllKeys { data_store, ttl } => {
            node.move_all_keys(data_store, ttl).await;
            (encode(&StatusReply::new("OK")), false)
        }

        Request::GetOverlay { start_node_id } => {
            let overlay = node.overlay(start_node_id).await;
            (encode(&OverlayReply { overlay }), false)
        }
    }
}

fn encode<T: Serialize>(body: &T) -> Vec<u8> {
    match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "response serialization failed");
            ERROR_PAYLOAD.to_vec()
        }
    }
}
