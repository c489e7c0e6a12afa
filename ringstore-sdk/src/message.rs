//! Request and response envelopes.
//!
//! Requests are one JSON object tagged by `"cmd"`; responses are
//! per-command JSON objects. Shapes here match the peer protocol exactly,
//! so any change is a wire break.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::peer::Peer;
use crate::store::Store;

/// A value carried by `PUT`: a single string, or a batch that set-unions
/// into the stored set (used when whole sets are relocated).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PutValue {
    One(String),
    Many(Vec<String>),
}

impl PutValue {
    pub fn into_values(self) -> Vec<String> {
        match self {
            PutValue::One(v) => vec![v],
            PutValue::Many(vs) => vs,
        }
    }
}

fn default_move_ttl() -> u32 {
    1
}

/// Every message a peer accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Request {
    #[serde(rename = "GET_NODE_INFO")]
    GetNodeInfo,

    #[serde(rename = "FIND_SUCCESSOR")]
    FindSuccessor { key_id: u64 },

    #[serde(rename = "NOTIFY")]
    Notify { candidate: Peer },

    #[serde(rename = "PUT")]
    Put {
        key: String,
        value: PutValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_node_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u32>,
    },

    #[serde(rename = "GET")]
    Get {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_node_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u32>,
    },

    /// `key`/`value` stay optional so a missing parameter can be answered
    /// with `WRONG_PARAMS` instead of a framing error.
    #[serde(rename = "DELETE")]
    Delete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_node_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u32>,
    },

    #[serde(rename = "JOIN")]
    Join { host: String, port: u16 },

    #[serde(rename = "DEPART")]
    Depart,

    #[serde(rename = "UPDATE_SUCCESSOR")]
    UpdateSuccessor {
        new_succ_id: u64,
        new_succ_host: String,
        new_succ_port: u16,
    },

    #[serde(rename = "UPDATE_PREDECESSOR")]
    UpdatePredecessor {
        new_pred_id: u64,
        new_pred_host: String,
        new_pred_port: u16,
    },

    #[serde(rename = "TRANSFER_KEYS")]
    TransferKeys {
        new_node_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_node_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u32>,
    },

    #[serde(rename = "MOVE_ALL_KEYS")]
    MoveAllKeys {
        data_store: Store,
        #[serde(default = "default_move_ttl")]
        ttl: u32,
    },

    #[serde(rename = "GET_OVERLAY")]
    GetOverlay {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_node_id: Option<u64>,
    },
}

/// Command tags a peer understands. Anything else earns the
/// unknown-command error reply rather than the `ERROR` literal.
pub const COMMANDS: &[&str] = &[
    "GET_NODE_INFO",
    "FIND_SUCCESSOR",
    "NOTIFY",
    "PUT",
    "GET",
    "DELETE",
    "JOIN",
    "DEPART",
    "UPDATE_SUCCESSOR",
    "UPDATE_PREDECESSOR",
    "TRANSFER_KEYS",
    "MOVE_ALL_KEYS",
    "GET_OVERLAY",
];

pub fn is_known_command(cmd: &str) -> bool {
    COMMANDS.contains(&cmd)
}

// ── Responses ────────────────────────────────────────────────────

/// `GET_NODE_INFO` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoReply {
    pub node_id: u64,
    pub successor: Peer,
    pub predecessor: Peer,
    pub data_store: Store,
}

/// `FIND_SUCCESSOR` and `JOIN` reply: the custodian and its predecessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSuccessorReply {
    pub successor: Peer,
    pub predecessor: Peer,
}

/// Generic `{"status": ...}` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

impl StatusReply {
    pub fn new(status: impl Into<String>) -> Self {
        Self { status: status.into() }
    }
}

/// `GET <key>` reply. `id` is the holder's node id, or -1 on a miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetReply {
    pub value: Vec<String>,
    pub id: i64,
}

/// `GET *` reply: every peer's serialized store, keyed by node id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAllReply {
    pub value: BTreeMap<u64, Store>,
}

/// `TRANSFER_KEYS` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysReply {
    pub keys: Store,
}

/// One peer's slice of a `GET_OVERLAY` walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSummary {
    pub node_id: u64,
    pub successor: Peer,
    pub predecessor: Peer,
    pub data_store: Store,
    pub uploaded_keys: Vec<String>,
}

/// `GET_OVERLAY` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayReply {
    pub overlay: Vec<PeerSummary>,
}

/// `DELETE` outcome, also reused for local applies inside the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Ok,
    NotFound,
    WrongParams,
    Error,
}

impl OpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OpStatus::Ok => "OK",
            OpStatus::NotFound => "NOT_FOUND",
            OpStatus::WrongParams => "WRONG_PARAMS",
            OpStatus::Error => "ERROR",
        }
    }

    pub fn from_status(status: &str) -> Self {
        match status {
            "OK" => OpStatus::Ok,
            "NOT_FOUND" => OpStatus::NotFound,
            "WRONG_PARAMS" => OpStatus::WrongParams,
            _ => OpStatus::Error,
        }
    }
}
