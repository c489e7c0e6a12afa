use std::io;

/// Errors surfaced by the wire layer.
///
/// Callers in the node core treat any `WireError` as "peer unreachable or
/// talking nonsense" and fall back to their documented defaults; nothing
/// here is retried.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame of {0} bytes exceeds maximum")]
    Oversize(u64),

    #[error("peer closed connection before responding")]
    Closed,

    #[error("peer reported an internal error")]
    Remote,
}
