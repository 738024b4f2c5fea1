//! Error kinds that cross the RPC boundary.
//!
//! Everything else (fetch failures, snapshot IO, queue-empty polls) is
//! handled where it happens and never surfaces to a remote caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    /// The transport failed or the peer is down. Callers recover locally:
    /// search routing drops the replica and retries, crawlers spill to a
    /// pending queue, callback delivery removes the subscriber.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// The dispatcher found zero reachable storage barrels even after a
    /// reconnect pass. Surfaced to the caller.
    #[error("no storage barrels available")]
    NoReplicas,
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Unreachable(e.to_string())
    }
}
