use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Peer {peer_id} did not answer within {after:?}")]
    Timeout { peer_id: u64, after: Duration },

    #[error("Peer {0} is unreachable")]
    Unreachable(u64),

    #[error("Node is shutting down")]
    Shutdown,

    #[error("gRPC error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ElectionError>;
