//! Error kinds for the versioned filesystem
//!
//! Errors propagate to the caller unchanged; the store performs no retries.
//! Absence of a path is NOT an error: the resolvers return `Ok(None)` and
//! callers promote that to [`StoreError::NoPathFound`] explicitly when they
//! need to.

/// Errors that can occur in the versioned filesystem
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot convert node to the requested type, broken input data?")]
    BadNode,

    #[error("no such hash in `{namespaces}`: {hash}")]
    NoHashFound { hash: String, namespaces: String },

    #[error("no such path in `{namespace}`: {path}")]
    NoPathFound { path: String, namespace: String },

    #[error("commit root matches HEAD, nothing to commit")]
    NoChange,

    #[error("no checkpoint recorded for node id {0:x}")]
    NoLastCheckpoint(u64),

    #[error("checkpoint ({id_link:x}, {index:x}) already staged")]
    CheckpointExists { id_link: u64, index: u64 },

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("commits are submitted, not staged")]
    CannotStageCommit,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid multihash: {0}")]
    BadHash(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("corrupt store data: {0}")]
    Corrupt(String),

    #[error("wire format: {0}")]
    Wire(#[from] bincode::Error),

    #[error("database: {0}")]
    Db(#[from] sled::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
