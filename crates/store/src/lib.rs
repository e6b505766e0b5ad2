//! ketch storage core: a content-addressed versioned filesystem
//!
//! Every file, directory and commit is an immutable node named by the hash
//! of its serialized form; user-visible paths map to hashes through a
//! mutable tree index; history is a chain of commits over a staging area.
//! The whole structure lives in namespaced buckets of an embedded KV
//! store, with an in-memory path trie as a bounded cache in front of it.

pub mod config;
pub mod error;
pub mod fs;
pub mod hash;
pub mod kv;
pub mod node;
pub mod trie;

pub use config::StoreConfig;
pub use error::StoreError;
pub use fs::{CancelToken, Filesystem};
pub use hash::Hash;
pub use kv::{Bucket, KvStore};
pub use node::{ChangeKind, Checkpoint, CheckpointLink, Commit, Directory, File, Node, NodeKind};
pub use trie::PathTrie;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
