//! Node model: files, directories, commits, checkpoints
//!
//! Every node is an immutable value identified by the hash of its wire
//! form. The wire form is a tagged bincode encoding whose leading variant
//! discriminant distinguishes FILE / DIRECTORY / COMMIT; directory children
//! live in a `BTreeMap` so the serialization is sorted by name and hashing
//! stays deterministic.
//!
//! Parents are stored as hashes and resolved on demand. Re-staging an
//! ancestor does not rewrite descendant parent pointers; old parent
//! versions stay in the store, so walking the chain always terminates and
//! yields correct names, while path resolution stays authoritative through
//! the tree namespace.

use crate::hash::Hash;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node of the versioned filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    File(File),
    Directory(Directory),
    Commit(Commit),
}

/// A file entry; `content` names the compressed payload blob, while the
/// node's own hash covers the metadata below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub content: Hash,
    pub parent: Option<Hash>,
}

/// A directory; `size` is the sum of all child sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub parent: Option<Hash>,
    pub children: BTreeMap<String, Hash>,
}

/// A snapshot of the whole tree plus the changeset that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: u64,
    pub author: String,
    pub message: String,
    pub root: Hash,
    pub parent: Option<Hash>,
    pub changeset: Vec<CheckpointLink>,
}

/// Discriminant of a node, mostly for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Commit,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
            NodeKind::Commit => "commit",
        };
        write!(f, "{name}")
    }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Directory(_) => NodeKind::Directory,
            Node::Commit(_) => NodeKind::Commit,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Node::File(f) => f.id,
            Node::Directory(d) => d.id,
            Node::Commit(c) => c.id,
        }
    }

    /// The node's name within its parent. Commits have no place in the
    /// path tree and report an empty name.
    pub fn name(&self) -> &str {
        match self {
            Node::File(f) => &f.name,
            Node::Directory(d) => &d.name,
            Node::Commit(_) => "",
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::File(f) => f.size,
            Node::Directory(d) => d.size,
            Node::Commit(_) => 0,
        }
    }

    /// Parent hash: the containing directory for files and directories,
    /// the preceding commit for commits.
    pub fn parent_hash(&self) -> Option<&Hash> {
        match self {
            Node::File(f) => f.parent.as_ref(),
            Node::Directory(d) => d.parent.as_ref(),
            Node::Commit(c) => c.parent.as_ref(),
        }
    }

    /// Serialize to the canonical wire form.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from the wire form.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Content hash of the node: a pure function of the wire form. Mutating
    /// any field yields a different hash on the next call.
    pub fn hash(&self) -> Result<Hash> {
        Ok(Hash::digest(&self.marshal()?))
    }
}

impl Directory {
    pub fn new(id: u64, name: impl Into<String>, parent: Option<Hash>) -> Self {
        Self {
            id,
            name: name.into(),
            size: 0,
            parent,
            children: BTreeMap::new(),
        }
    }

    /// The tree root: named "/", no parent.
    pub fn root(id: u64) -> Self {
        Self::new(id, "/", None)
    }
}

impl File {
    pub fn new(id: u64, name: impl Into<String>, size: u64, content: Hash, parent: Hash) -> Self {
        Self {
            id,
            name: name.into(),
            size,
            content,
            parent: Some(parent),
        }
    }
}

impl Commit {
    pub fn new(
        id: u64,
        author: impl Into<String>,
        message: impl Into<String>,
        root: Hash,
        parent: Option<Hash>,
    ) -> Self {
        Self {
            id,
            author: author.into(),
            message: message.into(),
            root,
            parent,
            changeset: Vec::new(),
        }
    }
}

/// What happened to a node in one change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    Moved,
}

/// A per-node change record; history for one `id_link` is ordered by `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Id of the node this record belongs to
    pub id_link: u64,
    /// Position within the node's history
    pub index: u64,
    /// Node hash after the change
    pub hash: Hash,
    pub change: ChangeKind,
    pub author: String,
}

impl Checkpoint {
    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// The link a commit changeset stores for this record.
    pub fn link(&self) -> CheckpointLink {
        CheckpointLink {
            id_link: self.id_link,
            index: self.index,
        }
    }
}

/// Pointer from a commit's changeset into checkpoint history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointLink {
    pub id_link: u64,
    pub index: u64,
}
