//! The versioned filesystem: object store, staging, checkpoints, refs
//!
//! Key space (nested buckets, see `kv`):
//!
//! ```text
//! objects/<b58-hash>                       serialized node
//! tree/<path>                              node hash ("/." suffix for dirs)
//! checkpoints/<hex-id>/<hex-index>         serialized checkpoint
//! stage/objects|tree|checkpoints/...       same, pending namespaces
//! stats/node-count                         u64 big-endian id counter
//! refs/<lowercase-name>                    node hash
//! metadata/<key>                           caller-defined bytes
//! ```
//!
//! Nodes enter `stage/objects` on staging and are promoted to `objects` on
//! commit; objects are immutable once written. The filesystem is
//! single-writer, multi-reader: one `RwLock` guards the path trie, the hash
//! index and the id counter. Every mutating operation takes it exclusively.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::hash::Hash;
use crate::kv::KvStore;
use crate::node::{ChangeKind, Checkpoint, CheckpointLink, Commit, Directory, File, Node, NodeKind};
use crate::trie::PathTrie;
use crate::Result;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const STAGE_PREFIX: &str = "stage/";

/// Cooperative cancellation for long-running scans. Checked between
/// records, never mid-record.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// In-memory caches; authoritative state lives in the KV store.
struct CacheState {
    trie: PathTrie,
    /// b58 hash -> cached trie path.
    index: AHashMap<String, String>,
}

impl CacheState {
    fn cached(&self, b58: &str) -> Option<Arc<Node>> {
        let path = self.index.get(b58)?;
        self.trie.lookup(path)
    }
}

/// Which shape of entry a path lookup is after. Directory entries carry a
/// `/.` suffix in the tree namespace, so `foo` the file and `foo` the
/// directory coexist.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Any,
    File,
    Directory,
}

/// A content-addressed versioned filesystem over a KV store
pub struct Filesystem {
    kv: KvStore,
    config: StoreConfig,
    state: RwLock<CacheState>,
}

impl Filesystem {
    pub fn new(kv: KvStore) -> Self {
        Self::with_config(kv, StoreConfig::default())
    }

    pub fn with_config(kv: KvStore, config: StoreConfig) -> Self {
        Self {
            kv,
            config,
            state: RwLock::new(CacheState {
                trie: PathTrie::new(),
                index: AHashMap::new(),
            }),
        }
    }

    /// Draw the next node id from the persistent `stats/node-count`
    /// counter. Ids are monotone for the lifetime of the store and are
    /// never reused.
    pub fn next_id(&self) -> Result<u64> {
        let _exclusive = self.state.write();
        self.next_id_inner()
    }

    fn next_id_inner(&self) -> Result<u64> {
        let bucket = self.kv.bucket(&["stats"]);
        let next = match bucket.get("node-count")? {
            Some(bytes) => {
                if bytes.len() != 8 {
                    return Err(StoreError::Corrupt("node-count is not a u64".into()));
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf) + 1
            }
            None => 1,
        };

        bucket.put("node-count", &next.to_be_bytes())?;
        Ok(next)
    }

    /// Load a node's bytes by hash, probing the live namespace first and
    /// the stage second. The namespaces are disjoint by construction, so
    /// the order only decides error provenance.
    fn load_node(&self, hash: &Hash) -> Result<Node> {
        let b58 = hash.to_b58();

        for ns in [&["objects"][..], &["stage", "objects"][..]] {
            if let Some(data) = self.kv.bucket(ns).get(&b58)? {
                return Node::unmarshal(&data);
            }
        }

        Err(StoreError::NoHashFound {
            hash: b58,
            namespaces: "objects and stage/objects".into(),
        })
    }

    /// Reconstruct a node's absolute path by walking its parent hashes.
    /// A visited set guards against cycles in a malformed store.
    fn node_path(&self, node: &Node) -> Result<String> {
        if let Node::Commit(_) = node {
            return Err(StoreError::BadNode);
        }

        if node.parent_hash().is_none() {
            return Ok("/".to_string());
        }

        let mut names = vec![node.name().to_string()];
        let mut parent = node.parent_hash().cloned();
        let mut visited = HashSet::new();

        while let Some(hash) = parent {
            let b58 = hash.to_b58();
            if !visited.insert(b58.clone()) {
                return Err(StoreError::Corrupt(format!("parent cycle at {b58}")));
            }

            let ancestor = self.load_node(&hash)?;
            if !matches!(ancestor, Node::Directory(_)) {
                return Err(StoreError::BadNode);
            }

            match ancestor.parent_hash() {
                None => break, // reached the root
                Some(_) => {
                    names.push(ancestor.name().to_string());
                    parent = ancestor.parent_hash().cloned();
                }
            }
        }

        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Resolve a node by hash, going through the trie/index cache.
    pub fn node_by_hash(&self, hash: &Hash) -> Result<Arc<Node>> {
        let b58 = hash.to_b58();
        {
            let state = self.state.read();
            if let Some(node) = state.cached(&b58) {
                return Ok(node);
            }
        }

        let mut state = self.state.write();
        self.node_by_hash_locked(&mut state, hash)
    }

    fn node_by_hash_locked(&self, state: &mut CacheState, hash: &Hash) -> Result<Arc<Node>> {
        let b58 = hash.to_b58();
        if let Some(node) = state.cached(&b58) {
            return Ok(node);
        }

        let node = self.load_node(hash)?;
        if let Node::Commit(_) = node {
            // Commits have no place in the path trie.
            return Ok(Arc::new(node));
        }

        let path = self.node_path(&node)?;
        let node = Arc::new(node);
        state.trie.insert(&path, node.clone(), b58.clone());
        state.index.insert(b58, path);
        self.enforce_cache_bound(state);
        Ok(node)
    }

    fn enforce_cache_bound(&self, state: &mut CacheState) {
        if state.trie.len() > self.config.max_cached_nodes {
            for b58 in state.trie.evict_to(self.config.max_cached_nodes) {
                state.index.remove(&b58);
            }
        }
    }

    /// Resolve a path to a node. `Ok(None)` means "no such path"; it is
    /// deliberately not an error, see [`Filesystem::require_node`].
    pub fn resolve_node(&self, path: &str) -> Result<Option<Arc<Node>>> {
        let mode = if path.trim_end_matches('/').ends_with("/.") || path == "." {
            Lookup::Directory
        } else {
            Lookup::Any
        };
        let clean = canonical(path);

        {
            let state = self.state.read();
            if let Some(node) = trie_hit(&state, &clean, mode) {
                return Ok(Some(node));
            }
        }

        let mut state = self.state.write();
        self.resolve_locked(&mut state, &clean, mode)
    }

    /// Resolve a path, promoting absence to [`StoreError::NoPathFound`].
    pub fn require_node(&self, path: &str) -> Result<Arc<Node>> {
        let clean = canonical(path);
        self.resolve_node(path)?.ok_or(StoreError::NoPathFound {
            path: clean,
            namespace: "tree and stage/tree".into(),
        })
    }

    fn resolve_locked(
        &self,
        state: &mut CacheState,
        clean: &str,
        mode: Lookup,
    ) -> Result<Option<Arc<Node>>> {
        if let Some(node) = trie_hit(state, clean, mode) {
            return Ok(Some(node));
        }

        let candidates = match mode {
            Lookup::File => vec![tree_key(clean)],
            Lookup::Directory => vec![tree_key(&append_dot(clean))],
            // A bare path may name a file or a directory; try both shapes.
            Lookup::Any => vec![tree_key(clean), tree_key(&append_dot(clean))],
        };

        for ns in [&["tree"][..], &["stage", "tree"][..]] {
            let bucket = self.kv.bucket(ns);
            for key in &candidates {
                if let Some(bytes) = bucket.get(key)? {
                    if bytes.is_empty() {
                        // Removal tombstone, cleared at the next commit.
                        continue;
                    }
                    let hash = Hash::from_bytes(&bytes)?;
                    return self.node_by_hash_locked(state, &hash).map(Some);
                }
            }
        }

        Ok(None)
    }

    pub fn resolve_file(&self, path: &str) -> Result<Option<File>> {
        let clean = canonical(path);
        let mut state = self.state.write();
        match self.resolve_locked(&mut state, &clean, Lookup::File)? {
            Some(node) => match &*node {
                Node::File(f) => Ok(Some(f.clone())),
                _ => Err(StoreError::BadNode),
            },
            None => Ok(None),
        }
    }

    pub fn resolve_directory(&self, path: &str) -> Result<Option<Directory>> {
        let clean = canonical(path);
        let mut state = self.state.write();
        match self.resolve_locked(&mut state, &clean, Lookup::Directory)? {
            Some(node) => match &*node {
                Node::Directory(d) => Ok(Some(d.clone())),
                _ => Err(StoreError::BadNode),
            },
            None => Ok(None),
        }
    }

    pub fn file_by_hash(&self, hash: &Hash) -> Result<File> {
        match &*self.node_by_hash(hash)? {
            Node::File(f) => Ok(f.clone()),
            _ => Err(StoreError::BadNode),
        }
    }

    pub fn directory_by_hash(&self, hash: &Hash) -> Result<Directory> {
        match &*self.node_by_hash(hash)? {
            Node::Directory(d) => Ok(d.clone()),
            _ => Err(StoreError::BadNode),
        }
    }

    pub fn commit_by_hash(&self, hash: &Hash) -> Result<Commit> {
        match &*self.node_by_hash(hash)? {
            Node::Commit(c) => Ok(c.clone()),
            _ => Err(StoreError::BadNode),
        }
    }

    /// Stage a file or directory: write it to the stage namespaces, cache
    /// it, and re-stage the whole parent chain, whose hashes change with
    /// the new child. Commits go through [`Filesystem::submit_commit`].
    pub fn stage_node(&self, node: &Node) -> Result<()> {
        let mut state = self.state.write();
        self.stage_node_locked(&mut state, node.clone())
    }

    fn stage_node_locked(&self, state: &mut CacheState, node: Node) -> Result<()> {
        if let Node::Commit(_) = node {
            return Err(StoreError::CannotStageCommit);
        }

        let data = node.marshal()?;
        let hash = Hash::digest(&data);
        let b58 = hash.to_b58();
        self.kv.bucket(&["stage", "objects"]).put(&b58, &data)?;

        let path = self.node_path(&node)?;
        let key = match node.kind() {
            NodeKind::Directory => tree_key(&append_dot(&path)),
            _ => tree_key(&path),
        };
        self.kv
            .bucket(&["stage", "tree"])
            .put(&key, hash.as_bytes())?;

        tracing::debug!(path = %path, hash = %b58, "staged node");

        let name = node.name().to_string();
        let size = node.size();
        let parent_hash = node.parent_hash().cloned();
        let parent_path = split_parent(&path).0.to_string();

        state.trie.insert(&path, Arc::new(node), b58.clone());
        state.index.insert(b58, path);
        self.enforce_cache_bound(state);

        // The parent's child list changed, so its hash changes too; the
        // chain up to the root must be re-staged. Prefer the current
        // version of the parent: the node's own parent pointer may predate
        // sibling updates.
        if let Some(parent_hash) = parent_hash {
            let parent = match self.resolve_locked(state, &parent_path, Lookup::Directory)? {
                Some(current) => current,
                None => self.node_by_hash_locked(state, &parent_hash)?,
            };
            let Node::Directory(dir) = &*parent else {
                return Err(StoreError::BadNode);
            };

            let mut dir = dir.clone();
            let old_child_size = match dir.children.get(&name) {
                Some(old) => self.node_by_hash_locked(state, &old.clone())?.size(),
                None => 0,
            };
            dir.size = dir.size + size - old_child_size;
            dir.children.insert(name, hash);

            self.stage_node_locked(state, Node::Directory(dir))?;
        }

        Ok(())
    }

    /// Stage a file at `path`, creating missing intermediate directories,
    /// and record the matching change checkpoint. The node id is reused
    /// when the path already names a file.
    pub fn stage_file(&self, path: &str, content: Hash, size: u64, author: &str) -> Result<File> {
        let mut state = self.state.write();

        let clean = canonical(path);
        if clean == "/" {
            return Err(StoreError::InvalidPath("a file needs a name".into()));
        }
        let (parent_path, name) = split_parent(&clean);

        let (id, change) = match self.resolve_locked(&mut state, &clean, Lookup::File)? {
            Some(node) => match &*node {
                Node::File(f) => (f.id, ChangeKind::Modified),
                _ => return Err(StoreError::BadNode),
            },
            None => (self.next_id_inner()?, ChangeKind::Added),
        };

        let parent = self.ensure_directory_locked(&mut state, parent_path)?;
        let parent_hash = Node::Directory(parent).hash()?;

        let file = File::new(id, name, size, content, parent_hash);
        let file_hash = Node::File(file.clone()).hash()?;
        self.stage_node_locked(&mut state, Node::File(file.clone()))?;

        let checkpoint = Checkpoint {
            id_link: id,
            index: self.next_checkpoint_index(id)?,
            hash: file_hash,
            change,
            author: author.to_string(),
        };
        self.stage_checkpoint_inner(&checkpoint)?;

        Ok(file)
    }

    /// Resolve the directory at `path`, staging any missing ancestors on
    /// the way down.
    fn ensure_directory_locked(&self, state: &mut CacheState, path: &str) -> Result<Directory> {
        if let Some(node) = self.resolve_locked(state, path, Lookup::Directory)? {
            return match &*node {
                Node::Directory(d) => Ok(d.clone()),
                _ => Err(StoreError::BadNode),
            };
        }

        let dir = if path == "/" {
            Directory::root(self.next_id_inner()?)
        } else {
            let (parent_path, name) = split_parent(path);
            let parent = self.ensure_directory_locked(state, parent_path)?;
            Directory::new(
                self.next_id_inner()?,
                name,
                Some(Node::Directory(parent).hash()?),
            )
        };

        self.stage_node_locked(state, Node::Directory(dir.clone()))?;
        Ok(dir)
    }

    /// Unlink a file or empty directory, re-stage its ancestors and record
    /// a `Removed` checkpoint. The object itself stays stored; history
    /// still references its hash.
    pub fn remove(&self, path: &str, author: &str) -> Result<()> {
        let mut state = self.state.write();

        let clean = canonical(path);
        if clean == "/" {
            return Err(StoreError::InvalidPath(
                "cannot remove the root directory".into(),
            ));
        }

        let node = self
            .resolve_locked(&mut state, &clean, Lookup::Any)?
            .ok_or_else(|| StoreError::NoPathFound {
                path: clean.clone(),
                namespace: "tree and stage/tree".into(),
            })?;

        if let Node::Directory(dir) = &*node {
            if !dir.children.is_empty() {
                return Err(StoreError::InvalidPath(format!(
                    "directory not empty: {clean}"
                )));
            }
        }

        let (parent_path, name) = split_parent(&clean);
        let mut parent = self.ensure_directory_locked(&mut state, parent_path)?;
        parent.children.remove(name);
        parent.size = parent.size.saturating_sub(node.size());
        self.stage_node_locked(&mut state, Node::Directory(parent))?;

        // Tombstone the mapping; promotion turns it into a live delete.
        let key = match node.kind() {
            NodeKind::Directory => tree_key(&append_dot(&clean)),
            _ => tree_key(&clean),
        };
        self.kv.bucket(&["stage", "tree"]).put(&key, b"")?;

        if let Some((_, b58)) = state.trie.remove(&clean) {
            state.index.remove(&b58);
        }

        let checkpoint = Checkpoint {
            id_link: node.id(),
            index: self.next_checkpoint_index(node.id())?,
            hash: node.hash()?,
            change: ChangeKind::Removed,
            author: author.to_string(),
        };
        self.stage_checkpoint_inner(&checkpoint)
    }

    /// Append a change record to the stage. `(id_link, index)` pairs are
    /// append-only; staging a duplicate is a programming error.
    pub fn stage_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let _exclusive = self.state.write();
        self.stage_checkpoint_inner(checkpoint)
    }

    fn stage_checkpoint_inner(&self, checkpoint: &Checkpoint) -> Result<()> {
        let key = hex_key(checkpoint.index);

        for ns in [&["checkpoints"][..], &["stage", "checkpoints"][..]] {
            let bucket = self.kv.bucket(ns).sub(&hex_key(checkpoint.id_link));
            if bucket.get(&key)?.is_some() {
                return Err(StoreError::CheckpointExists {
                    id_link: checkpoint.id_link,
                    index: checkpoint.index,
                });
            }
        }

        self.kv
            .bucket(&["stage", "checkpoints"])
            .sub(&hex_key(checkpoint.id_link))
            .put(&key, &checkpoint.marshal()?)
    }

    fn next_checkpoint_index(&self, id_link: u64) -> Result<u64> {
        match self.last_checkpoint(id_link) {
            Ok(checkpoint) => Ok(checkpoint.index + 1),
            Err(StoreError::NoLastCheckpoint(_)) => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// The most recent change record for a node id, probing the committed
    /// namespace before the stage.
    pub fn last_checkpoint(&self, id_link: u64) -> Result<Checkpoint> {
        for ns in [&["checkpoints"][..], &["stage", "checkpoints"][..]] {
            let bucket = self.kv.bucket(ns).sub(&hex_key(id_link));
            if let Some((_, value)) = bucket.last()? {
                return Checkpoint::unmarshal(&value);
            }
        }

        Err(StoreError::NoLastCheckpoint(id_link))
    }

    /// Full change history for a node id, ordered by index. Unknown ids
    /// yield an empty history, not an error.
    pub fn history(&self, id_link: u64) -> Result<Vec<Checkpoint>> {
        self.history_with(id_link, &CancelToken::new())
    }

    pub fn history_with(&self, id_link: u64, cancel: &CancelToken) -> Result<Vec<Checkpoint>> {
        let mut history = Vec::new();

        for ns in [&["checkpoints"][..], &["stage", "checkpoints"][..]] {
            self.kv
                .bucket(ns)
                .sub(&hex_key(id_link))
                .for_each(|_, value| {
                    if cancel.is_cancelled() {
                        return Err(StoreError::Cancelled);
                    }
                    history.push(Checkpoint::unmarshal(value)?);
                    Ok(())
                })?;
        }

        // Keys already sort numerically, but the ordering is an invariant
        // of the API, not of the key format.
        history.sort_by_key(|c| c.index);
        Ok(history)
    }

    pub fn history_by_path(&self, path: &str) -> Result<Vec<Checkpoint>> {
        let node = self.require_node(path)?;
        self.history(node.id())
    }

    /// Promote the stage to the live namespaces and advance HEAD.
    ///
    /// The whole promotion -- object, tree and checkpoint copies, stage
    /// clear, the commit object itself, the HEAD ref -- is applied as one
    /// atomic batch. On any failure the stage is untouched and HEAD
    /// unchanged.
    pub fn submit_commit(&self, commit: &mut Commit) -> Result<()> {
        self.submit_commit_with(commit, &CancelToken::new())
    }

    pub fn submit_commit_with(&self, commit: &mut Commit, cancel: &CancelToken) -> Result<()> {
        let mut state = self.state.write();

        match self.head_locked(&mut state) {
            Ok(head) => {
                if head.root == commit.root {
                    return Err(StoreError::NoChange);
                }
            }
            // No HEAD yet: this is the first commit.
            Err(StoreError::RefNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        // Every staged change record becomes part of the changeset.
        self.kv
            .bucket(&["stage", "checkpoints"])
            .for_each(|key, _| {
                if cancel.is_cancelled() {
                    return Err(StoreError::Cancelled);
                }
                commit.changeset.push(parse_checkpoint_key(key)?);
                Ok(())
            })?;

        let node = Node::Commit(commit.clone());
        let data = node.marshal()?;
        let hash = Hash::digest(&data);
        let b58 = hash.to_b58();

        let mut batch = sled::Batch::default();
        let mut records = 0usize;
        for item in self.kv.scan(STAGE_PREFIX) {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let (key, value) = item?;
            let live = key[STAGE_PREFIX.len()..].to_vec();
            if value.is_empty() {
                // Removal tombstone: drop the live mapping.
                batch.remove(live);
            } else {
                batch.insert(live, value);
            }
            batch.remove(key);
            records += 1;
        }

        batch.insert(format!("objects/{b58}").into_bytes(), data);
        batch.insert(b"refs/head".to_vec(), hash.as_bytes());

        self.kv.apply(batch)?;
        self.kv.flush()?;

        tracing::info!(commit = %b58, records, "promoted stage to live");
        Ok(())
    }

    /// Store `name -> node hash`. Refnames are case-insensitive and
    /// lowercased before storage.
    pub fn save_ref(&self, name: &str, node: &Node) -> Result<()> {
        let _exclusive = self.state.write();
        let hash = node.hash()?;
        self.kv
            .bucket(&["refs"])
            .put(&name.to_lowercase(), hash.as_bytes())
    }

    pub fn resolve_ref(&self, name: &str) -> Result<Arc<Node>> {
        let mut state = self.state.write();
        self.resolve_ref_locked(&mut state, name)
    }

    fn resolve_ref_locked(&self, state: &mut CacheState, name: &str) -> Result<Arc<Node>> {
        let refname = name.to_lowercase();
        let bytes = self
            .kv
            .bucket(&["refs"])
            .get(&refname)?
            .ok_or(StoreError::RefNotFound(refname))?;

        let hash = Hash::from_bytes(&bytes)?;
        self.node_by_hash_locked(state, &hash)
    }

    /// The commit HEAD points at.
    pub fn head(&self) -> Result<Commit> {
        let mut state = self.state.write();
        self.head_locked(&mut state)
    }

    fn head_locked(&self, state: &mut CacheState) -> Result<Commit> {
        match &*self.resolve_ref_locked(state, "HEAD")? {
            Node::Commit(c) => Ok(c.clone()),
            _ => Err(StoreError::BadNode),
        }
    }

    /// The root directory. An empty filesystem yields a synthesized empty
    /// directory that is not persisted; the first write creates the real
    /// root with a proper id.
    pub fn root(&self) -> Result<Directory> {
        match self.resolve_directory("/")? {
            Some(dir) => Ok(dir),
            None => Ok(Directory::root(0)),
        }
    }

    /// The commit that submitting right now would create: current root,
    /// HEAD as parent, empty message.
    pub fn status(&self, author: &str) -> Result<Commit> {
        let root_hash = Node::Directory(self.root()?).hash()?;
        let parent = match self.head() {
            Ok(head) => Some(Node::Commit(head).hash()?),
            Err(StoreError::RefNotFound(_)) => None,
            Err(err) => return Err(err),
        };

        Ok(Commit::new(self.next_id()?, author, "", root_hash, parent))
    }

    pub fn metadata_put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.kv.bucket(&["metadata"]).put(key, value)
    }

    pub fn metadata_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.kv.bucket(&["metadata"]).get(key)
    }

    /// Reserved garbage collection entry point.
    pub fn remove_unreferenced_nodes(&self) -> Result<()> {
        // TODO: walk commit roots, mark reachable hashes and drop the rest
        // together with checkpoints of deleted nodes.
        Ok(())
    }
}

fn trie_hit(state: &CacheState, clean: &str, mode: Lookup) -> Option<Arc<Node>> {
    let node = state.trie.lookup(clean)?;
    let ok = match mode {
        Lookup::Any => true,
        Lookup::File => matches!(&*node, Node::File(_)),
        Lookup::Directory => matches!(&*node, Node::Directory(_)),
    };
    ok.then_some(node)
}

/// Canonical POSIX form: leading slash, no empty or `.` components.
fn canonical(path: &str) -> String {
    let comps: Vec<&str> = path
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();

    if comps.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", comps.join("/"))
    }
}

/// Directory marker form: `/a/b` becomes `/a/b/.`, the root becomes `/.`.
fn append_dot(path: &str) -> String {
    if path == "/" {
        "/.".to_string()
    } else {
        format!("{path}/.")
    }
}

/// Bucket key for a canonical path: the leading slash is dropped, so the
/// root directory entry is literally `.`.
fn tree_key(path: &str) -> String {
    path.strip_prefix('/').unwrap_or(path).to_string()
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("/", path),
    }
}

/// Zero-padded hex, so bucket key order equals numeric order.
fn hex_key(value: u64) -> String {
    format!("{value:016x}")
}

fn parse_checkpoint_key(key: &str) -> Result<CheckpointLink> {
    let (id_part, index_part) = key
        .split_once('/')
        .ok_or_else(|| StoreError::Corrupt(format!("malformed checkpoint key: {key}")))?;

    let id_link = u64::from_str_radix(id_part, 16)
        .map_err(|_| StoreError::Corrupt(format!("malformed checkpoint id: {id_part}")))?;
    let index = u64::from_str_radix(index_part, 16)
        .map_err(|_| StoreError::Corrupt(format!("malformed checkpoint index: {index_part}")))?;

    Ok(CheckpointLink { id_link, index })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_paths() {
        assert_eq!(canonical("/"), "/");
        assert_eq!(canonical(""), "/");
        assert_eq!(canonical("/a/b/"), "/a/b");
        assert_eq!(canonical("a//b"), "/a/b");
        assert_eq!(canonical("/a/b/."), "/a/b");
        assert_eq!(canonical("/."), "/");
    }

    #[test]
    fn test_append_dot() {
        assert_eq!(append_dot("/"), "/.");
        assert_eq!(append_dot("/a"), "/a/.");
    }

    #[test]
    fn test_tree_key() {
        assert_eq!(tree_key("/x.txt"), "x.txt");
        assert_eq!(tree_key("/a/b/."), "a/b/.");
        assert_eq!(tree_key("/."), ".");
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/x.txt"), ("/", "x.txt"));
        assert_eq!(split_parent("/a/b/c"), ("/a/b", "c"));
    }

    #[test]
    fn test_hex_key_orders_numerically() {
        let mut keys: Vec<String> = [3u64, 1, 2, 16, 255].iter().map(|&v| hex_key(v)).collect();
        keys.sort();
        assert_eq!(keys, [hex_key(1), hex_key(2), hex_key(3), hex_key(16), hex_key(255)]);
    }

    #[test]
    fn test_parse_checkpoint_key() {
        let link = parse_checkpoint_key("0000000000000007/0000000000000003").unwrap();
        assert_eq!(link, CheckpointLink { id_link: 7, index: 3 });

        assert!(parse_checkpoint_key("no-slash").is_err());
        assert!(parse_checkpoint_key("xyz/1").is_err());
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_next_id_is_monotone() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);
        let a = fs.next_id()?;
        let b = fs.next_id()?;
        let c = fs.next_id()?;
        assert!(a < b && b < c);
        assert_eq!(a, 1);
        Ok(())
    }

    #[test]
    fn test_node_path_walks_parents() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);

        let root = Directory::root(1);
        let root_hash = Node::Directory(root.clone()).hash()?;
        let sub = Directory::new(2, "a", Some(root_hash));
        let sub_hash = Node::Directory(sub.clone()).hash()?;
        let file = File::new(3, "x.txt", 5, Hash::digest(b"payload"), sub_hash);

        fs.stage_node(&Node::Directory(root))?;
        fs.stage_node(&Node::Directory(sub))?;

        assert_eq!(fs.node_path(&Node::File(file))?, "/a/x.txt");
        Ok(())
    }

    #[test]
    fn test_node_path_detects_cycles() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);

        // Two directories that claim each other as parent; such a store is
        // malformed and must fail instead of looping.
        let a = Directory::new(1, "a", Some(Hash::digest(b"placeholder")));
        let a_hash = Node::Directory(a.clone()).hash()?;
        let b = Directory::new(2, "b", Some(a_hash.clone()));
        let b_hash = Node::Directory(b.clone()).hash()?;
        let mut a2 = a;
        a2.parent = Some(b_hash.clone());

        // Plant the malformed pair directly in the object namespace.
        let objects = fs.kv.bucket(&["objects"]);
        objects.put(&a_hash.to_b58(), &Node::Directory(a2).marshal()?)?;
        objects.put(&b_hash.to_b58(), &Node::Directory(b.clone()).marshal()?)?;

        let err = fs.node_path(&Node::Directory(b)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        Ok(())
    }

    #[test]
    fn test_stage_commit_rejected() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);
        let commit = Commit::new(1, "a", "m", Hash::digest(b"root"), None);
        assert!(matches!(
            fs.stage_node(&Node::Commit(commit)),
            Err(StoreError::CannotStageCommit)
        ));
        Ok(())
    }

    #[test]
    fn test_metadata_roundtrip() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);
        assert_eq!(fs.metadata_get("owner")?, None);
        fs.metadata_put("owner", b"alice")?;
        assert_eq!(fs.metadata_get("owner")?, Some(b"alice".to_vec()));
        Ok(())
    }

    #[test]
    fn test_refs_are_case_insensitive() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);

        let root = Directory::root(1);
        fs.stage_node(&Node::Directory(root.clone()))?;
        fs.save_ref("Trunk", &Node::Directory(root.clone()))?;

        let resolved = fs.resolve_ref("TRUNK")?;
        assert_eq!(resolved.id(), 1);

        assert!(matches!(
            fs.resolve_ref("missing"),
            Err(StoreError::RefNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_duplicate_checkpoint_rejected() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);
        let checkpoint = Checkpoint {
            id_link: 7,
            index: 1,
            hash: Hash::digest(b"x"),
            change: ChangeKind::Added,
            author: "a".into(),
        };

        fs.stage_checkpoint(&checkpoint)?;
        assert!(matches!(
            fs.stage_checkpoint(&checkpoint),
            Err(StoreError::CheckpointExists { id_link: 7, index: 1 })
        ));
        Ok(())
    }

    #[test]
    fn test_history_cancellation() -> crate::Result<()> {
        let fs = Filesystem::new(KvStore::temporary()?);
        for index in 0..4 {
            fs.stage_checkpoint(&Checkpoint {
                id_link: 9,
                index,
                hash: Hash::digest(b"c"),
                change: ChangeKind::Modified,
                author: "a".into(),
            })?;
        }

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            fs.history_with(9, &cancel),
            Err(StoreError::Cancelled)
        ));
        Ok(())
    }
}
