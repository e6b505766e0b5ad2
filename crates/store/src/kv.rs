//! Namespaced key-value buckets over sled
//!
//! Buckets are hierarchical key-prefix namespaces on one sled tree rather
//! than separate trees. Flattening the namespaces onto a single key space
//! is what allows the commit promotion to be a single atomic
//! [`sled::Batch`].

use crate::Result;
use std::path::Path;

/// Handle to the backing database
#[derive(Clone)]
pub struct KvStore {
    db: sled::Db,
}

impl KvStore {
    /// Open (or create) a store at the given directory.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// An in-memory store that disappears on drop. Test use.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Get a bucket for a namespace path, e.g. `&["stage", "objects"]`.
    /// A bucket that "already exists" is simply the same prefix again.
    pub fn bucket(&self, path: &[&str]) -> Bucket {
        Bucket {
            db: self.db.clone(),
            prefix: path.join("/"),
        }
    }

    /// Iterate every key/value pair under `prefix` in key order.
    pub fn scan(&self, prefix: &str) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        self.db
            .scan_prefix(prefix.as_bytes())
            .map(|item| item.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Into::into))
    }

    /// Apply a batch of writes atomically: either all of them land or none.
    pub fn apply(&self, batch: sled::Batch) -> Result<()> {
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Flush to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// One namespace of the key space
#[derive(Clone)]
pub struct Bucket {
    db: sled::Db,
    prefix: String,
}

impl Bucket {
    fn full_key(&self, key: &str) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + 1 + key.len());
        full.extend_from_slice(self.prefix.as_bytes());
        full.push(b'/');
        full.extend_from_slice(key.as_bytes());
        full
    }

    /// The absolute key this bucket would use for `key`; the commit
    /// promotion uses it to rewrite stage keys into live ones.
    pub fn key_for(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(self.full_key(key))?.map(|v| v.to_vec()))
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(self.full_key(key), value)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.db.remove(self.full_key(key))?;
        Ok(())
    }

    /// The entry with the highest key in this bucket, if any.
    pub fn last(&self) -> Result<Option<(String, Vec<u8>)>> {
        let mut prefix = self.prefix.clone().into_bytes();
        prefix.push(b'/');

        match self.db.scan_prefix(&prefix).next_back() {
            Some(item) => {
                let (k, v) = item?;
                let key = String::from_utf8_lossy(&k[prefix.len()..]).into_owned();
                Ok(Some((key, v.to_vec())))
            }
            None => Ok(None),
        }
    }

    /// Visit every entry in key order. The callback's error aborts the scan
    /// and propagates, which is also the cancellation mechanism.
    pub fn for_each(&self, mut f: impl FnMut(&str, &[u8]) -> Result<()>) -> Result<()> {
        let mut prefix = self.prefix.clone().into_bytes();
        prefix.push(b'/');

        for item in self.db.scan_prefix(&prefix) {
            let (k, v) = item?;
            let key = String::from_utf8_lossy(&k[prefix.len()..]);
            f(&key, &v)?;
        }

        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        let mut prefix = self.prefix.clone().into_bytes();
        prefix.push(b'/');
        match self.db.scan_prefix(&prefix).next() {
            Some(item) => {
                item?;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// A nested bucket under this one.
    pub fn sub(&self, name: &str) -> Bucket {
        Bucket {
            db: self.db.clone(),
            prefix: format!("{}/{}", self.prefix, name),
        }
    }
}
