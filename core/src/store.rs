use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::schedule::HostIdentity;

/// Namespace for everything this tool writes into a KV.
pub const NAMESPACE: &str = "auto-updater";

/// Filesystem-backed key/value store used as the default KV engine.
#[derive(Clone)]
pub struct FsKv {
    root: PathBuf,
}

/// Minimal key/value interface over byte keys and values.
pub trait Kv: Clone + Send + Sync + 'static {
    /// Get value bytes for `key`, if present.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    /// Set value bytes for `key`, overwriting if it exists.
    fn put(&self, key: &[u8], val: &[u8]) -> Result<()>;
    /// Delete `key`; returns `true` if a value existed.
    fn delete(&self, key: &[u8]) -> bool;
}

/// Serde helpers layered on top of any [`Kv`] implementation.
pub trait KvSerde: Kv {
    /// Deserialize type `T` stored at `key` using `bincode`.
    fn get_t<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get(key) {
            Some(bytes) => {
                let v = bincode::deserialize::<T>(&bytes)
                    .with_context(|| "bincode deserialize")?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }
    /// Serialize `val` with `bincode` and store at `key`.
    fn put_t<T: Serialize>(&self, key: &[u8], val: &T) -> Result<()> {
        let buf = bincode::serialize(val).with_context(|| "bincode serialize")?;
        self.put(key, &buf)
    }
}
impl<T: Kv> KvSerde for T {}

/// Where a host's last successful update time (epoch seconds) lives.
pub trait UpdateRecordStore {
    /// Last update time, or `None` if the host never updated.
    fn read(&self, host: &HostIdentity) -> Result<Option<i64>>;
    /// Record `at` as the last update time.
    fn write(&self, host: &HostIdentity, at: i64) -> Result<()>;
    /// Forget the record; returns `true` if one existed.
    fn clear(&self, host: &HostIdentity) -> bool;
}

impl<K: Kv> UpdateRecordStore for K {
    fn read(&self, host: &HostIdentity) -> Result<Option<i64>> {
        self.get_t::<i64>(&record_key(host))
            .with_context(|| format!("read last update for {host}"))
    }

    fn write(&self, host: &HostIdentity, at: i64) -> Result<()> {
        self.put_t(&record_key(host), &at)
            .with_context(|| format!("write last update for {host}"))
    }

    fn clear(&self, host: &HostIdentity) -> bool {
        self.delete(&record_key(host))
    }
}

fn record_key(host: &HostIdentity) -> Vec<u8> {
    ns(NAMESPACE, &format!("update:last_update_at:{host}"))
}

/// Default KV type exported by this crate (FS-backed).
pub type DefaultKv = FsKv;

/// Open an FS-backed KV rooted at `dir` (created if missing).
pub fn open_default<P: AsRef<Path>>(dir: P) -> Result<DefaultKv> {
    let root = dir.as_ref().to_path_buf();
    fs::create_dir_all(&root)
        .with_context(|| format!("create kv dir {}", root.display()))?;
    Ok(FsKv { root })
}

/// Build a namespaced key as bytes: `"{ns}:{key}"`.
pub fn ns(ns: &str, key: &str) -> Vec<u8> {
    let mut s = String::with_capacity(ns.len() + 1 + key.len());
    s.push_str(ns);
    s.push(':');
    s.push_str(key);
    s.into_bytes()
}

/* --------------------- impl FsKv --------------------- */

impl FsKv {
    fn path_for(&self, key: &[u8]) -> PathBuf {
        // Host names may contain anything; file names are hex of the key bytes.
        self.root.join(hex::encode(key))
    }
}

impl Kv for FsKv {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        let mut f = fs::File::open(&path).ok()?;
        let mut buf = Vec::new();
        if f.read_to_end(&mut buf).is_ok() { Some(buf) } else { None }
    }

    fn put(&self, key: &[u8], val: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        // Write temp then rename so a crash never leaves a half-written record.
        let tmp = path.with_extension("tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(val)
            .and_then(|_| f.sync_all())
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        tracing::debug!(path = %path.display(), bytes = val.len(), "kv put");
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> bool {
        let path = self.path_for(key);
        fs::remove_file(path).is_ok()
    }
}

/// In-process KV, handy for dry runs and tests.
#[derive(Clone, Default)]
pub struct MemKv {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl Kv for MemKv {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &[u8], val: &[u8]) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("mem kv lock poisoned"))?
            .insert(key.to_vec(), val.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.inner
            .lock()
            .map(|mut m| m.remove(key).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> HostIdentity {
        HostIdentity::new(name).unwrap()
    }

    #[test]
    fn fs_record_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let h = host("db-7.internal");
        {
            let kv = open_default(dir.path().join("state")).unwrap();
            assert_eq!(kv.read(&h).unwrap(), None);
            kv.write(&h, 1_700_000_000).unwrap();
        }
        let kv = open_default(dir.path().join("state")).unwrap();
        assert_eq!(kv.read(&h).unwrap(), Some(1_700_000_000));
        assert!(kv.clear(&h));
        assert!(!kv.clear(&h));
        assert_eq!(kv.read(&h).unwrap(), None);
    }

    #[test]
    fn records_are_per_host() {
        let kv = MemKv::default();
        kv.write(&host("a"), 10).unwrap();
        kv.write(&host("b"), 20).unwrap();
        assert_eq!(kv.read(&host("a")).unwrap(), Some(10));
        assert_eq!(kv.read(&host("b")).unwrap(), Some(20));
    }

    #[test]
    fn odd_host_names_map_to_flat_files() {
        let dir = tempfile::tempdir().unwrap();
        let kv = open_default(dir.path()).unwrap();
        kv.write(&host("../../etc/passwd"), 1).unwrap();
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(kv.read(&host("../../etc/passwd")).unwrap(), Some(1));
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let kv = MemKv::default();
        kv.put(&record_key(&host("a")), b"xy").unwrap();
        assert!(kv.read(&host("a")).is_err());
    }

    #[test]
    fn ns_joins_with_colon() {
        assert_eq!(ns("auto-updater", "x"), b"auto-updater:x".to_vec());
    }
}
