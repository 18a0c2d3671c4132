//! Disk tier: one self-describing file per key.
//!
//! File layout (`<key>.entry`):
//!
//! ```text
//! {"version":1,"key":"…","status":200,"content_type":"application/json",
//!  "created_at_ms":…,"ttl_ms":…,"body_len":…}\n
//! <body_len raw body bytes>
//! ```
//!
//! The header is a single line of compact JSON (string escaping guarantees
//! it contains no raw newline). Each file carries everything needed to decide
//! expiry, so there is no index to corrupt. Writes go to a temp file in the
//! same directory, are synced, and are renamed into place; concurrent writers
//! of one key resolve as last-writer-wins.
//!
//! Reads take no lock. Renames and unlinks of a key happen under one of a
//! fixed set of process-wide striped async locks, shared by every tier in the
//! process, and a stale entry is only unlinked after being re-read under that
//! lock. A sweep or lookup therefore never deletes an entry that a concurrent
//! `store` has just put in place. Separate processes writing one directory
//! concurrently are not coordinated.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::entry::{CacheEntry, from_millis, to_millis};
use super::key::CacheKey;
use crate::types::Payload;
use crate::{Result, TollgateError};

const FORMAT_VERSION: u32 = 1;
const ENTRY_EXTENSION: &str = "entry";
const LOCK_STRIPES: usize = 64;

static KEY_LOCKS: LazyLock<Vec<Mutex<()>>> =
    LazyLock::new(|| (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect());

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    version: u32,
    key: String,
    status: u16,
    content_type: Option<String>,
    created_at_ms: u64,
    ttl_ms: u64,
    body_len: u64,
}

/// Disk entries removed by a sweep.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SweepReport {
    pub expired: usize,
    pub corrupt: usize,
    pub remaining: usize,
    /// Entries that could not be read or deleted.
    pub failed: usize,
}

/// State of an entry file as judged under its key's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Missing,
    Fresh,
    /// Expired; the file was removed.
    Expired,
    /// Undecodable; the file was removed.
    Corrupt,
}

#[derive(Debug)]
pub(crate) struct DiskTier {
    dir: PathBuf,
}

impl DiskTier {
    /// Open (creating if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            TollgateError::Configuration(format!(
                "failed to create cache dir {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }


    /// Read the entry for `key`.
    ///
    /// `Ok(None)` when no file exists; [`TollgateError::CacheCorruption`]
    /// when one exists but cannot be decoded. Expiry is left to the caller.
    pub async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode(key, &bytes)
            .map(Some)
            .map_err(|reason| TollgateError::CacheCorruption { path, reason })
    }

    /// Atomically write the entry for `key`.
    pub async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let bytes = encode(key, entry)?;
        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{key}.{:016x}.tmp", rand::random::<u64>()));

        if let Err(e) = write_synced(&tmp, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        let _guard = key_lock(key).lock().await;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key = key.short(), bytes = bytes.len(), "wrote disk cache entry");
        Ok(())
    }

    /// Delete the entry for `key`. Returns whether a file was removed.
    pub async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let _guard = key_lock(key).lock().await;
        remove_path(&self.path_for(key)).await
    }

    /// Re-read the entry for `key` under its lock and delete it only if it is
    /// still expired at `now` or undecodable.
    pub async fn remove_stale(&self, key: &CacheKey, now: SystemTime) -> Result<Verdict> {
        let path = self.path_for(key);
        let _guard = key_lock(key).lock().await;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Verdict::Missing),
            Err(e) => return Err(e.into()),
        };
        let verdict = match decode(key, &bytes) {
            Ok(entry) if entry.is_expired(now) => Verdict::Expired,
            Ok(_) => return Ok(Verdict::Fresh),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "removing corrupt cache entry");
                Verdict::Corrupt
            }
        };
        if remove_path(&path).await? {
            Ok(verdict)
        } else {
            Ok(Verdict::Missing)
        }
    }

    /// Remove expired and undecodable entries.
    ///
    /// Safe to run alongside `load`/`store`: each file is judged and deleted
    /// under its key's lock. An entry that cannot be read or deleted is
    /// logged, counted in `failed` and skipped.
    pub async fn sweep(&self, now: SystemTime) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for (key, path) in self.entry_files().await? {
            match self.remove_stale(&key, now).await {
                Ok(Verdict::Missing) => {}
                Ok(Verdict::Fresh) => report.remaining += 1,
                Ok(Verdict::Expired) => report.expired += 1,
                Ok(Verdict::Corrupt) => report.corrupt += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to sweep cache entry");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Delete every entry file. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for (key, path) in self.entry_files().await? {
            let _guard = key_lock(&key).lock().await;
            if remove_path(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of entry files currently on disk (expired ones included).
    pub async fn count(&self) -> Result<usize> {
        Ok(self.entry_files().await?.len())
    }

    /// Every `<key>.entry` file in the directory. Temp files and anything
    /// whose stem is not a valid key are ignored.
    async fn entry_files(&self) -> Result<Vec<(CacheKey, PathBuf)>> {
        let mut files = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| CacheKey::parse(s).ok())
            else {
                continue;
            };
            files.push((key, path));
        }
        Ok(files)
    }
}

fn key_lock(key: &CacheKey) -> &'static Mutex<()> {
    let stripe = key
        .as_str()
        .get(..2)
        .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
        .unwrap_or_default();
    &KEY_LOCKS[stripe % LOCK_STRIPES]
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

async fn remove_path(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn encode(key: &CacheKey, entry: &CacheEntry) -> Result<Vec<u8>> {
    let header = EntryHeader {
        version: FORMAT_VERSION,
        key: key.as_str().to_string(),
        status: entry.payload.status,
        content_type: entry.payload.content_type.clone(),
        created_at_ms: to_millis(entry.created_at),
        ttl_ms: u64::try_from(entry.ttl.as_millis()).unwrap_or(u64::MAX),
        body_len: entry.payload.body.len() as u64,
    };
    let mut bytes = serde_json::to_vec(&header)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&entry.payload.body);
    Ok(bytes)
}

fn decode(key: &CacheKey, bytes: &[u8]) -> std::result::Result<CacheEntry, String> {
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| "missing header line".to_string())?;
    let header: EntryHeader =
        serde_json::from_slice(&bytes[..split]).map_err(|e| format!("bad header: {e}"))?;
    if header.version != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", header.version));
    }
    if header.key != key.as_str() {
        return Err("header key does not match file name".into());
    }
    let body = &bytes[split + 1..];
    if body.len() as u64 != header.body_len {
        return Err(format!(
            "body length {} does not match header ({})",
            body.len(),
            header.body_len
        ));
    }
    Ok(CacheEntry {
        payload: Payload {
            status: header.status,
            content_type: header.content_type,
            body: body.to_vec(),
        },
        created_at: from_millis(header.created_at_ms),
        ttl: Duration::from_millis(header.ttl_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KeyBuilder;
    use crate::types::RequestParams;

    fn key() -> CacheKey {
        KeyBuilder::new().build(&RequestParams::new().with("q", "disk"))
    }

    #[test]
    fn body_may_contain_newlines() {
        let entry = CacheEntry::new(
            Payload::new("line one\nline two\n").with_content_type("text/plain"),
            Duration::from_secs(30),
        );
        let bytes = encode(&key(), &entry).unwrap();
        let decoded = decode(&key(), &bytes).unwrap();
        assert_eq!(decoded.payload, entry.payload);
        assert_eq!(decoded.ttl, Duration::from_secs(30));
        assert_eq!(to_millis(decoded.created_at), to_millis(entry.created_at));
    }

    #[test]
    fn truncated_body_is_corrupt() {
        let entry = CacheEntry::new(Payload::new("0123456789"), Duration::from_secs(30));
        let bytes = encode(&key(), &entry).unwrap();
        assert!(decode(&key(), &bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn mismatched_key_is_corrupt() {
        let entry = CacheEntry::new(Payload::new("x"), Duration::from_secs(30));
        let bytes = encode(&key(), &entry).unwrap();
        let other = KeyBuilder::new().build(&RequestParams::new().with("q", "other"));
        assert!(decode(&other, &bytes).is_err());
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(decode(&key(), b"not a cache file").is_err());
        assert!(decode(&key(), b"{}\nbody").is_err());
    }

    #[tokio::test]
    async fn store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).unwrap();
        let entry = CacheEntry::new(Payload::new("x"), Duration::from_secs(30));
        tier.store(&key(), &entry).await.unwrap();
        tier.store(&key(), &entry).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.entry", key())]);
    }

    #[tokio::test]
    async fn remove_stale_keeps_replaced_entry() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).unwrap();
        let judged_at = SystemTime::now() + Duration::from_secs(60);

        let old = CacheEntry::new(Payload::new("old"), Duration::from_secs(1));
        tier.store(&key(), &old).await.unwrap();
        let fresh = CacheEntry::new(Payload::new("fresh"), Duration::from_secs(3600));
        tier.store(&key(), &fresh).await.unwrap();

        assert_eq!(tier.remove_stale(&key(), judged_at).await.unwrap(), Verdict::Fresh);
        let kept = tier.load(&key()).await.unwrap().unwrap();
        assert_eq!(kept.payload.text(), "fresh");
    }

    #[tokio::test]
    async fn remove_stale_deletes_expired_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path()).unwrap();
        let later = SystemTime::now() + Duration::from_secs(60);

        let entry = CacheEntry::new(Payload::new("x"), Duration::from_secs(1));
        tier.store(&key(), &entry).await.unwrap();
        assert_eq!(tier.remove_stale(&key(), later).await.unwrap(), Verdict::Expired);
        assert_eq!(tier.remove_stale(&key(), later).await.unwrap(), Verdict::Missing);

        std::fs::write(tier.path_for(&key()), b"garbage").unwrap();
        assert_eq!(tier.remove_stale(&key(), later).await.unwrap(), Verdict::Corrupt);
        assert!(!tier.path_for(&key()).exists());
    }
}
