use async_trait::async_trait;
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Precondition, Storage, StoreItem};
use crate::error::StorageError;

/// On-disk layout of a single versioned value.
#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    version: u64,
    value: Value,
}

/// Directory-backed storage: one JSON file per key, nested by `/` segments.
///
/// Values survive process restarts and are visible to other processes using
/// the same directory. Every read-check-write (`write`, `append`, `drain`)
/// runs under an exclusive advisory lock on a `.lock` file next to the data
/// file, so version checks and list updates stay atomic across processes.
/// Data files are replaced by rename, so plain reads never see a torn file.
pub struct FileStorage {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str, suffix: &str) -> PathBuf {
        let mut path = self.root.clone();
        let segments: Vec<String> = key.split('/').map(encode_segment).collect();
        if let Some((last, dirs)) = segments.split_last() {
            for dir in dirs {
                path.push(dir);
            }
            path.push(format!("{last}{suffix}"));
        }
        path
    }

    /// Takes the cross-process lock guarding `path`. Released on drop.
    async fn lock_key(&self, key: &str, path: &Path) -> Result<KeyLock, StorageError> {
        let mut lock_path = path.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|locked| locked);

        locked
            .map(|file| KeyLock { _file: file })
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    async fn read_json<T>(&self, key: &str, path: &Path) -> Result<Option<T>, StorageError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Json {
                key: key.to_string(),
                source,
            })
    }

    async fn write_json<T: Serialize>(
        &self,
        key: &str,
        path: &Path,
        value: &T,
    ) -> Result<(), StorageError> {
        let io_err = |source: std::io::Error| StorageError::Io {
            key: key.to_string(),
            source,
        };
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

/// Holds an exclusive lock on a key's `.lock` file. Closing the file
/// releases the lock.
struct KeyLock {
    _file: File,
}

/// Percent-encodes everything but ASCII alphanumerics, `-` and `_`, so a key
/// segment can never escape the storage root.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, key: &str) -> Result<Option<StoreItem>, StorageError> {
        let path = self.path_for(key, ".json");
        let record: Option<FileRecord> = self.read_json(key, &path).await?;
        Ok(record.map(|r| StoreItem {
            value: r.value,
            version: r.version,
        }))
    }

    async fn write(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<u64, StorageError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key, ".json");
        let _key_lock = self.lock_key(key, &path).await?;
        let current: Option<FileRecord> = self.read_json(key, &path).await?;
        let current_version = current.map(|r| r.version);
        precondition.check(key, current_version)?;

        let version = current_version.unwrap_or(0) + 1;
        self.write_json(key, &path, &FileRecord { version, value })
            .await?;
        Ok(version)
    }

    async fn append(&self, key: &str, values: Vec<Value>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key, ".list.json");
        let _key_lock = self.lock_key(key, &path).await?;
        let mut entries: Vec<Value> = self.read_json(key, &path).await?.unwrap_or_default();
        entries.extend(values);
        self.write_json(key, &path, &entries).await
    }

    async fn drain(&self, key: &str) -> Result<Vec<Value>, StorageError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key, ".list.json");
        let _key_lock = self.lock_key(key, &path).await?;
        let entries: Vec<Value> = self.read_json(key, &path).await?.unwrap_or_default();
        if !entries.is_empty() {
            self.write_json(key, &path, &Vec::<Value>::new()).await?;
        }
        Ok(entries)
    }
}
