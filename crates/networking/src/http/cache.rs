//! Two-tier response cache: an in-memory map mirrored to files on disk.
//!
//! Both tiers are addressed by the destination key from
//! [`destination_key`](super::url::destination_key). The file tier lives in
//! a dedicated namespace directory so purging it leaves sibling cache data
//! alone.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use directories::BaseDirs;
use image::DynamicImage;
use parking_lot::RwLock;

use super::request::{CachingLevel, ResponseType};
use super::result::{Payload, decode_image};
use crate::error::Result;
use crate::logging::targets;

/// Name of the namespace directory holding cache files.
pub const CACHE_NAMESPACE: &str = "com.networking.cache";

/// The namespace directory under the platform cache directory.
///
/// Falls back to the system temp directory when the platform cache
/// directory cannot be determined.
pub fn default_cache_root() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_NAMESPACE)
}

/// Remove a cache namespace directory. A missing directory is not an error.
pub(crate) fn remove_namespace(root: &Path) -> Result<()> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// An in-memory map plus a filesystem mirror sharing the same keys.
#[derive(Debug)]
pub struct TwoTierCache {
    root: PathBuf,
    memory: RwLock<HashMap<String, Payload>>,
}

impl TwoTierCache {
    /// Create a cache whose file tier lives in `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memory: RwLock::new(HashMap::new()),
        }
    }

    /// The namespace directory of the file tier.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file backing `key`.
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Look up `key` at `level`.
    ///
    /// [`CachingLevel::None`] purges the key from both tiers. A file tier hit
    /// is decoded for `response_type` and promoted into memory.
    pub fn read(&self, key: &str, level: CachingLevel, response_type: ResponseType) -> Option<Payload> {
        match level {
            CachingLevel::None => {
                self.purge(key);
                None
            }
            CachingLevel::Memory => self.read_memory(key),
            CachingLevel::MemoryAndFile => self
                .read_memory(key)
                .or_else(|| self.read_file(key, response_type)),
        }
    }

    fn read_memory(&self, key: &str) -> Option<Payload> {
        let hit = self.memory.read().get(key).cloned();
        tracing::trace!(target: targets::CACHE, key, hit = hit.is_some(), "memory lookup");
        hit
    }

    fn read_file(&self, key: &str, response_type: ResponseType) -> Option<Payload> {
        let path = self.file_path(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(target: targets::CACHE, path = %path.display(), error = %err, "failed to read cache file");
                }
                return None;
            }
        };

        let payload = match response_type {
            ResponseType::Image => Payload::Image(decode_image(&bytes)?),
            ResponseType::Json | ResponseType::Data => Payload::Bytes(bytes),
        };

        tracing::trace!(target: targets::CACHE, key, "file hit promoted to memory");
        self.memory.write().insert(key.to_string(), payload.clone());
        Some(payload)
    }

    /// Store `payload` under `key` at `level`.
    ///
    /// [`CachingLevel::None`] and empty bytes purge the key instead. With
    /// [`CachingLevel::MemoryAndFile`] the file is replaced atomically. The
    /// memory tier is updated even when the file write fails; that failure
    /// is still returned.
    pub fn write(
        &self,
        key: &str,
        payload: Payload,
        level: CachingLevel,
        response_type: ResponseType,
    ) -> Result<()> {
        if level == CachingLevel::None {
            self.purge(key);
            return Ok(());
        }
        if matches!(&payload, Payload::Bytes(bytes) if bytes.is_empty()) {
            self.purge(key);
            return Ok(());
        }

        let file_result = if level == CachingLevel::MemoryAndFile {
            encode_for_file(&payload).and_then(|bytes| self.write_file(key, &bytes))
        } else {
            Ok(())
        };

        let memory_value = match (payload, response_type) {
            (Payload::Bytes(bytes), ResponseType::Image) => match decode_image(&bytes) {
                Some(image) => Payload::Image(image),
                None => Payload::Bytes(bytes),
            },
            (payload, _) => payload,
        };

        tracing::trace!(target: targets::CACHE, key, ?level, "cached");
        self.memory.write().insert(key.to_string(), memory_value);
        file_result
    }

    /// Store a decoded image together with the bytes it was decoded from.
    ///
    /// The file tier keeps `source` as received, so the original format
    /// survives. Level and empty-source handling match [`write`](Self::write).
    pub fn write_image(
        &self,
        key: &str,
        source: Bytes,
        image: Arc<DynamicImage>,
        level: CachingLevel,
    ) -> Result<()> {
        if level == CachingLevel::None || source.is_empty() {
            self.purge(key);
            return Ok(());
        }

        let file_result = if level == CachingLevel::MemoryAndFile {
            self.write_file(key, &source)
        } else {
            Ok(())
        };

        tracing::trace!(target: targets::CACHE, key, ?level, "cached image");
        self.memory.write().insert(key.to_string(), Payload::Image(image));
        file_result
    }

    fn write_file(&self, key: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.root)?;
        file.write_all(bytes)?;
        file.persist(self.file_path(key)).map_err(|err| err.error)?;
        Ok(())
    }

    /// Remove `key` from both tiers.
    pub fn purge(&self, key: &str) {
        let removed = self.memory.write().remove(key).is_some();
        let path = self.file_path(key);
        if let Err(err) = std::fs::remove_file(&path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(target: targets::CACHE, path = %path.display(), error = %err, "failed to purge cache file");
        }
        tracing::trace!(target: targets::CACHE, key, removed, "purged");
    }

    /// Drop every memory tier entry, keeping the files.
    pub fn clear_memory(&self) {
        self.memory.write().clear();
    }

    /// Remove the whole namespace directory and clear the memory tier.
    pub fn purge_all(&self) -> Result<()> {
        self.clear_memory();
        tracing::debug!(target: targets::CACHE, root = %self.root.display(), "purging cache namespace");
        remove_namespace(&self.root)
    }
}

fn encode_for_file(payload: &Payload) -> Result<Bytes> {
    match payload {
        Payload::Bytes(bytes) => Ok(bytes.clone()),
        Payload::Image(image) => {
            let mut buffer = Cursor::new(Vec::new());
            Arc::as_ref(image)
                .write_to(&mut buffer, image::ImageFormat::Png)
                .map_err(|err| crate::error::NetworkingError::UnexpectedError {
                    status_code: None,
                    message: format!("Failed to encode image: {err}"),
                })?;
            Ok(Bytes::from(buffer.into_inner()))
        }
    }
}
