//! Shard byte sources
//!
//! The reconstruction core never performs I/O on its own. Shard bytes come in
//! through a [`ShardSource`], which the verifier calls once per declared shard,
//! possibly from several threads at once.
//!
//! Provided sources:
//! - any `Fn(&ShardRef) -> Result<Bytes, FetchError>` closure
//! - [`MemorySource`]: shards held in memory, keyed by index
//! - [`DirectorySource`]: one file per shard under a root directory

use crate::erasure::ShardData;
use crate::error::FetchError;
use crate::manifest::ShardRef;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Supplies the bytes of a declared shard
///
/// Implementations must be Send + Sync; timeouts and retries are theirs.
pub trait ShardSource: Send + Sync {
    fn fetch(&self, shard: &ShardRef) -> Result<Bytes, FetchError>;
}

impl<F> ShardSource for F
where
    F: Fn(&ShardRef) -> Result<Bytes, FetchError> + Send + Sync,
{
    fn fetch(&self, shard: &ShardRef) -> Result<Bytes, FetchError> {
        self(shard)
    }
}

/// Default file name of a shard inside a directory
pub fn shard_file_name(index: usize) -> String {
    format!("shard-{index}.bin")
}

/// In-memory shard source
pub struct MemorySource {
    shards: RwLock<HashMap<usize, Bytes>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Source holding every shard in `shards`
    pub fn from_shards(shards: &[ShardData]) -> Self {
        let source = Self::new();
        for shard in shards {
            source.insert(shard.index, shard.data.clone());
        }
        source
    }

    pub fn insert(&self, index: usize, data: Bytes) {
        self.shards.write().insert(index, data);
    }

    /// Drop a shard, making later fetches fail with `NotFound`
    pub fn remove(&self, index: usize) -> Option<Bytes> {
        self.shards.write().remove(&index)
    }

    /// Flip one byte of a stored shard
    pub fn corrupt(&self, index: usize, offset: usize) -> bool {
        let mut shards = self.shards.write();
        match shards.get(&index) {
            Some(data) if offset < data.len() => {
                let mut bytes = data.to_vec();
                bytes[offset] ^= 0xFF;
                shards.insert(index, Bytes::from(bytes));
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.read().is_empty()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardSource for MemorySource {
    fn fetch(&self, shard: &ShardRef) -> Result<Bytes, FetchError> {
        self.shards
            .read()
            .get(&shard.index)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("shard {}", shard.index)))
    }
}

/// Directory-backed shard source
///
/// A shard's file is its locator resolved against the root, or
/// `shard-{index}.bin` when no locator is declared. Locators may not leave
/// the root.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the file backing `shard`
    pub fn path_for(&self, shard: &ShardRef) -> Result<PathBuf, FetchError> {
        let Some(locator) = shard.locator.as_deref() else {
            return Ok(self.root.join(shard_file_name(shard.index)));
        };
        let relative = Path::new(locator);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(FetchError::InvalidLocator(locator.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Write shards using their default file names
    pub fn write_shards(&self, shards: &[ShardData]) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        for shard in shards {
            std::fs::write(self.root.join(shard_file_name(shard.index)), &shard.data)?;
        }
        Ok(())
    }
}

impl ShardSource for DirectorySource {
    fn fetch(&self, shard: &ShardRef) -> Result<Bytes, FetchError> {
        let path = self.path_for(shard)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::HashAlgorithm;
    use tempfile::TempDir;

    fn shard_ref(index: usize, locator: Option<&str>) -> ShardRef {
        ShardRef {
            index,
            hash: HashAlgorithm::Sha256.digest(b""),
            size_bytes: None,
            locator: locator.map(str::to_string),
        }
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new();
        assert!(source.is_empty());
        source.insert(3, Bytes::from_static(b"three"));
        assert_eq!(source.len(), 1);

        assert_eq!(source.fetch(&shard_ref(3, None)).unwrap(), "three");
        assert!(matches!(
            source.fetch(&shard_ref(4, None)),
            Err(FetchError::NotFound(_))
        ));

        assert!(source.corrupt(3, 0));
        assert!(!source.corrupt(3, 99));
        assert_ne!(source.fetch(&shard_ref(3, None)).unwrap(), "three");

        assert!(source.remove(3).is_some());
        assert!(source.fetch(&shard_ref(3, None)).is_err());
    }

    #[test]
    fn test_closure_source() {
        let source = |shard: &ShardRef| -> Result<Bytes, FetchError> {
            Ok(Bytes::from(vec![shard.index as u8; 4]))
        };
        assert_eq!(source.fetch(&shard_ref(7, None)).unwrap().as_ref(), &[7u8; 4]);
    }

    #[test]
    fn test_directory_source_default_names() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path());
        let shards = vec![
            ShardData::new(0, Bytes::from_static(b"zero"), false),
            ShardData::new(1, Bytes::from_static(b"one"), true),
        ];
        source.write_shards(&shards).unwrap();

        assert!(dir.path().join("shard-0.bin").exists());
        assert_eq!(source.fetch(&shard_ref(1, None)).unwrap(), "one");
        assert!(matches!(
            source.fetch(&shard_ref(2, None)),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_source_locator() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/a.bin"), b"alpha").unwrap();
        let source = DirectorySource::new(dir.path());

        assert_eq!(
            source.fetch(&shard_ref(0, Some("nested/a.bin"))).unwrap(),
            "alpha"
        );
    }

    #[test]
    fn test_directory_source_rejects_escaping_locator() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path());

        for locator in ["../secret", "/etc/passwd", "a/../../b"] {
            assert!(matches!(
                source.fetch(&shard_ref(0, Some(locator))),
                Err(FetchError::InvalidLocator(_))
            ));
        }
    }
}
