// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Virtual module manager.
//!
//! Generated modules have no stable backing file. The manager keeps their content in
//! memory, identifies each version by the SHA-1 of its content, and decorates the host
//! bundler's hashing and transform hooks so that requests for owned paths are answered
//! from memory.

use dashmap::DashMap;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{FederationError, Result};

/// SHA-1 of a buffer, hex encoded
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content))
}

/// A generated module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualModule {
    /// Module path
    pub path: PathBuf,
    /// Current content
    pub content: Arc<str>,
    /// SHA-1 of `content`
    pub hash: String,
}

/// In-memory store of generated modules
#[derive(Debug, Default)]
pub struct VirtualModuleManager {
    modules: DashMap<PathBuf, VirtualModule>,
    write_to_disk: bool,
}

impl VirtualModuleManager {
    /// Create a manager; `write_to_disk` mirrors every change to the file system.
    pub fn new(write_to_disk: bool) -> Self {
        Self {
            modules: DashMap::new(),
            write_to_disk,
        }
    }

    /// Run `generator` and store its output under `path`.
    ///
    /// Returns `true` when the content changed. Identical output leaves the stored
    /// module, and therefore its hash, untouched. Nothing is stored when the generator
    /// fails.
    pub fn register_virtual_module<F>(&self, path: impl Into<PathBuf>, generator: F) -> Result<bool>
    where
        F: FnOnce() -> Result<String>,
    {
        let path = path.into();
        let content = generator().map_err(|e| FederationError::generator(&path, e))?;

        let unchanged = self
            .modules
            .get(&path)
            .is_some_and(|module| *module.content == *content);
        if unchanged {
            return Ok(false);
        }

        let module = VirtualModule {
            hash: content_hash(content.as_bytes()),
            content: Arc::from(content),
            path: path.clone(),
        };
        debug!("Registered virtual module {} ({})", path.display(), module.hash);

        if self.write_to_disk {
            write_best_effort(&path, &module.content);
        }

        self.modules.insert(path, module);
        Ok(true)
    }

    /// Current content of a virtual module
    pub fn get(&self, path: &Path) -> Option<Arc<str>> {
        self.modules.get(path).map(|m| m.content.clone())
    }

    /// Content hash of a virtual module
    pub fn content_hash(&self, path: &Path) -> Option<String> {
        self.modules.get(path).map(|m| m.hash.clone())
    }

    /// Whether the manager owns `path`
    pub fn is_virtual(&self, path: &Path) -> bool {
        self.modules.contains_key(path)
    }

    /// All owned paths
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.modules.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Number of owned modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module was registered yet
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Decorate a hasher so owned paths answer with their content hash.
    ///
    /// Wrapping an already wrapped hasher returns it unchanged.
    pub fn wrap_hasher(self: &Arc<Self>, inner: Arc<dyn FileHasher>) -> Arc<dyn FileHasher> {
        if inner.is_virtualized() {
            return inner;
        }
        Arc::new(VirtualHasher {
            manager: Arc::clone(self),
            inner,
        })
    }

    /// Decorate a transformer so owned paths are transformed from memory.
    ///
    /// Wrapping an already wrapped transformer returns it unchanged.
    pub fn wrap_transformer(
        self: &Arc<Self>,
        inner: Arc<dyn FileTransformer>,
    ) -> Arc<dyn FileTransformer> {
        if inner.is_virtualized() {
            return inner;
        }
        Arc::new(VirtualTransformer {
            manager: Arc::clone(self),
            inner,
        })
    }
}

fn write_best_effort(path: &Path, content: &str) {
    let result = path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|_| std::fs::write(path, content));
    if let Err(e) = result {
        warn!("Failed to write virtual module {}: {}", path.display(), e);
    }
}

/// Content identity hook of the host bundler
pub trait FileHasher: Send + Sync {
    /// Hash identifying the current version of `path`
    fn hash(&self, path: &Path) -> Result<String>;

    /// Whether this hasher already answers for virtual modules
    fn is_virtualized(&self) -> bool {
        false
    }
}

/// Hashes file contents from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskHasher;

impl FileHasher for DiskHasher {
    fn hash(&self, path: &Path) -> Result<String> {
        let data = std::fs::read(path)?;
        Ok(content_hash(&data))
    }
}

struct VirtualHasher {
    manager: Arc<VirtualModuleManager>,
    inner: Arc<dyn FileHasher>,
}

impl FileHasher for VirtualHasher {
    fn hash(&self, path: &Path) -> Result<String> {
        match self.manager.content_hash(path) {
            Some(hash) => Ok(hash),
            None => self.inner.hash(path),
        }
    }

    fn is_virtualized(&self) -> bool {
        true
    }
}

/// Transform hook of the host bundler
pub trait FileTransformer: Send + Sync {
    /// Transform a module. `source` carries the buffer to transform; `None` means the
    /// transformer reads `path` itself.
    fn transform(&self, path: &Path, source: Option<&str>) -> Result<String>;

    /// Whether this transformer already serves virtual modules
    fn is_virtualized(&self) -> bool {
        false
    }
}

struct VirtualTransformer {
    manager: Arc<VirtualModuleManager>,
    inner: Arc<dyn FileTransformer>,
}

impl FileTransformer for VirtualTransformer {
    fn transform(&self, path: &Path, source: Option<&str>) -> Result<String> {
        match self.manager.get(path) {
            Some(content) => self.inner.transform(path, Some(&content)),
            None => self.inner.transform(path, source),
        }
    }

    fn is_virtualized(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_identical_content_keeps_hash() {
        let manager = VirtualModuleManager::new(false);
        let path = PathBuf::from("/app/node_modules/.mf-metro/init-host.js");

        assert!(manager.register_virtual_module(&path, || Ok("a".into())).unwrap());
        let first = manager.content_hash(&path).unwrap();

        assert!(!manager.register_virtual_module(&path, || Ok("a".into())).unwrap());
        assert_eq!(manager.content_hash(&path).unwrap(), first);

        assert!(manager.register_virtual_module(&path, || Ok("b".into())).unwrap());
        assert_ne!(manager.content_hash(&path).unwrap(), first);
        assert_eq!(&*manager.get(&path).unwrap(), "b");
    }

    #[test]
    fn test_generator_failure_is_not_cached() {
        let manager = VirtualModuleManager::new(false);
        let path = PathBuf::from("/app/gen.js");

        let err = manager
            .register_virtual_module(&path, || Err(FederationError::config("boom")))
            .unwrap_err();
        assert!(matches!(err, FederationError::Generator { .. }));
        assert!(!manager.is_virtual(&path));
    }

    #[test]
    fn test_disk_mirroring() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("registry.js");
        let manager = VirtualModuleManager::new(true);

        manager
            .register_virtual_module(&path, || Ok("export {};".into()))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "export {};");
    }

    struct CountingHasher(AtomicUsize);

    impl FileHasher for CountingHasher {
        fn hash(&self, _path: &Path) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("disk".into())
        }
    }

    #[test]
    fn test_wrap_hasher() {
        let manager = Arc::new(VirtualModuleManager::new(false));
        let path = PathBuf::from("/app/virtual.js");
        manager.register_virtual_module(&path, || Ok("x".into())).unwrap();

        let inner = Arc::new(CountingHasher(AtomicUsize::new(0)));
        let wrapped = manager.wrap_hasher(inner.clone());
        let twice = manager.wrap_hasher(wrapped.clone());
        assert!(Arc::ptr_eq(&wrapped, &twice));

        assert_eq!(wrapped.hash(&path).unwrap(), content_hash(b"x"));
        assert_eq!(wrapped.hash(Path::new("/app/other.js")).unwrap(), "disk");
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }

    struct EchoTransformer;

    impl FileTransformer for EchoTransformer {
        fn transform(&self, _path: &Path, source: Option<&str>) -> Result<String> {
            Ok(source.unwrap_or("<disk>").to_string())
        }
    }

    #[test]
    fn test_wrap_transformer() {
        let manager = Arc::new(VirtualModuleManager::new(false));
        let path = PathBuf::from("/app/virtual.js");
        manager.register_virtual_module(&path, || Ok("generated".into())).unwrap();

        let wrapped = manager.wrap_transformer(Arc::new(EchoTransformer));
        assert!(wrapped.is_virtualized());
        assert_eq!(wrapped.transform(&path, None).unwrap(), "generated");
        assert_eq!(wrapped.transform(Path::new("/app/a.js"), None).unwrap(), "<disk>");
    }

    #[test]
    fn test_disk_hasher() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "x").unwrap();
        assert_eq!(DiskHasher.hash(&path).unwrap(), content_hash(b"x"));
    }
}
