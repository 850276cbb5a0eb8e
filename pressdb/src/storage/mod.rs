pub mod fs;
pub mod http;
pub mod memory;
pub mod repository;

use crate::error::{PressDbError, Result};
use crate::schema::{ResolvedCollection, ResolvedSource};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use fs::FsDriver;
pub use http::HttpDriver;
pub use memory::MemoryDriver;

/// Capability interface every physical source is addressed through.
///
/// Drivers are read-only from the pipeline's perspective; concurrent reads
/// within a parse batch must be safe.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// All keys of this mount, relative and slash-delimited, in stable
    /// lexicographic order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Raw bytes for one relative key.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Local directory backing this mount, when there is one to watch.
    fn watch_root(&self) -> Option<&Path> {
        None
    }
}

/// Per-collection driver configuration, selected from the collection source
/// at mount-construction time.
#[derive(Debug, Clone)]
pub enum MountOptions {
    Fs { base: PathBuf, ignore: Vec<String> },
    Http { base_url: String },
    Repository { url: String, path: String },
}

impl MountOptions {
    pub fn from_source(source: &ResolvedSource) -> Self {
        if let Some(repository) = &source.repository {
            MountOptions::Repository {
                url: repository.clone(),
                path: source.path.clone(),
            }
        } else if source.path.starts_with("http://") || source.path.starts_with("https://") {
            MountOptions::Http {
                base_url: source.path.clone(),
            }
        } else {
            MountOptions::Fs {
                base: source.cwd.join(&source.path),
                ignore: source.ignore.clone(),
            }
        }
    }
}

/// Construct the driver for one mount. Driver constructors fail fast: a
/// missing directory or unreachable remote is reported here, never deferred
/// to the first read.
pub async fn get_mount_driver(options: MountOptions) -> Result<Arc<dyn StorageDriver>> {
    match options {
        MountOptions::Fs { base, ignore } => Ok(Arc::new(FsDriver::new(base, &ignore)?)),
        MountOptions::Http { base_url } => Ok(Arc::new(HttpDriver::connect(&base_url).await?)),
        MountOptions::Repository { url, path } => {
            Ok(Arc::new(repository::snapshot(&url, &path).await?))
        }
    }
}

/// One logical key space over all collection mounts. Keys are namespaced by
/// collection name: `"<collection>/<relative-path>"`.
pub struct Storage {
    mounts: BTreeMap<String, Arc<dyn StorageDriver>>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("mounts", &self.mounts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            mounts: BTreeMap::new(),
        }
    }

    pub fn mount(&mut self, name: impl Into<String>, driver: Arc<dyn StorageDriver>) {
        self.mounts.insert(name.into(), driver);
    }

    /// Namespaced keys of one collection, in stable lexicographic order.
    /// A collection without a mount has no keys.
    pub async fn get_keys(&self, collection: &str) -> Result<Vec<String>> {
        let Some(driver) = self.mounts.get(collection) else {
            return Ok(Vec::new());
        };
        let mut keys: Vec<String> = driver
            .keys()
            .await?
            .into_iter()
            .map(|key| format!("{collection}/{key}"))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Raw bytes for a namespaced key.
    pub async fn get_item(&self, key: &str) -> Result<Vec<u8>> {
        let (collection, relative) = key
            .split_once('/')
            .ok_or_else(|| PressDbError::UnknownKey(key.to_string()))?;
        let driver = self
            .mounts
            .get(collection)
            .ok_or_else(|| PressDbError::UnknownKey(key.to_string()))?;
        driver.read(relative).await
    }

    /// Local directories to watch, per collection. Only filesystem-backed
    /// mounts participate in the dev watch loop.
    pub fn watch_roots(&self) -> Vec<(String, PathBuf)> {
        self.mounts
            .iter()
            .filter_map(|(name, driver)| {
                driver
                    .watch_root()
                    .map(|root| (name.clone(), root.to_path_buf()))
            })
            .collect()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

/// Build one mount per collection with a declared source. Every mount
/// failure is collected so multiple misconfigured collections are reported
/// together instead of failing on the first.
pub async fn create_collections_storage(collections: &[ResolvedCollection]) -> Result<Storage> {
    let mut storage = Storage::new();
    let mut failures = Vec::new();

    for collection in collections {
        let Some(source) = &collection.source else {
            continue;
        };
        let options = MountOptions::from_source(source);
        match get_mount_driver(options).await {
            Ok(driver) => storage.mount(collection.name.clone(), driver),
            Err(e) => failures.push(format!("  {}: {e}", collection.name)),
        }
    }

    if !failures.is_empty() {
        return Err(PressDbError::Mount(failures.join("\n")));
    }
    Ok(storage)
}
