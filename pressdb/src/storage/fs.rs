use super::StorageDriver;
use crate::error::{PressDbError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local directory tree mount. Keys are paths relative to `base` with `/`
/// separators. Hidden entries (leading dot) are always skipped; `ignore`
/// globs are matched against the relative key.
#[derive(Debug)]
pub struct FsDriver {
    base: PathBuf,
    ignore: Vec<glob::Pattern>,
}

impl FsDriver {
    pub fn new(base: impl Into<PathBuf>, ignore: &[String]) -> Result<Self> {
        let base = base.into();
        if !base.is_dir() {
            return Err(PressDbError::Config(format!(
                "Source directory does not exist: {}",
                base.display()
            )));
        }
        let ignore = ignore
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| {
                    PressDbError::Config(format!("Invalid ignore pattern '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FsDriver { base, ignore })
    }

    fn ignored(&self, key: &str) -> bool {
        self.ignore.iter().any(|pattern| pattern.matches(key))
    }

    fn collect(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                self.collect(&path, out)?;
            } else {
                let key = path
                    .strip_prefix(&self.base)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                if !self.ignored(&key) {
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for FsDriver {
    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect(&self.base, &mut keys)?;
        keys.sort();
        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        if key.split('/').any(|segment| segment == "..") {
            return Err(PressDbError::UnknownKey(key.to_string()));
        }
        let path = self.base.join(key);
        Ok(tokio::fs::read(path).await?)
    }

    fn watch_root(&self) -> Option<&Path> {
        Some(&self.base)
    }
}
