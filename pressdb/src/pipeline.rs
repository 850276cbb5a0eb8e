use crate::db::SqliteAdapter;
use crate::dump;
use crate::error::Result;
use crate::schema::{self, DevOptions, Manifest, ResolvedCollection};
use crate::storage::{create_collections_storage, Storage};
use crate::watch::{FileWatcher, WatchSession};
use std::path::Path;

/// Ties the whole compile path together: an explicit manifest in, resolved
/// collections and mounted storage out, with dump generation and the dev
/// watch loop on top. No dynamic loading and no process-global state; the
/// statement sequence is returned to the caller.
pub struct Pipeline {
    collections: Vec<ResolvedCollection>,
    storage: Storage,
    integrity_version: String,
    dev: DevOptions,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("collections", &self.collections)
            .field("storage", &self.storage)
            .field("integrity_version", &self.integrity_version)
            .field("dev", &self.dev)
            .finish()
    }
}

impl Pipeline {
    /// Resolve the manifest and construct every collection mount. Mount
    /// failures surface here, before any parsing work begins.
    pub async fn new(manifest: Manifest) -> Result<Self> {
        let collections = schema::resolve_collections(&manifest)?;
        let integrity_version = schema::integrity_version(&collections);
        let storage = create_collections_storage(&collections).await?;
        log::info!(
            "Resolved {} collections (integrity {integrity_version})",
            collections.len()
        );
        Ok(Pipeline {
            collections,
            storage,
            integrity_version,
            dev: manifest.dev,
        })
    }

    pub fn collections(&self) -> &[ResolvedCollection] {
        &self.collections
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn integrity_version(&self) -> &str {
        &self.integrity_version
    }

    pub fn dev_options(&self) -> &DevOptions {
        &self.dev
    }

    /// Generate the full ordered SQL statement sequence.
    pub async fn generate_dump(&self) -> Result<Vec<String>> {
        dump::generate_sql_dump(&self.storage, &self.collections, &self.integrity_version).await
    }

    /// Generate and package the dump artifact for embedding.
    pub async fn package(&self) -> Result<String> {
        let statements = self.generate_dump().await?;
        dump::package_dump(&statements)
    }

    /// Development mode: bootstrap the on-disk database, then keep it in
    /// sync with source edits until the watcher shuts down.
    pub async fn watch(self, database_path: &Path) -> Result<()> {
        let roots = self.storage.watch_roots();
        let (watcher, events) = FileWatcher::start(&roots)?;
        let adapter = SqliteAdapter::open(database_path)?;

        let mut session = WatchSession::new(self.collections, self.storage, adapter, events);
        session.bootstrap(&self.integrity_version).await?;
        log::info!(
            "Watching {} collection roots; live database at {}",
            roots.len(),
            database_path.display()
        );
        session.run().await?;
        drop(watcher);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{load_dump, DatabaseAdapter, SqliteAdapter};
    use crate::schema::parse_manifest_str;
    use serde_json::json;

    fn write_fixture(tmp: &tempfile::TempDir) -> Manifest {
        std::fs::create_dir_all(tmp.path().join("content/posts")).unwrap();
        std::fs::write(
            tmp.path().join("content/posts/hello.md"),
            "---\ntitle: \"Hello\"\n---\nWorld",
        )
        .unwrap();
        parse_manifest_str(
            r#"
collections:
  posts:
    type: page
    source: content/posts
    fields:
      title: { type: string }
"#,
            tmp.path(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn compiles_the_example_scenario_end_to_end() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = Pipeline::new(write_fixture(&tmp)).await.unwrap();

        let artifact = pipeline.package().await.unwrap();
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        load_dump(&adapter, &artifact, pipeline.integrity_version()).unwrap();

        let row = adapter
            .first(
                "SELECT title, path FROM content_posts WHERE \"contentId\" = ?1",
                &[json!("posts/hello.md")],
            )
            .unwrap()
            .unwrap();
        assert_eq!(row["title"], json!("Hello"));
        assert_eq!(row["path"], json!("/hello"));
    }

    #[tokio::test]
    async fn misconfigured_source_fails_before_parsing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let manifest = parse_manifest_str(
            r#"
collections:
  posts:
    type: page
    source: does/not/exist
"#,
            tmp.path(),
        )
        .unwrap();
        let err = Pipeline::new(manifest).await.unwrap_err();
        assert!(matches!(err, crate::PressDbError::Mount(_)));
    }
}
