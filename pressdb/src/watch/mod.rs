use crate::content;
use crate::db::{DatabaseAdapter, SqliteAdapter};
use crate::dump::{generate_collection_insert, generate_sql_dump, quote};
use crate::error::Result;
use crate::schema::ResolvedCollection;
use crate::storage::Storage;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// The kind of storage-level change detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A debounced change notification, addressed by namespaced storage key.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub key: String,
    pub kind: ChangeKind,
}

/// Watches the filesystem roots behind collection mounts. Raw notify events
/// are debounced (100ms) on a bridge thread and mapped to storage keys
/// before they reach the session channel.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    _thread: std::thread::JoinHandle<()>,
}

impl FileWatcher {
    pub fn start(
        roots: &[(String, PathBuf)],
    ) -> Result<(Self, UnboundedReceiver<WatchEvent>)> {
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();
        let (event_tx, event_rx) = unbounded_channel::<WatchEvent>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;

        let mut canonical_roots = Vec::new();
        for (collection, root) in roots {
            if root.exists() {
                watcher.watch(root, RecursiveMode::Recursive)?;
                let canonical =
                    std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
                canonical_roots.push((collection.clone(), canonical));
            }
        }

        let thread = std::thread::spawn(move || bridge(notify_rx, event_tx, canonical_roots));

        Ok((
            FileWatcher {
                _watcher: watcher,
                _thread: thread,
            },
            event_rx,
        ))
    }
}

fn bridge(
    notify_rx: mpsc::Receiver<notify::Result<Event>>,
    event_tx: UnboundedSender<WatchEvent>,
    roots: Vec<(String, PathBuf)>,
) {
    let debounce = Duration::from_millis(100);
    let mut pending: Vec<WatchEvent> = Vec::new();
    let mut last_event = Instant::now();

    loop {
        match notify_rx.recv_timeout(debounce) {
            Ok(Ok(event)) => {
                let kind = match event.kind {
                    EventKind::Create(_) => Some(ChangeKind::Created),
                    EventKind::Modify(_) => Some(ChangeKind::Modified),
                    EventKind::Remove(_) => Some(ChangeKind::Removed),
                    _ => None,
                };
                if let Some(kind) = kind {
                    for path in event.paths {
                        if !is_document_file(&path) {
                            continue;
                        }
                        if let Some(key) = key_for(&roots, &path) {
                            pending.push(WatchEvent { key, kind });
                        }
                    }
                }
                last_event = Instant::now();
            }
            Ok(Err(e)) => {
                log::warn!("File watcher error: {e}");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !pending.is_empty() && last_event.elapsed() >= debounce {
                    // Deduplicate paths within the window (keep last kind).
                    let mut latest = HashMap::new();
                    for event in pending.drain(..) {
                        latest.insert(event.key.clone(), event);
                    }
                    for (_, event) in latest {
                        if event_tx.send(event).is_err() {
                            return; // Receiver dropped
                        }
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Map an absolute filesystem path back to its namespaced storage key.
fn key_for(roots: &[(String, PathBuf)], path: &Path) -> Option<String> {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    for (collection, root) in roots {
        if let Ok(relative) = canonical.strip_prefix(root) {
            let relative = relative.to_string_lossy().replace('\\', "/");
            return Some(format!("{collection}/{relative}"));
        }
    }
    None
}

fn is_document_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown") | Some("yml") | Some("yaml") | Some("json")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    ChangeDetected,
    Reparsing,
    Committed,
}

/// The incremental rebuild loop. Cold start executes the full dump against
/// the live database; afterwards each change reparses only the affected key
/// and commits a single-row replacement. The session is the sole owner of
/// the live database, so commits are serialized by construction.
pub struct WatchSession {
    collections: Vec<ResolvedCollection>,
    storage: Storage,
    adapter: SqliteAdapter,
    events: UnboundedReceiver<WatchEvent>,
    backlog: VecDeque<(WatchEvent, u64)>,
    generations: HashMap<String, u64>,
    state: WatchState,
    /// Changes committed to the live database.
    pub committed: u64,
    /// Changes dropped because a newer change superseded them.
    pub discarded: u64,
}

impl WatchSession {
    pub fn new(
        collections: Vec<ResolvedCollection>,
        storage: Storage,
        adapter: SqliteAdapter,
        events: UnboundedReceiver<WatchEvent>,
    ) -> Self {
        WatchSession {
            collections,
            storage,
            adapter,
            events,
            backlog: VecDeque::new(),
            generations: HashMap::new(),
            state: WatchState::Idle,
            committed: 0,
            discarded: 0,
        }
    }

    pub fn adapter(&self) -> &SqliteAdapter {
        &self.adapter
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Rebuild the live database from scratch using the same dump-generation
    /// algorithm as a production build.
    pub async fn bootstrap(&mut self, integrity_version: &str) -> Result<()> {
        for collection in &self.collections {
            self.adapter
                .exec(&format!("DROP TABLE IF EXISTS {};", collection.table_name))?;
        }
        let statements =
            generate_sql_dump(&self.storage, &self.collections, integrity_version).await?;
        for statement in &statements {
            self.adapter.exec(statement)?;
        }
        log::info!("Dev database bootstrapped ({} statements)", statements.len());
        Ok(())
    }

    /// Process change events until the channel closes. Returns the session
    /// so callers can inspect the final database state.
    pub async fn run(mut self) -> Result<WatchSession> {
        loop {
            let next = if let Some(entry) = self.backlog.pop_front() {
                Some(entry)
            } else {
                let received = self.events.recv().await;
                match received {
                    Some(event) => {
                        let generation = self.bump(&event.key);
                        Some((event, generation))
                    }
                    None => None,
                }
            };
            let Some((event, generation)) = next else {
                break;
            };

            self.state = WatchState::ChangeDetected;
            self.drain();
            if self.current(&event.key) != generation {
                self.discarded += 1;
                self.state = WatchState::Idle;
                continue;
            }
            self.apply(event, generation).await;
            self.state = WatchState::Idle;
        }
        Ok(self)
    }

    /// Pull everything already queued on the channel into the backlog,
    /// coalescing rapid changes: only the most recent event per key
    /// survives.
    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let generation = self.bump(&event.key);
            let before = self.backlog.len();
            self.backlog.retain(|(queued, _)| queued.key != event.key);
            self.discarded += (before - self.backlog.len()) as u64;
            self.backlog.push_back((event, generation));
        }
    }

    async fn apply(&mut self, event: WatchEvent, generation: u64) {
        let Some(collection) = self.collection_for(&event.key).cloned() else {
            log::debug!("Ignoring change for unmounted key '{}'", event.key);
            return;
        };
        self.state = WatchState::Reparsing;

        match event.kind {
            ChangeKind::Removed => {
                self.drain();
                if self.current(&event.key) != generation {
                    self.discarded += 1;
                    return;
                }
                if let Err(e) = self.delete_record(&collection, &event.key) {
                    log::warn!("Failed to remove '{}' from dev database: {e}", event.key);
                    return;
                }
                self.committed += 1;
                self.state = WatchState::Committed;
                log::info!("Removed '{}'", event.key);
            }
            ChangeKind::Created | ChangeKind::Modified => {
                let record =
                    match content::parse_content(&self.storage, &collection, &event.key).await {
                        Ok(record) => record,
                        Err(e) => {
                            // Previously committed state stays intact.
                            log::warn!("Reparse failed, change discarded: {e}");
                            return;
                        }
                    };
                self.drain();
                if self.current(&event.key) != generation {
                    self.discarded += 1;
                    log::debug!("Discarding stale reparse of '{}'", event.key);
                    return;
                }
                if let Err(e) = self.commit_record(&collection, &event.key, &record) {
                    log::warn!("Failed to commit '{}': {e}", event.key);
                    return;
                }
                self.committed += 1;
                self.state = WatchState::Committed;
                log::info!("Committed '{}'", event.key);
            }
        }
    }

    fn bump(&mut self, key: &str) -> u64 {
        let generation = self.generations.entry(key.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn current(&self, key: &str) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    fn collection_for(&self, key: &str) -> Option<&ResolvedCollection> {
        let (name, _) = key.split_once('/')?;
        self.collections.iter().find(|c| c.name == name)
    }

    /// Replace the row for one key inside a single transaction. The live
    /// database is never left partially updated.
    fn commit_record(
        &self,
        collection: &ResolvedCollection,
        key: &str,
        record: &content::ParsedRecord,
    ) -> Result<()> {
        let delete = format!(
            "DELETE FROM {} WHERE \"contentId\" = {};",
            collection.table_name,
            quote(key)
        );
        let insert = generate_collection_insert(collection, record)?;

        self.adapter.begin_transaction()?;
        let result = self
            .adapter
            .exec(&delete)
            .and_then(|_| self.adapter.exec(&insert));
        match result {
            Ok(()) => self.adapter.commit_transaction(),
            Err(e) => {
                let _ = self.adapter.rollback_transaction();
                Err(e)
            }
        }
    }

    fn delete_record(&self, collection: &ResolvedCollection, key: &str) -> Result<()> {
        self.adapter.exec(&format!(
            "DELETE FROM {} WHERE \"contentId\" = {};",
            collection.table_name,
            quote(key)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{integrity_version, parse_manifest_str, resolve_collections};
    use crate::storage::create_collections_storage;
    use serde_json::json;

    async fn session_fixture(
        tmp: &tempfile::TempDir,
    ) -> (WatchSession, UnboundedSender<WatchEvent>, String) {
        std::fs::create_dir_all(tmp.path().join("posts")).unwrap();
        std::fs::write(
            tmp.path().join("posts/hello.md"),
            "---\ntitle: \"Hello\"\n---\nWorld",
        )
        .unwrap();

        let manifest = parse_manifest_str(
            r#"
collections:
  posts:
    type: page
    source: posts
    fields:
      title: { type: string, required: true }
"#,
            tmp.path(),
        )
        .unwrap();
        let collections = resolve_collections(&manifest).unwrap();
        let version = integrity_version(&collections);
        let storage = create_collections_storage(&collections).await.unwrap();
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let (tx, rx) = unbounded_channel();

        let mut session = WatchSession::new(collections, storage, adapter, rx);
        session.bootstrap(&version).await.unwrap();
        (session, tx, version)
    }

    fn title_of(session: &WatchSession, key: &str) -> Option<String> {
        session
            .adapter()
            .first(
                "SELECT title FROM content_posts WHERE \"contentId\" = ?1",
                &[json!(key)],
            )
            .unwrap()
            .and_then(|row| row.get("title").and_then(|v| v.as_str().map(String::from)))
    }

    #[tokio::test]
    async fn bootstrap_populates_the_live_database() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (session, _tx, version) = session_fixture(&tmp).await;
        assert_eq!(
            title_of(&session, "posts/hello.md").as_deref(),
            Some("Hello")
        );
        let info = session
            .adapter()
            .first("SELECT version FROM content__info WHERE id = 'version'", &[])
            .unwrap()
            .unwrap();
        assert_eq!(info["version"], json!(version));
    }

    #[tokio::test]
    async fn incremental_change_replaces_only_that_row() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (session, tx, _) = session_fixture(&tmp).await;

        std::fs::write(
            tmp.path().join("posts/hello.md"),
            "---\ntitle: \"Updated\"\n---\nWorld",
        )
        .unwrap();
        tx.send(WatchEvent {
            key: "posts/hello.md".into(),
            kind: ChangeKind::Modified,
        })
        .unwrap();
        drop(tx);

        let session = session.run().await.unwrap();
        assert_eq!(session.committed, 1);
        assert_eq!(
            title_of(&session, "posts/hello.md").as_deref(),
            Some("Updated")
        );
        // Still exactly one row.
        let rows = session
            .adapter()
            .all("SELECT * FROM content_posts", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn failed_reparse_keeps_previously_committed_state() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (session, tx, _) = session_fixture(&tmp).await;

        // Unterminated front matter: reparse fails, prior row must survive.
        std::fs::write(tmp.path().join("posts/hello.md"), "---\ntitle: broken\n").unwrap();
        tx.send(WatchEvent {
            key: "posts/hello.md".into(),
            kind: ChangeKind::Modified,
        })
        .unwrap();
        drop(tx);

        let session = session.run().await.unwrap();
        assert_eq!(session.committed, 0);
        assert_eq!(
            title_of(&session, "posts/hello.md").as_deref(),
            Some("Hello")
        );
    }

    #[tokio::test]
    async fn rapid_changes_to_one_key_coalesce() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (session, tx, _) = session_fixture(&tmp).await;

        std::fs::write(
            tmp.path().join("posts/hello.md"),
            "---\ntitle: \"Final\"\n---\n",
        )
        .unwrap();
        for _ in 0..3 {
            tx.send(WatchEvent {
                key: "posts/hello.md".into(),
                kind: ChangeKind::Modified,
            })
            .unwrap();
        }
        drop(tx);

        let session = session.run().await.unwrap();
        // Only the most recent version is committed; the rest coalesce away.
        assert_eq!(session.committed, 1);
        assert_eq!(session.discarded, 2);
        assert_eq!(
            title_of(&session, "posts/hello.md").as_deref(),
            Some("Final")
        );
    }

    #[tokio::test]
    async fn removal_deletes_the_row() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (session, tx, _) = session_fixture(&tmp).await;

        std::fs::remove_file(tmp.path().join("posts/hello.md")).unwrap();
        tx.send(WatchEvent {
            key: "posts/hello.md".into(),
            kind: ChangeKind::Removed,
        })
        .unwrap();
        drop(tx);

        let session = session.run().await.unwrap();
        assert!(title_of(&session, "posts/hello.md").is_none());
    }

    #[test]
    fn document_file_filter() {
        assert!(is_document_file(Path::new("/x/a.md")));
        assert!(is_document_file(Path::new("/x/a.yaml")));
        assert!(!is_document_file(Path::new("/x/a.swp")));
        assert!(!is_document_file(Path::new("/x/a")));
    }
}
