//! The engine: open documents by path, the shared scratch document, the
//! process-wide block and the event bus every component fires into.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use outliner_common::{Direction, GroupId, HistoryDirection, InsertMode, ItemId};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::events::{DocumentEvent, EventBus, ExitEvent, SavedCopyEvent};
use crate::store::{self, MemoryDocument};

/// How `close` treats unsaved changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Refuse with `Error::HasUnsavedChanges`.
    KeepUnsaved,
    /// Close anyway, dropping unsaved work.
    Discard,
}

/// Process-wide advisory lock. Non-reentrant and never queued.
#[derive(Debug, Default)]
pub struct Protection {
    held: AtomicBool,
}

impl Protection {
    /// `false` when someone already holds the block.
    pub fn block(&self) -> bool {
        self.held.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Scoped variant of `block`: released when the guard drops.
    pub fn try_block(&self) -> Option<BlockGuard<'_>> {
        self.block().then_some(BlockGuard { protection: self })
    }
}

pub struct BlockGuard<'a> {
    protection: &'a Protection,
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.protection.release();
    }
}

pub struct Engine {
    config: EngineConfig,
    documents: Mutex<HashMap<PathBuf, Arc<Document>>>,
    memory: OnceLock<MemoryDocument>,
    protection: Protection,
    events: Arc<EventBus>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            documents: Mutex::new(HashMap::new()),
            memory: OnceLock::new(),
            protection: Protection::default(),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Write an empty document at `path` and open it.
    pub fn create(&self, path: &Path) -> Result<Arc<Document>> {
        let path = normalize(path);
        let mut documents = self.lock_documents();
        if documents.contains_key(&path) {
            return Err(Error::AlreadyOpen(path));
        }
        if path.exists() {
            return Err(Error::AlreadyExists(path));
        }

        // Nothing is registered or left on disk unless the first write lands.
        let document = Arc::new(self.load_document(&path, store::file::empty()?)?);
        document.save(None)?;
        documents.insert(path.clone(), Arc::clone(&document));
        drop(documents);

        info!(path = %path.display(), "document created");
        self.events.document_created.fire(&DocumentEvent { path });
        Ok(document)
    }

    pub fn open(&self, path: &Path) -> Result<Arc<Document>> {
        let path = normalize(path);
        let mut documents = self.lock_documents();
        if documents.contains_key(&path) {
            return Err(Error::AlreadyOpen(path));
        }

        let conn = store::file::load(&path)?;
        let document = Arc::new(self.load_document(&path, conn)?);
        documents.insert(path.clone(), Arc::clone(&document));
        drop(documents);

        info!(path = %path.display(), items = document.get_items_count(), "document opened");
        self.events.document_opened.fire(&DocumentEvent { path });
        Ok(document)
    }

    pub fn close(&self, path: &Path, mode: CloseMode) -> Result<()> {
        let path = normalize(path);
        let document = self.document(&path)?;
        if mode == CloseMode::KeepUnsaved && document.pending_changes() {
            return Err(Error::HasUnsavedChanges(path));
        }

        // Stays registered if the connection cannot be released.
        document.close()?;
        let mut documents = self.lock_documents();
        if documents.get(&path).is_some_and(|open| Arc::ptr_eq(open, &document)) {
            documents.remove(&path);
        }
        drop(documents);
        info!(path = %path.display(), ?mode, "document closed");
        self.events.document_closed.fire(&DocumentEvent { path });
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let document = self.document(path)?;
        document.save(self.config.history_limit)?;
        self.events.document_saved.fire(&DocumentEvent { path: document.path().to_path_buf() });
        Ok(())
    }

    /// Write the document to `destination`; it stays open under its own path
    /// and keeps its pending-changes state.
    pub fn save_copy(&self, path: &Path, destination: &Path) -> Result<()> {
        let document = self.document(path)?;
        document.save_copy(destination)?;
        self.events.document_saved_copy.fire(&SavedCopyEvent {
            path: document.path().to_path_buf(),
            destination: destination.to_path_buf(),
        });
        Ok(())
    }

    // ── Lookup ─────────────────────────────────────────────────────

    pub fn document(&self, path: &Path) -> Result<Arc<Document>> {
        let path = normalize(path);
        self.lock_documents().get(&path).cloned().ok_or(Error::NotFound(path))
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.lock_documents().contains_key(&normalize(path))
    }

    /// Paths of every open document, sorted.
    pub fn open_documents(&self) -> Vec<PathBuf> {
        let mut paths = self.lock_documents().keys().cloned().collect::<Vec<_>>();
        paths.sort();
        paths
    }

    pub fn documents_count(&self) -> usize {
        self.lock_documents().len()
    }

    // ── Path-keyed item calls ──────────────────────────────────────

    pub fn create_child(
        &self,
        path: &Path,
        parent: Option<ItemId>,
        group: GroupId,
        text: &str,
    ) -> Result<ItemId> {
        self.document(path)?.insert(parent, InsertMode::Child, group, text, "Insert item")
    }

    pub fn create_sibling(
        &self,
        path: &Path,
        sibling: ItemId,
        group: GroupId,
        text: &str,
    ) -> Result<ItemId> {
        self.document(path)?.insert(Some(sibling), InsertMode::Sibling, group, text, "Insert item")
    }

    /// `false` when the move is structurally impossible; other failures are
    /// returned as errors.
    pub fn move_item(
        &self,
        path: &Path,
        id: ItemId,
        direction: Direction,
        group: GroupId,
    ) -> Result<bool> {
        match self.document(path)?.shift(id, direction, group, "Move item") {
            Ok(()) => Ok(true),
            Err(Error::CannotMove { id, reason }) => {
                debug!(%id, reason, "move refused");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub fn update_item_text(
        &self,
        path: &Path,
        id: ItemId,
        group: GroupId,
        text: &str,
    ) -> Result<()> {
        self.document(path)?.update_text(id, group, text, "Edit item")
    }

    pub fn delete_items(&self, path: &Path, ids: &[ItemId], group: GroupId) -> Result<Vec<ItemId>> {
        self.document(path)?.delete(ids, group, "Delete items")
    }

    pub fn undo(&self, path: &Path) -> Result<bool> {
        self.document(path)?.apply(HistoryDirection::Undo)
    }

    pub fn redo(&self, path: &Path) -> Result<bool> {
        self.document(path)?.apply(HistoryDirection::Redo)
    }

    pub fn preview_undo(&self, path: &Path) -> Result<Vec<ItemId>> {
        self.document(path)?.preview(HistoryDirection::Undo)
    }

    pub fn preview_redo(&self, path: &Path) -> Result<Vec<ItemId>> {
        self.document(path)?.preview(HistoryDirection::Redo)
    }

    // ── Global block ───────────────────────────────────────────────

    pub fn block(&self) -> bool {
        self.protection.block()
    }

    pub fn release(&self) {
        self.protection.release();
    }

    pub fn try_block(&self) -> Option<BlockGuard<'_>> {
        self.protection.try_block()
    }

    pub fn is_blocked(&self) -> bool {
        self.protection.is_blocked()
    }

    // ── Scratch store and exit ─────────────────────────────────────

    /// The shared scratch document, created on first use.
    pub fn memory(&self) -> Result<&MemoryDocument> {
        if let Some(memory) = self.memory.get() {
            return Ok(memory);
        }
        let created = MemoryDocument::new(self.config.checkout_policy)?;
        // A racing caller may have won; either instance is empty.
        Ok(self.memory.get_or_init(|| created))
    }

    /// Two-phase shutdown: subscribers see `exit_requested` while every
    /// document is still open, then everything is torn down and
    /// `exit_completed` fires. Unsaved work is dropped.
    pub fn exit(&self) {
        let open_documents = self.open_documents();
        info!(documents = open_documents.len(), "exit requested");
        self.events.exit_requested.fire(&ExitEvent { open_documents: open_documents.clone() });

        if let Some(memory) = self.memory.get() {
            if !memory.is_closed() {
                if let Err(err) = memory.close() {
                    warn!(error = %err, "memory document did not close cleanly");
                }
            }
        }
        let documents = std::mem::take(&mut *self.lock_documents());
        for (path, document) in documents {
            if let Err(err) = document.close() {
                warn!(path = %path.display(), error = %err, "document did not close cleanly");
            }
        }

        info!("exit completed");
        self.events.exit_completed.fire(&ExitEvent { open_documents });
    }

    fn load_document(&self, path: &Path, conn: rusqlite::Connection) -> Result<Document> {
        Document::load(
            path,
            conn,
            self.config.checkout_policy,
            Arc::clone(&self.events),
            &self.config.default_item_text,
        )
    }

    fn lock_documents(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<Document>>> {
        self.documents.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Registry key for `path`: canonical when the file exists, the canonical
/// parent joined with the file name when only the directory does, and the
/// path as given otherwise. A key does not change when the file is created.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn block_is_not_reentrant() {
        let engine = Engine::default();
        assert!(engine.block());
        assert!(!engine.block());
        engine.release();
        assert!(engine.block());
        engine.release();
    }

    #[test]
    fn scoped_block_releases_on_drop() {
        let engine = Engine::default();
        {
            let _guard = engine.try_block().expect("block should be free");
            assert!(engine.is_blocked());
            assert!(engine.try_block().is_none());
        }
        assert!(!engine.is_blocked());
    }

    #[test]
    fn create_registers_and_refuses_duplicates() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("plan.outl");
        let engine = Engine::default();

        engine.create(&path).expect("create should succeed");
        assert!(path.exists());
        assert!(engine.is_open(&path));
        assert!(matches!(engine.create(&path), Err(Error::AlreadyOpen(_))));
        assert!(matches!(engine.open(&path), Err(Error::AlreadyOpen(_))));

        engine.close(&path, CloseMode::KeepUnsaved).unwrap();
        assert!(matches!(engine.create(&path), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn failed_create_leaves_nothing_behind() {
        let tmp = tempdir().expect("tempdir should be created");
        let dir = tmp.path().join("later");
        let path = dir.join("plan.outl");
        let engine = Engine::default();

        assert!(engine.create(&path).is_err());
        assert!(!path.exists());
        assert!(!engine.is_open(&path));

        std::fs::create_dir(&dir).unwrap();
        engine.create(&path).expect("create should succeed once the directory exists");
        assert!(path.exists());
    }

    #[test]
    fn relative_and_absolute_paths_share_a_key() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("plan.outl");
        let via_dot = tmp.path().join(".").join("plan.outl");
        let engine = Engine::default();

        engine.create(&via_dot).expect("create should succeed");
        assert!(engine.is_open(&path));
        assert_eq!(engine.open_documents(), vec![normalize(&path)]);
    }

    #[test]
    fn failed_close_keeps_document_registered() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("plan.outl");
        let engine = Engine::default();
        let doc = engine.create(&path).expect("create should succeed");
        drop(doc.connection().close().expect("connection should close"));

        assert!(matches!(engine.close(&path, CloseMode::Discard), Err(Error::Closed)));
        assert!(engine.is_open(&path));
    }

    #[test]
    fn move_item_reports_impossible_moves_as_false() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("plan.outl");
        let engine = Engine::default();
        let doc = engine.create(&path).unwrap();

        let a = engine.create_child(&path, None, doc.next_group(), "A").unwrap();
        assert!(!engine.move_item(&path, a, Direction::Up, doc.next_group()).unwrap());
        assert!(matches!(
            engine.move_item(&path, ItemId(404), Direction::Up, doc.next_group()),
            Err(Error::ItemNotFound(_))
        ));
    }

    #[test]
    fn memory_document_is_shared_until_exit() {
        let engine = Engine::default();
        let first = engine.memory().unwrap() as *const MemoryDocument;
        let second = engine.memory().unwrap() as *const MemoryDocument;
        assert_eq!(first, second);

        engine.exit();
        assert!(engine.memory().unwrap().is_closed());
    }
}
