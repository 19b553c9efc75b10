//! Typed lifecycle and mutation notifications.
//!
//! Each [`Signal`] keeps its own ordered list of handlers. `fire` runs them
//! synchronously on the calling thread, in subscription order, over a
//! snapshot taken before dispatch: a handler may subscribe or unsubscribe
//! (itself included) without deadlocking, and the change applies from the
//! next `fire`. The [`EventBus`] is owned by the `Engine` and shared by
//! every open document.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use outliner_common::{GroupId, HistoryDirection, ItemId};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Signal<T> {
    name: &'static str,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Signal<T> {
    pub fn new(name: &'static str) -> Self {
        Self { name, next_id: AtomicU64::new(1), handlers: Mutex::new(Vec::new()) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_handlers().push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` when `id` was not subscribed to this signal.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock_handlers();
        let before = handlers.len();
        handlers.retain(|(candidate, _)| *candidate != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_handlers().len()
    }

    pub fn fire(&self, payload: &T) {
        let snapshot = self.lock_handlers().iter().map(|(_, h)| Arc::clone(h)).collect::<Vec<_>>();
        if snapshot.is_empty() {
            return;
        }
        tracing::trace!(signal = self.name, handlers = snapshot.len(), "firing");
        for handler in snapshot {
            handler(payload);
        }
    }

    fn lock_handlers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler<T>)>> {
        self.handlers.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEvent {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedCopyEvent {
    pub path: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemEvent {
    pub path: PathBuf,
    pub id: ItemId,
    pub group: GroupId,
}

/// One cascade delete, after the per-item `item_deleted` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemsDeletedEvent {
    pub path: PathBuf,
    pub group: GroupId,
    pub ids: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryInsertedEvent {
    pub path: PathBuf,
    pub entry: i64,
    pub group: GroupId,
    pub item: ItemId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryAppliedEvent {
    pub path: PathBuf,
    pub direction: HistoryDirection,
    pub group: GroupId,
    pub items: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRemovedEvent {
    pub path: PathBuf,
    pub entries: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingChangesEvent {
    pub path: PathBuf,
    pub pending: bool,
}

/// Payload of both exit phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitEvent {
    pub open_documents: Vec<PathBuf>,
}

/// Every signal the engine fires.
#[derive(Debug)]
pub struct EventBus {
    pub document_created: Signal<DocumentEvent>,
    pub document_opened: Signal<DocumentEvent>,
    pub document_closed: Signal<DocumentEvent>,
    pub document_saved: Signal<DocumentEvent>,
    pub document_saved_copy: Signal<SavedCopyEvent>,
    pub item_inserted: Signal<ItemEvent>,
    pub item_updated: Signal<ItemEvent>,
    pub item_deleted: Signal<ItemEvent>,
    pub items_deleted: Signal<ItemsDeletedEvent>,
    pub history_inserted: Signal<HistoryInsertedEvent>,
    pub history_applied: Signal<HistoryAppliedEvent>,
    pub history_removed: Signal<HistoryRemovedEvent>,
    pub pending_changes: Signal<PendingChangesEvent>,
    pub exit_requested: Signal<ExitEvent>,
    pub exit_completed: Signal<ExitEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            document_created: Signal::new("document_created"),
            document_opened: Signal::new("document_opened"),
            document_closed: Signal::new("document_closed"),
            document_saved: Signal::new("document_saved"),
            document_saved_copy: Signal::new("document_saved_copy"),
            item_inserted: Signal::new("item_inserted"),
            item_updated: Signal::new("item_updated"),
            item_deleted: Signal::new("item_deleted"),
            items_deleted: Signal::new("items_deleted"),
            history_inserted: Signal::new("history_inserted"),
            history_applied: Signal::new("history_applied"),
            history_removed: Signal::new("history_removed"),
            pending_changes: Signal::new("pending_changes"),
            exit_requested: Signal::new("exit_requested"),
            exit_completed: Signal::new("exit_completed"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
