//! One open outline: its item tree, its history ledger and the guarded
//! working connection both are persisted through.
//!
//! Lock order is always connection guard first, then the state mutex. Calls
//! that read only the in-memory tree take just the state mutex, so they can
//! proceed while another caller holds the connection. Events are fired after
//! both locks are released and before the call returns.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use outliner_common::{
    Direction, GroupId, GroupSummary, HistoryDirection, HistoryKind, InsertMode, ItemId, ItemInfo,
    Operation,
};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::events::{
    EventBus, HistoryAppliedEvent, HistoryInsertedEvent, HistoryRemovedEvent, ItemEvent,
    ItemsDeletedEvent, PendingChangesEvent,
};
use crate::history::{self, Ledger};
use crate::store::{self, CheckoutPolicy, ConnectionGuard, NewEntry};
use crate::tree::{self, ItemTree};

struct DocumentState {
    tree: ItemTree,
    ledger: Ledger,
}

/// What a committed unit of work changed, kept until the locks are gone.
#[derive(Default)]
struct Outcome {
    group: Option<GroupId>,
    applied: Vec<Operation>,
    appended: Vec<(i64, ItemId)>,
    removed: Vec<i64>,
    pending: Option<bool>,
}

pub struct Document {
    path: PathBuf,
    guard: ConnectionGuard,
    state: Mutex<DocumentState>,
    events: Arc<EventBus>,
    default_item_text: String,
}

impl Document {
    /// Build a document over a validated working connection.
    pub(crate) fn load(
        path: &Path,
        conn: Connection,
        policy: CheckoutPolicy,
        events: Arc<EventBus>,
        default_item_text: &str,
    ) -> Result<Self> {
        let items = store::items::load_all(&conn)?;
        let last_allocated = store::items::last_allocated_id(&conn)?;
        let tree = ItemTree::from_items(items, last_allocated);
        tree.check_consistency()
            .map_err(|reason| Error::NotValid { path: path.to_path_buf(), reason })?;
        let ledger = Ledger::load(&conn)?;
        debug!(
            path = %path.display(),
            items = tree.len(),
            cursor = ledger.cursor(),
            "document loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            guard: ConnectionGuard::new("document connection", conn, policy),
            state: Mutex::new(DocumentState { tree, ledger }),
            events,
            default_item_text: default_item_text.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The guarded working connection, for collaborators that keep their own
    /// relations next to the items.
    pub fn connection(&self) -> &ConnectionGuard {
        &self.guard
    }

    // ── Item tree ──────────────────────────────────────────────────

    /// Insert a new item relative to `base` and return its id.
    ///
    /// `Child` appends under `base` (`None` is the root level); `Sibling`
    /// places the item directly after `base`.
    pub fn insert(
        &self,
        base: Option<ItemId>,
        mode: InsertMode,
        group: GroupId,
        text: &str,
        description: &str,
    ) -> Result<ItemId> {
        let text = if text.is_empty() { self.default_item_text.as_str() } else { text };
        let mut created = None;
        self.mutate(group, description, |tree| {
            let (id, ops) = tree::plan_insert(tree, base, mode, text)?;
            created = Some(id);
            Ok(ops)
        })?;
        created.ok_or_else(|| Error::InvalidReference("insert produced no item".to_string()))
    }

    pub fn update_text(
        &self,
        id: ItemId,
        group: GroupId,
        text: &str,
        description: &str,
    ) -> Result<()> {
        self.mutate(group, description, |tree| tree::plan_update_text(tree, id, text))
    }

    /// Set (`Some`) or clear (`None`) one auxiliary field of an item.
    pub fn set_field(
        &self,
        id: ItemId,
        group: GroupId,
        key: &str,
        value: Option<&str>,
        description: &str,
    ) -> Result<()> {
        self.mutate(group, description, |tree| tree::plan_set_field(tree, id, key, value))
    }

    pub fn shift(
        &self,
        id: ItemId,
        direction: Direction,
        group: GroupId,
        description: &str,
    ) -> Result<()> {
        self.mutate(group, description, |tree| tree::plan_shift(tree, id, direction))
    }

    /// Cascade delete; returns every removed id, descendants included.
    pub fn delete(&self, ids: &[ItemId], group: GroupId, description: &str) -> Result<Vec<ItemId>> {
        let mut removed = Vec::new();
        self.mutate(group, description, |tree| {
            let ops = tree::plan_delete(tree, ids)?;
            removed = ops
                .iter()
                .filter_map(|op| match op {
                    Operation::DeleteItem { id } => Some(*id),
                    _ => None,
                })
                .collect();
            Ok(ops)
        })?;
        self.events.items_deleted.fire(&ItemsDeletedEvent {
            path: self.path.clone(),
            group,
            ids: removed.clone(),
        });
        Ok(removed)
    }

    pub fn get_tree_item(&self, parent: Option<ItemId>, previous: Option<ItemId>) -> Option<ItemId> {
        self.lock_state().tree.tree_item(parent, previous)
    }

    /// Children of `parent` in chain order.
    pub fn children(&self, parent: Option<ItemId>) -> Vec<ItemId> {
        self.lock_state().tree.children(parent)
    }

    pub fn get_item_text(&self, id: ItemId) -> Result<String> {
        let state = self.lock_state();
        let item = state.tree.get(id).ok_or(Error::ItemNotFound(id))?;
        Ok(item.text.clone())
    }

    pub fn get_item_info(&self, id: ItemId) -> Result<ItemInfo> {
        let state = self.lock_state();
        let item = state.tree.get(id).ok_or(Error::ItemNotFound(id))?;
        Ok(item.info())
    }

    pub fn get_items_ids(&self) -> Vec<ItemId> {
        self.lock_state().tree.ids()
    }

    pub fn get_items_count(&self) -> usize {
        self.lock_state().tree.len()
    }

    pub fn check_consistency(&self) -> Result<()> {
        self.lock_state()
            .tree
            .check_consistency()
            .map_err(|reason| Error::NotValid { path: self.path.clone(), reason })
    }

    // ── History ────────────────────────────────────────────────────

    pub fn next_group(&self) -> GroupId {
        self.lock_state().ledger.next_group()
    }

    /// Append a raw entry for a change the caller made itself.
    ///
    /// Nothing is applied; `backward` must undo whatever the caller did. Like
    /// any new work, this discards entries that are currently undone.
    pub fn insert_history(
        &self,
        group: GroupId,
        item: ItemId,
        kind: HistoryKind,
        description: &str,
        forward: &Operation,
        backward: &Operation,
    ) -> Result<i64> {
        let mut conn = self.guard.get()?;
        let mut state = self.lock_state();
        let was_pending = state.ledger.pending_changes();

        let tx = conn.transaction()?;
        let removed = store::history::discard_undone(&tx)?;
        let entry = store::history::append(
            &tx,
            NewEntry { group, item, kind, description, forward, backward },
        )?;
        tx.commit()?;

        state.ledger.move_cursor(entry);
        state.ledger.observe_group(group);
        let pending = state.ledger.pending_changes();
        drop(state);
        drop(conn);

        self.publish(Outcome {
            group: Some(group),
            appended: vec![(entry, item)],
            removed,
            pending: (pending != was_pending).then_some(pending),
            ..Outcome::default()
        });
        Ok(entry)
    }

    /// Items the next undo or redo step would touch. Changes nothing.
    pub fn preview(&self, direction: HistoryDirection) -> Result<Vec<ItemId>> {
        let conn = self.guard.get()?;
        history::preview(&conn, direction)
    }

    /// Replay one group. `false` when there is nothing to replay.
    pub fn apply(&self, direction: HistoryDirection) -> Result<bool> {
        let mut conn = self.guard.get()?;
        let mut state = self.lock_state();
        let was_pending = state.ledger.pending_changes();

        let DocumentState { tree, ledger } = &mut *state;
        let Some(replayed) = history::replay(&mut conn, tree, direction)? else {
            return Ok(false);
        };
        ledger.move_cursor(replayed.cursor);
        let pending = ledger.pending_changes();
        drop(state);
        drop(conn);

        self.events.history_applied.fire(&HistoryAppliedEvent {
            path: self.path.clone(),
            direction,
            group: replayed.group,
            items: replayed.items,
        });
        self.publish(Outcome {
            group: Some(replayed.group),
            applied: replayed.applied,
            pending: (pending != was_pending).then_some(pending),
            ..Outcome::default()
        });
        Ok(true)
    }

    pub fn undo(&self) -> Result<bool> {
        self.apply(HistoryDirection::Undo)
    }

    pub fn redo(&self) -> Result<bool> {
        self.apply(HistoryDirection::Redo)
    }

    pub fn pending_changes(&self) -> bool {
        self.lock_state().ledger.pending_changes()
    }

    /// Record the current cursor as the saved baseline.
    pub fn mark_saved(&self) {
        self.update_ledger(Ledger::mark_saved);
    }

    /// Flag changes made outside the ledger; cleared by the next save.
    pub fn set_modified(&self) {
        self.update_ledger(Ledger::set_modified);
    }

    /// Group summaries, newest first.
    pub fn history_descriptions(&self) -> Result<Vec<GroupSummary>> {
        let conn = self.guard.get()?;
        store::history::group_summaries(&conn)
    }

    /// Drop the oldest applied groups beyond `keep_groups`. Undone entries
    /// are left alone. Returns the removed entry ids.
    pub fn prune_history(&self, keep_groups: usize) -> Result<Vec<i64>> {
        let mut conn = self.guard.get()?;
        let removed = self.prune_locked(&mut conn, keep_groups)?;
        drop(conn);
        self.publish(Outcome { removed: removed.clone(), ..Outcome::default() });
        Ok(removed)
    }

    fn prune_locked(&self, conn: &mut Connection, keep_groups: usize) -> Result<Vec<i64>> {
        let mut state = self.lock_state();
        let tx = conn.transaction()?;
        let removed = store::history::prune(&tx, keep_groups)?;
        let cursor = store::history::cursor(&tx)?;
        tx.commit()?;
        state.ledger.rebase_cursor(cursor, &removed);
        if !removed.is_empty() {
            debug!(path = %self.path.display(), removed = removed.len(), "history pruned");
        }
        Ok(removed)
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Persist to the document's own path and make that the saved baseline.
    pub(crate) fn save(&self, history_limit: Option<usize>) -> Result<()> {
        let mut conn = self.guard.get()?;
        let removed = match history_limit {
            Some(limit) => {
                // The file gets the pruned history; the working copy follows
                // only once the file is written.
                let mut staged = store::file::duplicate(&conn)?;
                let tx = staged.transaction()?;
                store::history::prune(&tx, limit)?;
                tx.commit()?;
                store::file::persist(&staged, &self.path)?;
                self.prune_locked(&mut conn, limit)?
            }
            None => {
                store::file::persist(&conn, &self.path)?;
                Vec::new()
            }
        };

        let mut state = self.lock_state();
        let was_pending = state.ledger.pending_changes();
        state.ledger.mark_saved();
        drop(state);
        drop(conn);

        info!(path = %self.path.display(), "document saved");
        self.publish(Outcome {
            removed,
            pending: was_pending.then_some(false),
            ..Outcome::default()
        });
        Ok(())
    }

    /// Persist a copy elsewhere; the saved baseline does not move.
    pub(crate) fn save_copy(&self, destination: &Path) -> Result<()> {
        let conn = self.guard.get()?;
        store::file::persist(&conn, destination)?;
        info!(
            path = %self.path.display(),
            destination = %destination.display(),
            "document copy saved"
        );
        Ok(())
    }

    /// Wait for the connection and release it for good.
    pub(crate) fn close(&self) -> Result<()> {
        let conn = self.guard.close()?;
        drop(conn);
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Plan, apply and record one mutation as a single transaction.
    fn mutate<F>(&self, group: GroupId, description: &str, plan: F) -> Result<()>
    where
        F: FnOnce(&mut ItemTree) -> Result<Vec<Operation>>,
    {
        let mut conn = self.guard.get()?;
        let mut state = self.lock_state();
        let was_pending = state.ledger.pending_changes();
        let DocumentState { tree, ledger } = &mut *state;

        let ops = plan(tree)?;
        let mut inverses = Vec::with_capacity(ops.len());
        let committed = (|| -> Result<(Vec<i64>, Vec<(i64, ItemId)>)> {
            let tx = conn.transaction()?;
            let removed = store::history::discard_undone(&tx)?;
            history::execute(&tx, tree, &ops, &mut inverses)?;
            let mut appended = Vec::with_capacity(ops.len());
            for (forward, backward) in ops.iter().zip(&inverses) {
                let entry = store::history::append(
                    &tx,
                    NewEntry {
                        group,
                        item: forward.item(),
                        kind: forward.default_kind(),
                        description,
                        forward,
                        backward,
                    },
                )?;
                appended.push((entry, forward.item()));
            }
            tx.commit()?;
            Ok((removed, appended))
        })();

        let (removed, appended) = match committed {
            Ok(committed) => committed,
            Err(err) => {
                history::roll_back(tree, inverses);
                return Err(err);
            }
        };
        if let Some((last, _)) = appended.last() {
            ledger.move_cursor(*last);
        }
        ledger.observe_group(group);
        let pending = ledger.pending_changes();
        debug!(
            path = %self.path.display(),
            %group,
            ops = ops.len(),
            cursor = ledger.cursor(),
            "mutation committed"
        );
        drop(state);
        drop(conn);

        self.publish(Outcome {
            group: Some(group),
            applied: ops,
            appended,
            removed,
            pending: (pending != was_pending).then_some(pending),
        });
        Ok(())
    }

    fn update_ledger(&self, change: fn(&mut Ledger)) {
        let mut state = self.lock_state();
        let was_pending = state.ledger.pending_changes();
        change(&mut state.ledger);
        let pending = state.ledger.pending_changes();
        drop(state);
        self.publish(Outcome {
            pending: (pending != was_pending).then_some(pending),
            ..Outcome::default()
        });
    }

    fn publish(&self, outcome: Outcome) {
        let events = &self.events;
        if !outcome.removed.is_empty() {
            events.history_removed.fire(&HistoryRemovedEvent {
                path: self.path.clone(),
                entries: outcome.removed,
            });
        }
        if let Some(group) = outcome.group {
            for op in &outcome.applied {
                let signal = match op {
                    Operation::InsertItem { .. } => &events.item_inserted,
                    Operation::DeleteItem { .. } => &events.item_deleted,
                    Operation::SetText { .. }
                    | Operation::SetField { .. }
                    | Operation::Relink { .. } => &events.item_updated,
                };
                signal.fire(&ItemEvent { path: self.path.clone(), id: op.item(), group });
            }
            for (entry, item) in outcome.appended {
                events.history_inserted.fire(&HistoryInsertedEvent {
                    path: self.path.clone(),
                    entry,
                    group,
                    item,
                });
            }
        }
        if let Some(pending) = outcome.pending {
            events.pending_changes.fire(&PendingChangesEvent { path: self.path.clone(), pending });
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document").field("path", &self.path).finish_non_exhaustive()
    }
}
