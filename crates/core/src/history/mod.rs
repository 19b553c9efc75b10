//! Undo/redo over the persisted history relation.
//!
//! [`Ledger`] is the in-memory view of a document's history: the cursor (id
//! of the newest applied entry), the saved baseline, the next group id and an
//! explicit modified flag. Entries themselves live in the `history` relation;
//! done entries always precede undone ones, so a single id is enough to
//! separate applied from not-yet-applied work.
//!
//! [`execute`] is the one path by which operations reach a tree: it applies
//! each operation, mirrors the touched item row, and records the inverse so a
//! failure part-way can be rolled back. Mutations and replay both use it.

use outliner_common::{GroupId, HistoryDirection, HistoryStatus, ItemId, Operation};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::{self, HistoryEntry};
use crate::tree::ItemTree;

/// Baseline no cursor can take once the saved state has been pruned away.
const UNREACHABLE_BASELINE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    cursor: i64,
    saved: i64,
    next_group: i64,
    modified: bool,
}

impl Ledger {
    /// Read ledger state from a freshly loaded store. The loaded state is the
    /// saved baseline.
    pub fn load(conn: &Connection) -> Result<Self> {
        let cursor = store::history::cursor(conn)?;
        let next_group = store::history::max_group(conn)? + 1;
        Ok(Self { cursor, saved: cursor, next_group, modified: false })
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn saved(&self) -> i64 {
        self.saved
    }

    pub fn next_group(&mut self) -> GroupId {
        let group = GroupId(self.next_group);
        self.next_group += 1;
        group
    }

    /// Keep the counter ahead of groups callers brought from elsewhere.
    pub fn observe_group(&mut self, group: GroupId) {
        if group.0 >= self.next_group {
            self.next_group = group.0 + 1;
        }
    }

    pub fn pending_changes(&self) -> bool {
        self.modified || self.cursor != self.saved
    }

    pub fn mark_saved(&mut self) {
        self.saved = self.cursor;
        self.modified = false;
    }

    pub fn set_modified(&mut self) {
        self.modified = true;
    }

    pub fn move_cursor(&mut self, cursor: i64) {
        self.cursor = cursor;
    }

    /// Entries in `removed` were dropped without changing the document
    /// itself. A clean ledger stays clean; a dirty one stays dirty even when
    /// the saved baseline can no longer be reached.
    pub fn rebase_cursor(&mut self, cursor: i64, removed: &[i64]) {
        if self.cursor == self.saved {
            self.saved = cursor;
        } else if !removed.is_empty() && (self.saved == 0 || removed.contains(&self.saved)) {
            self.saved = UNREACHABLE_BASELINE;
        }
        self.cursor = cursor;
    }
}

/// Apply `ops` in order, keeping item rows in step with the tree.
///
/// The inverse of every successfully applied operation is pushed onto
/// `inverses`; on error the caller hands them to [`ItemTree::rollback`].
pub fn execute(
    conn: &Connection,
    tree: &mut ItemTree,
    ops: &[Operation],
    inverses: &mut Vec<Operation>,
) -> Result<()> {
    for op in ops {
        let inverse = tree.apply(op)?;
        inverses.push(inverse);
        sync_row(conn, tree, op.item())?;
    }
    Ok(())
}

fn sync_row(conn: &Connection, tree: &ItemTree, id: ItemId) -> Result<()> {
    match tree.get(id) {
        Some(item) => store::items::upsert(conn, item)?,
        None => {
            store::items::delete(conn, id)?;
        }
    }
    Ok(())
}

/// Undo the collected inverses after a failed unit of work.
pub fn roll_back(tree: &mut ItemTree, inverses: Vec<Operation>) {
    if let Err(err) = tree.rollback(inverses) {
        // Inverses were derived from the states they now restore.
        warn!(error = %err, "in-memory rollback did not complete");
    }
}

/// Outcome of one successful undo or redo step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replayed {
    pub group: GroupId,
    pub items: Vec<ItemId>,
    pub applied: Vec<Operation>,
    pub cursor: i64,
}

/// Item ids the next step in `direction` would touch, in application order.
pub fn preview(conn: &Connection, direction: HistoryDirection) -> Result<Vec<ItemId>> {
    let entries = store::history::next_group(conn, direction)?;
    Ok(touched_items(&entries))
}

/// Replay one whole group in `direction`. `Ok(None)` when there is nothing
/// to replay. Any failure, including a history row that no longer decodes,
/// rolls the tree and the rows back and is reported as `Error::HistoryReplay`.
pub fn replay(
    conn: &mut Connection,
    tree: &mut ItemTree,
    direction: HistoryDirection,
) -> Result<Option<Replayed>> {
    let mut inverses = Vec::new();
    let mut group = None;
    let outcome = (|| -> Result<Option<Replayed>> {
        let tx = conn.transaction()?;
        let entries = store::history::next_group(&tx, direction)?;
        let Some(first) = entries.first() else {
            return Ok(None);
        };
        group = Some(first.group);

        let ops = entries
            .iter()
            .map(|entry| match direction {
                HistoryDirection::Undo => entry.backward.clone(),
                HistoryDirection::Redo => entry.forward.clone(),
            })
            .collect::<Vec<_>>();
        let ids = entries.iter().map(|entry| entry.id).collect::<Vec<_>>();
        let status = match direction {
            HistoryDirection::Undo => HistoryStatus::Undone,
            HistoryDirection::Redo => HistoryStatus::Done,
        };

        inverses.reserve(ops.len());
        execute(&tx, tree, &ops, &mut inverses)?;
        store::history::set_status(&tx, &ids, status)?;
        let cursor = store::history::cursor(&tx)?;
        tx.commit()?;
        debug!(%direction, group = %first.group, entries = ids.len(), cursor, "history replayed");
        Ok(Some(Replayed {
            group: first.group,
            items: touched_items(&entries),
            applied: ops,
            cursor,
        }))
    })();

    outcome.map_err(|err| {
        warn!(%direction, group = ?group, error = %err, "history replay rolled back");
        roll_back(tree, std::mem::take(&mut inverses));
        Error::HistoryReplay { direction, reason: err.to_string() }
    })
}

fn touched_items(entries: &[HistoryEntry]) -> Vec<ItemId> {
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        if !items.contains(&entry.item) {
            items.push(entry.item);
        }
    }
    items
}
