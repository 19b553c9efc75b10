// `history` relation access: append, group lookup, status flips, pruning.

use chrono::Utc;
use outliner_common::{
    GroupId, GroupSummary, HistoryDirection, HistoryKind, HistoryStatus, ItemId, Operation,
};
use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};

const ROW_COLUMNS: &str = "id, group_id, item, kind, description, forward_op, forward_payload, \
                           backward_op, backward_payload, status, created_at";

/// A decoded history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub group: GroupId,
    pub item: ItemId,
    pub kind: HistoryKind,
    pub description: String,
    pub forward: Operation,
    pub backward: Operation,
    pub status: HistoryStatus,
    pub created_at: String,
}

/// Entry about to be appended.
#[derive(Debug, Clone, Copy)]
pub struct NewEntry<'a> {
    pub group: GroupId,
    pub item: ItemId,
    pub kind: HistoryKind,
    pub description: &'a str,
    pub forward: &'a Operation,
    pub backward: &'a Operation,
}

struct RawEntry {
    id: i64,
    group: i64,
    item: i64,
    kind: String,
    description: String,
    forward_op: String,
    forward_payload: String,
    backward_op: String,
    backward_payload: String,
    status: String,
    created_at: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group: row.get(1)?,
            item: row.get(2)?,
            kind: row.get(3)?,
            description: row.get(4)?,
            forward_op: row.get(5)?,
            forward_payload: row.get(6)?,
            backward_op: row.get(7)?,
            backward_payload: row.get(8)?,
            status: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<HistoryEntry> {
        let kind = HistoryKind::parse(&self.kind).ok_or_else(|| {
            Error::CorruptHistory(format!("entry {} has kind `{}`", self.id, self.kind))
        })?;
        let status = HistoryStatus::parse(&self.status).ok_or_else(|| {
            Error::CorruptHistory(format!("entry {} has status `{}`", self.id, self.status))
        })?;
        Ok(HistoryEntry {
            id: self.id,
            group: GroupId(self.group),
            item: ItemId(self.item),
            kind,
            description: self.description,
            forward: Operation::decode(&self.forward_op, &self.forward_payload)?,
            backward: Operation::decode(&self.backward_op, &self.backward_payload)?,
            status,
            created_at: self.created_at,
        })
    }
}

pub fn append(conn: &Connection, entry: NewEntry<'_>) -> Result<i64> {
    let (forward_op, forward_payload) = entry.forward.encode()?;
    let (backward_op, backward_payload) = entry.backward.encode()?;
    conn.execute(
        "INSERT INTO history \
         (group_id, item, kind, description, forward_op, forward_payload, \
          backward_op, backward_payload, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'done', ?9)",
        params![
            entry.group.0,
            entry.item.get(),
            entry.kind.as_str(),
            entry.description,
            forward_op,
            forward_payload,
            backward_op,
            backward_payload,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Entries of the next group to undo (newest first) or redo (oldest first).
///
/// Only the contiguous run sharing the first row's group is returned.
pub fn next_group(conn: &Connection, direction: HistoryDirection) -> Result<Vec<HistoryEntry>> {
    let sql = match direction {
        HistoryDirection::Undo => {
            format!("SELECT {ROW_COLUMNS} FROM history WHERE status = 'done' ORDER BY id DESC")
        }
        HistoryDirection::Redo => {
            format!("SELECT {ROW_COLUMNS} FROM history WHERE status = 'undone' ORDER BY id ASC")
        }
    };
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut raw = Vec::new();
    while let Some(row) = rows.next()? {
        let entry = RawEntry::from_row(row)?;
        if raw.first().is_some_and(|first: &RawEntry| first.group != entry.group) {
            break;
        }
        raw.push(entry);
    }
    raw.into_iter().map(RawEntry::decode).collect()
}

pub fn set_status(conn: &Connection, ids: &[i64], status: HistoryStatus) -> Result<()> {
    let mut stmt = conn.prepare("UPDATE history SET status = ?1 WHERE id = ?2")?;
    for id in ids {
        stmt.execute(params![status.as_str(), id])?;
    }
    Ok(())
}

/// Drop every undone entry; returns the removed ids.
pub fn discard_undone(conn: &Connection) -> Result<Vec<i64>> {
    let ids = select_ids(conn, "SELECT id FROM history WHERE status = 'undone' ORDER BY id", [])?;
    if !ids.is_empty() {
        conn.execute("DELETE FROM history WHERE status = 'undone'", [])?;
    }
    Ok(ids)
}

/// Remove the oldest done groups so that at most `keep_groups` remain.
pub fn prune(conn: &Connection, keep_groups: usize) -> Result<Vec<i64>> {
    let keep = i64::try_from(keep_groups).unwrap_or(i64::MAX);
    let ids = select_ids(
        conn,
        "SELECT id FROM history WHERE status = 'done' AND group_id IN ( \
             SELECT group_id FROM history WHERE status = 'done' \
             GROUP BY group_id ORDER BY MAX(id) DESC LIMIT -1 OFFSET ?1 \
         ) ORDER BY id",
        params![keep],
    )?;
    let mut stmt = conn.prepare("DELETE FROM history WHERE id = ?1")?;
    for id in &ids {
        stmt.execute(params![id])?;
    }
    Ok(ids)
}

/// Id of the newest applied entry, `0` when nothing is applied.
pub fn cursor(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM history WHERE status = 'done'",
        [],
        |row| row.get(0),
    )
}

pub fn max_group(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(group_id), 0) FROM history", [], |row| row.get(0))
}

pub fn entry(conn: &Connection, id: i64) -> Result<Option<HistoryEntry>> {
    let mut stmt = conn.prepare(&format!("SELECT {ROW_COLUMNS} FROM history WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    let entry = match rows.next()? {
        Some(row) => Some(RawEntry::from_row(row)?.decode()?),
        None => None,
    };
    Ok(entry)
}

/// One summary per group and status, newest first.
pub fn group_summaries(conn: &Connection) -> Result<Vec<GroupSummary>> {
    let mut stmt = conn.prepare(
        "SELECT group_id, description, status, COUNT(*), MAX(id) FROM history \
         GROUP BY group_id, status ORDER BY MAX(id) DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(group, description, status, count)| {
            let status = HistoryStatus::parse(&status).ok_or_else(|| {
                Error::CorruptHistory(format!("group {group} has status `{status}`"))
            })?;
            Ok(GroupSummary {
                group: GroupId(group),
                description,
                status,
                entries: usize::try_from(count).unwrap_or_default(),
            })
        })
        .collect()
}

fn select_ids<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt.query_map(params, |row| row.get(0))?.collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}
