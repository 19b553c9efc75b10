// Core domain types shared across all outliner crates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an item inside one document.
///
/// Ids are positive and never reused. The value `0` is reserved on disk for
/// the root / first-child sentinels, which are modelled as `None` in Rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl ItemId {
    pub fn get(self) -> i64 {
        self.0
    }

    /// Decode a stored reference column, mapping the `0` sentinel to `None`.
    pub fn from_column(value: i64) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Encode an optional reference for storage (`None` becomes `0`).
    pub fn to_column(value: Option<Self>) -> i64 {
        value.map(|id| id.0).unwrap_or(0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// History grouping id; all entries sharing a group undo/redo together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a new item goes relative to its base item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Append as the last child of the base.
    Child,
    /// Insert immediately after the base, under the same parent.
    Sibling,
}

/// Single-item structural move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    /// Become the next sibling of the current parent. Children stay attached.
    ToParent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryDirection {
    Undo,
    Redo,
}

impl fmt::Display for HistoryDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undo => f.write_str("undo"),
            Self::Redo => f.write_str("redo"),
        }
    }
}

/// Tag describing what a history entry did to its item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Insert,
    Update,
    Move,
    Delete,
    Other,
}

impl HistoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "move" => Some(Self::Move),
            "delete" => Some(Self::Delete),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Whether a history entry is currently applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Done,
    Undone,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Undone => "undone",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "done" => Some(Self::Done),
            "undone" => Some(Self::Undone),
            _ => None,
        }
    }
}

/// Full snapshot of one item as returned by `get_item_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: ItemId,
    /// `None` means the item sits at root level.
    pub parent: Option<ItemId>,
    /// `None` means the item is the first child of its parent.
    pub previous: Option<ItemId>,
    pub text: String,
    /// Auxiliary fields owned by collaborators; opaque to the engine.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// One user-visible undo step, as listed by `history_descriptions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSummary {
    pub group: GroupId,
    pub description: String,
    pub status: HistoryStatus,
    pub entries: usize,
}
