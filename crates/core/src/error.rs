use std::path::PathBuf;

use outliner_common::{HistoryDirection, ItemId, OperationCodecError};
use thiserror::Error;

use crate::tree::ApplyError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the engine can report to a caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("document `{}` does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("document `{}` is already open", .0.display())]
    AlreadyOpen(PathBuf),
    #[error("cannot create `{}`: file already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("`{}` is not a valid outliner document: {reason}", .path.display())]
    NotValid { path: PathBuf, reason: String },
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
    #[error("invalid reference item: {0}")]
    InvalidReference(String),
    #[error("cannot move item {id}: {reason}")]
    CannotMove { id: ItemId, reason: &'static str },
    #[error("{0} is busy")]
    Busy(&'static str),
    #[error("connection has been closed")]
    Closed,
    #[error("document `{}` has unsaved changes", .0.display())]
    HasUnsavedChanges(PathBuf),
    #[error("{direction} failed and was rolled back: {reason}")]
    HistoryReplay { direction: HistoryDirection, reason: String },
    #[error("sqlite: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("history row is corrupt: {0}")]
    CorruptHistory(String),
    #[error("history codec: {0}")]
    Codec(#[from] OperationCodecError),
    #[error("tree operation rejected: {0}")]
    Inconsistent(#[from] ApplyError),
}

impl Error {
    /// Structural and lookup failures leave state untouched and are safe to
    /// report to a user and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ItemNotFound(_)
                | Self::InvalidReference(_)
                | Self::CannotMove { .. }
                | Self::Busy(_)
                | Self::HasUnsavedChanges(_)
        )
    }
}
