// outliner-common: shared types and the operation codec for the outliner workspace

pub mod ops;
pub mod types;

pub use ops::{Operation, OperationCodecError};
pub use types::{
    Direction, GroupId, GroupSummary, HistoryDirection, HistoryKind, HistoryStatus, InsertMode,
    ItemId, ItemInfo,
};
