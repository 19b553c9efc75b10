use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{HistoryKind, ItemId};

/// A self-contained, replayable change to one item.
///
/// History entries store a forward and a backward operation. Neither is a
/// diff against current state: each carries the exact target values, so a
/// group can be replayed even after unrelated entries were pruned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    InsertItem {
        id: ItemId,
        parent: Option<ItemId>,
        previous: Option<ItemId>,
        text: String,
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },
    DeleteItem {
        id: ItemId,
    },
    SetText {
        id: ItemId,
        text: String,
    },
    SetField {
        id: ItemId,
        key: String,
        value: Option<String>,
    },
    Relink {
        id: ItemId,
        parent: Option<ItemId>,
        previous: Option<ItemId>,
    },
}

impl Operation {
    /// The item this operation concerns.
    pub fn item(&self) -> ItemId {
        match self {
            Self::InsertItem { id, .. }
            | Self::DeleteItem { id }
            | Self::SetText { id, .. }
            | Self::SetField { id, .. }
            | Self::Relink { id, .. } => *id,
        }
    }

    /// Stored in the `*_op` history columns.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InsertItem { .. } => "insert_item",
            Self::DeleteItem { .. } => "delete_item",
            Self::SetText { .. } => "set_text",
            Self::SetField { .. } => "set_field",
            Self::Relink { .. } => "relink",
        }
    }

    /// History kind recorded when this operation is the forward half.
    pub fn default_kind(&self) -> HistoryKind {
        match self {
            Self::InsertItem { .. } => HistoryKind::Insert,
            Self::DeleteItem { .. } => HistoryKind::Delete,
            Self::SetText { .. } | Self::SetField { .. } => HistoryKind::Update,
            Self::Relink { .. } => HistoryKind::Move,
        }
    }

    /// Split into `(tag, payload)` for the history relation.
    pub fn encode(&self) -> Result<(&'static str, String), OperationCodecError> {
        let mut value = serde_json::to_value(self).map_err(OperationCodecError::Json)?;
        if let Value::Object(map) = &mut value {
            map.remove("op");
        }
        let payload = serde_json::to_string(&value).map_err(OperationCodecError::Json)?;
        Ok((self.tag(), payload))
    }

    /// Rebuild an operation from its stored `(tag, payload)` pair.
    pub fn decode(tag: &str, payload: &str) -> Result<Self, OperationCodecError> {
        let value: Value = serde_json::from_str(payload).map_err(OperationCodecError::Json)?;
        let Value::Object(mut map) = value else {
            return Err(OperationCodecError::PayloadNotObject { tag: tag.to_string() });
        };
        if !KNOWN_TAGS.contains(&tag) {
            return Err(OperationCodecError::UnknownTag(tag.to_string()));
        }
        map.insert("op".to_string(), Value::String(tag.to_string()));
        serde_json::from_value(Value::Object(map)).map_err(OperationCodecError::Json)
    }
}

const KNOWN_TAGS: &[&str] = &["insert_item", "delete_item", "set_text", "set_field", "relink"];

#[derive(Debug, Error)]
pub enum OperationCodecError {
    #[error("unknown operation tag `{0}`")]
    UnknownTag(String),
    #[error("payload for `{tag}` is not a JSON object")]
    PayloadNotObject { tag: String },
    #[error("operation payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
}
