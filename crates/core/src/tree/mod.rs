//! In-memory ordered tree of one document's items.
//!
//! Siblings form a singly linked chain through `previous`. Next-sibling
//! lookups go through an index keyed by `(parent, previous)`, so walking a
//! chain forward is O(1) per step. Index buckets hold every item currently
//! claiming a key: while a group of relinks is replayed two items may claim
//! the same slot for a moment, and the bucket keeps both until one moves on.

mod plan;

use std::collections::{BTreeMap, HashMap, HashSet};

use outliner_common::{ItemId, ItemInfo, Operation};
use thiserror::Error;

pub use plan::{plan_delete, plan_insert, plan_set_field, plan_shift, plan_update_text};

/// `(parent, previous)`; `None` stands for the root / first-child sentinels.
pub type ChainKey = (Option<ItemId>, Option<ItemId>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub previous: Option<ItemId>,
    pub text: String,
    pub fields: BTreeMap<String, String>,
}

impl Item {
    pub fn info(&self) -> ItemInfo {
        ItemInfo {
            id: self.id,
            parent: self.parent,
            previous: self.previous,
            text: self.text.clone(),
            fields: self.fields.clone(),
        }
    }

    fn key(&self) -> ChainKey {
        (self.parent, self.previous)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("item {0} does not exist")]
    Missing(ItemId),
    #[error("item {0} already exists")]
    Duplicate(ItemId),
    #[error("parent {parent} of item {id} does not exist")]
    MissingParent { id: ItemId, parent: ItemId },
    #[error("item {0} still has children")]
    HasChildren(ItemId),
    #[error("placing item {0} there would create a cycle")]
    Cycle(ItemId),
}

#[derive(Debug, Clone, Default)]
pub struct ItemTree {
    items: HashMap<ItemId, Item>,
    chains: HashMap<ChainKey, Vec<ItemId>>,
    child_counts: HashMap<Option<ItemId>, usize>,
    last_id: i64,
}

impl ItemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the tree from stored rows. `last_allocated` is the highest id
    /// ever handed out, so deleted ids are not reused.
    pub fn from_items(items: Vec<Item>, last_allocated: i64) -> Self {
        let mut tree = Self { last_id: last_allocated, ..Self::default() };
        for item in items {
            tree.last_id = tree.last_id.max(item.id.get());
            tree.link(&item);
            tree.items.insert(item.id, item);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<ItemId> {
        let mut ids = self.items.keys().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    pub fn last_allocated_id(&self) -> i64 {
        self.last_id
    }

    pub fn allocate_id(&mut self) -> ItemId {
        self.last_id += 1;
        ItemId(self.last_id)
    }

    /// The item whose parent and previous match, if any.
    pub fn tree_item(&self, parent: Option<ItemId>, previous: Option<ItemId>) -> Option<ItemId> {
        self.chains.get(&(parent, previous)).and_then(|bucket| bucket.first().copied())
    }

    pub fn next_sibling(&self, id: ItemId) -> Option<ItemId> {
        let item = self.items.get(&id)?;
        self.tree_item(item.parent, Some(id))
    }

    pub fn child_count(&self, parent: Option<ItemId>) -> usize {
        self.child_counts.get(&parent).copied().unwrap_or(0)
    }

    /// Children of `parent` in chain order.
    pub fn children(&self, parent: Option<ItemId>) -> Vec<ItemId> {
        let limit = self.child_count(parent);
        let mut children = Vec::with_capacity(limit);
        let mut cursor = self.tree_item(parent, None);
        while let Some(id) = cursor {
            if children.len() == limit {
                // A cycle in a corrupted chain; consistency checks report it.
                break;
            }
            children.push(id);
            cursor = self.tree_item(parent, Some(id));
        }
        children
    }

    pub fn last_child(&self, parent: Option<ItemId>) -> Option<ItemId> {
        self.children(parent).last().copied()
    }

    /// `id` and all of its descendants, deepest first, later siblings before
    /// earlier ones. Reversing the list yields a pre-order walk in chain order.
    pub fn subtree_post_order(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        self.collect_post_order(id, &mut out);
        out
    }

    fn collect_post_order(&self, id: ItemId, out: &mut Vec<ItemId>) {
        for child in self.children(Some(id)).into_iter().rev() {
            self.collect_post_order(child, out);
        }
        out.push(id);
    }

    pub fn is_ancestor(&self, ancestor: ItemId, of: ItemId) -> bool {
        let mut cursor = self.items.get(&of).and_then(|item| item.parent);
        let mut steps = 0usize;
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.items.len() {
                return false;
            }
            cursor = self.items.get(&id).and_then(|item| item.parent);
        }
        false
    }

    /// Apply one operation and return its exact inverse.
    pub fn apply(&mut self, op: &Operation) -> Result<Operation, ApplyError> {
        match op {
            Operation::InsertItem { id, parent, previous, text, fields } => {
                if self.items.contains_key(id) {
                    return Err(ApplyError::Duplicate(*id));
                }
                if let Some(parent_id) = parent {
                    if !self.items.contains_key(parent_id) {
                        return Err(ApplyError::MissingParent { id: *id, parent: *parent_id });
                    }
                }
                let item = Item {
                    id: *id,
                    parent: *parent,
                    previous: *previous,
                    text: text.clone(),
                    fields: fields.clone(),
                };
                self.last_id = self.last_id.max(id.get());
                self.link(&item);
                self.items.insert(*id, item);
                Ok(Operation::DeleteItem { id: *id })
            }
            Operation::DeleteItem { id } => {
                let Some(item) = self.items.get(id) else {
                    return Err(ApplyError::Missing(*id));
                };
                if self.child_count(Some(*id)) > 0 {
                    return Err(ApplyError::HasChildren(*id));
                }
                let item = item.clone();
                self.unlink(&item);
                self.items.remove(id);
                Ok(Operation::InsertItem {
                    id: item.id,
                    parent: item.parent,
                    previous: item.previous,
                    text: item.text,
                    fields: item.fields,
                })
            }
            Operation::SetText { id, text } => {
                let item = self.items.get_mut(id).ok_or(ApplyError::Missing(*id))?;
                let old = std::mem::replace(&mut item.text, text.clone());
                Ok(Operation::SetText { id: *id, text: old })
            }
            Operation::SetField { id, key, value } => {
                let item = self.items.get_mut(id).ok_or(ApplyError::Missing(*id))?;
                let old = match value {
                    Some(value) => item.fields.insert(key.clone(), value.clone()),
                    None => item.fields.remove(key),
                };
                Ok(Operation::SetField { id: *id, key: key.clone(), value: old })
            }
            Operation::Relink { id, parent, previous } => {
                let Some(item) = self.items.get(id) else {
                    return Err(ApplyError::Missing(*id));
                };
                if let Some(parent_id) = parent {
                    if *parent_id == *id || self.is_ancestor(*id, *parent_id) {
                        return Err(ApplyError::Cycle(*id));
                    }
                    if !self.items.contains_key(parent_id) {
                        return Err(ApplyError::MissingParent { id: *id, parent: *parent_id });
                    }
                }
                let old = item.clone();
                self.unlink(&old);
                let mut moved = old.clone();
                moved.parent = *parent;
                moved.previous = *previous;
                self.link(&moved);
                self.items.insert(*id, moved);
                Ok(Operation::Relink { id: *id, parent: old.parent, previous: old.previous })
            }
        }
    }

    /// Undo already-applied operations given their inverses in application
    /// order.
    pub fn rollback(&mut self, inverses: Vec<Operation>) -> Result<(), ApplyError> {
        for inverse in inverses.into_iter().rev() {
            self.apply(&inverse)?;
        }
        Ok(())
    }

    /// Verify that every parent's children form exactly one acyclic chain.
    pub fn check_consistency(&self) -> Result<(), String> {
        for item in self.items.values() {
            if let Some(parent) = item.parent {
                if !self.items.contains_key(&parent) {
                    return Err(format!("item {} has missing parent {parent}", item.id));
                }
            }
            if let Some(previous) = item.previous {
                match self.items.get(&previous) {
                    None => {
                        return Err(format!("item {} follows missing item {previous}", item.id));
                    }
                    Some(before) if before.parent != item.parent => {
                        return Err(format!(
                            "item {} follows {previous}, which has a different parent",
                            item.id
                        ));
                    }
                    Some(_) => {}
                }
            }
            match self.chains.get(&item.key()).map(Vec::as_slice) {
                Some([only]) if *only == item.id => {}
                _ => {
                    return Err(format!(
                        "chain slot of item {} is shared or missing from the index",
                        item.id
                    ));
                }
            }
            if self.is_ancestor(item.id, item.id) {
                return Err(format!("item {} is its own ancestor", item.id));
            }
        }

        let parents = self.child_counts.keys().copied().collect::<Vec<_>>();
        for parent in parents {
            let expected = self.child_count(parent);
            let walked = self.children(parent);
            let unique = walked.iter().collect::<HashSet<_>>();
            if walked.len() != expected || unique.len() != expected {
                let label = parent.map_or_else(|| "root".to_string(), |id| id.to_string());
                return Err(format!(
                    "children of {label}: chain reaches {} of {expected} items",
                    unique.len()
                ));
            }
        }
        Ok(())
    }

    fn link(&mut self, item: &Item) {
        self.chains.entry(item.key()).or_default().push(item.id);
        *self.child_counts.entry(item.parent).or_default() += 1;
    }

    fn unlink(&mut self, item: &Item) {
        let key = item.key();
        if let Some(bucket) = self.chains.get_mut(&key) {
            bucket.retain(|id| *id != item.id);
            if bucket.is_empty() {
                self.chains.remove(&key);
            }
        }
        if let Some(count) = self.child_counts.get_mut(&item.parent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.child_counts.remove(&item.parent);
            }
        }
    }
}
