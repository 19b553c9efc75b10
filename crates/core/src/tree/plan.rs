// Translate user-level edits into forward operations against the current tree.
//
// Planning only reads the tree (apart from id allocation); nothing changes
// until the caller applies the returned operations.

use std::collections::{BTreeSet, HashSet};

use outliner_common::{Direction, InsertMode, ItemId, Operation};

use super::ItemTree;
use crate::error::{Error, Result};

/// Plan a new item relative to `base` (`None` = root level, child mode only).
pub fn plan_insert(
    tree: &mut ItemTree,
    base: Option<ItemId>,
    mode: InsertMode,
    text: &str,
) -> Result<(ItemId, Vec<Operation>)> {
    if let Some(base) = base {
        if !tree.contains(base) {
            return Err(Error::InvalidReference(format!("item {base} does not exist")));
        }
    }

    let (parent, previous, follower) = match mode {
        InsertMode::Child => (base, tree.last_child(base), None),
        InsertMode::Sibling => {
            let Some(base) = base else {
                return Err(Error::InvalidReference(
                    "the root level has no siblings".to_string(),
                ));
            };
            let parent = tree.get(base).and_then(|item| item.parent);
            (parent, Some(base), tree.next_sibling(base))
        }
    };

    let id = tree.allocate_id();
    let mut ops = vec![Operation::InsertItem {
        id,
        parent,
        previous,
        text: text.to_string(),
        fields: Default::default(),
    }];
    if let Some(follower) = follower {
        ops.push(Operation::Relink { id: follower, parent, previous: Some(id) });
    }
    Ok((id, ops))
}

pub fn plan_update_text(tree: &ItemTree, id: ItemId, text: &str) -> Result<Vec<Operation>> {
    if !tree.contains(id) {
        return Err(Error::ItemNotFound(id));
    }
    Ok(vec![Operation::SetText { id, text: text.to_string() }])
}

pub fn plan_set_field(
    tree: &ItemTree,
    id: ItemId,
    key: &str,
    value: Option<&str>,
) -> Result<Vec<Operation>> {
    if !tree.contains(id) {
        return Err(Error::ItemNotFound(id));
    }
    Ok(vec![Operation::SetField {
        id,
        key: key.to_string(),
        value: value.map(str::to_string),
    }])
}

/// Plan a single-item move. `ToParent` keeps the item's own children
/// attached to it.
pub fn plan_shift(tree: &ItemTree, id: ItemId, direction: Direction) -> Result<Vec<Operation>> {
    let item = tree.get(id).ok_or(Error::ItemNotFound(id))?;
    let parent = item.parent;

    match direction {
        Direction::Up => {
            let Some(before) = item.previous else {
                return Err(Error::CannotMove { id, reason: "already the first sibling" });
            };
            let before_previous = tree.get(before).and_then(|item| item.previous);
            Ok(swap_adjacent(tree, parent, before_previous, before, id))
        }
        Direction::Down => {
            let Some(after) = tree.next_sibling(id) else {
                return Err(Error::CannotMove { id, reason: "already the last sibling" });
            };
            Ok(swap_adjacent(tree, parent, item.previous, id, after))
        }
        Direction::ToParent => {
            let Some(old_parent) = parent else {
                return Err(Error::CannotMove { id, reason: "already at root level" });
            };
            let grandparent = tree.get(old_parent).and_then(|item| item.parent);
            let mut ops = Vec::with_capacity(3);
            if let Some(follower) = tree.next_sibling(id) {
                ops.push(Operation::Relink {
                    id: follower,
                    parent: Some(old_parent),
                    previous: item.previous,
                });
            }
            ops.push(Operation::Relink { id, parent: grandparent, previous: Some(old_parent) });
            if let Some(parent_follower) = tree.next_sibling(old_parent) {
                ops.push(Operation::Relink {
                    id: parent_follower,
                    parent: grandparent,
                    previous: Some(id),
                });
            }
            Ok(ops)
        }
    }
}

/// `first` directly precedes `second`; produce the relinks that swap them.
fn swap_adjacent(
    tree: &ItemTree,
    parent: Option<ItemId>,
    first_previous: Option<ItemId>,
    first: ItemId,
    second: ItemId,
) -> Vec<Operation> {
    let mut ops = vec![
        Operation::Relink { id: second, parent, previous: first_previous },
        Operation::Relink { id: first, parent, previous: Some(second) },
    ];
    if let Some(follower) = tree.next_sibling(second) {
        ops.push(Operation::Relink { id: follower, parent, previous: Some(first) });
    }
    ops
}

/// Plan a cascade delete of `ids` and every descendant.
///
/// Surviving siblings are relinked first. Deletions follow, children before
/// parents, so the reversed backward operations restore parents first and
/// siblings in chain order.
pub fn plan_delete(tree: &ItemTree, ids: &[ItemId]) -> Result<Vec<Operation>> {
    let mut doomed = HashSet::new();
    let mut roots = BTreeSet::new();
    for id in ids {
        if !tree.contains(*id) {
            return Err(Error::ItemNotFound(*id));
        }
        roots.insert(*id);
    }
    let roots = roots
        .iter()
        .copied()
        .filter(|id| !roots.iter().any(|other| tree.is_ancestor(*other, *id)))
        .collect::<Vec<_>>();

    let mut deletions = Vec::new();
    for root in &roots {
        let subtree = tree.subtree_post_order(*root);
        doomed.extend(subtree.iter().copied());
        deletions.extend(subtree);
    }

    let mut ops = Vec::new();
    for root in &roots {
        let Some(follower) = tree.next_sibling(*root) else {
            continue;
        };
        if doomed.contains(&follower) {
            continue;
        }
        let mut previous = tree.get(*root).and_then(|item| item.previous);
        while let Some(candidate) = previous {
            if !doomed.contains(&candidate) {
                break;
            }
            previous = tree.get(candidate).and_then(|item| item.previous);
        }
        let parent = tree.get(follower).and_then(|item| item.parent);
        ops.push(Operation::Relink { id: follower, parent, previous });
    }

    ops.extend(deletions.into_iter().map(|id| Operation::DeleteItem { id }));
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn seeded(shape: &[(i64, Option<i64>, Option<i64>)]) -> ItemTree {
        let mut tree = ItemTree::new();
        for (id, parent, previous) in shape {
            tree.apply(&Operation::InsertItem {
                id: ItemId(*id),
                parent: parent.map(ItemId),
                previous: previous.map(ItemId),
                text: id.to_string(),
                fields: BTreeMap::new(),
            })
            .expect("seed insert should apply");
        }
        tree
    }

    fn run(tree: &mut ItemTree, ops: &[Operation]) {
        for op in ops {
            tree.apply(op).expect("planned op should apply");
        }
        tree.check_consistency().expect("tree should stay consistent");
    }

    #[test]
    fn sibling_insert_relinks_follower() {
        let mut tree = seeded(&[(1, None, None), (2, None, Some(1))]);
        let (id, ops) = plan_insert(&mut tree, Some(ItemId(1)), InsertMode::Sibling, "new").unwrap();
        assert_eq!(id, ItemId(3));
        assert_eq!(ops.len(), 2);
        run(&mut tree, &ops);
        assert_eq!(tree.children(None), vec![ItemId(1), ItemId(3), ItemId(2)]);
    }

    #[test]
    fn child_insert_appends_last() {
        let mut tree = seeded(&[(1, None, None), (2, Some(1), None)]);
        let (id, ops) = plan_insert(&mut tree, Some(ItemId(1)), InsertMode::Child, "new").unwrap();
        run(&mut tree, &ops);
        assert_eq!(tree.children(Some(ItemId(1))), vec![ItemId(2), id]);
    }

    #[test]
    fn insert_rejects_bad_references() {
        let mut tree = seeded(&[(1, None, None)]);
        assert!(matches!(
            plan_insert(&mut tree, Some(ItemId(8)), InsertMode::Child, "x"),
            Err(Error::InvalidReference(_))
        ));
        assert!(matches!(
            plan_insert(&mut tree, None, InsertMode::Sibling, "x"),
            Err(Error::InvalidReference(_))
        ));
    }

    #[test]
    fn shift_up_and_down_swap_neighbours() {
        let mut tree = seeded(&[(1, None, None), (2, None, Some(1)), (3, None, Some(2))]);
        let ops = plan_shift(&tree, ItemId(2), Direction::Up).unwrap();
        run(&mut tree, &ops);
        assert_eq!(tree.children(None), vec![ItemId(2), ItemId(1), ItemId(3)]);

        let ops = plan_shift(&tree, ItemId(1), Direction::Down).unwrap();
        run(&mut tree, &ops);
        assert_eq!(tree.children(None), vec![ItemId(2), ItemId(3), ItemId(1)]);
    }

    #[test]
    fn shift_at_chain_ends_cannot_move() {
        let tree = seeded(&[(1, None, None), (2, None, Some(1))]);
        assert!(matches!(
            plan_shift(&tree, ItemId(1), Direction::Up),
            Err(Error::CannotMove { .. })
        ));
        assert!(matches!(
            plan_shift(&tree, ItemId(2), Direction::Down),
            Err(Error::CannotMove { .. })
        ));
        assert!(matches!(
            plan_shift(&tree, ItemId(2), Direction::ToParent),
            Err(Error::CannotMove { .. })
        ));
    }

    #[test]
    fn to_parent_keeps_children_attached() {
        // 1 { 2 { 4 }, 3 }, 5
        let mut tree = seeded(&[
            (1, None, None),
            (2, Some(1), None),
            (3, Some(1), Some(2)),
            (4, Some(2), None),
            (5, None, Some(1)),
        ]);
        let ops = plan_shift(&tree, ItemId(2), Direction::ToParent).unwrap();
        run(&mut tree, &ops);

        assert_eq!(tree.children(None), vec![ItemId(1), ItemId(2), ItemId(5)]);
        assert_eq!(tree.children(Some(ItemId(1))), vec![ItemId(3)]);
        assert_eq!(tree.children(Some(ItemId(2))), vec![ItemId(4)]);
    }

    #[test]
    fn delete_relinks_over_consecutive_victims() {
        let mut tree = seeded(&[
            (1, None, None),
            (2, None, Some(1)),
            (3, None, Some(2)),
            (4, None, Some(3)),
            (5, Some(2), None),
        ]);
        let ops = plan_delete(&tree, &[ItemId(3), ItemId(2), ItemId(5)]).unwrap();
        run(&mut tree, &ops);
        assert_eq!(tree.ids(), vec![ItemId(1), ItemId(4)]);
        assert_eq!(tree.children(None), vec![ItemId(1), ItemId(4)]);
    }

    #[test]
    fn delete_unknown_item_fails_without_plan() {
        let tree = seeded(&[(1, None, None)]);
        assert!(matches!(plan_delete(&tree, &[ItemId(1), ItemId(9)]), Err(Error::ItemNotFound(_))));
    }
}
