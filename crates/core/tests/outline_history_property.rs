use std::path::Path;
use std::sync::Arc;

use outliner_common::{Direction, InsertMode, ItemId, ItemInfo};
use outliner_core::{CloseMode, Document, Engine, Error};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        self.state >> 11
    }

    fn next_usize(&mut self, upper_exclusive: usize) -> usize {
        if upper_exclusive == 0 {
            return 0;
        }
        (self.next_u64() as usize) % upper_exclusive
    }
}

fn snapshot(doc: &Document) -> Vec<ItemInfo> {
    doc.get_items_ids()
        .into_iter()
        .map(|id| doc.get_item_info(id).expect("listed item should exist"))
        .collect()
}

fn pick(doc: &Document, rng: &mut Lcg) -> Option<ItemId> {
    let ids = doc.get_items_ids();
    if ids.is_empty() {
        return None;
    }
    Some(ids[rng.next_usize(ids.len())])
}

fn walk_children(doc: &Document, parent: Option<ItemId>) -> Vec<ItemId> {
    let mut out = Vec::new();
    let mut previous = None;
    while let Some(id) = doc.get_tree_item(parent, previous) {
        assert!(!out.contains(&id), "chain under {parent:?} repeats {id}");
        out.push(id);
        previous = Some(id);
    }
    out
}

/// Every parent's chain, walked one item at a time, covers exactly the items
/// that name it as parent.
fn assert_walks_match(doc: &Document) {
    let infos = snapshot(doc);
    let mut parents = infos.iter().map(|info| info.parent).collect::<Vec<_>>();
    parents.push(None);
    parents.sort();
    parents.dedup();
    for parent in parents {
        let mut walked = walk_children(doc, parent);
        walked.sort();
        let expected =
            infos.iter().filter(|info| info.parent == parent).map(|info| info.id).collect::<Vec<_>>();
        assert_eq!(walked, expected, "children of {parent:?}");
    }
}

/// One random mutation as its own group. Structural refusals are fine.
fn apply_random_mutation(doc: &Document, rng: &mut Lcg, step: usize) {
    let group = doc.next_group();
    let result = match rng.next_usize(6) {
        0 | 1 => {
            let base = pick(doc, rng);
            let mode = if base.is_some() && rng.next_usize(2) == 0 {
                InsertMode::Sibling
            } else {
                InsertMode::Child
            };
            doc.insert(base, mode, group, &format!("item {step}"), "Insert").map(|_| ())
        }
        2 => match pick(doc, rng) {
            Some(id) => {
                let direction = match rng.next_usize(3) {
                    0 => Direction::Up,
                    1 => Direction::Down,
                    _ => Direction::ToParent,
                };
                doc.shift(id, direction, group, "Move")
            }
            None => Ok(()),
        },
        3 => match pick(doc, rng) {
            Some(id) => doc.update_text(id, group, &format!("edit {step}"), "Edit"),
            None => Ok(()),
        },
        4 => match pick(doc, rng) {
            Some(id) => {
                let mut ids = vec![id];
                if let Some(other) = pick(doc, rng) {
                    ids.push(other);
                }
                doc.delete(&ids, group, "Delete").map(|_| ())
            }
            None => Ok(()),
        },
        _ => {
            // Two inserts in one group, like a paste.
            doc.insert(None, InsertMode::Child, group, "paste a", "Paste").and_then(|first| {
                doc.insert(Some(first), InsertMode::Sibling, group, "paste b", "Paste")
                    .map(|_| ())
            })
        }
    };
    match result {
        Ok(()) | Err(Error::CannotMove { .. }) => {}
        Err(err) => panic!("mutation failed unexpectedly: {err}"),
    }
}

fn run_random_history(path: &Path, seed: u64, steps: usize) {
    let engine = Engine::default();
    let doc: Arc<Document> = engine.create(path).expect("document should be created");
    let mut rng = Lcg::new(seed);

    let mut states = vec![snapshot(&doc)];
    for step in 0..steps {
        let before = snapshot(&doc);
        apply_random_mutation(&doc, &mut rng, step);
        doc.check_consistency().expect("chain invariant should hold after every mutation");
        assert_walks_match(&doc);

        let after = snapshot(&doc);
        if after != before {
            // Round-trip law at every reachable cursor.
            assert!(doc.undo().expect("undo should succeed"));
            assert_eq!(snapshot(&doc), before, "undo should restore the pre-group state");
            assert!(doc.redo().expect("redo should succeed"));
            assert_eq!(snapshot(&doc), after, "redo should restore the post-group state");
            states.push(after);
        } else {
            // Refused moves and edits on an empty outline append nothing.
            let last = states.last().cloned().unwrap_or_default();
            assert_eq!(last, after);
        }
    }

    // Unwind everything, then replay it all.
    let final_state = snapshot(&doc);
    while doc.undo().expect("undo should succeed") {
        doc.check_consistency().expect("chain invariant should hold while undoing");
    }
    assert!(doc.get_items_ids().is_empty());
    while doc.redo().expect("redo should succeed") {
        doc.check_consistency().expect("chain invariant should hold while redoing");
    }
    assert_eq!(snapshot(&doc), final_state);

    // Storage mirrors memory: save, reopen, compare.
    engine.save(path).expect("save should succeed");
    engine.close(path, CloseMode::KeepUnsaved).expect("saved document should close");
    let reopened = engine.open(path).expect("document should reopen");
    assert_eq!(snapshot(&reopened), final_state);
    reopened.check_consistency().expect("reloaded chains should be consistent");
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        max_shrink_iters: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_edits_keep_chains_and_round_trip(seed in any::<u64>(), steps in 1usize..60) {
        let tmp = tempdir().expect("tempdir should be created");
        run_random_history(&tmp.path().join("random.outl"), seed, steps);
    }
}
