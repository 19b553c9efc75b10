// `outliner undo` / `outliner redo`: step through history one change at a
// time.

use std::path::PathBuf;

use clap::Args;
use outliner_common::{HistoryDirection, ItemId};
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct StepArgs {
    /// Document path.
    pub doc: PathBuf,

    /// Show which items the step would touch without applying it.
    #[arg(long)]
    preview: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub direction: HistoryDirection,
    pub applied: bool,
    pub preview: bool,
    pub items: Vec<i64>,
}

pub fn run(args: StepArgs, direction: HistoryDirection) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = Session::open(&args.doc).and_then(|session| {
        let (engine, path) = (session.engine(), session.path());
        let items = match direction {
            HistoryDirection::Undo => engine.preview_undo(path)?,
            HistoryDirection::Redo => engine.preview_redo(path)?,
        };
        let applied = match (args.preview, direction) {
            (true, _) => false,
            (false, HistoryDirection::Undo) => engine.undo(path)?,
            (false, HistoryDirection::Redo) => engine.redo(path)?,
        };
        let items = items.into_iter().map(ItemId::get).collect();
        session.finish()?;
        Ok(StepResult { direction, applied, preview: args.preview, items })
    });
    super::report(format, result, format_human)
}

fn format_human(result: &StepResult) -> String {
    let ids = result.items.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
    if result.items.is_empty() {
        return format!("Nothing to {}", result.direction);
    }
    if result.preview {
        format!("Next {} touches items {ids}", result.direction)
    } else {
        let verb = match result.direction {
            HistoryDirection::Undo => "Undid",
            HistoryDirection::Redo => "Redid",
        };
        format!("{verb} change to items {ids}")
    }
}

#[cfg(test)]
mod tests {
    use outliner_common::InsertMode;
    use outliner_core::Engine;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn undo_persists_across_sessions() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("notes.outl");
        let engine = Engine::default();
        let doc = engine.create(&path).expect("document should be created");
        let group = doc.next_group();
        doc.insert(None, InsertMode::Child, group, "Draft", "Add item").expect("insert should work");
        engine.save(&path).expect("save should succeed");
        engine.exit();

        let step = |preview| StepArgs { doc: path.clone(), preview, json: true };
        run(step(true), HistoryDirection::Undo).expect("preview should succeed");
        let session = Session::open(&path).expect("session should open");
        assert_eq!(session.document().get_items_count(), 1, "preview must not apply");
        session.finish().expect("session should finish");

        run(step(false), HistoryDirection::Undo).expect("undo should succeed");
        let session = Session::open(&path).expect("session should open");
        assert_eq!(session.document().get_items_count(), 0);
        let redo = session.document().preview(HistoryDirection::Redo).expect("preview should work");
        assert_eq!(redo.len(), 1, "the undone insert stays redoable");
    }

    #[test]
    fn human_format_covers_each_outcome() {
        let empty = StepResult {
            direction: HistoryDirection::Redo,
            applied: false,
            preview: false,
            items: vec![],
        };
        assert_eq!(format_human(&empty), "Nothing to redo");

        let preview = StepResult {
            direction: HistoryDirection::Undo,
            applied: false,
            preview: true,
            items: vec![3, 1],
        };
        assert_eq!(format_human(&preview), "Next undo touches items 3, 1");

        let done = StepResult { preview: false, applied: true, ..preview };
        assert_eq!(format_human(&done), "Undid change to items 3, 1");
    }
}
