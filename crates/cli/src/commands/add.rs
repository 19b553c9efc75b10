// `outliner add`: add an item as a last child or right after a sibling.

use std::path::PathBuf;

use clap::Args;
use outliner_common::ItemId;
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Document path.
    pub doc: PathBuf,

    /// Item text.
    pub text: String,

    /// Append as the last child of this item (root level when omitted).
    #[arg(long, value_name = "ID", conflicts_with = "after")]
    under: Option<i64>,

    /// Insert directly after this item.
    #[arg(long, value_name = "ID")]
    after: Option<i64>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResult {
    pub id: i64,
    pub parent: Option<i64>,
    pub previous: Option<i64>,
}

pub fn run(args: AddArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = Session::open(&args.doc).and_then(|session| {
        let result = add(&session, &args)?;
        session.finish()?;
        Ok(result)
    });
    super::report(format, result, format_human)
}

fn add(session: &Session, args: &AddArgs) -> anyhow::Result<AddResult> {
    let engine = session.engine();
    let group = session.document().next_group();
    let id = match args.after {
        Some(sibling) => engine.create_sibling(session.path(), ItemId(sibling), group, &args.text)?,
        None => engine.create_child(session.path(), args.under.map(ItemId), group, &args.text)?,
    };
    let info = session.document().get_item_info(id)?;
    Ok(AddResult {
        id: id.get(),
        parent: info.parent.map(ItemId::get),
        previous: info.previous.map(ItemId::get),
    })
}

fn format_human(result: &AddResult) -> String {
    match result.parent {
        Some(parent) => format!("Added item {} under {parent}", result.id),
        None => format!("Added item {} at root level", result.id),
    }
}

#[cfg(test)]
mod tests {
    use outliner_core::Engine;
    use tempfile::tempdir;

    use super::*;

    fn args(doc: &std::path::Path, text: &str, under: Option<i64>, after: Option<i64>) -> AddArgs {
        AddArgs { doc: doc.to_path_buf(), text: text.into(), under, after, json: true }
    }

    #[test]
    fn add_places_children_and_siblings() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("todo.outl");
        Engine::default().create(&path).expect("document should be created");

        let session = Session::open(&path).expect("session should open");
        let first = add(&session, &args(&path, "Groceries", None, None)).expect("add should work");
        let child =
            add(&session, &args(&path, "Milk", Some(first.id), None)).expect("add should work");
        let sibling =
            add(&session, &args(&path, "Eggs", None, Some(child.id))).expect("add should work");
        session.finish().expect("session should save");

        assert_eq!(child.parent, Some(first.id));
        assert_eq!(sibling.parent, Some(first.id));
        assert_eq!(sibling.previous, Some(child.id));

        let reopened = Session::open(&path).expect("session should reopen");
        assert_eq!(reopened.document().get_items_count(), 3);
        assert_eq!(
            reopened.document().history_descriptions().expect("history should list").len(),
            3
        );
    }

    #[test]
    fn human_format_mentions_parent() {
        let nested = AddResult { id: 7, parent: Some(3), previous: None };
        assert_eq!(format_human(&nested), "Added item 7 under 3");
        let root = AddResult { id: 8, parent: None, previous: Some(7) };
        assert_eq!(format_human(&root), "Added item 8 at root level");
    }
}
