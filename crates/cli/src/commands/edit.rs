// `outliner edit`: replace an item's text.

use std::path::PathBuf;

use clap::Args;
use outliner_common::ItemId;
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Document path.
    pub doc: PathBuf,

    /// Item id.
    pub id: i64,

    /// New text.
    pub text: String,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResult {
    pub id: i64,
    pub old_text: String,
    pub text: String,
}

pub fn run(args: EditArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = Session::open(&args.doc).and_then(|session| {
        let id = ItemId(args.id);
        let document = session.document();
        let old_text = document.get_item_text(id)?;
        let group = document.next_group();
        session.engine().update_item_text(session.path(), id, group, &args.text)?;
        session.finish()?;
        Ok(EditResult { id: args.id, old_text, text: args.text })
    });
    super::report(format, result, format_human)
}

fn format_human(result: &EditResult) -> String {
    format!("Item {}: {:?} -> {:?}", result.id, result.old_text, result.text)
}
