// `outliner tree`: show the item tree with ids.

use std::path::PathBuf;

use clap::Args;
use outliner_common::ItemId;
use outliner_core::Document;
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct TreeArgs {
    /// Document path.
    pub doc: PathBuf,

    /// Show only the subtree under this item.
    #[arg(long, value_name = "ID")]
    root: Option<i64>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeResult {
    pub doc_path: String,
    #[serde(default)]
    pub items: Vec<TreeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeItem {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub children: Vec<TreeItem>,
}

pub fn run(args: TreeArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = Session::open(&args.doc).and_then(|session| {
        let root = args.root.map(ItemId);
        let items = match root {
            Some(id) => vec![collect_item(session.document(), id)?],
            None => collect_children(session.document(), None)?,
        };
        let result = TreeResult { doc_path: session.path().display().to_string(), items };
        session.finish()?;
        Ok(result)
    });
    super::report(format, result, format_human)
}

/// Walk the chain under `parent` one item at a time.
pub(crate) fn collect_children(
    document: &Document,
    parent: Option<ItemId>,
) -> anyhow::Result<Vec<TreeItem>> {
    let mut items = Vec::new();
    let mut previous = None;
    while let Some(id) = document.get_tree_item(parent, previous) {
        items.push(collect_item(document, id)?);
        previous = Some(id);
    }
    Ok(items)
}

fn collect_item(document: &Document, id: ItemId) -> anyhow::Result<TreeItem> {
    let text = document.get_item_text(id)?;
    let children = collect_children(document, Some(id))?;
    Ok(TreeItem { id: id.get(), text, children })
}

fn format_human(result: &TreeResult) -> String {
    let mut lines = Vec::new();
    lines.push(result.doc_path.clone());
    for item in &result.items {
        render_tree_node(&mut lines, item, 0);
    }
    lines.join("\n")
}

fn render_tree_node(lines: &mut Vec<String>, item: &TreeItem, depth: usize) {
    let indent = "  ".repeat(depth);
    let prefix = if depth == 0 { "" } else { "├─ " };
    lines.push(format!("{indent}{prefix}{} [{}]", item.text, item.id));
    for child in &item.children {
        render_tree_node(lines, child, depth + 1);
    }
}
