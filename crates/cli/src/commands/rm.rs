// `outliner rm`: delete items together with everything under them.

use std::path::PathBuf;

use clap::Args;
use outliner_common::ItemId;
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct RmArgs {
    /// Document path.
    pub doc: PathBuf,

    /// Ids of the items to delete.
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<i64>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmResult {
    pub removed: Vec<i64>,
}

pub fn run(args: RmArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let ids = args.ids.iter().copied().map(ItemId).collect::<Vec<_>>();
    let result = Session::open(&args.doc).and_then(|session| {
        let group = session.document().next_group();
        let mut removed = session.engine().delete_items(session.path(), &ids, group)?;
        removed.sort();
        session.finish()?;
        Ok(RmResult { removed: removed.into_iter().map(ItemId::get).collect() })
    });
    super::report(format, result, format_human)
}

fn format_human(result: &RmResult) -> String {
    let ids = result.removed.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
    match result.removed.len() {
        1 => format!("Deleted item {ids}"),
        count => format!("Deleted {count} items: {ids}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_lists_cascade() {
        assert_eq!(format_human(&RmResult { removed: vec![5] }), "Deleted item 5");
        assert_eq!(
            format_human(&RmResult { removed: vec![2, 3, 9] }),
            "Deleted 3 items: 2, 3, 9"
        );
    }
}
