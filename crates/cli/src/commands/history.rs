// `outliner history`: list recorded changes, newest first.

use std::path::PathBuf;

use clap::Args;
use outliner_common::{GroupSummary, HistoryStatus};
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::session::Session;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Document path.
    pub doc: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResult {
    pub doc_path: String,
    pub pending_changes: bool,
    #[serde(default)]
    pub groups: Vec<GroupSummary>,
}

pub fn run(args: HistoryArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = Session::open(&args.doc).and_then(|session| {
        let document = session.document();
        let result = HistoryResult {
            doc_path: session.path().display().to_string(),
            pending_changes: document.pending_changes(),
            groups: document.history_descriptions()?,
        };
        session.finish()?;
        Ok(result)
    });
    super::report(format, result, format_human)
}

fn format_human(result: &HistoryResult) -> String {
    let mut lines = vec![result.doc_path.clone()];
    if result.groups.is_empty() {
        lines.push("  (no history)".to_string());
    }
    for group in &result.groups {
        let marker = match group.status {
            HistoryStatus::Done => " ",
            HistoryStatus::Undone => "~",
        };
        let noun = if group.entries == 1 { "entry" } else { "entries" };
        lines.push(format!(
            "{marker} #{} {} ({} {noun})",
            group.group, group.description, group.entries
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use outliner_common::GroupId;

    use super::*;

    #[test]
    fn human_format_marks_undone_groups() {
        let result = HistoryResult {
            doc_path: "plans.outl".into(),
            pending_changes: true,
            groups: vec![
                GroupSummary {
                    group: GroupId(4),
                    description: "Delete items".into(),
                    status: HistoryStatus::Undone,
                    entries: 3,
                },
                GroupSummary {
                    group: GroupId(3),
                    description: "Add item".into(),
                    status: HistoryStatus::Done,
                    entries: 1,
                },
            ],
        };
        let output = format_human(&result);
        assert!(output.contains("~ #4 Delete items (3 entries)"));
        assert!(output.contains("  #3 Add item (1 entry)"));
    }

    #[test]
    fn human_format_empty_history() {
        let result =
            HistoryResult { doc_path: "new.outl".into(), pending_changes: false, groups: vec![] };
        assert_eq!(format_human(&result), "new.outl\n  (no history)");
    }
}
