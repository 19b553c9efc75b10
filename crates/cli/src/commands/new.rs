// `outliner new`: create an empty outline document.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use outliner_core::{Engine, EngineConfig};
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Path of the document to create (e.g. `plans.outl`).
    pub path: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResult {
    pub path: String,
}

pub fn run(args: NewArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    super::report(format, create(&args.path), format_human)
}

fn create(path: &Path) -> anyhow::Result<NewResult> {
    let engine = Engine::new(EngineConfig::load());
    let document = engine
        .create(path)
        .with_context(|| format!("failed to create document `{}`", path.display()))?;
    let result = NewResult { path: document.path().display().to_string() };
    engine.exit();
    Ok(result)
}

fn format_human(result: &NewResult) -> String {
    format!("Created {}", result.path)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn create_writes_an_openable_document() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("fresh.outl");
        let result = create(&path).expect("create should succeed");
        assert!(result.path.ends_with("fresh.outl"));

        let engine = Engine::default();
        let document = engine.open(&path).expect("created document should open");
        assert_eq!(document.get_items_count(), 0);
    }

    #[test]
    fn create_refuses_existing_files() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("taken.outl");
        std::fs::write(&path, b"occupied").unwrap();
        let err = create(&path).expect_err("existing file should be refused");
        assert!(format!("{err:#}").contains("already exists"));
    }

    #[test]
    fn human_format_names_the_path() {
        let result = NewResult { path: "/tmp/plans.outl".into() };
        assert_eq!(format_human(&result), "Created /tmp/plans.outl");
    }
}
