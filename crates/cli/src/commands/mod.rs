// CLI subcommand dispatch.

use clap::Subcommand;
use outliner_common::HistoryDirection;
use serde::Serialize;

use crate::output::{self, OutputFormat};

pub mod add;
pub mod edit;
pub mod history;
pub mod mv;
pub mod new;
pub mod rm;
pub mod tree;
pub mod undo;

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty outline document
    New(new::NewArgs),
    /// Show the item tree with ids
    Tree(tree::TreeArgs),
    /// Add an item
    Add(add::AddArgs),
    /// Replace an item's text
    Edit(edit::EditArgs),
    /// Move an item up, down or out one level
    Mv(mv::MvArgs),
    /// Delete items and everything under them
    Rm(rm::RmArgs),
    /// Undo the last change
    Undo(undo::StepArgs),
    /// Redo the last undone change
    Redo(undo::StepArgs),
    /// List undoable and redoable changes
    History(history::HistoryArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::New(args) => new::run(args),
        Command::Tree(args) => tree::run(args),
        Command::Add(args) => add::run(args),
        Command::Edit(args) => edit::run(args),
        Command::Mv(args) => mv::run(args),
        Command::Rm(args) => rm::run(args),
        Command::Undo(args) => undo::run(args, HistoryDirection::Undo),
        Command::Redo(args) => undo::run(args, HistoryDirection::Redo),
        Command::History(args) => history::run(args),
    }
}

/// Print a command's result, or its error, in the selected format.
fn report<T: Serialize>(
    format: OutputFormat,
    result: anyhow::Result<T>,
    format_human: fn(&T) -> String,
) -> anyhow::Result<()> {
    match result {
        Ok(value) => {
            output::print_output(format, &value, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}
