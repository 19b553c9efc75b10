// `outliner mv`: move an item among its siblings or out one level.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use outliner_common::{Direction, ItemId};
use serde::{Deserialize, Serialize};

use crate::output::{self, OutputFormat};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MoveDirection {
    /// Swap with the previous sibling.
    Up,
    /// Swap with the next sibling.
    Down,
    /// Become the next sibling of the current parent, keeping children.
    Out,
}

impl From<MoveDirection> for Direction {
    fn from(direction: MoveDirection) -> Self {
        match direction {
            MoveDirection::Up => Direction::Up,
            MoveDirection::Down => Direction::Down,
            MoveDirection::Out => Direction::ToParent,
        }
    }
}

#[derive(Debug, Args)]
pub struct MvArgs {
    /// Document path.
    pub doc: PathBuf,

    /// Item id.
    pub id: i64,

    /// Where to move the item.
    #[arg(value_enum)]
    pub direction: MoveDirection,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MvResult {
    pub id: i64,
    pub direction: Direction,
    pub moved: bool,
}

pub fn run(args: MvArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let direction = Direction::from(args.direction);
    let result = Session::open(&args.doc).and_then(|session| {
        let group = session.document().next_group();
        let moved = session.engine().move_item(session.path(), ItemId(args.id), direction, group)?;
        session.finish()?;
        Ok(MvResult { id: args.id, direction, moved })
    });
    if let Ok(MvResult { moved: false, id, .. }) = &result {
        output::print_warning(format, "CANNOT_MOVE", &format!("item {id} is already there"));
    }
    super::report(format, result, format_human)
}

fn format_human(result: &MvResult) -> String {
    let verb = if result.moved { "Moved" } else { "Did not move" };
    let direction = match result.direction {
        Direction::Up => "up",
        Direction::Down => "down",
        Direction::ToParent => "out",
    };
    format!("{verb} item {} {direction}", result.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_maps_to_parent_shift() {
        assert_eq!(Direction::from(MoveDirection::Out), Direction::ToParent);
        assert_eq!(Direction::from(MoveDirection::Up), Direction::Up);
    }

    #[test]
    fn human_format_reports_refusal() {
        let refused = MvResult { id: 2, direction: Direction::Up, moved: false };
        assert_eq!(format_human(&refused), "Did not move item 2 up");
        let moved = MvResult { id: 2, direction: Direction::ToParent, moved: true };
        assert_eq!(format_human(&moved), "Moved item 2 out");
    }
}
