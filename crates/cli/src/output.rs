// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use outliner_core::Error as CoreError;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RESET: &str = "\x1b[0m";

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON (one object per response).
    Json,
}

impl OutputFormat {
    /// Auto-detect format: JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    /// Testable variant that takes an explicit `is_tty` flag.
    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Write a value to stdout in the selected format.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    let mut out = io::stdout().lock();
    write_output(&mut out, format, value, human_fn)
}

/// Write a value to a provided writer (useful for testing).
pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => {
            writeln!(writer, "{}", human_fn(value))
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Write an error to stderr in the selected format.
pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    print_diagnostic(format, "error", ANSI_RED, code, message);
}

/// Write a warning to stderr in the selected format.
pub fn print_warning(format: OutputFormat, code: &str, message: &str) {
    print_diagnostic(format, "warning", ANSI_YELLOW, code, message);
}

fn print_diagnostic(format: OutputFormat, label: &str, color: &str, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    match format {
        OutputFormat::Human => {
            let line = render_human_stderr_line(label, message, io::stderr().is_terminal(), color);
            let _ = writeln!(err, "{line}");
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                label: {
                    "code": code,
                    "message": message,
                }
            });
            let _ = serde_json::to_writer(&mut err, &obj);
            let _ = writeln!(err);
        }
    }
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    let message = format!("{error:#}");
    let Some(core) = error.chain().find_map(|cause| cause.downcast_ref::<CoreError>()) else {
        return ("ERROR", message);
    };

    match core {
        CoreError::NotFound(path) => (
            "DOCUMENT_NOT_FOUND",
            format!("Document {} not found. Run: outliner new {0}", path.display()),
        ),
        CoreError::NotValid { path, reason } => (
            "NOT_AN_OUTLINE",
            format!("{} is not an outline document ({reason})", path.display()),
        ),
        CoreError::AlreadyExists(path) => (
            "ALREADY_EXISTS",
            format!("{} already exists. Run: outliner tree {0}", path.display()),
        ),
        CoreError::ItemNotFound(id) => {
            ("ITEM_NOT_FOUND", format!("Item {id} not found. Run: outliner tree <doc> to list ids"))
        }
        CoreError::InvalidReference(reason) => ("INVALID_REFERENCE", reason.clone()),
        CoreError::CannotMove { id, reason } => {
            ("CANNOT_MOVE", format!("Item {id} cannot move: {reason}"))
        }
        CoreError::Busy(what) => ("BUSY", format!("The {what} is in use. Try again.")),
        CoreError::HistoryReplay { direction, reason } => (
            "HISTORY_REPLAY",
            format!("Could not {direction}; nothing was changed ({reason})"),
        ),
        _ => ("ERROR", message),
    }
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use outliner_common::{HistoryDirection, ItemId};

    use super::*;

    #[test]
    fn detect_tty_returns_human() {
        assert_eq!(OutputFormat::detect_from_terminal(true), OutputFormat::Human);
    }

    #[test]
    fn detect_pipe_returns_json() {
        assert_eq!(OutputFormat::detect_from_terminal(false), OutputFormat::Json);
    }

    #[test]
    fn detect_json_flag_overrides_tty() {
        assert_eq!(OutputFormat::detect(true), OutputFormat::Json);
    }

    #[test]
    fn write_output_human_format() {
        #[derive(Serialize)]
        struct Info {
            name: String,
        }
        let info = Info { name: "groceries".into() };
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Human, &info, |i| format!("Name: {}", i.name))
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Name: groceries\n");
    }

    #[test]
    fn write_output_json_does_not_call_human_fn() {
        #[derive(Serialize)]
        struct Info {
            count: u32,
        }
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Json, &Info { count: 42 }, |_| {
            unreachable!("human_fn should not be called in JSON mode")
        })
        .unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["count"], 42);
    }

    #[test]
    fn print_diagnostics_do_not_panic() {
        print_error(OutputFormat::Human, "TEST_ERR", "something broke");
        print_error(OutputFormat::Json, "TEST_ERR", "something broke");
        print_warning(OutputFormat::Json, "WARN", "heads up");
    }

    #[test]
    fn render_human_error_uses_color_for_tty() {
        let line = render_human_stderr_line("error", "boom", true, ANSI_RED);
        assert!(line.contains(ANSI_RED));
        assert!(line.contains(ANSI_RESET));
        assert!(line.contains("boom"));
    }

    #[test]
    fn render_human_warning_without_tty_is_plain() {
        let line = render_human_stderr_line("warning", "careful", false, ANSI_YELLOW);
        assert_eq!(line, "warning: careful");
    }

    #[test]
    fn actionable_error_document_not_found_message() {
        let err = anyhow::Error::new(CoreError::NotFound(PathBuf::from("plan.outl")))
            .context("failed to open document");
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "DOCUMENT_NOT_FOUND");
        assert!(message.contains("outliner new plan.outl"));
    }

    #[test]
    fn actionable_error_item_not_found_message() {
        let err = anyhow::Error::new(CoreError::ItemNotFound(ItemId(12)));
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "ITEM_NOT_FOUND");
        assert!(message.contains("Item 12"));
    }

    #[test]
    fn actionable_error_replay_message() {
        let err = anyhow::Error::new(CoreError::HistoryReplay {
            direction: HistoryDirection::Undo,
            reason: "disk full".into(),
        });
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "HISTORY_REPLAY");
        assert!(message.starts_with("Could not undo"));
    }

    #[test]
    fn actionable_error_plain_message_passes_through() {
        let err = anyhow::anyhow!("something odd");
        assert_eq!(actionable_error(&err), ("ERROR", "something odd".to_string()));
    }
}
