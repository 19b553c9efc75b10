// Consistent exit codes for the outliner CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = document missing or not an outline
//   11 = item not found
//   12 = edit refused (impossible move, busy document, unsaved changes)
//   13 = history replay failed

use std::process;

use outliner_core::Error as CoreError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Document = 10,
    Item = 11,
    Refused = 12,
    Replay = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(core) = cause.downcast_ref::<CoreError>() {
                return Self::from_core(core);
            }
        }
        Self::Error
    }

    pub fn from_core(err: &CoreError) -> Self {
        match err {
            CoreError::NotFound(_)
            | CoreError::NotValid { .. }
            | CoreError::AlreadyExists(_)
            | CoreError::AlreadyOpen(_) => Self::Document,
            CoreError::ItemNotFound(_) => Self::Item,
            CoreError::InvalidReference(_) => Self::Usage,
            CoreError::CannotMove { .. }
            | CoreError::Busy(_)
            | CoreError::HasUnsavedChanges(_) => Self::Refused,
            CoreError::HistoryReplay { .. } => Self::Replay,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
