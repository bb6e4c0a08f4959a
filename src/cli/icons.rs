//! Console icons shared by the command output.

use console::{style, StyledObject};

use crate::refresh::RefreshStatus;

pub fn success() -> StyledObject<&'static str> {
    style("✓").green()
}

pub fn info() -> StyledObject<&'static str> {
    style("→").cyan()
}

pub fn warn() -> StyledObject<&'static str> {
    style("!").yellow()
}

pub fn error() -> StyledObject<&'static str> {
    style("✗").red()
}

pub fn dim_arrow() -> StyledObject<&'static str> {
    style("→").dim()
}

/// Icon for a source's final status.
pub fn status(status: RefreshStatus) -> StyledObject<&'static str> {
    match status {
        RefreshStatus::Success => success(),
        RefreshStatus::Failed => error(),
        RefreshStatus::Skipped => warn(),
        RefreshStatus::Pending | RefreshStatus::Running => dim_arrow(),
    }
}
