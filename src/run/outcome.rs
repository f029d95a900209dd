use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{AppError, ErrorKind};
use crate::run::DeliveryMode;

/// Final verdict of one plan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Passed,
    /// The test ran and reported something other than `Pass`, or its passing
    /// result could not be persisted.
    Failed { reason: String },
    /// No callback arrived in time. The remote run may still finish.
    Unknown { reason: String },
    Error { kind: ErrorKind, detail: String },
}

impl RunOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, RunOutcome::Passed)
    }
}

impl From<AppError> for RunOutcome {
    fn from(e: AppError) -> Self {
        RunOutcome::Error {
            kind: e.kind(),
            detail: e.to_string(),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Passed => write!(f, "passed"),
            RunOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            RunOutcome::Unknown { reason } => write!(f, "unknown: {reason}"),
            RunOutcome::Error { kind, detail } => write!(f, "error ({kind:?}): {detail}"),
        }
    }
}

/// Everything the caller learns about a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub mode: DeliveryMode,
    pub test_id: Option<String>,
    pub artifact: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Human-readable progress lines, in order.
    pub log: Vec<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_pass()
    }
}

/// Collects the log trail of a run while also emitting it through `tracing`.
#[derive(Debug, Default)]
pub(crate) struct RunTrail {
    pub lines: Vec<String>,
    pub test_id: Option<String>,
    pub artifact: Option<PathBuf>,
}

impl RunTrail {
    pub fn info(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.lines.push(line);
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::warn!("{line}");
        self.lines.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::error!("{line}");
        self.lines.push(line);
    }
}
