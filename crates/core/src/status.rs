// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status state machine
//!
//! The happy path is monotonic:
//! `submitted -> downloading? -> building -> running -> uploading? -> done`.
//! Stop, abort and failure are escape paths reachable from any non-terminal
//! status. `pending`, `aborting` and `aborted` are owned by the control plane;
//! the executor only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a job as stored on its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    #[default]
    Submitted,
    Downloading,
    Building,
    Running,
    Uploading,
    Stopping,
    Stopped,
    Aborting,
    Aborted,
    Failed,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Submitted => "submitted",
            JobStatus::Downloading => "downloading",
            JobStatus::Building => "building",
            JobStatus::Running => "running",
            JobStatus::Uploading => "uploading",
            JobStatus::Stopping => "stopping",
            JobStatus::Stopped => "stopped",
            JobStatus::Aborting => "aborting",
            JobStatus::Aborted => "aborted",
            JobStatus::Failed => "failed",
            JobStatus::Done => "done",
        }
    }

    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Stopped | JobStatus::Aborted | JobStatus::Failed | JobStatus::Done
        )
    }

    /// Position on the happy path, `None` for escape-path statuses
    fn rank(&self) -> Option<u8> {
        match self {
            JobStatus::Pending => Some(0),
            JobStatus::Submitted => Some(1),
            JobStatus::Downloading => Some(2),
            JobStatus::Building => Some(3),
            JobStatus::Running => Some(4),
            JobStatus::Uploading => Some(5),
            JobStatus::Done => Some(6),
            _ => None,
        }
    }

    /// Whether a job in this status may move to `next`.
    ///
    /// Forward moves along the happy path may skip optional phases. Terminal
    /// statuses never move.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Failed | JobStatus::Stopping | JobStatus::Aborting => true,
            JobStatus::Stopped => true,
            JobStatus::Aborted => *self == JobStatus::Aborting,
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
