// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot stop broadcast shared by the stop watchers and the job task

use crate::error::ExecutorError;
use tokio_util::sync::CancellationToken;

/// Idempotent stop signal.
///
/// Any number of producers may call [`StopSignal::stop`]; the job task only
/// observes it at checkpoints and while waiting on the container.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once a stop was requested
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Checkpoint between phases
    pub fn checkpoint(&self) -> Result<(), ExecutorError> {
        if self.is_stopped() {
            return Err(ExecutorError::Stopped);
        }
        Ok(())
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
#[path = "stop_tests.rs"]
mod tests;
