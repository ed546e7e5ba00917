// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Job runner execution engine

mod build;
mod error;
mod executor;
mod phases;
mod resolve;
mod runspec;
mod runtime;
mod stage;
mod stop;

#[cfg(test)]
mod test_support;

pub use build::{diff_key, image_name};
pub use error::{ExecutorError, Phase, StepError};
pub use executor::{Executor, LOGS_PORT_ENV};
pub use runtime::{RuntimeConfig, RuntimeDeps};
