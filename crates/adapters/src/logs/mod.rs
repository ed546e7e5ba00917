// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job output sinks
//!
//! Container output is written to several places at once: the backend's
//! log service, an append-only local file and the live stream. [`FanOut`]
//! combines them and [`SharedLog`] lets the build and run steps share it.

mod json;
mod stream;

pub use json::JsonLineLog;
pub use stream::{StreamServer, StreamWriter};

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// An owned output sink
pub type LogSink = Box<dyn Write + Send>;

/// Writes every buffer to each sink in order.
///
/// A failing sink does not stop the others; the first error is reported
/// after all sinks have been written.
pub struct FanOut {
    sinks: Vec<LogSink>,
}

impl FanOut {
    pub fn new(sinks: Vec<LogSink>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Write for FanOut {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.write_all(buf) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Cloneable handle to a single sink
#[derive(Clone)]
pub struct SharedLog {
    inner: Arc<Mutex<LogSink>>,
}

impl SharedLog {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// A handle that discards everything
    pub fn sink() -> Self {
        Self::new(io::sink())
    }
}

impl Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}

/// Open `<dir>/<name>.log` for appending, creating `dir` if needed
pub fn open_local_log(dir: &Path, name: &str) -> io::Result<File> {
    std::fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{name}.log")))
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
