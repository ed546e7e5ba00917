// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-lines log sink used by the local backend

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp_ms: u64,
    message: &'a str,
}

/// Buffers raw output and writes one JSON record per completed line
pub struct JsonLineLog {
    file: File,
    pending: Vec<u8>,
}

impl JsonLineLog {
    /// Open (or create) the log file, creating parent directories
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            pending: Vec::new(),
        })
    }

    fn emit(&mut self, line: &[u8]) -> io::Result<()> {
        let message = String::from_utf8_lossy(line);
        let entry = LogEntry {
            timestamp_ms: now_ms(),
            message: message.trim_end_matches('\r'),
        };
        let mut record = serde_json::to_vec(&entry).map_err(io::Error::other)?;
        record.push(b'\n');
        self.file.write_all(&record)
    }
}

impl Write for JsonLineLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line[..line.len() - 1])?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line)?;
        }
        self.file.flush()
    }
}

impl Drop for JsonLineLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
