// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live log stream
//!
//! A TCP endpoint that relays job output to every connected client as it
//! is written. Closing is idempotent; writes after close are discarded.

use std::io::{self, Write};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const STREAM_BUFFER: usize = 1024;

#[derive(Clone)]
pub struct StreamServer {
    tx: broadcast::Sender<Vec<u8>>,
    port: Option<u16>,
    closed: CancellationToken,
}

impl StreamServer {
    /// Listen on `addr` and start accepting clients
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();
        let (tx, _) = broadcast::channel(STREAM_BUFFER);
        let closed = CancellationToken::new();
        tokio::spawn(accept_loop(listener, tx.clone(), closed.clone()));
        tracing::info!(port, "log stream listening");
        Ok(Self {
            tx,
            port: Some(port),
            closed,
        })
    }

    /// A stream with no listener; writes go nowhere
    pub fn detached() -> Self {
        let (tx, _) = broadcast::channel(STREAM_BUFFER);
        Self {
            tx,
            port: None,
            closed: CancellationToken::new(),
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn writer(&self) -> StreamWriter {
        StreamWriter {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }

    /// Disconnect clients after flushing what they have not yet received
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Write half of a [`StreamServer`]
#[derive(Clone)]
pub struct StreamWriter {
    tx: broadcast::Sender<Vec<u8>>,
    closed: CancellationToken,
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.closed.is_cancelled() {
            // Err only means nobody is connected
            let _ = self.tx.send(buf.to_vec());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<Vec<u8>>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::debug!(%peer, "log stream client connected");
                    tokio::spawn(serve_client(socket, tx.subscribe(), closed.clone()));
                }
                Err(e) => tracing::warn!(error = %e, "log stream accept failed"),
            },
        }
    }
}

async fn serve_client(
    mut socket: TcpStream,
    mut rx: broadcast::Receiver<Vec<u8>>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Ok(chunk) => {
                    if socket.write_all(&chunk).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "log stream client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = closed.cancelled() => break,
        }
    }
    while let Ok(chunk) = rx.try_recv() {
        if socket.write_all(&chunk).await.is_err() {
            return;
        }
    }
    let _ = socket.shutdown().await;
}
