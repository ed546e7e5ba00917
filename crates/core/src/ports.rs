// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application port resolution
//!
//! On the local compute target the container runs on a bridge network, so
//! every app port is published on a host port (the one the job asked for,
//! or a free one). Elsewhere the container shares the host network and no
//! port is published.

use crate::job::AppSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::TcpListener;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("invalid app port: {0}")]
    Invalid(u16),
    #[error("port declared twice: {0}")]
    Duplicate(u16),
    #[error("host port {port} is unavailable: {source}")]
    Unavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// A container port published on a host port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    pub container_port: u16,
    pub host_port: u16,
}

/// Container ports to expose
pub fn exposed_ports(apps: &[AppSpec], is_local: bool) -> Vec<u16> {
    if !is_local {
        return Vec::new();
    }
    apps.iter().map(|app| app.port).collect()
}

/// Host bindings for the job's apps, allocating free host ports where needed
pub fn binding_ports(apps: &[AppSpec], is_local: bool) -> Result<Vec<PortBinding>, PortError> {
    if !is_local {
        return Ok(Vec::new());
    }

    let mut container_ports = HashSet::new();
    let mut host_ports = HashSet::new();
    let mut bindings = Vec::with_capacity(apps.len());
    // Held until every app has a port so no two allocations collide
    let mut reserved = Vec::new();

    for app in apps {
        if app.port == 0 {
            return Err(PortError::Invalid(app.port));
        }
        if !container_ports.insert(app.port) {
            return Err(PortError::Duplicate(app.port));
        }
        let host_port = match app.map_to_port {
            Some(port) => {
                ensure_free(port)?;
                port
            }
            None => {
                let listener = allocate_free()?;
                let port = local_port(&listener)?;
                reserved.push(listener);
                port
            }
        };
        if !host_ports.insert(host_port) {
            return Err(PortError::Duplicate(host_port));
        }
        bindings.push(PortBinding {
            container_port: app.port,
            host_port,
        });
    }

    drop(reserved);
    Ok(bindings)
}

fn ensure_free(port: u16) -> Result<(), PortError> {
    TcpListener::bind(("0.0.0.0", port))
        .map(drop)
        .map_err(|source| PortError::Unavailable { port, source })
}

fn allocate_free() -> Result<TcpListener, PortError> {
    TcpListener::bind(("0.0.0.0", 0)).map_err(|source| PortError::Unavailable { port: 0, source })
}

fn local_port(listener: &TcpListener) -> Result<u16, PortError> {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|source| PortError::Unavailable { port: 0, source })
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
