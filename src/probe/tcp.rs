// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use tokio::net::TcpStream;

use super::ProbeError;
use crate::models::{ProbeResult, as_millis};

/// Resolves `host` and connects to the first address accepting the
/// connection. Resolution and connect share the `timeout` budget.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ProbeError> {
    let start = Instant::now();
    let address = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> =
        match tokio::time::timeout(timeout, tokio::net::lookup_host((host, port))).await {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(e)) => {
                return Err(ProbeError::NameResolution {
                    host: host.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ProbeError::NameResolution {
                    host: host.to_string(),
                    reason: format!("no answer within {}ms", timeout.as_millis()),
                });
            }
        };
    if addrs.is_empty() {
        return Err(ProbeError::NameResolution {
            host: host.to_string(),
            reason: "no addresses found".to_string(),
        });
    }
    let remaining = timeout.saturating_sub(start.elapsed());
    match tokio::time::timeout(remaining, TcpStream::connect(&addrs[..])).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProbeError::Refused {
            address,
            reason: e.to_string(),
        }),
        Err(_) => Err(ProbeError::Timeout { address, timeout }),
    }
}

/// Checks whether `host:port` accepts TCP connections.
pub async fn check_tcp(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    match connect(host, port, timeout).await {
        Ok(_) => {
            let elapsed = as_millis(start.elapsed());
            ProbeResult::online(
                elapsed,
                format!("TCP connection to {host}:{port} successful, response time: {elapsed}ms"),
            )
        }
        Err(e) => ProbeResult::offline(format!("TCP {e}")),
    }
}
