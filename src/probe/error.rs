// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::time::Duration;

use thiserror::Error;

/// Failures inside a probe. They never leave the probe, every one of them
/// ends up as the message of an offline result.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("name resolution failed for {host}: {reason}")]
    NameResolution { host: String, reason: String },
    #[error("connection to {address} refused or filtered: {reason}")]
    Refused { address: String, reason: String },
    #[error("connection to {address} timed out after {}ms", .timeout.as_millis())]
    Timeout { address: String, timeout: Duration },
    #[error("unable to load key {path}: {reason}")]
    Key { path: String, reason: String },
    #[error("SSH handshake failed: {0}")]
    Ssh(#[from] russh::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
