// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::time::Duration;

use thiserror::Error;

use crate::{
    http::HttpError,
    models::{OptionsError, ScanId, TargetId},
    probe::ProbeError,
    storage::StorageError,
};

/// Failure of a single scan phase. Phase errors never abort a scan, they
/// end up as an info finding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unable to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("{0}")]
    Connect(String),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("HTTP request failed: {0}")]
    Http(#[from] HttpError),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("unable to parse certificate: {0}")]
    Certificate(String),
    #[error("DNS query failed: {0}")]
    Dns(String),
    #[error("port scanner {scanner} failed: {reason}")]
    PortScanner { scanner: String, reason: String },
    #[error("unable to parse port scanner output: {0}")]
    Parse(String),
}

impl From<ProbeError> for ScanError {
    fn from(value: ProbeError) -> Self {
        match value {
            ProbeError::NameResolution { host, reason } => Self::Resolve { host, reason },
            ProbeError::Timeout { timeout, .. } => Self::Timeout(timeout),
            e => Self::Connect(e.to_string()),
        }
    }
}

impl From<std::io::Error> for ScanError {
    fn from(value: std::io::Error) -> Self {
        Self::Connect(value.to_string())
    }
}

impl From<rustls::Error> for ScanError {
    fn from(value: rustls::Error) -> Self {
        Self::Tls(value.to_string())
    }
}

impl From<quick_xml::DeError> for ScanError {
    fn from(value: quick_xml::DeError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Errors of starting, stopping or finishing scans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanServiceError {
    #[error("A scan of target {0} is already running")]
    AlreadyRunning(TargetId),
    #[error("Scan {0} is not running")]
    NotRunning(ScanId),
    #[error("Invalid scan options: {0}")]
    Options(#[from] OptionsError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Scan task ended unexpectedly: {0}")]
    Task(String),
}
