// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Status;

/// Outcome of a single protocol probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: Status,
    /// Response time in milliseconds, only set for online results.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_time: Option<u64>,
    pub message: String,
}

impl ProbeResult {
    pub fn online(response_time: u64, message: impl Into<String>) -> Self {
        Self {
            status: Status::Online,
            response_time: Some(response_time),
            message: message.into(),
        }
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self {
            status: Status::Offline,
            response_time: None,
            message: message.into(),
        }
    }

    /// An offline result that still carries the measured latency, e.g. an
    /// HTTP server answering with an error status.
    pub fn offline_with_time(response_time: u64, message: impl Into<String>) -> Self {
        Self {
            status: Status::Offline,
            response_time: Some(response_time),
            message: message.into(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }
}

/// Verdict for one target in one check cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStatus {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_time: Option<u64>,
    pub message: String,
    pub checked_at: u64,
}

/// Milliseconds of a duration, saturating instead of truncating silently.
pub fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
