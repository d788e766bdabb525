// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Configuration of the daemon, read from a TOML file.
//!
//! Every section falls back to its defaults, an empty file is a valid
//! configuration without targets.

pub mod duration;
mod logging;

pub use logging::*;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    models::{ScanOptions, Target, TargetId},
    probe::ProbeTimeouts,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Target id {0} is used more than once")]
    DuplicateTarget(TargetId),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// `[monitor]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitor {
    #[serde(with = "duration")]
    pub interval: Duration,
    pub max_concurrent_checks: usize,
    pub timeouts: ProbeTimeouts,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_concurrent_checks: 16,
            timeouts: ProbeTimeouts::default(),
        }
    }
}

/// `[alerts]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alerts {
    pub enabled: bool,
    pub recipients: Vec<String>,
}

/// `[scanner]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scanner {
    #[serde(flatten)]
    pub options: ScanOptions,
    /// Connect timeout of a single port in the connect scan.
    #[serde(with = "duration")]
    pub port_timeout: Duration,
    /// Timeout of a single HTTP request or TLS handshake.
    #[serde(with = "duration")]
    pub request_timeout: Duration,
    /// Upper bound of a whole scan, the scan is marked failed afterwards.
    #[serde(with = "duration")]
    pub scan_timeout: Duration,
    pub nmap_path: PathBuf,
    pub use_deep_scanner: bool,
    pub max_concurrent_ports: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            options: ScanOptions::default(),
            port_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(600),
            nmap_path: PathBuf::from("nmap"),
            use_deep_scanner: true,
            max_concurrent_ports: 64,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// Directory for scan records. Records are kept in memory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "log")]
    pub logging: Logging,
    pub monitor: Monitor,
    pub alerts: Alerts,
    pub scanner: Scanner,
    pub storage: Storage,
    pub targets: Vec<Target>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        content.parse()
    }

    fn check(self) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        if let Some(target) = self.targets.iter().find(|t| !seen.insert(t.id)) {
            return Err(ConfigError::DuplicateTarget(target.id));
        }
        if self.monitor.max_concurrent_checks == 0 {
            return Err(ConfigError::Zero("monitor.max_concurrent_checks"));
        }
        if self.monitor.interval.is_zero() {
            return Err(ConfigError::Zero("monitor.interval"));
        }
        if self.scanner.max_concurrent_ports == 0 {
            return Err(ConfigError::Zero("scanner.max_concurrent_ports"));
        }
        Ok(self)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str::<Config>(s)?.check()
    }
}
