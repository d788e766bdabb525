// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use serde::{Deserialize, Serialize};

/// Well known ports probed by every standard scan.
pub const WELL_KNOWN_PORTS: [u16; 23] = [
    21, 22, 23, 25, 53, 80, 110, 135, 139, 143, 443, 445, 1433, 1521, 3306, 3389, 5432, 5900,
    6379, 8080, 8443, 9200, 27017,
];

/// Additional ports probed by deep scans.
pub const DEEP_EXTRA_PORTS: [u16; 18] = [
    111, 389, 636, 873, 1080, 2049, 2375, 5000, 5601, 5984, 6443, 8000, 8008, 8081, 8888, 9000,
    9090, 11211,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDepth {
    /// Dangerous port connect scan and a single TLS handshake.
    Quick,
    #[default]
    Standard,
    /// Standard scan with an extended port list and maximum version
    /// detection intensity.
    Deep,
}

/// Recognised options of a security scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub scan_depth: ScanDepth,
    pub custom_ports: Vec<u16>,
    pub exclude_ports: Vec<u16>,
    pub enable_ssl_scan: bool,
    pub enable_web_scan: bool,
    pub enable_dns_scan: bool,
    pub enable_cve_scan: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            scan_depth: ScanDepth::Standard,
            custom_ports: Vec::new(),
            exclude_ports: Vec::new(),
            enable_ssl_scan: true,
            enable_web_scan: true,
            enable_dns_scan: true,
            enable_cve_scan: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("Port 0 is not a valid port in {0}")]
    InvalidPort(&'static str),
    #[error("All ports are excluded, nothing left to scan")]
    NoPorts,
}

impl ScanOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.custom_ports.contains(&0) {
            return Err(OptionsError::InvalidPort("custom_ports"));
        }
        if self.exclude_ports.contains(&0) {
            return Err(OptionsError::InvalidPort("exclude_ports"));
        }
        if self.ports().is_empty() {
            return Err(OptionsError::NoPorts);
        }
        Ok(())
    }

    /// Ports to probe in ascending order: the base list of the scan depth
    /// plus custom ports, minus excluded ports.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = WELL_KNOWN_PORTS.to_vec();
        if self.scan_depth == ScanDepth::Deep {
            ports.extend(DEEP_EXTRA_PORTS);
        }
        ports.extend(self.custom_ports.iter().copied().filter(|p| *p != 0));
        ports.retain(|p| !self.exclude_ports.contains(p));
        ports.sort_unstable();
        ports.dedup();
        ports
    }
}
