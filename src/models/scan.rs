// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

use super::{Recommendation, RiskLevel, ScanDepth, SeverityCounts, TargetId, Vulnerability};

pub type ScanId = String;

/// Lifecycle of a scan record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ScanStatus::Pending => "pending",
                ScanStatus::InProgress => "in_progress",
                ScanStatus::Completed => "completed",
                ScanStatus::Failed => "failed",
            }
        )
    }
}

/// What is known about a service listening on an open port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
}

impl ServiceInfo {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Result of the port and service discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortScanDetails {
    /// Name of the port scanner that produced the result.
    pub scanner: String,
    pub scanned_ports: Vec<u16>,
    pub open_ports: Vec<u16>,
    pub services: BTreeMap<u16, ServiceInfo>,
}

impl PortScanDetails {
    /// Ports with a web service, paired with whether the service speaks
    /// TLS.
    pub fn web_ports(&self) -> Vec<(u16, bool)> {
        self.services
            .iter()
            .filter(|(_, service)| {
                let name = service.name.to_lowercase();
                name.contains("http") || name.contains("web")
            })
            .map(|(port, service)| {
                let name = service.name.to_lowercase();
                let tls = name.contains("https") || name.contains("ssl") || [443, 8443].contains(port);
                (*port, tls)
            })
            .collect()
    }

    pub fn https_port(&self) -> Option<u16> {
        self.web_ports()
            .into_iter()
            .find_map(|(port, tls)| tls.then_some(port))
    }
}

/// Technologies recognised on a web port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technologies {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub frameworks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDetails {
    pub port: u16,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_code: Option<u16>,
    pub technologies: Technologies,
    pub missing_headers: Vec<String>,
    pub exposed_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsDetails {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cipher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub days_until_expiry: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub legacy_protocols: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsDetails {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub spf: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dmarc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub zone_transfer_refused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dnssec: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub notes: Vec<String>,
}

/// Technical details collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDetails {
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ip_address: Option<String>,
    pub depth: ScanDepth,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ports: Option<PortScanDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub web: Vec<WebDetails>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssl: Option<TlsDetails>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dns: Option<DnsDetails>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<u32>,
}

/// Everything a finished scan produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub risk_level: RiskLevel,
    pub vulnerabilities: Vec<Vulnerability>,
    pub recommendations: Vec<Recommendation>,
    pub details: ScanDetails,
    pub counts: SeverityCounts,
}

/// One run of the security scan pipeline against a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: ScanId,
    pub target_id: TargetId,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<u64>,
    pub risk_level: RiskLevel,
    pub vulnerabilities: Vec<Vulnerability>,
    pub recommendations: Vec<Recommendation>,
    pub details: ScanDetails,
    pub counts: SeverityCounts,
    /// Only set on failed scans.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl ScanRecord {
    pub fn finalize(
        &mut self,
        status: ScanStatus,
        report: ScanReport,
        error: Option<String>,
        completed_at: u64,
    ) {
        self.status = status;
        self.completed_at = Some(completed_at);
        self.risk_level = report.risk_level;
        self.vulnerabilities = report.vulnerabilities;
        self.recommendations = report.recommendations;
        self.details = report.details;
        self.counts = report.counts;
        self.error_message = match status {
            ScanStatus::Failed => error,
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_ports_are_classified() {
        let mut details = PortScanDetails::default();
        details.services.insert(22, ServiceInfo::named("ssh"));
        details.services.insert(80, ServiceInfo::named("http"));
        details.services.insert(443, ServiceInfo::named("https"));
        details.services.insert(8443, ServiceInfo::named("https-alt"));
        details.services.insert(9000, ServiceInfo::named("ssl/http"));
        details.services.insert(3306, ServiceInfo::named("mysql"));
        assert_eq!(
            details.web_ports(),
            vec![(80, false), (443, true), (8443, true), (9000, true)]
        );
        assert_eq!(details.https_port(), Some(443));
    }

    #[test]
    fn error_only_kept_on_failure() {
        let mut record = ScanRecord::default();
        record.finalize(
            ScanStatus::Completed,
            ScanReport::default(),
            Some("ignored".to_string()),
            10,
        );
        assert_eq!(record.error_message, None);
        record.finalize(
            ScanStatus::Failed,
            ScanReport::default(),
            Some("timeout".to_string()),
            11,
        );
        assert_eq!(record.error_message.as_deref(), Some("timeout"));
        assert_eq!(record.completed_at, Some(11));
    }
}
