// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use super::policy::{self, KnownCve};
use crate::models::{PortScanDetails, ServiceInfo, Severity, Vulnerability};

fn matches(cve: &KnownCve, service: &ServiceInfo, version: &str) -> bool {
    let software = format!(
        "{} {}",
        service.name,
        service.product.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    software.contains(cve.software) && version.contains(cve.version)
}

/// Looks up every service with a known version in the table of known
/// vulnerable releases.
pub fn match_known_cves(ports: &PortScanDetails) -> Vec<Vulnerability> {
    ports
        .services
        .iter()
        .filter_map(|(port, service)| {
            service
                .version
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|version| (*port, service, version))
        })
        .flat_map(|(port, service, version)| {
            policy::KNOWN_CVES
                .iter()
                .filter(move |cve| matches(cve, service, version))
                .map(move |cve| {
                    Vulnerability::new(
                        Severity::Critical,
                        "known_cve",
                        format!(
                            "{} {} is affected by {}: {}",
                            service.product.as_deref().unwrap_or(&service.name),
                            version,
                            cve.cve,
                            cve.summary
                        ),
                    )
                    .with_port(port)
                    .with_service(service.name.clone())
                    .with_cve(cve.cve)
                    .with_remediation(format!(
                        "Upgrade {} to a release fixing {}",
                        cve.software, cve.cve
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, product: Option<&str>, version: Option<&str>) -> ServiceInfo {
        ServiceInfo {
            name: name.to_string(),
            product: product.map(str::to_string),
            version: version.map(str::to_string),
        }
    }

    #[test]
    fn versions_are_matched() {
        let mut ports = PortScanDetails::default();
        ports.services.insert(
            22,
            service("ssh", Some("OpenSSH"), Some("7.2p2 Ubuntu 4ubuntu2.10")),
        );
        ports
            .services
            .insert(80, service("http", Some("Apache httpd"), Some("2.4.49")));
        ports
            .services
            .insert(443, service("https", Some("nginx"), Some("1.25.3")));
        let findings = match_known_cves(&ports);
        let cves: Vec<_> = findings.iter().filter_map(|f| f.cve.as_deref()).collect();
        assert_eq!(cves, vec!["CVE-2016-6210", "CVE-2021-41773"]);
        assert!(findings.iter().all(|f| f.severity == Severity::Critical));
        assert_eq!(findings[1].port, Some(80));
        assert!(findings[1].description.contains("Apache httpd 2.4.49"));
    }

    #[test]
    fn services_without_version_are_skipped() {
        let mut ports = PortScanDetails::default();
        ports
            .services
            .insert(80, service("http", Some("Apache httpd"), None));
        ports.services.insert(8080, service("http-alt", None, Some("")));
        assert!(match_known_cves(&ports).is_empty());
    }
}
