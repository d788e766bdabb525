// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Low latency risk snapshot: a connect scan of the dangerous ports and a
//! single TLS handshake.

use super::{ScanError, TlsInspector, policy};
use crate::models::{
    PortScanDetails, Protocol, ScanOptions, Severity, Target, TlsDetails, Vulnerability,
};

/// Ports of the quick check without the excluded ones.
pub fn ports(options: &ScanOptions) -> Vec<u16> {
    policy::QUICK_CHECK_PORTS
        .iter()
        .copied()
        .filter(|p| !options.exclude_ports.contains(p))
        .collect()
}

pub fn dangerous_ports(ports: &PortScanDetails) -> Vec<Vulnerability> {
    ports
        .open_ports
        .iter()
        .filter_map(|port| policy::quick_port_severity(*port).map(|s| (*port, s)))
        .map(|(port, severity)| {
            let service = policy::dangerous_service(port)
                .map(|s| s.service)
                .unwrap_or("Service");
            Vulnerability::new(
                severity,
                "dangerous_port",
                format!("Port {port} ({service}) is open"),
            )
            .with_port(port)
            .with_service(service)
            .with_remediation(format!("Close or restrict access to port {port}"))
        })
        .collect()
}

/// Port for the TLS handshake when the target is monitored over HTTPS.
pub fn tls_port(target: &Target) -> Option<u16> {
    (target.protocols.contains(&Protocol::Http) && target.http.use_https)
        .then(|| target.http.port.unwrap_or(443))
}

/// One handshake, only the negotiated protocol is judged.
pub async fn tls_check(
    inspector: &dyn TlsInspector,
    host: &str,
    port: u16,
) -> Result<(TlsDetails, Vec<Vulnerability>), ScanError> {
    let observation = inspector.handshake(host, port).await?;
    let mut findings = Vec::new();
    if policy::is_legacy_protocol(&observation.protocol) {
        findings.push(
            Vulnerability::new(
                Severity::High,
                "ssl_weak",
                format!("Obsolete SSL/TLS protocol: {}", observation.protocol),
            )
            .with_port(port)
            .with_remediation("Use TLS 1.2 or newer"),
        );
    }
    let details = TlsDetails {
        port,
        protocol: Some(observation.protocol),
        cipher: Some(observation.cipher).filter(|c| !c.is_empty()),
        subject: observation.certificate.as_ref().map(|c| c.subject.clone()),
        issuer: observation.certificate.as_ref().map(|c| c.issuer.clone()),
        ..Default::default()
    };
    Ok((details, findings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{TlsObservation, fake::StaticInspector};

    #[test]
    fn excluded_ports_are_skipped() {
        let options = ScanOptions {
            exclude_ports: vec![22, 3389],
            ..Default::default()
        };
        assert_eq!(ports(&options), vec![23, 139, 445, 5900, 6379, 9200, 27017]);
    }

    #[test]
    fn severities_of_open_ports() {
        let details = PortScanDetails {
            open_ports: vec![22, 445, 5900],
            ..Default::default()
        };
        let findings = dangerous_ports(&details);
        let found: Vec<_> = findings.iter().map(|f| (f.port, f.severity)).collect();
        assert_eq!(
            found,
            vec![(Some(445), Severity::High), (Some(5900), Severity::Medium)]
        );
        assert_eq!(findings[0].description, "Port 445 (SMB) is open");
        assert!(findings.iter().all(|f| f.kind == "dangerous_port"));
    }

    #[tokio::test]
    async fn legacy_handshake_is_weak() {
        let inspector = StaticInspector {
            modern: Some(TlsObservation {
                protocol: "TLSv1.1".to_string(),
                cipher: "TLS_RSA_WITH_AES_128_CBC_SHA".to_string(),
                certificate: None,
            }),
            legacy: Vec::new(),
        };
        let (details, findings) = tls_check(&inspector, "example.com", 443).await.unwrap();
        assert_eq!(details.protocol.as_deref(), Some("TLSv1.1"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, "ssl_weak");
        assert_eq!(findings[0].severity, Severity::High);

        let refused = StaticInspector::default();
        assert!(tls_check(&refused, "example.com", 443).await.is_err());
    }
}
