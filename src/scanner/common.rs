// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use lazy_regex::{Lazy, lazy_regex};
use regex::Regex;

use super::policy;
use crate::{
    http::HttpFetch,
    models::{PortScanDetails, Severity, Vulnerability},
};

static DISCLOSURE_SIGNATURES: [(&str, &Lazy<Regex>); 4] = [
    ("Stack trace", &STACK_TRACE),
    ("Path disclosure", &PATH_DISCLOSURE),
    ("Database error", &DATABASE_ERROR),
    ("Debug mode", &DEBUG_MODE),
];

static STACK_TRACE: Lazy<Regex> = lazy_regex!(r"(?i)(at\s+\w+\.\w+|Traceback|stack trace)");
static PATH_DISCLOSURE: Lazy<Regex> = lazy_regex!(r"(?i)(/home/|/var/www/|C:\\|/usr/)");
static DATABASE_ERROR: Lazy<Regex> = lazy_regex!(r"(?i)(SQLException|mysql_|ORA-\d+|PostgreSQL)");
static DEBUG_MODE: Lazy<Regex> = lazy_regex!(r"(?i)(DEBUG\s*=\s*True|WP_DEBUG|debug mode)");

/// Open ports running a service that should not be reachable.
pub fn dangerous_services(ports: &PortScanDetails) -> Vec<Vulnerability> {
    ports
        .open_ports
        .iter()
        .filter_map(|port| policy::dangerous_service(*port))
        .map(|service| {
            Vulnerability::new(
                service.severity,
                "dangerous_service",
                format!(
                    "{} exposed on port {}: {}",
                    service.service, service.port, service.risk
                ),
            )
            .with_port(service.port)
            .with_service(service.service)
            .with_remediation(format!(
                "Restrict access to {} with a firewall or disable the service",
                service.service
            ))
        })
        .collect()
}

/// Name of the first disclosure signature found in `body`.
pub fn disclosure_in(body: &str) -> Option<&'static str> {
    DISCLOSURE_SIGNATURES
        .iter()
        .find(|(_, signature)| signature.is_match(body))
        .map(|(name, _)| *name)
}

/// Requests pages likely to fail below `base` and looks for internals in
/// the error pages. Unreachable pages are skipped.
pub async fn information_disclosure(fetcher: &dyn HttpFetch, base: &str) -> Vec<Vulnerability> {
    let mut findings = Vec::new();
    for path in policy::ERROR_TRIGGERING_PATHS {
        let url = format!("{base}{path}");
        let response = match fetcher.get(&url, false).await {
            Ok(response) => response,
            Err(error) => {
                tracing::trace!(%url, %error, "Error page not reachable");
                continue;
            }
        };
        if let Some(kind) = disclosure_in(&response.body) {
            findings.push(
                Vulnerability::new(
                    Severity::Medium,
                    "information_disclosure",
                    format!("{kind} detected in error pages"),
                )
                .with_remediation("Disable debug output and use generic error pages"),
            );
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::fake::StaticFetcher, models::ServiceInfo};

    #[test]
    fn dangerous_ports() {
        let mut ports = PortScanDetails::default();
        for (port, name) in [(22, "ssh"), (23, "telnet"), (3389, "rdp")] {
            ports.open_ports.push(port);
            ports.services.insert(port, ServiceInfo::named(name));
        }
        let findings = dangerous_services(&ports);
        let found: Vec<_> = findings.iter().map(|f| (f.port, f.severity)).collect();
        assert_eq!(
            found,
            vec![(Some(23), Severity::Critical), (Some(3389), Severity::High)]
        );
        assert!(findings.iter().all(|f| f.kind == "dangerous_service"));
    }

    #[test]
    fn signatures() {
        assert_eq!(
            disclosure_in("Traceback (most recent call last):"),
            Some("Stack trace")
        );
        assert_eq!(
            disclosure_in("at com.example.Handler.run(Handler.java:12)"),
            Some("Stack trace")
        );
        assert_eq!(
            disclosure_in("failed to open /var/www/html/index.php"),
            Some("Path disclosure")
        );
        assert_eq!(
            disclosure_in("Warning: mysql_connect(): access denied"),
            Some("Database error")
        );
        assert_eq!(disclosure_in("define('WP_DEBUG', true);"), Some("Debug mode"));
        assert_eq!(disclosure_in("<h1>Not Found</h1>"), None);
    }

    #[tokio::test]
    async fn error_pages_are_checked() {
        let fetcher = StaticFetcher::default()
            .with(
                "http://example.com:80/non-existent-page-12345",
                404,
                &[],
                "<h1>Not Found</h1>",
            )
            .with(
                "http://example.com:80/admin/config/database",
                500,
                &[],
                "ORA-00942: table or view does not exist",
            );
        let findings = information_disclosure(&fetcher, "http://example.com:80").await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].description, "Database error detected in error pages");
        assert_eq!(findings[0].severity, Severity::Medium);
    }
}
