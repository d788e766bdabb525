// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use super::policy;
use crate::models::{
    Category, Priority, Recommendation, RiskLevel, ScanDetails, ScanReport, SeverityCounts,
    Vulnerability,
};

/// Sum of the severity weights of all findings.
pub fn risk_score(findings: &[Vulnerability]) -> u32 {
    findings
        .iter()
        .map(|f| policy::severity_weight(f.severity))
        .sum()
}

pub fn risk_level(findings: &[Vulnerability]) -> RiskLevel {
    policy::risk_tier(risk_score(findings))
}

fn is_web_input_finding(kind: &str) -> bool {
    kind.starts_with("xss")
        || matches!(kind, "sql_injection" | "path_traversal" | "command_injection")
}

/// Derives at most one recommendation per category from the findings.
pub fn recommendations(risk: RiskLevel, findings: &[Vulnerability]) -> Vec<Recommendation> {
    let any = |predicate: fn(&str) -> bool| findings.iter().any(|f| predicate(&f.kind));
    let mut result = Vec::new();
    if matches!(risk, RiskLevel::Critical | RiskLevel::High) {
        result.push(Recommendation {
            priority: Priority::Critical,
            category: Category::General,
            action: "Address the critical vulnerabilities immediately".to_string(),
            details: "Severe security flaws were found and must be fixed urgently".to_string(),
        });
    }
    if any(|kind| kind.starts_with("ssl")) {
        result.push(Recommendation {
            priority: Priority::High,
            category: Category::Ssl,
            action: "Update the SSL/TLS configuration".to_string(),
            details: "Disable obsolete protocols and require at least TLS 1.2".to_string(),
        });
    }
    if any(is_web_input_finding) {
        result.push(Recommendation {
            priority: Priority::Critical,
            category: Category::Web,
            action: "Enforce strict input validation".to_string(),
            details: "Use a security framework, output encoding and prepared statements"
                .to_string(),
        });
    }
    if any(|kind| matches!(kind, "dangerous_service" | "dangerous_port")) {
        result.push(Recommendation {
            priority: Priority::High,
            category: Category::Network,
            action: "Close or restrict dangerous services".to_string(),
            details: "Limit access to critical services with a firewall".to_string(),
        });
    }
    result
}

/// Scores the findings and assembles the report.
pub fn build_report(vulnerabilities: Vec<Vulnerability>, mut details: ScanDetails) -> ScanReport {
    let score = risk_score(&vulnerabilities);
    let risk_level = policy::risk_tier(score);
    details.score = Some(score);
    ScanReport {
        risk_level,
        recommendations: recommendations(risk_level, &vulnerabilities),
        counts: SeverityCounts::from_findings(&vulnerabilities),
        vulnerabilities,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    fn finding(severity: Severity, kind: &str) -> Vulnerability {
        Vulnerability::new(severity, kind, kind)
    }

    #[test]
    fn examples() {
        assert_eq!(risk_level(&[]), RiskLevel::Low);
        let one = vec![finding(Severity::Critical, "a")];
        assert_eq!(risk_level(&one), RiskLevel::High);
        let two = vec![finding(Severity::Critical, "a"), finding(Severity::Critical, "b")];
        assert_eq!(risk_level(&two), RiskLevel::Critical);
        let info = vec![finding(Severity::Info, "scan_error")];
        assert_eq!(risk_level(&info), RiskLevel::Low);
    }

    #[test]
    fn adding_a_finding_never_lowers_the_tier() {
        let severities = [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ];
        // Walks every severity sequence of length three.
        for a in severities {
            for b in severities {
                for c in severities {
                    let mut findings = Vec::new();
                    let mut previous = risk_level(&findings);
                    for severity in [a, b, c] {
                        findings.push(finding(severity, "x"));
                        let current = risk_level(&findings);
                        assert!(current >= previous, "{findings:?}");
                        previous = current;
                    }
                }
            }
        }
    }

    #[test]
    fn one_recommendation_per_category() {
        let findings = vec![
            finding(Severity::High, "ssl_expiring"),
            finding(Severity::Medium, "ssl_old_protocol"),
            finding(Severity::High, "xss_reflected"),
            finding(Severity::Critical, "sql_injection"),
            finding(Severity::Critical, "dangerous_service"),
        ];
        let risk = risk_level(&findings);
        let recommendations = recommendations(risk, &findings);
        let categories: Vec<_> = recommendations.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::General,
                Category::Ssl,
                Category::Web,
                Category::Network
            ]
        );
    }

    #[test]
    fn low_risk_without_matching_types_has_no_recommendations() {
        let findings = vec![finding(Severity::Medium, "missing_security_header")];
        assert!(recommendations(risk_level(&findings), &findings).is_empty());
    }

    #[test]
    fn report_counts_and_score() {
        let report = build_report(
            vec![
                finding(Severity::High, "weak_cipher"),
                finding(Severity::Low, "information_disclosure"),
                finding(Severity::Info, "scan_error"),
            ],
            ScanDetails::default(),
        );
        assert_eq!(report.details.score, Some(8));
        assert_eq!(report.risk_level, RiskLevel::Medium);
        assert_eq!(report.counts.high, 1);
        assert_eq!(report.counts.total(), 2);
        assert_eq!(report.vulnerabilities.len(), 3);
    }
}
