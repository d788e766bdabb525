// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Heuristic tables used by the scan phases and the risk scorer.
//!
//! None of the values is derived from an external standard. They are kept
//! here as plain data so they can be replaced without touching the phases.

use crate::models::{RiskLevel, Severity};

/// Weight of a finding in the risk score.
pub fn severity_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 10,
        Severity::High => 7,
        Severity::Medium => 4,
        Severity::Low => 1,
        Severity::Info => 0,
    }
}

/// Minimum score of each tier, checked from the most severe tier down.
pub const RISK_THRESHOLDS: [(u32, RiskLevel); 3] = [
    (20, RiskLevel::Critical),
    (10, RiskLevel::High),
    (5, RiskLevel::Medium),
];

pub fn risk_tier(score: u32) -> RiskLevel {
    RISK_THRESHOLDS
        .iter()
        .find(|(minimum, _)| score >= *minimum)
        .map(|(_, tier)| *tier)
        .unwrap_or(RiskLevel::Low)
}

/// Service names assumed by the connect scan for well known ports.
const SERVICE_GUESSES: [(u16, &str); 24] = [
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (443, "https"),
    (445, "smb"),
    (1433, "ms-sql"),
    (1521, "oracle"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (5900, "vnc"),
    (6379, "redis"),
    (8000, "http-alt"),
    (8080, "http-alt"),
    (8443, "https-alt"),
    (9200, "elasticsearch"),
    (27017, "mongodb"),
];

pub fn guess_service(port: u16) -> String {
    SERVICE_GUESSES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("unknown-{port}"))
}

/// A service that should not be reachable from outside.
pub struct DangerousService {
    pub port: u16,
    pub service: &'static str,
    pub severity: Severity,
    pub risk: &'static str,
}

pub const DANGEROUS_SERVICES: [DangerousService; 9] = [
    DangerousService {
        port: 23,
        service: "Telnet",
        severity: Severity::Critical,
        risk: "unencrypted remote login",
    },
    DangerousService {
        port: 135,
        service: "MS-RPC",
        severity: Severity::High,
        risk: "exposes Windows services",
    },
    DangerousService {
        port: 139,
        service: "NetBIOS",
        severity: Severity::High,
        risk: "leaks system information",
    },
    DangerousService {
        port: 445,
        service: "SMB",
        severity: Severity::Critical,
        risk: "ransomware and lateral movement vector",
    },
    DangerousService {
        port: 3389,
        service: "RDP",
        severity: Severity::High,
        risk: "remote desktop reachable",
    },
    DangerousService {
        port: 5900,
        service: "VNC",
        severity: Severity::High,
        risk: "insecure remote desktop reachable",
    },
    DangerousService {
        port: 6379,
        service: "Redis",
        severity: Severity::Critical,
        risk: "database commonly running without authentication",
    },
    DangerousService {
        port: 9200,
        service: "Elasticsearch",
        severity: Severity::Critical,
        risk: "API commonly running without authentication",
    },
    DangerousService {
        port: 27017,
        service: "MongoDB",
        severity: Severity::Critical,
        risk: "database reachable",
    },
];

pub fn dangerous_service(port: u16) -> Option<&'static DangerousService> {
    DANGEROUS_SERVICES.iter().find(|s| s.port == port)
}

/// Ports probed by the quick check.
pub const QUICK_CHECK_PORTS: [u16; 9] = [22, 23, 139, 445, 3389, 5900, 6379, 9200, 27017];

/// Severity of an open port in the quick check, `None` for ports that are
/// probed but not a finding on their own.
pub fn quick_port_severity(port: u16) -> Option<Severity> {
    match port {
        23 | 445 | 6379 | 9200 | 27017 => Some(Severity::High),
        139 | 3389 | 5900 => Some(Severity::Medium),
        _ => None,
    }
}

/// Product and version substring of a known vulnerable release.
pub struct KnownCve {
    pub software: &'static str,
    pub version: &'static str,
    pub cve: &'static str,
    pub summary: &'static str,
}

pub const KNOWN_CVES: [KnownCve; 6] = [
    KnownCve {
        software: "apache",
        version: "2.4.49",
        cve: "CVE-2021-41773",
        summary: "path traversal",
    },
    KnownCve {
        software: "apache",
        version: "2.4.50",
        cve: "CVE-2021-42013",
        summary: "path traversal and remote code execution",
    },
    KnownCve {
        software: "nginx",
        version: "1.16.0",
        cve: "CVE-2019-9511",
        summary: "HTTP/2 denial of service",
    },
    KnownCve {
        software: "nginx",
        version: "1.17.2",
        cve: "CVE-2019-9513",
        summary: "HTTP/2 resource loop",
    },
    KnownCve {
        software: "ssh",
        version: "7.0",
        cve: "CVE-2016-0777",
        summary: "client information leak",
    },
    KnownCve {
        software: "ssh",
        version: "7.2",
        cve: "CVE-2016-6210",
        summary: "user enumeration",
    },
];

/// Recommended response header with its suggested value.
pub struct SecurityHeader {
    pub name: &'static str,
    pub purpose: &'static str,
    pub recommended: &'static str,
}

pub const SECURITY_HEADERS: [SecurityHeader; 7] = [
    SecurityHeader {
        name: "X-Frame-Options",
        purpose: "clickjacking protection",
        recommended: "DENY or SAMEORIGIN",
    },
    SecurityHeader {
        name: "X-Content-Type-Options",
        purpose: "MIME sniffing protection",
        recommended: "nosniff",
    },
    SecurityHeader {
        name: "Strict-Transport-Security",
        purpose: "forces HTTPS",
        recommended: "max-age=31536000; includeSubDomains",
    },
    SecurityHeader {
        name: "Content-Security-Policy",
        purpose: "XSS and injection protection",
        recommended: "default-src 'self'",
    },
    SecurityHeader {
        name: "X-XSS-Protection",
        purpose: "legacy XSS filter",
        recommended: "1; mode=block",
    },
    SecurityHeader {
        name: "Referrer-Policy",
        purpose: "limits referrer leakage",
        recommended: "strict-origin-when-cross-origin",
    },
    SecurityHeader {
        name: "Permissions-Policy",
        purpose: "restricts browser features",
        recommended: "geolocation=(), microphone=(), camera=()",
    },
];

/// Response headers disclosing software details.
pub const DISCLOSING_HEADERS: [&str; 3] = ["Server", "X-Powered-By", "X-AspNet-Version"];

/// Paths that must not be served, with what their exposure means.
pub const SENSITIVE_PATHS: [(&str, &str); 17] = [
    ("/.git/config", "Git repository exposed"),
    ("/.env", "Environment variables exposed"),
    ("/wp-config.php", "WordPress configuration exposed"),
    ("/config.php", "Configuration file exposed"),
    ("/.htaccess", "Apache configuration exposed"),
    ("/web.config", "IIS configuration exposed"),
    ("/robots.txt", "robots.txt readable"),
    ("/sitemap.xml", "Sitemap exposed"),
    ("/backup.sql", "SQL backup exposed"),
    ("/database.sql", "Database export exposed"),
    ("/.DS_Store", "macOS metadata exposed"),
    ("/Thumbs.db", "Windows metadata exposed"),
    ("/phpinfo.php", "PHP info page exposed"),
    ("/server-status", "Apache status page exposed"),
    ("/admin", "Possible admin panel"),
    ("/phpmyadmin", "phpMyAdmin exposed"),
    ("/.svn/entries", "SVN repository exposed"),
];

/// Exposed secrets and source are critical, everything else is medium.
pub fn exposed_path_severity(path: &str) -> Severity {
    if [".env", "config", ".git", "sql"]
        .iter()
        .any(|marker| path.contains(marker))
    {
        Severity::Critical
    } else {
        Severity::Medium
    }
}

/// Paths likely to produce an error page.
pub const ERROR_TRIGGERING_PATHS: [&str; 3] = [
    "/non-existent-page-12345",
    "/admin/config/database",
    "/.git/HEAD",
];

pub const TRAVERSAL_PAYLOADS: [&str; 3] = [
    "../../../etc/passwd",
    "..\\..\\..\\windows\\system32\\config\\sam",
    "....//....//....//etc/passwd",
];

pub const XSS_PAYLOADS: [&str; 3] = [
    "<script>alert('XSS')</script>",
    "'\"><script>alert(1)</script>",
    "javascript:alert(1)",
];

pub const SQL_PAYLOADS: [&str; 4] = ["'", "1' OR '1'='1", "' OR 1=1--", "admin'--"];

pub const SQL_ERROR_PATTERNS: [&str; 6] = [
    "SQL syntax",
    "mysql_fetch",
    "ORA-01756",
    "PostgreSQL",
    "SQLite",
    "Microsoft SQL Server",
];

pub const COMMAND_PAYLOADS: [&str; 4] = ["; ls", "| whoami", "& dir", "`id`"];

/// Output fragments of system commands or password files.
pub const COMMAND_OUTPUT_MARKERS: [&str; 4] = ["uid=", "gid=", "root:", "admin:"];

/// Cipher name fragments of broken or export grade cipher suites.
pub const WEAK_CIPHER_MARKERS: [&str; 7] = ["RC4", "DES", "3DES", "MD5", "NULL", "EXPORT", "anon"];

pub fn is_weak_cipher(name: &str) -> bool {
    WEAK_CIPHER_MARKERS.iter().any(|m| name.contains(m))
}

pub const LEGACY_PROTOCOLS: [&str; 5] = ["SSLv2", "SSLv3", "TLSv1", "TLSv1.0", "TLSv1.1"];

pub fn is_legacy_protocol(name: &str) -> bool {
    LEGACY_PROTOCOLS.contains(&name)
}

/// Certificates expiring in fewer days are reported.
pub const CERTIFICATE_EXPIRY_WARNING_DAYS: i64 = 30;
