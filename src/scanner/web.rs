// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Analysis of the web services found by the port discovery.

use futures::future::join_all;
use lazy_regex::regex_is_match;

use super::policy;
use crate::{
    http::{HttpError, HttpFetch, WebResponse},
    models::{Severity, Technologies, Vulnerability, WebDetails},
};

/// `scheme://host:port` without a trailing slash.
pub fn base_url(host: &str, port: u16, tls: bool) -> String {
    let scheme = if tls { "https" } else { "http" };
    if host.contains(':') && !host.starts_with('[') {
        format!("{scheme}://[{host}]:{port}")
    } else {
        format!("{scheme}://{host}:{port}")
    }
}

/// Frameworks recognised by patterns in a page body.
pub fn detect_frameworks(body: &str) -> Vec<String> {
    [
        (
            "WordPress",
            regex_is_match!(r#"(?i)<meta name="generator" content="WordPress"#, body),
        ),
        ("Drupal", regex_is_match!(r"(?i)Drupal\.settings", body)),
        ("Joomla", regex_is_match!(r"(?i)/media/jui/js/", body)),
        ("Django", regex_is_match!(r"(?i)csrfmiddlewaretoken", body)),
        ("Laravel", regex_is_match!(r"(?i)laravel_session", body)),
        ("React", regex_is_match!(r"(?i)_react", body)),
        ("Angular", regex_is_match!(r"(?i)ng-version", body)),
        ("Vue.js", regex_is_match!(r"(?i)Vue\.js", body)),
    ]
    .into_iter()
    .filter_map(|(name, found)| found.then(|| name.to_string()))
    .collect()
}

pub fn technologies(response: &WebResponse) -> Technologies {
    Technologies {
        server: response.header("server").map(str::to_owned),
        backend: response.header("x-powered-by").map(str::to_owned),
        frameworks: detect_frameworks(&response.body),
    }
}

/// Findings for missing recommended headers and for headers disclosing
/// software details.
pub fn header_findings(port: u16, response: &WebResponse) -> (Vec<String>, Vec<Vulnerability>) {
    let mut missing = Vec::new();
    let mut findings = Vec::new();
    for header in &policy::SECURITY_HEADERS {
        if response.header(header.name).is_none() {
            missing.push(header.name.to_string());
            findings.push(
                Vulnerability::new(
                    Severity::Medium,
                    "missing_security_header",
                    format!("Missing security header {} ({})", header.name, header.purpose),
                )
                .with_port(port)
                .with_remediation(format!("Add header: {}: {}", header.name, header.recommended)),
            );
        }
    }
    for name in policy::DISCLOSING_HEADERS {
        if let Some(value) = response.header(name) {
            findings.push(
                Vulnerability::new(
                    Severity::Low,
                    "information_disclosure",
                    format!("Header {name} discloses {value}"),
                )
                .with_port(port)
                .with_remediation(format!("Remove the {name} header or hide version details")),
            );
        }
    }
    (missing, findings)
}

/// Requests every sensitive path without following redirects. A 200
/// response is an exposure.
pub async fn exposed_files(
    fetcher: &dyn HttpFetch,
    base: &str,
    port: u16,
) -> Vec<(String, Vulnerability)> {
    let probes = policy::SENSITIVE_PATHS.iter().map(|(path, description)| async move {
        let url = format!("{base}{path}");
        match fetcher.get(&url, false).await {
            Ok(response) if response.status == 200 => Some((
                path.to_string(),
                Vulnerability::new(
                    policy::exposed_path_severity(path),
                    "exposed_file",
                    format!("{description}: {path}"),
                )
                .with_port(port)
                .with_remediation(format!("Remove or deny access to {path}")),
            )),
            Ok(_) => None,
            Err(error) => {
                tracing::trace!(%url, %error, "Sensitive path not reachable");
                None
            }
        }
    });
    join_all(probes).await.into_iter().flatten().collect()
}

/// A family of attack payloads and the response signature revealing a
/// vulnerable endpoint.
struct InjectionProbe {
    kind: &'static str,
    severity: Severity,
    payloads: &'static [&'static str],
    url: fn(&str, &str) -> String,
    signature: fn(&WebResponse, &str) -> Option<String>,
    remediation: &'static str,
}

fn path_url(base: &str, payload: &str) -> String {
    format!("{base}/{payload}")
}

fn query_url(base: &str, parameter: &str, payload: &str) -> String {
    format!("{base}/?{parameter}={}", urlencoding::encode(payload))
}

fn q_url(base: &str, payload: &str) -> String {
    query_url(base, "q", payload)
}

fn id_url(base: &str, payload: &str) -> String {
    query_url(base, "id", payload)
}

fn cmd_url(base: &str, payload: &str) -> String {
    query_url(base, "cmd", payload)
}

fn file_contents(response: &WebResponse, payload: &str) -> Option<String> {
    (response.status == 200
        && (response.body.contains("root:") || response.body.contains("admin:")))
    .then(|| format!("Path traversal: {payload} returned file contents"))
}

fn reflected(response: &WebResponse, payload: &str) -> Option<String> {
    response
        .body
        .contains(payload)
        .then(|| format!("Possible reflected XSS: {payload} is echoed unencoded"))
}

fn sql_error(response: &WebResponse, _: &str) -> Option<String> {
    policy::SQL_ERROR_PATTERNS
        .iter()
        .find(|pattern| response.body.contains(*pattern))
        .map(|pattern| format!("SQL error \"{pattern}\" exposed, possible SQL injection"))
}

fn command_output(response: &WebResponse, payload: &str) -> Option<String> {
    policy::COMMAND_OUTPUT_MARKERS
        .iter()
        .any(|marker| response.body.contains(marker))
        .then(|| format!("Possible command injection with {payload}"))
}

const INJECTION_PROBES: [InjectionProbe; 4] = [
    InjectionProbe {
        kind: "path_traversal",
        severity: Severity::Critical,
        payloads: &policy::TRAVERSAL_PAYLOADS,
        url: path_url,
        signature: file_contents,
        remediation: "Validate and sanitize user supplied paths",
    },
    InjectionProbe {
        kind: "xss_reflected",
        severity: Severity::High,
        payloads: &policy::XSS_PAYLOADS,
        url: q_url,
        signature: reflected,
        remediation: "Encode HTML output and validate input",
    },
    InjectionProbe {
        kind: "sql_injection",
        severity: Severity::Critical,
        payloads: &policy::SQL_PAYLOADS,
        url: id_url,
        signature: sql_error,
        remediation: "Use prepared statements",
    },
    InjectionProbe {
        kind: "command_injection",
        severity: Severity::Critical,
        payloads: &policy::COMMAND_PAYLOADS,
        url: cmd_url,
        signature: command_output,
        remediation: "Never pass user input to system commands",
    },
];

/// Runs the payloads of every probe family in order and reports a family
/// on its first matching response.
pub async fn injection_findings(
    fetcher: &dyn HttpFetch,
    base: &str,
    port: u16,
) -> Vec<Vulnerability> {
    let mut findings = Vec::new();
    for probe in &INJECTION_PROBES {
        for payload in probe.payloads {
            let url = (probe.url)(base, payload);
            let response = match fetcher.get(&url, false).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::trace!(%url, %error, "Payload request failed");
                    continue;
                }
            };
            if let Some(description) = (probe.signature)(&response, payload) {
                findings.push(
                    Vulnerability::new(probe.severity, probe.kind, description)
                        .with_port(port)
                        .with_remediation(probe.remediation),
                );
                break;
            }
        }
    }
    findings
}

/// Analyses one web port. Fails only when the root page is unreachable.
pub async fn analyze_port(
    fetcher: &dyn HttpFetch,
    host: &str,
    port: u16,
    tls: bool,
) -> Result<(WebDetails, Vec<Vulnerability>), HttpError> {
    let base = base_url(host, port, tls);
    let root = fetcher.get(&format!("{base}/"), true).await?;
    let (missing_headers, mut findings) = header_findings(port, &root);
    let exposed = exposed_files(fetcher, &base, port).await;
    let exposed_paths = exposed.iter().map(|(path, _)| path.clone()).collect();
    findings.extend(exposed.into_iter().map(|(_, finding)| finding));
    findings.extend(injection_findings(fetcher, &base, port).await);
    Ok((
        WebDetails {
            port,
            url: root.url.clone(),
            status_code: Some(root.status),
            technologies: technologies(&root),
            missing_headers,
            exposed_paths,
        },
        findings,
    ))
}

/// Analyses every web port. An unreachable port is an info finding.
pub async fn analyze(
    fetcher: &dyn HttpFetch,
    host: &str,
    web_ports: &[(u16, bool)],
) -> (Vec<WebDetails>, Vec<Vulnerability>) {
    let mut details = Vec::new();
    let mut findings = Vec::new();
    for (port, tls) in web_ports {
        match analyze_port(fetcher, host, *port, *tls).await {
            Ok((d, f)) => {
                details.push(d);
                findings.extend(f);
            }
            Err(error) => {
                tracing::debug!(host, port, %error, "Web analysis skipped");
                findings.push(
                    Vulnerability::new(
                        Severity::Info,
                        "scan_error",
                        format!("Web analysis of port {port} failed: {error}"),
                    )
                    .with_port(*port),
                );
            }
        }
    }
    (details, findings)
}
