// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Security scan pipeline.
//!
//! A scan runs its phases in sequence: port discovery, web analysis, TLS
//! analysis, DNS posture, known CVEs and common misconfigurations. Every
//! phase is isolated, an error or a panic inside a phase becomes an info
//! finding and the next phase runs. Findings and details are collected in
//! a [`ScanProgress`] so that a scan cut short still reports what it found.

mod common;
mod cve;
mod dns;
mod error;
mod nmap;
pub mod policy;
mod ports;
mod quick;
mod risk;
mod service;
mod tls;
mod web;

pub use common::{dangerous_services, disclosure_in, information_disclosure};
pub use cve::match_known_cves;
pub use dns::{DnsCapability, HickoryDns, ZoneTransfer};
pub use error::{ScanError, ScanServiceError};
pub use nmap::{NmapScanner, parse_nmap_xml};
pub use ports::{ConnectScanner, PortDiscovery, PortScanner, resolve};
pub use risk::{build_report, recommendations, risk_level, risk_score};
pub use service::{RunningScanHandle, ScanService};
pub use tls::{
    CertificateInfo, LegacyObservation, LegacyVersion, RustlsInspector, TlsInspector,
    TlsObservation,
};

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::FutureExt;

use crate::{
    config,
    http::{HttpError, HttpFetch, HyperFetcher},
    models::{
        PortScanDetails, ScanDepth, ScanDetails, ScanOptions, ScanReport, Severity, Target,
        Vulnerability, current_time_in_seconds,
    },
};

#[derive(Debug, Default)]
struct Collected {
    details: ScanDetails,
    findings: Vec<Vulnerability>,
}

/// Findings and details of a scan while it is running.
///
/// Cloning shares the collected state.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    collected: Arc<Mutex<Collected>>,
}

impl ScanProgress {
    fn lock(&self) -> MutexGuard<'_, Collected> {
        // A panicking phase never leaves the collection half written.
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, findings: impl IntoIterator<Item = Vulnerability>) {
        self.lock().findings.extend(findings);
    }

    pub fn update(&self, f: impl FnOnce(&mut ScanDetails)) {
        f(&mut self.lock().details);
    }

    pub fn findings(&self) -> Vec<Vulnerability> {
        self.lock().findings.clone()
    }

    /// Scores what has been collected so far.
    pub fn report(&self) -> ScanReport {
        let collected = self.lock();
        build_report(collected.findings.clone(), collected.details.clone())
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs one phase. A failure is recorded as info finding and `None` is
/// returned.
async fn run_phase<T, F>(progress: &ScanProgress, phase: &'static str, f: F) -> Option<T>
where
    F: Future<Output = Result<T, ScanError>>,
{
    let reason = match AssertUnwindSafe(f).catch_unwind().await {
        Ok(Ok(value)) => {
            tracing::debug!(phase, "Phase finished");
            return Some(value);
        }
        Ok(Err(error)) => error.to_string(),
        Err(panic) => panic_message(panic),
    };
    tracing::warn!(phase, %reason, "Phase failed");
    progress.add([Vulnerability::new(
        Severity::Info,
        "scan_error",
        format!("{phase} phase failed: {reason}"),
    )]);
    None
}

/// Runs the scan phases against a target.
pub struct SecurityScanner {
    ports: Arc<dyn PortScanner>,
    quick_ports: Arc<dyn PortScanner>,
    fetcher: Arc<dyn HttpFetch>,
    tls: Arc<dyn TlsInspector>,
    dns: Option<Arc<dyn DnsCapability>>,
}

impl SecurityScanner {
    /// Detects the deep port scanner once and sets up the network
    /// collaborators.
    pub async fn new(config: &config::Scanner) -> Result<Self, HttpError> {
        let connect = Arc::new(ConnectScanner::new(
            config.port_timeout,
            config.max_concurrent_ports,
        ));
        let deep = match config.use_deep_scanner {
            true => NmapScanner::detect(&config.nmap_path, config.scan_timeout)
                .await
                .map(|nmap| Arc::new(nmap) as Arc<dyn PortScanner>),
            false => None,
        };
        Ok(Self {
            ports: Arc::new(PortDiscovery::new(deep, connect.clone())),
            quick_ports: connect,
            fetcher: Arc::new(HyperFetcher::new(config.request_timeout)?),
            tls: Arc::new(RustlsInspector::new(config.request_timeout)),
            dns: Some(Arc::new(HickoryDns::from_system(config.request_timeout))),
        })
    }

    /// Scanner from the given collaborators. The quick check uses `ports`
    /// as well.
    pub fn with_collaborators(
        ports: Arc<dyn PortScanner>,
        fetcher: Arc<dyn HttpFetch>,
        tls: Arc<dyn TlsInspector>,
        dns: Option<Arc<dyn DnsCapability>>,
    ) -> Self {
        Self {
            quick_ports: ports.clone(),
            ports,
            fetcher,
            tls,
            dns,
        }
    }

    pub fn with_quick_port_scanner(mut self, ports: Arc<dyn PortScanner>) -> Self {
        self.quick_ports = ports;
        self
    }

    /// Runs a scan to completion and scores it.
    pub async fn run(&self, target: &Target, options: &ScanOptions) -> ScanReport {
        let progress = ScanProgress::default();
        self.scan(target, options, &progress).await;
        progress.report()
    }

    /// Runs the phases selected by `options`, collecting into `progress`.
    pub async fn scan(&self, target: &Target, options: &ScanOptions, progress: &ScanProgress) {
        progress.update(|details| {
            details.hostname = target.hostname_or_ip().to_string();
            details.ip_address = target.ip_address.clone();
            details.depth = options.scan_depth;
        });
        match options.scan_depth {
            ScanDepth::Quick => self.quick(target, options, progress).await,
            ScanDepth::Standard | ScanDepth::Deep => self.full(target, options, progress).await,
        }
    }

    async fn quick(&self, target: &Target, options: &ScanOptions, progress: &ScanProgress) {
        let ports = quick::ports(options);
        let scan = self
            .quick_ports
            .scan(target.ip_or_hostname(), &ports, ScanDepth::Quick);
        if let Some(ports) = run_phase(progress, "ports", scan).await {
            progress.add(quick::dangerous_ports(&ports));
            progress.update(|d| d.ports = Some(ports));
        }

        if let (true, Some(port)) = (options.enable_ssl_scan, quick::tls_port(target)) {
            let check = quick::tls_check(self.tls.as_ref(), target.hostname_or_ip(), port);
            if let Some((ssl, findings)) = run_phase(progress, "tls", check).await {
                progress.add(findings);
                progress.update(|d| d.ssl = Some(ssl));
            }
        }
    }

    async fn full(&self, target: &Target, options: &ScanOptions, progress: &ScanProgress) {
        let hostname = target.hostname_or_ip();
        let port_list = options.ports();
        let scan = self
            .ports
            .scan(target.ip_or_hostname(), &port_list, options.scan_depth);
        let ports: Option<PortScanDetails> = run_phase(progress, "ports", scan).await;
        if let Some(ports) = &ports {
            tracing::debug!(
                hostname,
                scanner = %ports.scanner,
                open = ?ports.open_ports,
                "Port discovery finished"
            );
            progress.update(|d| d.ports = Some(ports.clone()));
        }
        let web_ports = ports
            .as_ref()
            .map(PortScanDetails::web_ports)
            .unwrap_or_default();

        if options.enable_web_scan && !web_ports.is_empty() {
            let analysis = async {
                let analysis = web::analyze(self.fetcher.as_ref(), hostname, &web_ports).await;
                Ok::<_, ScanError>(analysis)
            };
            if let Some((web, findings)) = run_phase(progress, "web", analysis).await {
                progress.add(findings);
                progress.update(|d| d.web = web);
            }
        }

        let https_port = ports.as_ref().and_then(PortScanDetails::https_port);
        if let (true, Some(port)) = (options.enable_ssl_scan, https_port) {
            let now = current_time_in_seconds("tls") as i64;
            let inspection = tls::inspect(self.tls.as_ref(), hostname, port, now);
            if let Some((ssl, findings)) = run_phase(progress, "tls", inspection).await {
                progress.add(findings);
                progress.update(|d| d.ssl = Some(ssl));
            }
        }

        if options.enable_dns_scan {
            let assessment =
                async { Ok::<_, ScanError>(dns::assess(self.dns.as_deref(), hostname).await) };
            if let Some((dns, findings)) = run_phase(progress, "dns", assessment).await {
                progress.add(findings);
                progress.update(|d| d.dns = Some(dns));
            }
        }

        let Some(ports) = ports else {
            return;
        };

        if options.enable_cve_scan {
            let matching = async { Ok::<_, ScanError>(match_known_cves(&ports)) };
            if let Some(findings) = run_phase(progress, "cve", matching).await {
                progress.add(findings);
            }
        }

        let plain_web_port = web_ports
            .iter()
            .find_map(|(port, tls)| (!tls).then_some(*port));
        let checks = async {
            let mut findings = dangerous_services(&ports);
            if let (true, Some(port)) = (options.enable_web_scan, plain_web_port) {
                let base = web::base_url(hostname, port, false);
                findings.extend(information_disclosure(self.fetcher.as_ref(), &base).await);
            }
            Ok::<_, ScanError>(findings)
        };
        if let Some(findings) = run_phase(progress, "common", checks).await {
            progress.add(findings);
        }
    }
}

#[cfg(debug_assertions)]
pub mod fake {
    pub use super::dns::fake::StaticDns;
    pub use super::ports::fake::LambdaPortScanner;
    pub use super::tls::fake::StaticInspector;
}
