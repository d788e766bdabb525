// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;

use super::{ScanError, policy};
use crate::models::{PortScanDetails, ScanDepth, ServiceInfo};

/// Finds open ports and the services behind them.
#[async_trait]
pub trait PortScanner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn scan(
        &self,
        host: &str,
        ports: &[u16],
        depth: ScanDepth,
    ) -> Result<PortScanDetails, ScanError>;
}

/// Resolves `host` to the first address, bounded by `timeout`.
pub async fn resolve(host: &str, timeout: Duration) -> Result<IpAddr, ScanError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let resolve_error = |reason: String| ScanError::Resolve {
        host: host.to_string(),
        reason,
    };
    let mut addrs = tokio::time::timeout(timeout, tokio::net::lookup_host((host, 0)))
        .await
        .map_err(|_| resolve_error(format!("no answer within {timeout:?}")))?
        .map_err(|e| resolve_error(e.to_string()))?;
    addrs
        .next()
        .map(|a| a.ip())
        .ok_or_else(|| resolve_error("no addresses found".to_string()))
}

/// TCP connect scan. Services are guessed from the port number.
pub struct ConnectScanner {
    timeout: Duration,
    max_concurrent: usize,
}

impl ConnectScanner {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Returns the ports of `ports` accepting a connection, ascending.
    pub async fn open_ports(&self, ip: IpAddr, ports: &[u16]) -> Vec<u16> {
        let timeout = self.timeout;
        let mut open: Vec<u16> = futures::stream::iter(ports.iter().copied())
            .map(|port| async move {
                let addr = SocketAddr::new(ip, port);
                match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_)) => {
                        tracing::trace!(%addr, "open");
                        Some(port)
                    }
                    _ => None,
                }
            })
            .buffer_unordered(self.max_concurrent)
            .filter_map(|port| async move { port })
            .collect()
            .await;
        open.sort_unstable();
        open
    }
}

#[async_trait]
impl PortScanner for ConnectScanner {
    fn name(&self) -> &'static str {
        "connect"
    }

    async fn scan(
        &self,
        host: &str,
        ports: &[u16],
        _: ScanDepth,
    ) -> Result<PortScanDetails, ScanError> {
        let ip = resolve(host, self.timeout).await?;
        let open_ports = self.open_ports(ip, ports).await;
        Ok(PortScanDetails {
            scanner: self.name().to_string(),
            scanned_ports: ports.to_vec(),
            services: open_ports
                .iter()
                .map(|port| (*port, ServiceInfo::named(&policy::guess_service(*port))))
                .collect(),
            open_ports,
        })
    }
}

/// Uses the deep scanner when one was detected at startup and falls back
/// to the connect scan when it is missing or fails.
pub struct PortDiscovery {
    deep: Option<Arc<dyn PortScanner>>,
    fallback: Arc<dyn PortScanner>,
}

impl PortDiscovery {
    pub fn new(deep: Option<Arc<dyn PortScanner>>, fallback: Arc<dyn PortScanner>) -> Self {
        Self { deep, fallback }
    }

    pub fn has_deep_scanner(&self) -> bool {
        self.deep.is_some()
    }
}

#[async_trait]
impl PortScanner for PortDiscovery {
    fn name(&self) -> &'static str {
        self.deep
            .as_ref()
            .map(|d| d.name())
            .unwrap_or_else(|| self.fallback.name())
    }

    async fn scan(
        &self,
        host: &str,
        ports: &[u16],
        depth: ScanDepth,
    ) -> Result<PortScanDetails, ScanError> {
        if let Some(deep) = &self.deep {
            match deep.scan(host, ports, depth).await {
                Ok(details) => return Ok(details),
                Err(error) => {
                    tracing::warn!(scanner = deep.name(), %error, "Deep port scan failed, using connect scan")
                }
            }
        }
        self.fallback.scan(host, ports, depth).await
    }
}

#[cfg(debug_assertions)]
pub mod fake {
    use super::*;

    type Scan = Box<dyn Fn(&str, &[u16]) -> Result<PortScanDetails, ScanError> + Send + Sync>;

    /// Port scanner answering with the result of a closure.
    pub struct LambdaPortScanner {
        scan: Scan,
    }

    impl LambdaPortScanner {
        pub fn new<F>(scan: F) -> Self
        where
            F: Fn(&str, &[u16]) -> Result<PortScanDetails, ScanError> + Send + Sync + 'static,
        {
            Self {
                scan: Box::new(scan),
            }
        }

        /// Reports the given ports as open with the given service names;
        /// ports not part of the scanned list are omitted.
        pub fn open(services: &[(u16, &str)]) -> Self {
            let services: Vec<(u16, ServiceInfo)> = services
                .iter()
                .map(|(port, name)| (*port, ServiceInfo::named(name)))
                .collect();
            Self::new(move |_, ports| {
                let found: Vec<_> = services
                    .iter()
                    .filter(|(port, _)| ports.contains(port))
                    .cloned()
                    .collect();
                Ok(PortScanDetails {
                    scanner: "fake".to_string(),
                    scanned_ports: ports.to_vec(),
                    open_ports: found.iter().map(|(port, _)| *port).collect(),
                    services: found.into_iter().collect(),
                })
            })
        }

        /// Every port is closed.
        pub fn closed() -> Self {
            Self::open(&[])
        }
    }

    #[async_trait]
    impl PortScanner for LambdaPortScanner {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn scan(
            &self,
            host: &str,
            ports: &[u16],
            _: ScanDepth,
        ) -> Result<PortScanDetails, ScanError> {
            (self.scan)(host, ports)
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::{fake::LambdaPortScanner, *};

    #[tokio::test]
    async fn connect_scan_finds_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let scanner = ConnectScanner::new(Duration::from_secs(1), 4);
        let details = scanner
            .scan("127.0.0.1", &[closed, open], ScanDepth::Standard)
            .await
            .unwrap();
        assert_eq!(details.open_ports, vec![open]);
        assert_eq!(details.scanned_ports, vec![closed, open]);
        assert_eq!(details.scanner, "connect");
        assert!(details.services.contains_key(&open));
    }

    #[tokio::test]
    async fn unresolvable_host_is_an_error() {
        let scanner = ConnectScanner::new(Duration::from_secs(2), 4);
        let result = scanner
            .scan("host.invalid", &[80], ScanDepth::Standard)
            .await;
        assert!(matches!(result, Err(ScanError::Resolve { .. })));
    }

    #[tokio::test]
    async fn failing_deep_scanner_falls_back() {
        let deep = LambdaPortScanner::new(|_, _| {
            Err(ScanError::PortScanner {
                scanner: "nmap".to_string(),
                reason: "exited with 1".to_string(),
            })
        });
        let discovery = PortDiscovery::new(
            Some(Arc::new(deep)),
            Arc::new(LambdaPortScanner::open(&[(22, "ssh")])),
        );
        assert!(discovery.has_deep_scanner());
        let details = discovery
            .scan("192.0.2.1", &[22, 80], ScanDepth::Standard)
            .await
            .unwrap();
        assert_eq!(details.open_ports, vec![22]);
    }
}
