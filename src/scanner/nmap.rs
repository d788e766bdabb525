// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{PortScanner, ScanError};
use crate::models::{PortScanDetails, ScanDepth, ServiceInfo};

/// Service and version detection by running nmap.
#[derive(Debug, Clone)]
pub struct NmapScanner {
    path: PathBuf,
    timeout: Duration,
}

impl NmapScanner {
    /// Returns a scanner when `path` can be executed. Called once at startup.
    pub async fn detect(path: &Path, timeout: Duration) -> Option<Self> {
        let output = Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(Duration::from_secs(10), output).await {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let version = stdout.lines().next().unwrap_or_default().trim();
                tracing::info!(path = %path.display(), version, "Deep port scanner available");
                Some(Self {
                    path: path.to_owned(),
                    timeout,
                })
            }
            Ok(Ok(output)) => {
                tracing::info!(path = %path.display(), status = %output.status, "Deep port scanner not usable, using connect scan");
                None
            }
            Ok(Err(error)) => {
                tracing::info!(path = %path.display(), %error, "Deep port scanner not available, using connect scan");
                None
            }
            Err(_) => {
                tracing::info!(path = %path.display(), "Deep port scanner did not answer, using connect scan");
                None
            }
        }
    }

    pub fn arguments(host: &str, ports: &[u16], depth: ScanDepth) -> Vec<String> {
        let intensity = match depth {
            ScanDepth::Deep => "9",
            ScanDepth::Quick | ScanDepth::Standard => "7",
        };
        let ports = ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        [
            "-sV",
            "-sC",
            "--version-intensity",
            intensity,
            "-Pn",
            "--open",
            "-p",
            ports.as_str(),
            "-oX",
            "-",
            host,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, Deserialize)]
struct NmapHost {
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
struct NmapPort {
    #[serde(rename = "@portid")]
    id: u16,
    state: NmapState,
    #[serde(default)]
    service: Option<NmapService>,
}

#[derive(Debug, Deserialize)]
struct NmapState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct NmapService {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@product", default)]
    product: Option<String>,
    #[serde(rename = "@version", default)]
    version: Option<String>,
    #[serde(rename = "@tunnel", default)]
    tunnel: Option<String>,
}

impl From<NmapService> for ServiceInfo {
    fn from(value: NmapService) -> Self {
        let name = match (value.name.as_str(), value.tunnel.as_deref()) {
            ("http", Some("ssl")) => "https".to_string(),
            _ => value.name,
        };
        Self {
            name,
            product: value.product,
            version: value.version,
        }
    }
}

/// Parses the XML report of nmap into the open ports and their services.
pub fn parse_nmap_xml(xml: &str) -> Result<Vec<(u16, ServiceInfo)>, ScanError> {
    let run: NmapRun = quick_xml::de::from_str(xml)?;
    let mut services: Vec<(u16, ServiceInfo)> = run
        .hosts
        .into_iter()
        .filter_map(|h| h.ports)
        .flat_map(|p| p.ports)
        .filter(|p| p.state.state == "open")
        .map(|p| {
            let service = p
                .service
                .map(ServiceInfo::from)
                .unwrap_or_else(|| ServiceInfo::named("unknown"));
            (p.id, service)
        })
        .collect();
    services.sort_by_key(|(port, _)| *port);
    services.dedup_by_key(|(port, _)| *port);
    Ok(services)
}

#[async_trait]
impl PortScanner for NmapScanner {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn scan(
        &self,
        host: &str,
        ports: &[u16],
        depth: ScanDepth,
    ) -> Result<PortScanDetails, ScanError> {
        let failed = |reason: String| ScanError::PortScanner {
            scanner: self.name().to_string(),
            reason,
        };
        let output = Command::new(&self.path)
            .args(Self::arguments(host, ports, depth))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))?
            .map_err(|e| failed(e.to_string()))?;
        if !output.status.success() {
            return Err(failed(format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let services = parse_nmap_xml(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(host, open = services.len(), "nmap finished");
        Ok(PortScanDetails {
            scanner: self.name().to_string(),
            scanned_ports: ports.to_vec(),
            open_ports: services.iter().map(|(port, _)| *port).collect(),
            services: services.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<?xml-stylesheet href="file:///usr/bin/../share/nmap/nmap.xsl" type="text/xsl"?>
<nmaprun scanner="nmap" args="nmap -sV -oX - 192.0.2.10" start="1700000000" version="7.94" xmloutputversion="1.05">
<scaninfo type="connect" protocol="tcp" numservices="3" services="22,80,443"/>
<verbose level="0"/>
<debugging level="0"/>
<host starttime="1700000000" endtime="1700000012"><status state="up" reason="user-set" reason_ttl="0"/>
<address addr="192.0.2.10" addrtype="ipv4"/>
<hostnames>
</hostnames>
<ports><port protocol="tcp" portid="22"><state state="open" reason="syn-ack" reason_ttl="0"/><service name="ssh" product="OpenSSH" version="7.2p2 Ubuntu 4ubuntu2.10" method="probed" conf="10"/></port>
<port protocol="tcp" portid="80"><state state="open" reason="syn-ack" reason_ttl="0"/><service name="http" product="Apache httpd" version="2.4.49" method="probed" conf="10"/><script id="http-title" output="Site"/></port>
<port protocol="tcp" portid="443"><state state="open" reason="syn-ack" reason_ttl="0"/><service name="http" product="nginx" tunnel="ssl" method="probed" conf="10"/></port>
<port protocol="tcp" portid="8080"><state state="filtered" reason="no-response" reason_ttl="0"/></port>
</ports>
<times srtt="405" rttvar="120" to="100000"/>
</host>
<runstats><finished time="1700000012" timestr="Tue Nov 14 22:13:32 2023" elapsed="12.00" exit="success"/><hosts up="1" down="0" total="1"/>
</runstats>
</nmaprun>
"#;

    #[test]
    fn parses_services() {
        let services = parse_nmap_xml(REPORT).unwrap();
        let ports: Vec<u16> = services.iter().map(|(p, _)| *p).collect();
        assert_eq!(ports, vec![22, 80, 443]);
        assert_eq!(services[0].1.product.as_deref(), Some("OpenSSH"));
        assert_eq!(services[1].1.version.as_deref(), Some("2.4.49"));
        assert_eq!(services[2].1.name, "https");
        assert_eq!(services[2].1.version, None);
    }

    #[test]
    fn host_without_ports() {
        let xml = r#"<nmaprun><host><status state="down"/></host></nmaprun>"#;
        assert!(parse_nmap_xml(xml).unwrap().is_empty());
        assert!(parse_nmap_xml("<nmaprun></nmaprun>").unwrap().is_empty());
    }

    #[test]
    fn arguments_depend_on_depth() {
        let standard = NmapScanner::arguments("example.com", &[22, 80], ScanDepth::Standard);
        assert_eq!(standard.last().map(String::as_str), Some("example.com"));
        assert!(standard.windows(2).any(|w| w[0] == "-p" && w[1] == "22,80"));
        assert!(standard.windows(2).any(|w| w[0] == "--version-intensity" && w[1] == "7"));
        let deep = NmapScanner::arguments("example.com", &[22], ScanDepth::Deep);
        assert!(deep.windows(2).any(|w| w[0] == "--version-intensity" && w[1] == "9"));
    }

    #[tokio::test]
    async fn missing_binary_is_not_detected() {
        let path = Path::new("/nonexistent/hostwatch-nmap");
        assert!(NmapScanner::detect(path, Duration::from_secs(1)).await.is_none());
    }
}
