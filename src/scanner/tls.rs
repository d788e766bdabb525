// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    fmt::{Display, Formatter},
    net::IpAddr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use rustls::{ProtocolVersion, pki_types::ServerName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::{FromDer, X509Certificate};

use super::{ScanError, policy};
use crate::{
    http::insecure_tls_config,
    models::{Severity, TlsDetails, Vulnerability},
    probe,
};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Common name of the subject, the full subject when there is none.
    pub subject: String,
    pub issuer: String,
    /// End of validity as unix timestamp.
    pub not_after: i64,
}

/// What a TLS 1.2/1.3 handshake revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsObservation {
    pub protocol: String,
    pub cipher: String,
    pub certificate: Option<CertificateInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyVersion {
    Tls10,
    Tls11,
}

impl LegacyVersion {
    pub const ALL: [LegacyVersion; 2] = [LegacyVersion::Tls10, LegacyVersion::Tls11];

    fn wire(&self) -> [u8; 2] {
        match self {
            LegacyVersion::Tls10 => [0x03, 0x01],
            LegacyVersion::Tls11 => [0x03, 0x02],
        }
    }
}

impl Display for LegacyVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LegacyVersion::Tls10 => "TLSv1",
                LegacyVersion::Tls11 => "TLSv1.1",
            }
        )
    }
}

/// A server accepted a legacy protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyObservation {
    pub version: LegacyVersion,
    pub cipher_suite: u16,
}

impl LegacyObservation {
    pub fn cipher_name(&self) -> String {
        LEGACY_CIPHER_SUITES
            .iter()
            .find(|(id, _)| *id == self.cipher_suite)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("0x{:04X}", self.cipher_suite))
    }
}

/// Cipher suites offered in the legacy ClientHello. Broken suites are
/// offered first so that a server preferring them reveals it.
const LEGACY_CIPHER_SUITES: [(u16, &str); 19] = [
    (0x0005, "TLS_RSA_WITH_RC4_128_SHA"),
    (0x0004, "TLS_RSA_WITH_RC4_128_MD5"),
    (0x000A, "TLS_RSA_WITH_3DES_EDE_CBC_SHA"),
    (0x0016, "TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA"),
    (0x0009, "TLS_RSA_WITH_DES_CBC_SHA"),
    (0x0003, "TLS_RSA_EXPORT_WITH_RC4_40_MD5"),
    (0x0008, "TLS_RSA_EXPORT_WITH_DES40_CBC_SHA"),
    (0x0018, "TLS_DH_anon_WITH_RC4_128_MD5"),
    (0x0034, "TLS_DH_anon_WITH_AES_128_CBC_SHA"),
    (0x0001, "TLS_RSA_WITH_NULL_MD5"),
    (0x0002, "TLS_RSA_WITH_NULL_SHA"),
    (0xC013, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA"),
    (0xC014, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA"),
    (0xC009, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA"),
    (0xC00A, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA"),
    (0x0033, "TLS_DHE_RSA_WITH_AES_128_CBC_SHA"),
    (0x0039, "TLS_DHE_RSA_WITH_AES_256_CBC_SHA"),
    (0x002F, "TLS_RSA_WITH_AES_128_CBC_SHA"),
    (0x0035, "TLS_RSA_WITH_AES_256_CBC_SHA"),
];

/// Performs TLS handshakes without validating trust.
#[async_trait]
pub trait TlsInspector: Send + Sync {
    async fn handshake(&self, host: &str, port: u16) -> Result<TlsObservation, ScanError>;

    /// Returns `None` when the server refuses `version`.
    async fn legacy_handshake(
        &self,
        host: &str,
        port: u16,
        version: LegacyVersion,
    ) -> Result<Option<LegacyObservation>, ScanError>;
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1".to_string(),
        other => format!("{other:?}"),
    }
}

pub fn parse_certificate(der: &[u8]) -> Result<CertificateInfo, ScanError> {
    let (_, certificate) =
        X509Certificate::from_der(der).map_err(|e| ScanError::Certificate(e.to_string()))?;
    let subject = certificate
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| certificate.subject().to_string());
    Ok(CertificateInfo {
        subject,
        issuer: certificate.issuer().to_string(),
        not_after: certificate.validity().not_after.timestamp(),
    })
}

/// Builds a ClientHello for `version` offering the legacy cipher suites.
pub fn legacy_client_hello(version: LegacyVersion, host: &str) -> Vec<u8> {
    let mut hello = Vec::new();
    hello.extend_from_slice(&version.wire());
    // Fixed random, the handshake is never completed.
    hello.extend((0u8..32).map(|i| i.wrapping_mul(13).wrapping_add(0x5A)));
    hello.push(0);
    let suites_len = (LEGACY_CIPHER_SUITES.len() * 2) as u16;
    hello.extend_from_slice(&suites_len.to_be_bytes());
    for (id, _) in LEGACY_CIPHER_SUITES {
        hello.extend_from_slice(&id.to_be_bytes());
    }
    // Null compression only.
    hello.extend_from_slice(&[1, 0]);

    let mut extensions = Vec::new();
    if host.parse::<IpAddr>().is_err() && !host.is_empty() {
        let name = host.as_bytes();
        extensions.extend_from_slice(&0u16.to_be_bytes());
        extensions.extend_from_slice(&((name.len() + 5) as u16).to_be_bytes());
        extensions.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
        extensions.push(0);
        extensions.extend_from_slice(&(name.len() as u16).to_be_bytes());
        extensions.extend_from_slice(name);
    }
    hello.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    hello.extend_from_slice(&extensions);

    let mut handshake = vec![0x01];
    let len = hello.len() as u32;
    handshake.extend_from_slice(&len.to_be_bytes()[1..]);
    handshake.extend_from_slice(&hello);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

/// Outcome of reading the first server flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerHelloParse {
    /// Protocol version and cipher suite chosen by the server.
    Hello { version: u16, cipher_suite: u16 },
    /// The server answered with an alert.
    Alert,
    /// Not enough data yet.
    Incomplete,
    /// Not a TLS handshake answer.
    Invalid,
}

pub fn parse_server_hello(data: &[u8]) -> ServerHelloParse {
    match data.first() {
        None => return ServerHelloParse::Incomplete,
        Some(0x15) => return ServerHelloParse::Alert,
        Some(0x16) => {}
        Some(_) => return ServerHelloParse::Invalid,
    }
    if data.len() < 6 {
        return ServerHelloParse::Incomplete;
    }
    let body = &data[5..];
    if body[0] != 0x02 {
        return ServerHelloParse::Invalid;
    }
    // type(1) length(3) version(2) random(32) session id length(1)
    let Some(session_id_len) = body.get(38).map(|l| *l as usize) else {
        return ServerHelloParse::Incomplete;
    };
    let at = 39 + session_id_len;
    match (body.get(4..6), body.get(at..at + 2)) {
        (Some(version), Some(suite)) => ServerHelloParse::Hello {
            version: u16::from_be_bytes([version[0], version[1]]),
            cipher_suite: u16::from_be_bytes([suite[0], suite[1]]),
        },
        _ => ServerHelloParse::Incomplete,
    }
}

/// `TlsInspector` using rustls for the handshake and raw records for the
/// legacy probe.
pub struct RustlsInspector {
    timeout: Duration,
}

impl RustlsInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TlsInspector for RustlsInspector {
    async fn handshake(&self, host: &str, port: u16) -> Result<TlsObservation, ScanError> {
        let connector = TlsConnector::from(Arc::new(insecure_tls_config()?));
        let server_name = ServerName::try_from(host)
            .map_err(|e| ScanError::Tls(e.to_string()))?
            .to_owned();
        let stream = probe::connect(host, port, self.timeout).await?;
        let tls = tokio::time::timeout(self.timeout, connector.connect(server_name, stream))
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))?
            .map_err(|e| ScanError::Tls(e.to_string()))?;
        let (_, connection) = tls.get_ref();
        let certificate = match connection.peer_certificates().and_then(|c| c.first()) {
            Some(der) => Some(parse_certificate(der.as_ref())?),
            None => None,
        };
        Ok(TlsObservation {
            protocol: connection
                .protocol_version()
                .map(protocol_name)
                .unwrap_or_default(),
            cipher: connection
                .negotiated_cipher_suite()
                .map(|s| format!("{:?}", s.suite()))
                .unwrap_or_default(),
            certificate,
        })
    }

    async fn legacy_handshake(
        &self,
        host: &str,
        port: u16,
        version: LegacyVersion,
    ) -> Result<Option<LegacyObservation>, ScanError> {
        let mut stream = probe::connect(host, port, self.timeout).await?;
        let deadline = tokio::time::Instant::now() + self.timeout;
        tokio::time::timeout_at(deadline, stream.write_all(&legacy_client_hello(version, host)))
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))??;
        let mut received = Vec::with_capacity(1024);
        let mut buf = [0u8; 1024];
        loop {
            match parse_server_hello(&received) {
                ServerHelloParse::Hello {
                    version: chosen,
                    cipher_suite,
                } => {
                    return Ok((chosen.to_be_bytes() == version.wire()).then_some(
                        LegacyObservation {
                            version,
                            cipher_suite,
                        },
                    ));
                }
                ServerHelloParse::Alert => return Ok(None),
                ServerHelloParse::Invalid => {
                    return Err(ScanError::Tls("unexpected answer to ClientHello".to_string()));
                }
                ServerHelloParse::Incomplete if received.len() >= 16 * 1024 => {
                    return Err(ScanError::Tls("ServerHello too large".to_string()));
                }
                ServerHelloParse::Incomplete => {}
            }
            let n = tokio::time::timeout_at(deadline, stream.read(&mut buf))
                .await
                .map_err(|_| ScanError::Timeout(self.timeout))??;
            if n == 0 {
                // Closing the connection is a refusal as well.
                return Ok(None);
            }
            received.extend_from_slice(&buf[..n]);
        }
    }
}

/// Runs the modern and the legacy handshakes against `host:port`.
pub async fn inspect(
    inspector: &dyn TlsInspector,
    host: &str,
    port: u16,
    now: i64,
) -> Result<(TlsDetails, Vec<Vulnerability>), ScanError> {
    let modern = inspector.handshake(host, port).await;
    let mut legacy = Vec::new();
    for version in LegacyVersion::ALL {
        match inspector.legacy_handshake(host, port, version).await {
            Ok(Some(observation)) => legacy.push(observation),
            Ok(None) => {}
            Err(error) => tracing::debug!(host, port, %version, %error, "Legacy handshake failed"),
        }
    }
    analyze(port, modern, &legacy, now)
}

fn legacy_protocol_finding(port: u16, protocol: &str) -> Vulnerability {
    Vulnerability::new(
        Severity::High,
        "ssl_protocol",
        format!("Obsolete protocol in use: {protocol}"),
    )
    .with_port(port)
    .with_remediation("Disable SSL and TLS versions below 1.2")
}

fn weak_cipher_finding(port: u16, cipher: &str) -> Vulnerability {
    Vulnerability::new(
        Severity::High,
        "weak_cipher",
        format!("Weak cipher suite in use: {cipher}"),
    )
    .with_port(port)
    .with_remediation("Use modern cipher suites such as AES-GCM or ChaCha20-Poly1305")
}

/// Applies the certificate, protocol and cipher rules to the handshake
/// results. Fails when no handshake succeeded at all.
pub fn analyze(
    port: u16,
    modern: Result<TlsObservation, ScanError>,
    legacy: &[LegacyObservation],
    now: i64,
) -> Result<(TlsDetails, Vec<Vulnerability>), ScanError> {
    let mut details = TlsDetails {
        port,
        ..Default::default()
    };
    let mut findings = Vec::new();
    match modern {
        Ok(observation) => {
            if let Some(certificate) = &observation.certificate {
                let days = (certificate.not_after - now).div_euclid(SECONDS_PER_DAY);
                details.subject = Some(certificate.subject.clone());
                details.issuer = Some(certificate.issuer.clone());
                details.days_until_expiry = Some(days);
                if days < 0 {
                    findings.push(
                        Vulnerability::new(
                            Severity::Critical,
                            "ssl_expired",
                            format!("Certificate of {} has expired", certificate.subject),
                        )
                        .with_port(port)
                        .with_remediation("Renew the certificate immediately"),
                    );
                } else if days < policy::CERTIFICATE_EXPIRY_WARNING_DAYS {
                    findings.push(
                        Vulnerability::new(
                            Severity::High,
                            "ssl_expiring",
                            format!("Certificate expires in {days} days"),
                        )
                        .with_port(port)
                        .with_remediation("Schedule the certificate renewal"),
                    );
                }
            }
            if policy::is_legacy_protocol(&observation.protocol) {
                findings.push(legacy_protocol_finding(port, &observation.protocol));
            }
            if policy::is_weak_cipher(&observation.cipher) {
                findings.push(weak_cipher_finding(port, &observation.cipher));
            }
            details.protocol = Some(observation.protocol).filter(|p| !p.is_empty());
            details.cipher = Some(observation.cipher).filter(|c| !c.is_empty());
        }
        Err(error) => {
            // Only a legacy protocol is spoken.
            let Some(best) = legacy.iter().max_by_key(|o| o.version.wire()) else {
                return Err(error);
            };
            let protocol = best.version.to_string();
            findings.push(legacy_protocol_finding(port, &protocol));
            details.protocol = Some(protocol);
            details.cipher = Some(best.cipher_name());
        }
    }
    if !legacy.is_empty() {
        details.legacy_protocols = legacy.iter().map(|o| o.version.to_string()).collect();
        findings.push(
            Vulnerability::new(
                Severity::Medium,
                "ssl_old_protocol",
                format!(
                    "Legacy TLS versions accepted: {}",
                    details.legacy_protocols.join(", ")
                ),
            )
            .with_port(port)
            .with_remediation("Disable TLS 1.0 and 1.1"),
        );
        let weak = legacy
            .iter()
            .map(LegacyObservation::cipher_name)
            .find(|name| policy::is_weak_cipher(name));
        let already_reported = findings.iter().any(|f| f.kind == "weak_cipher");
        if let (Some(cipher), false) = (weak, already_reported) {
            findings.push(weak_cipher_finding(port, &cipher));
        }
    }
    Ok((details, findings))
}

#[cfg(debug_assertions)]
pub mod fake {
    use super::*;

    /// Answers handshakes with fixed observations.
    #[derive(Debug, Clone, Default)]
    pub struct StaticInspector {
        pub modern: Option<TlsObservation>,
        pub legacy: Vec<LegacyObservation>,
    }

    #[async_trait]
    impl TlsInspector for StaticInspector {
        async fn handshake(&self, _: &str, _: u16) -> Result<TlsObservation, ScanError> {
            self.modern
                .clone()
                .ok_or_else(|| ScanError::Tls("handshake refused".to_string()))
        }

        async fn legacy_handshake(
            &self,
            _: &str,
            _: u16,
            version: LegacyVersion,
        ) -> Result<Option<LegacyObservation>, ScanError> {
            Ok(self.legacy.iter().find(|o| o.version == version).copied())
        }
    }
}
