// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use hickory_proto::{
    op::{Message, MessageType, OpCode, Query, ResponseCode},
    rr::{Name, RecordType},
    serialize::binary::{BinDecodable, BinEncodable},
};
use hickory_resolver::{
    TokioAsyncResolver,
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::ScanError;
use crate::{
    models::{DnsDetails, Severity, Vulnerability},
    probe,
};

/// Record type number of DNSKEY.
const DNSKEY: u16 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTransfer {
    Allowed,
    Refused,
}

/// DNS queries needed by the DNS phase.
#[async_trait]
pub trait DnsCapability: Send + Sync {
    /// TXT strings of `name`, empty when there are none.
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ScanError>;

    /// Attempts an AXFR of `domain` against its name servers.
    async fn zone_transfer(&self, domain: &str) -> Result<ZoneTransfer, ScanError>;

    async fn has_dnssec(&self, name: &str) -> Result<bool, ScanError>;
}

fn is_no_records(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

fn dns_error(error: impl ToString) -> ScanError {
    ScanError::Dns(error.to_string())
}

/// `DnsCapability` backed by the system resolver configuration.
pub struct HickoryDns {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryDns {
    pub fn from_system(timeout: Duration) -> Self {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|error| {
                tracing::debug!(%error, "No system resolver configuration, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            });
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
        }
    }

    async fn name_servers(&self, domain: &str) -> Vec<String> {
        match self.resolver.ns_lookup(domain).await {
            Ok(lookup) => lookup
                .iter()
                .map(|ns| ns.to_string().trim_end_matches('.').to_string())
                .collect(),
            Err(error) => {
                tracing::debug!(domain, %error, "NS lookup failed");
                Vec::new()
            }
        }
    }

    async fn request_axfr(&self, server: &str, query: &[u8]) -> Result<ZoneTransfer, ScanError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let timeout = |_| ScanError::Timeout(self.timeout);
        let mut stream = probe::connect(server, 53, self.timeout).await?;
        let mut framed = (query.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(query);
        tokio::time::timeout_at(deadline, stream.write_all(&framed))
            .await
            .map_err(timeout)??;
        let mut len = [0u8; 2];
        tokio::time::timeout_at(deadline, stream.read_exact(&mut len))
            .await
            .map_err(timeout)??;
        let mut answer = vec![0u8; u16::from_be_bytes(len) as usize];
        tokio::time::timeout_at(deadline, stream.read_exact(&mut answer))
            .await
            .map_err(timeout)??;
        let response = Message::from_bytes(&answer).map_err(dns_error)?;
        Ok(axfr_outcome(&response))
    }
}

pub fn axfr_query(domain: &str, id: u16) -> Result<Vec<u8>, ScanError> {
    let name = Name::from_ascii(domain).map_err(dns_error)?;
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false)
        .add_query(Query::query(name, RecordType::AXFR));
    message.to_bytes().map_err(dns_error)
}

/// A transfer counts as allowed when the server answers with the SOA
/// record that opens the zone.
pub fn axfr_outcome(response: &Message) -> ZoneTransfer {
    let transfers = response.response_code() == ResponseCode::NoError
        && response
            .answers()
            .iter()
            .any(|r| r.record_type() == RecordType::SOA);
    if transfers {
        ZoneTransfer::Allowed
    } else {
        ZoneTransfer::Refused
    }
}

#[async_trait]
impl DnsCapability for HickoryDns {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ScanError> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|part| String::from_utf8_lossy(part).into_owned())
                        .collect::<String>()
                })
                .collect()),
            Err(error) if is_no_records(&error) => Ok(Vec::new()),
            Err(error) => Err(dns_error(error)),
        }
    }

    async fn zone_transfer(&self, domain: &str) -> Result<ZoneTransfer, ScanError> {
        let mut servers = self.name_servers(domain).await;
        if servers.is_empty() {
            servers.push(domain.to_string());
        }
        let query = axfr_query(domain, 0x4857)?;
        let mut last_error = None;
        for server in &servers {
            match self.request_axfr(server, &query).await {
                Ok(ZoneTransfer::Allowed) => {
                    tracing::debug!(domain, %server, "Zone transfer allowed");
                    return Ok(ZoneTransfer::Allowed);
                }
                Ok(ZoneTransfer::Refused) => return Ok(ZoneTransfer::Refused),
                Err(error) => {
                    tracing::debug!(domain, %server, %error, "Zone transfer attempt failed");
                    last_error = Some(error);
                }
            }
        }
        // Every server failed, nothing was learned.
        Err(last_error.unwrap_or_else(|| dns_error("no name server to ask")))
    }

    async fn has_dnssec(&self, name: &str) -> Result<bool, ScanError> {
        match self
            .resolver
            .lookup(name, RecordType::from(DNSKEY))
            .await
        {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(error) if is_no_records(&error) => Ok(false),
            Err(error) => Err(dns_error(error)),
        }
    }
}

/// Checks mail authentication records, zone transfers and DNSSEC of
/// `hostname`. Unanswered queries become notes, not findings.
pub async fn assess(
    dns: Option<&dyn DnsCapability>,
    hostname: &str,
) -> (DnsDetails, Vec<Vulnerability>) {
    let mut details = DnsDetails::default();
    let mut findings = Vec::new();
    let Some(dns) = dns else {
        details.notes.push("DNS resolver not available".to_string());
        return (details, findings);
    };
    if hostname.parse::<IpAddr>().is_ok() {
        details
            .notes
            .push("Target is an IP address, DNS checks skipped".to_string());
        return (details, findings);
    }
    details.available = true;

    match dns.resolve_txt(hostname).await {
        Ok(records) => {
            let spf = records.iter().any(|r| r.starts_with("v=spf1"));
            details.spf = Some(spf);
            if !spf {
                findings.push(
                    Vulnerability::new(
                        Severity::Medium,
                        "dns_spf_missing",
                        "No SPF record published",
                    )
                    .with_remediation("Publish an SPF record listing the allowed mail senders"),
                );
            }
        }
        Err(error) => details.notes.push(format!("SPF check failed: {error}")),
    }

    match dns.resolve_txt(&format!("_dmarc.{hostname}")).await {
        Ok(records) => {
            let dmarc = records.iter().any(|r| r.starts_with("v=DMARC1"));
            details.dmarc = Some(dmarc);
            if !dmarc {
                findings.push(
                    Vulnerability::new(
                        Severity::Medium,
                        "dns_dmarc_missing",
                        "No DMARC record published",
                    )
                    .with_remediation("Publish a DMARC policy at _dmarc"),
                );
            }
        }
        Err(error) => details.notes.push(format!("DMARC check failed: {error}")),
    }

    match dns.zone_transfer(hostname).await {
        Ok(ZoneTransfer::Allowed) => {
            details.zone_transfer_refused = Some(false);
            findings.push(
                Vulnerability::new(
                    Severity::Critical,
                    "dns_zone_transfer",
                    "Zone transfer (AXFR) allowed",
                )
                .with_remediation("Restrict zone transfers to the secondary name servers"),
            );
        }
        Ok(ZoneTransfer::Refused) => details.zone_transfer_refused = Some(true),
        Err(error) => details
            .notes
            .push(format!("Zone transfer check failed: {error}")),
    }

    match dns.has_dnssec(hostname).await {
        Ok(enabled) => {
            details.dnssec = Some(enabled);
            if !enabled {
                details.notes.push("DNSSEC not enabled".to_string());
            }
        }
        Err(error) => details.notes.push(format!("DNSSEC check failed: {error}")),
    }
    (details, findings)
}

#[cfg(debug_assertions)]
pub mod fake {
    use std::collections::HashMap;

    use super::*;

    /// Answers from fixed records. Names without TXT records resolve to
    /// nothing.
    #[derive(Debug, Clone)]
    pub struct StaticDns {
        pub txt: HashMap<String, Vec<String>>,
        pub zone_transfer: ZoneTransfer,
        pub dnssec: bool,
        /// Every query fails with this error when set.
        pub failure: Option<ScanError>,
    }

    impl Default for StaticDns {
        fn default() -> Self {
            Self {
                txt: HashMap::new(),
                zone_transfer: ZoneTransfer::Refused,
                dnssec: false,
                failure: None,
            }
        }
    }

    impl StaticDns {
        pub fn with_txt(mut self, name: &str, record: &str) -> Self {
            self.txt
                .entry(name.to_string())
                .or_default()
                .push(record.to_string());
            self
        }

        fn check(&self) -> Result<(), ScanError> {
            match &self.failure {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl DnsCapability for StaticDns {
        async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ScanError> {
            self.check()?;
            Ok(self.txt.get(name).cloned().unwrap_or_default())
        }

        async fn zone_transfer(&self, _: &str) -> Result<ZoneTransfer, ScanError> {
            self.check()?;
            Ok(self.zone_transfer)
        }

        async fn has_dnssec(&self, _: &str) -> Result<bool, ScanError> {
            self.check()?;
            Ok(self.dnssec)
        }
    }
}

#[cfg(test)]
mod tests {
    use hickory_proto::rr::{RData, Record, rdata::SOA};

    use super::{fake::StaticDns, *};

    fn kinds(findings: &[Vulnerability]) -> Vec<&str> {
        findings.iter().map(|f| f.kind.as_str()).collect()
    }

    #[tokio::test]
    async fn well_configured_domain() {
        let dns = StaticDns {
            dnssec: true,
            ..Default::default()
        }
        .with_txt("example.com", "v=spf1 include:_spf.example.com -all")
        .with_txt("_dmarc.example.com", "v=DMARC1; p=reject");
        let (details, findings) = assess(Some(&dns), "example.com").await;
        assert!(findings.is_empty());
        assert!(details.available);
        assert_eq!(details.spf, Some(true));
        assert_eq!(details.dmarc, Some(true));
        assert_eq!(details.zone_transfer_refused, Some(true));
        assert_eq!(details.dnssec, Some(true));
        assert!(details.notes.is_empty());
    }

    #[tokio::test]
    async fn missing_records_and_open_transfer() {
        let dns = StaticDns {
            zone_transfer: ZoneTransfer::Allowed,
            ..Default::default()
        }
        .with_txt("example.org", "google-site-verification=abc");
        let (details, findings) = assess(Some(&dns), "example.org").await;
        assert_eq!(
            kinds(&findings),
            vec!["dns_spf_missing", "dns_dmarc_missing", "dns_zone_transfer"]
        );
        assert_eq!(findings[2].severity, Severity::Critical);
        // Missing DNSSEC is recorded, not reported.
        assert_eq!(details.dnssec, Some(false));
        assert_eq!(details.notes, vec!["DNSSEC not enabled"]);
    }

    #[tokio::test]
    async fn failing_resolver_only_adds_notes() {
        let dns = StaticDns {
            failure: Some(ScanError::Dns("SERVFAIL".to_string())),
            ..Default::default()
        };
        let (details, findings) = assess(Some(&dns), "example.net").await;
        assert!(findings.is_empty());
        assert_eq!(details.notes.len(), 4);
        assert_eq!(details.spf, None);
    }

    #[tokio::test]
    async fn skipped_without_resolver_or_for_addresses() {
        let (details, findings) = assess(None, "example.com").await;
        assert!(findings.is_empty());
        assert!(!details.available);
        let dns = StaticDns::default();
        let (details, findings) = assess(Some(&dns), "192.0.2.7").await;
        assert!(findings.is_empty());
        assert_eq!(details.spf, None);
        assert_eq!(details.notes.len(), 1);
    }

    #[test]
    fn axfr_query_encoding() {
        let bytes = axfr_query("example.com", 7).unwrap();
        let message = Message::from_bytes(&bytes).unwrap();
        assert_eq!(message.id(), 7);
        assert_eq!(message.queries().len(), 1);
        assert_eq!(message.queries()[0].query_type(), RecordType::AXFR);
    }

    #[test]
    fn axfr_outcomes() {
        let mut refused = Message::new();
        refused.set_response_code(ResponseCode::Refused);
        assert_eq!(axfr_outcome(&refused), ZoneTransfer::Refused);

        let origin = Name::from_ascii("example.com.").unwrap();
        let soa = SOA::new(
            Name::from_ascii("ns1.example.com.").unwrap(),
            Name::from_ascii("hostmaster.example.com.").unwrap(),
            2024010101,
            7200,
            3600,
            1209600,
            3600,
        );
        let mut allowed = Message::new();
        allowed.add_answer(Record::from_rdata(origin, 3600, RData::SOA(soa)));
        assert_eq!(axfr_outcome(&allowed), ZoneTransfer::Allowed);
    }
}
