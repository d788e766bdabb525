// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{sync::Arc, time::Duration};

use hostwatch::{
    http::fake::StaticFetcher,
    models::{Protocol, RiskLevel, ScanOptions, ScanStatus, Severity, Target},
    scanner::{
        DnsCapability, PortScanner, ScanService, SecurityScanner,
        fake::{LambdaPortScanner, StaticDns, StaticInspector},
    },
    storage::{FileScanStore, InMemoryStore, ScanStore},
};

fn scanner(ports: LambdaPortScanner, dns: Option<StaticDns>) -> Arc<SecurityScanner> {
    Arc::new(SecurityScanner::with_collaborators(
        Arc::new(ports) as Arc<dyn PortScanner>,
        Arc::new(StaticFetcher::default()),
        Arc::new(StaticInspector::default()),
        dns.map(|dns| Arc::new(dns) as Arc<dyn DnsCapability>),
    ))
}

#[tokio::test]
async fn unreachable_host_has_no_findings() {
    let store = Arc::new(InMemoryStore::new(Vec::new()));
    let service = ScanService::new(
        scanner(LambdaPortScanner::closed(), None),
        store.clone(),
        Duration::from_secs(10),
    );
    let target = Target::new(1, "gone", "192.0.2.99", vec![Protocol::Icmp]);
    let record = service
        .run_scan(target, ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(record.status, ScanStatus::Completed);
    assert!(record.vulnerabilities.is_empty());
    assert_eq!(record.risk_level, RiskLevel::Low);
    assert!(record.recommendations.is_empty());
    assert_eq!(record.details.score, Some(0));
    assert_eq!(record.error_message, None);
    let ports = record.details.ports.as_ref().unwrap();
    assert!(ports.open_ports.is_empty());

    let listed = store.list_scans(1).await.unwrap();
    assert_eq!(listed, vec![record]);
}

#[tokio::test]
async fn scan_records_survive_on_disk() {
    let dir = std::env::temp_dir().join(format!("hostwatch-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(FileScanStore::new(&dir).await.unwrap());
    let dns = StaticDns::default().with_txt("shop.example", "v=spf1 -all");
    let service = ScanService::new(
        scanner(LambdaPortScanner::closed(), Some(dns)),
        store,
        Duration::from_secs(10),
    );
    let target = Target::new(4, "shop", "shop.example", vec![Protocol::Http]);
    let record = service
        .run_scan(target, ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(record.status, ScanStatus::Completed);
    let kinds: Vec<_> = record
        .vulnerabilities
        .iter()
        .map(|v| (v.kind.as_str(), v.severity))
        .collect();
    assert_eq!(kinds, vec![("dns_dmarc_missing", Severity::Medium)]);
    assert_eq!(record.risk_level, RiskLevel::Low);
    let dns = record.details.dns.as_ref().unwrap();
    assert_eq!(dns.spf, Some(true));
    assert_eq!(dns.dmarc, Some(false));

    let reopened = FileScanStore::new(&dir).await.unwrap();
    let stored = reopened.get_scan(&record.id).await.unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(reopened.list_scans(4).await.unwrap().len(), 1);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
