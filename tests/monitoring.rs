// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use hostwatch::{
    config::{Alerts, Monitor},
    models::{ProbeResult, Protocol, Status, Target},
    monitor::{Alert, Scheduler, fake::RecordingGateway},
    probe::{NetworkProber, fake::LambdaProber},
    storage::{InMemoryStore, TargetStore},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

fn alerts() -> Alerts {
    Alerts {
        enabled: true,
        recipients: vec!["ops@example.com".to_string()],
    }
}

fn monitor() -> Monitor {
    Monitor {
        interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Answers every connection with `200 OK` until aborted.
async fn serve_ok(listener: TcpListener) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let _ = stream.read(&mut buffer).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await;
            let _ = stream.shutdown().await;
        });
    }
}

#[tokio::test]
async fn http_target_goes_online_then_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(serve_ok(listener));

    let mut target = Target::new(1, "web", "127.0.0.1", vec![Protocol::Http]);
    target.http.port = Some(port);
    target.ip_address = Some("192.0.2.10".to_string());
    let store = Arc::new(InMemoryStore::new(vec![target]));
    let gateway = Arc::new(RecordingGateway::default());
    let prober = Arc::new(NetworkProber::new(monitor().timeouts).unwrap());
    let scheduler = Scheduler::new(prober, store.clone(), gateway.clone(), &monitor(), alerts());

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.transitions, 1);
    let web = store.get_target(1).await.unwrap().unwrap();
    assert_eq!(web.status, Status::Online);
    assert!(web.response_time.is_some());
    assert!(gateway.sent().is_empty());

    server.abort();
    let _ = server.await;

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.alerts_sent, 1);
    let web = store.get_target(1).await.unwrap().unwrap();
    assert_eq!(web.status, Status::Offline);
    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "web");
    assert_eq!(sent[0].hostname, "127.0.0.1");
    assert_eq!(sent[0].ip, "192.0.2.10");
    match &sent[0].alert {
        Alert::Down { error_message } => {
            assert!(error_message.starts_with("HTTP connection error"))
        }
        other => panic!("expected a down alert, got {other:?}"),
    }
}

#[tokio::test]
async fn flapping_target_alerts_once_per_transition() {
    let up = Arc::new(AtomicBool::new(true));
    let prober = {
        let up = up.clone();
        LambdaProber::new(move |_, _| {
            if up.load(Ordering::SeqCst) {
                ProbeResult::online(85, "HTTP status: 200, response time: 85ms")
            } else {
                ProbeResult::offline("HTTP connection error: connection refused")
            }
        })
    };
    let mut target = Target::new(2, "api", "api.local", vec![Protocol::Http]);
    target.status = Status::Online;
    let store = Arc::new(InMemoryStore::new(vec![target]));
    let gateway = Arc::new(RecordingGateway::default());
    let scheduler = Scheduler::new(
        Arc::new(prober),
        store.clone(),
        gateway.clone(),
        &monitor(),
        alerts(),
    );

    scheduler.run_cycle().await.unwrap();
    let api = store.get_target(2).await.unwrap().unwrap();
    assert_eq!(api.response_time, Some(85));
    assert!(gateway.sent().is_empty());

    up.store(false, Ordering::SeqCst);
    scheduler.run_cycle().await.unwrap();
    scheduler.run_cycle().await.unwrap();
    up.store(true, Ordering::SeqCst);
    scheduler.run_cycle().await.unwrap();

    let alerts: Vec<_> = gateway.sent().into_iter().map(|s| s.alert).collect();
    assert_eq!(
        alerts,
        vec![
            Alert::Down {
                error_message: "HTTP connection error: connection refused".to_string()
            },
            Alert::Recovery {
                response_time_ms: 85
            },
        ]
    );
}

#[tokio::test]
async fn scheduler_runs_until_stopped() {
    let store = Arc::new(InMemoryStore::new(vec![Target::new(
        3,
        "db",
        "db.local",
        vec![Protocol::Icmp],
    )]));
    let scheduler = Scheduler::new(
        Arc::new(LambdaProber::constant(ProbeResult::online(3, "up"))),
        store.clone(),
        Arc::new(RecordingGateway::default()),
        &monitor(),
        alerts(),
    );
    let handle = scheduler.start();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!handle.is_finished());
    handle.stop().await.unwrap();
    let db = store.get_target(3).await.unwrap().unwrap();
    assert_eq!(db.status, Status::Online);
}
