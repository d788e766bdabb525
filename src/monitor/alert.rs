// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use async_trait::async_trait;

use crate::{
    config::Alerts,
    models::{AggregateStatus, Status, Target},
};

const DEFAULT_DOWN_MESSAGE: &str = "Server is not responding";

/// Alert to send for a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    Down { error_message: String },
    Recovery { response_time_ms: u64 },
}

/// Decides whether a transition from `old` to the new aggregate is alerted.
///
/// Only online to offline and offline to online are alerted. The first
/// observation of a target (`old` is unknown) never is.
pub fn evaluate(old: Status, new: &AggregateStatus, settings: &Alerts) -> Option<Alert> {
    if !settings.enabled || settings.recipients.is_empty() {
        return None;
    }
    match (old, new.status) {
        (Status::Online, Status::Offline) => Some(Alert::Down {
            error_message: if new.message.is_empty() {
                DEFAULT_DOWN_MESSAGE.to_string()
            } else {
                new.message.clone()
            },
        }),
        (Status::Offline, Status::Online) => Some(Alert::Recovery {
            response_time_ms: new.response_time.unwrap_or_default(),
        }),
        (Status::Unknown, _)
        | (Status::Online, Status::Online | Status::Unknown)
        | (Status::Offline, Status::Offline | Status::Unknown) => None,
    }
}

/// Delivers alerts to operators. Recipients and transport credentials are
/// the gateway's own configuration.
#[async_trait]
pub trait AlertGateway: Send + Sync {
    async fn send_down_alert(
        &self,
        name: &str,
        hostname: &str,
        ip: &str,
        error_message: &str,
    ) -> bool;

    async fn send_recovery_alert(
        &self,
        name: &str,
        hostname: &str,
        ip: &str,
        response_time_ms: u64,
    ) -> bool;
}

/// Sends `alert` for `target` through the gateway and logs the outcome.
pub async fn dispatch<G>(gateway: &G, target: &Target, alert: &Alert) -> bool
where
    G: AlertGateway + ?Sized,
{
    let ip = target.ip_address.as_deref().unwrap_or_default();
    let sent = match alert {
        Alert::Down { error_message } => {
            gateway
                .send_down_alert(&target.name, &target.hostname, ip, error_message)
                .await
        }
        Alert::Recovery { response_time_ms } => {
            gateway
                .send_recovery_alert(&target.name, &target.hostname, ip, *response_time_ms)
                .await
        }
    };
    if sent {
        tracing::info!(target_name = %target.name, ?alert, "Alert sent");
    } else {
        tracing::warn!(target_name = %target.name, ?alert, "Unable to send alert");
    }
    sent
}

/// Gateway writing alerts to the log.
#[derive(Debug, Default, Clone)]
pub struct LogGateway {
    recipients: Vec<String>,
}

impl LogGateway {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl AlertGateway for LogGateway {
    async fn send_down_alert(
        &self,
        name: &str,
        hostname: &str,
        ip: &str,
        error_message: &str,
    ) -> bool {
        if self.recipients.is_empty() {
            return false;
        }
        tracing::warn!(
            recipients = ?self.recipients,
            target_name = name,
            hostname,
            ip,
            error_message,
            "ALERT: server down"
        );
        true
    }

    async fn send_recovery_alert(
        &self,
        name: &str,
        hostname: &str,
        ip: &str,
        response_time_ms: u64,
    ) -> bool {
        if self.recipients.is_empty() {
            return false;
        }
        tracing::info!(
            recipients = ?self.recipients,
            target_name = name,
            hostname,
            ip,
            response_time_ms,
            "ALERT: server recovered"
        );
        true
    }
}

#[cfg(debug_assertions)]
pub mod fake {
    use std::sync::Mutex;

    use super::*;

    /// An alert as received by the `RecordingGateway`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentAlert {
        pub name: String,
        pub hostname: String,
        pub ip: String,
        pub alert: Alert,
    }

    /// Remembers every alert it is asked to send.
    #[derive(Debug, Default)]
    pub struct RecordingGateway {
        sent: Mutex<Vec<SentAlert>>,
        failing: bool,
    }

    impl RecordingGateway {
        /// A gateway recording alerts but reporting every delivery as failed.
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<SentAlert> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }

        fn record(&self, name: &str, hostname: &str, ip: &str, alert: Alert) -> bool {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(SentAlert {
                    name: name.to_string(),
                    hostname: hostname.to_string(),
                    ip: ip.to_string(),
                    alert,
                });
            }
            !self.failing
        }
    }

    #[async_trait]
    impl AlertGateway for RecordingGateway {
        async fn send_down_alert(
            &self,
            name: &str,
            hostname: &str,
            ip: &str,
            error_message: &str,
        ) -> bool {
            self.record(
                name,
                hostname,
                ip,
                Alert::Down {
                    error_message: error_message.to_string(),
                },
            )
        }

        async fn send_recovery_alert(
            &self,
            name: &str,
            hostname: &str,
            ip: &str,
            response_time_ms: u64,
        ) -> bool {
            self.record(name, hostname, ip, Alert::Recovery { response_time_ms })
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn enabled() -> Alerts {
        Alerts {
            enabled: true,
            recipients: vec!["ops@example.com".to_string()],
        }
    }

    fn aggregate(status: Status) -> AggregateStatus {
        AggregateStatus {
            status,
            response_time: status.is_online().then_some(12),
            message: format!("now {status}"),
            checked_at: 0,
        }
    }

    #[test]
    fn transition_table() {
        for old in Status::ALL {
            for new in Status::ALL {
                let decision = evaluate(old, &aggregate(new), &enabled());
                let expected = match (old, new) {
                    (Status::Online, Status::Offline) => Some(Alert::Down {
                        error_message: "now offline".to_string(),
                    }),
                    (Status::Offline, Status::Online) => Some(Alert::Recovery {
                        response_time_ms: 12,
                    }),
                    _ => None,
                };
                assert_eq!(decision, expected, "{old} -> {new}");
            }
        }
    }

    #[test]
    fn disabled_or_without_recipients() {
        let disabled = Alerts {
            enabled: false,
            ..enabled()
        };
        let nobody = Alerts {
            recipients: vec![],
            ..enabled()
        };
        let down = aggregate(Status::Offline);
        assert_eq!(evaluate(Status::Online, &down, &disabled), None);
        assert_eq!(evaluate(Status::Online, &down, &nobody), None);
    }

    #[test]
    fn defaults_for_missing_metrics() {
        let mut down = aggregate(Status::Offline);
        down.message.clear();
        assert_eq!(
            evaluate(Status::Online, &down, &enabled()),
            Some(Alert::Down {
                error_message: DEFAULT_DOWN_MESSAGE.to_string()
            })
        );
        let mut up = aggregate(Status::Online);
        up.response_time = None;
        assert_eq!(
            evaluate(Status::Offline, &up, &enabled()),
            Some(Alert::Recovery {
                response_time_ms: 0
            })
        );
    }

    #[tokio::test]
    async fn log_gateway_needs_recipients() {
        assert!(!LogGateway::default().send_down_alert("a", "b", "c", "d").await);
        assert!(
            LogGateway::new(vec!["ops".to_string()])
                .send_recovery_alert("a", "b", "c", 5)
                .await
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn dispatch_logs_outcome() {
        let mut target = Target::new(1, "web", "web.local", vec![]);
        target.ip_address = Some("192.0.2.7".to_string());
        let down = Alert::Down {
            error_message: "HTTP connection error: refused".to_string(),
        };
        let gateway = LogGateway::new(vec!["ops@example.com".to_string()]);
        assert!(dispatch(&gateway, &target, &down).await);
        assert!(logs_contain("ALERT: server down"));
        assert!(logs_contain("192.0.2.7"));
        assert!(logs_contain("Alert sent"));

        assert!(!dispatch(&fake::RecordingGateway::failing(), &target, &down).await);
        assert!(logs_contain("Unable to send alert"));
    }
}
