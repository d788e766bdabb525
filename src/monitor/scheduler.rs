// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle},
    time::MissedTickBehavior,
};

use super::{Alert, AlertGateway, check_target, dispatch, evaluate};
use crate::{
    config::{Alerts, Monitor},
    models::{AggregateStatus, Target, TargetId},
    probe::Prober,
    storage::{StatusUpdate, StorageError, TargetStore},
};

/// Upper bound of a single alert delivery.
const ALERT_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of one sweep over all enabled targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub failed: usize,
    pub transitions: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
}

enum CheckOutcome {
    Checked(Box<Target>, AggregateStatus),
    Failed { id: TargetId, name: String, reason: String },
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_panic() {
        let panic = error.into_panic();
        let detail = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("check panicked: {detail}")
    } else {
        error.to_string()
    }
}

/// Periodically checks all enabled targets.
///
/// Cycles never overlap: the next cycle starts after the previous one
/// committed its updates and dispatched its alerts.
pub struct Scheduler<P, S, G> {
    prober: Arc<P>,
    store: Arc<S>,
    gateway: Arc<G>,
    alerts: Alerts,
    interval: Duration,
    max_concurrent: usize,
}

impl<P, S, G> Scheduler<P, S, G>
where
    P: Prober + 'static,
    S: TargetStore + 'static,
    G: AlertGateway + 'static,
{
    pub fn new(
        prober: Arc<P>,
        store: Arc<S>,
        gateway: Arc<G>,
        monitor: &Monitor,
        alerts: Alerts,
    ) -> Self {
        Self {
            prober,
            store,
            gateway,
            alerts,
            interval: monitor.interval,
            max_concurrent: monitor.max_concurrent_checks.max(1),
        }
    }

    async fn check(&self, target: Target) -> CheckOutcome {
        let id = target.id;
        let name = target.name.clone();
        let prober = self.prober.clone();
        // Spawned so that a panicking probe only takes down its own check.
        let task = tokio::spawn(async move {
            let result = check_target(prober.as_ref(), &target).await;
            (target, result)
        });
        match task.await {
            Ok((target, Ok(aggregate))) => CheckOutcome::Checked(Box::new(target), aggregate),
            Ok((_, Err(e))) => CheckOutcome::Failed {
                id,
                name,
                reason: e.to_string(),
            },
            Err(e) => CheckOutcome::Failed {
                id,
                name,
                reason: describe_join_error(e),
            },
        }
    }

    /// Runs a single sweep. Fails only when the targets cannot be listed.
    pub async fn run_cycle(&self) -> Result<CycleReport, StorageError> {
        let targets = self.store.list_enabled_targets().await?;
        tracing::debug!(targets = targets.len(), "Starting check cycle");
        let outcomes: Vec<CheckOutcome> = futures::stream::iter(targets)
            .map(|target| self.check(target))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut report = CycleReport::default();
        let mut updates = Vec::with_capacity(outcomes.len());
        let mut alerts: Vec<(Box<Target>, Alert)> = Vec::new();
        for outcome in outcomes {
            match outcome {
                CheckOutcome::Checked(target, aggregate) => {
                    report.checked += 1;
                    let changed = target.status != aggregate.status;
                    if changed {
                        report.transitions += 1;
                        tracing::info!(
                            target_name = %target.name,
                            from = %target.status,
                            to = %aggregate.status,
                            detail = %aggregate.message,
                            "Status changed"
                        );
                        if let Some(alert) = evaluate(target.status, &aggregate, &self.alerts) {
                            alerts.push((target.clone(), alert));
                        }
                    }
                    updates.push(StatusUpdate {
                        id: target.id,
                        status: aggregate.status,
                        response_time: aggregate.response_time,
                        checked_at: aggregate.checked_at,
                        status_changed_at: changed.then_some(aggregate.checked_at),
                    });
                }
                CheckOutcome::Failed { id, name, reason } => {
                    report.failed += 1;
                    tracing::warn!(id, target_name = %name, %reason, "Check failed, status left unchanged");
                }
            }
        }

        for (id, error) in self.store.commit_cycle(updates).await {
            tracing::warn!(id, %error, "Unable to store status");
        }

        for (target, alert) in alerts {
            let sent = tokio::time::timeout(
                ALERT_TIMEOUT,
                dispatch(self.gateway.as_ref(), &target, &alert),
            )
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(target_name = %target.name, "Alert delivery timed out");
                false
            });
            if sent {
                report.alerts_sent += 1;
            } else {
                report.alerts_failed += 1;
            }
        }
        tracing::info!(
            checked = report.checked,
            failed = report.failed,
            transitions = report.transitions,
            "Check cycle finished"
        );
        Ok(report)
    }

    /// Starts the sweep loop in the background. The first cycle runs
    /// immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, mut stop_requested) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            // A cycle taking longer than the interval delays the next tick
            // instead of triggering the missed ones in a burst.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop_requested.changed() => break,
                }
                if let Err(error) = self.run_cycle().await {
                    tracing::warn!(%error, "Unable to run check cycle");
                }
                if *stop_requested.borrow() {
                    break;
                }
            }
            tracing::info!("Scheduler stopped");
        });
        SchedulerHandle { handle, shutdown }
    }
}

/// Owner of a running scheduler loop.
pub struct SchedulerHandle {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Requests a stop and waits until the running cycle, if any, is
    /// finished.
    pub async fn stop(self) -> Result<(), JoinError> {
        // Fails only when the loop already ended.
        let _ = self.shutdown.send(true);
        self.handle.await
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{ProbeResult, Protocol, Status},
        monitor::fake::RecordingGateway,
        probe::fake::LambdaProber,
        storage::InMemoryStore,
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
            max_concurrent_checks: 2,
            ..Default::default()
        }
    }

    fn target(id: TargetId, name: &str, status: Status) -> Target {
        let mut target = Target::new(id, name, &format!("{name}.local"), vec![Protocol::Icmp]);
        target.status = status;
        target
    }

    #[tokio::test]
    async fn panicking_probe_does_not_stop_the_cycle() {
        let store = Arc::new(InMemoryStore::new(vec![
            target(1, "a", Status::Unknown),
            target(2, "broken", Status::Online),
            target(3, "c", Status::Unknown),
        ]));
        let prober = Arc::new(LambdaProber::new(|target, _| {
            if target.name == "broken" {
                panic!("probe exploded");
            }
            ProbeResult::online(7, "up")
        }));
        let gateway = Arc::new(RecordingGateway::default());
        let scheduler = Scheduler::new(prober, store.clone(), gateway.clone(), &monitor(), alerts());

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.failed, 1);

        for id in [1, 3] {
            let t = store.get_target(id).await.unwrap().unwrap();
            assert_eq!(t.status, Status::Online);
            assert_eq!(t.response_time, Some(7));
            assert!(t.last_check.is_some());
            assert!(t.last_status_change.is_some());
        }
        let broken = store.get_target(2).await.unwrap().unwrap();
        assert_eq!(broken.status, Status::Online);
        assert_eq!(broken.last_check, None);
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn invalid_target_is_left_unchanged() {
        let mut invalid = target(1, "tcp", Status::Offline);
        invalid.protocols = vec![Protocol::Tcp];
        let store = Arc::new(InMemoryStore::new(vec![invalid]));
        let scheduler = Scheduler::new(
            Arc::new(LambdaProber::constant(ProbeResult::online(1, "up"))),
            store.clone(),
            Arc::new(RecordingGateway::default()),
            &monitor(),
            alerts(),
        );
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = store.get_target(1).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Offline);
    }

    #[tokio::test]
    async fn unchanged_status_keeps_change_timestamp() {
        let mut t = target(1, "a", Status::Online);
        t.last_status_change = Some(5);
        let store = Arc::new(InMemoryStore::new(vec![t]));
        let gateway = Arc::new(RecordingGateway::default());
        let scheduler = Scheduler::new(
            Arc::new(LambdaProber::constant(ProbeResult::online(9, "up"))),
            store.clone(),
            gateway.clone(),
            &monitor(),
            alerts(),
        );
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.transitions, 0);
        let stored = store.get_target(1).await.unwrap().unwrap();
        assert_eq!(stored.last_status_change, Some(5));
        assert_eq!(stored.response_time, Some(9));
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn recovery_alert_and_failed_delivery() {
        let store = Arc::new(InMemoryStore::new(vec![target(1, "a", Status::Offline)]));
        let gateway = Arc::new(RecordingGateway::failing());
        let scheduler = Scheduler::new(
            Arc::new(LambdaProber::constant(ProbeResult::online(30, "up"))),
            store.clone(),
            gateway.clone(),
            &monitor(),
            alerts(),
        );
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.alerts_failed, 1);
        assert_eq!(
            gateway.sent()[0].alert,
            Alert::Recovery {
                response_time_ms: 30
            }
        );
        // The failed delivery did not prevent the update.
        assert_eq!(
            store.get_target(1).await.unwrap().unwrap().status,
            Status::Online
        );
    }

    #[tokio::test]
    async fn stops_at_cycle_boundary() {
        let store = Arc::new(InMemoryStore::new(vec![target(1, "a", Status::Unknown)]));
        let scheduler = Scheduler::new(
            Arc::new(LambdaProber::constant(ProbeResult::offline("down"))),
            store.clone(),
            Arc::new(RecordingGateway::default()),
            &monitor(),
            alerts(),
        );
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await.unwrap();
        let stored = store.get_target(1).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Offline);
        assert!(stored.last_check.is_some());
    }
}
