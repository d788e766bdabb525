// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{sync::Notify, task::JoinHandle};

use super::{ScanProgress, ScanServiceError, SecurityScanner, build_report};
use crate::{
    config::duration::format_duration,
    models::{ScanDetails, ScanId, ScanOptions, ScanRecord, ScanStatus, Target, TargetId},
    storage::ScanStore,
};

/// A handle to a running scan. Can be used to stop it.
#[derive(Debug, Clone)]
pub struct RunningScanHandle {
    scan_id: ScanId,
    stop: Arc<Notify>,
}

impl RunningScanHandle {
    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    /// The scan is finalized as failed with the findings collected so far.
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

type Running = Arc<Mutex<HashMap<TargetId, RunningScanHandle>>>;

fn lock(running: &Running) -> MutexGuard<'_, HashMap<TargetId, RunningScanHandle>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

enum End {
    Finished,
    Stopped,
    TimedOut,
}

/// Takes care of running a single scan to a terminal state.
struct RunningScan {
    scanner: Arc<SecurityScanner>,
    store: Arc<dyn ScanStore>,
    running: Running,
    target: Target,
    options: ScanOptions,
    scan_id: ScanId,
    stop: Arc<Notify>,
    timeout: Duration,
}

impl RunningScan {
    async fn run(self) -> Result<ScanRecord, ScanServiceError> {
        tracing::info!(
            scan_id = %self.scan_id,
            target_id = self.target.id,
            hostname = self.target.hostname_or_ip(),
            depth = ?self.options.scan_depth,
            "Scan started"
        );
        let progress = ScanProgress::default();
        let end = tokio::select! {
            _ = self.scanner.scan(&self.target, &self.options, &progress) => End::Finished,
            _ = self.stop.notified() => End::Stopped,
            _ = tokio::time::sleep(self.timeout) => End::TimedOut,
        };
        let (status, error) = match end {
            End::Finished => (ScanStatus::Completed, None),
            End::Stopped => (ScanStatus::Failed, Some("scan stopped".to_string())),
            End::TimedOut => (
                ScanStatus::Failed,
                Some(format!(
                    "scan timed out after {}",
                    format_duration(&self.timeout)
                )),
            ),
        };
        let result = self
            .store
            .finalize_scan(&self.scan_id, status, progress.report(), error)
            .await;
        lock(&self.running).remove(&self.target.id);
        match &result {
            Ok(record) if record.status == ScanStatus::Completed => tracing::info!(
                scan_id = %self.scan_id,
                risk = %record.risk_level,
                findings = record.vulnerabilities.len(),
                "Scan finished"
            ),
            Ok(record) => tracing::warn!(
                scan_id = %self.scan_id,
                reason = record.error_message.as_deref().unwrap_or_default(),
                findings = record.vulnerabilities.len(),
                "Scan failed"
            ),
            Err(error) => {
                tracing::warn!(scan_id = %self.scan_id, %error, "Unable to store scan result")
            }
        }
        Ok(result?)
    }
}

/// Starts scans as background tasks, at most one per target.
pub struct ScanService {
    scanner: Arc<SecurityScanner>,
    store: Arc<dyn ScanStore>,
    scan_timeout: Duration,
    running: Running,
}

impl ScanService {
    pub fn new(
        scanner: Arc<SecurityScanner>,
        store: Arc<dyn ScanStore>,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            scanner,
            store,
            scan_timeout,
            running: Default::default(),
        }
    }

    /// Creates the scan record and starts the scan in the background.
    ///
    /// Invalid options finalize the new record as failed and are returned
    /// as error.
    pub async fn start_scan(
        &self,
        target: Target,
        options: ScanOptions,
    ) -> Result<ScanRecord, ScanServiceError> {
        let (record, _) = self.spawn(target, options).await?;
        Ok(record)
    }

    /// Runs a scan and waits for its terminal record.
    pub async fn run_scan(
        &self,
        target: Target,
        options: ScanOptions,
    ) -> Result<ScanRecord, ScanServiceError> {
        let (_, handle) = self.spawn(target, options).await?;
        handle
            .await
            .map_err(|e| ScanServiceError::Task(e.to_string()))?
    }

    pub fn stop_scan(&self, scan_id: &str) -> Result<(), ScanServiceError> {
        let running = lock(&self.running);
        let handle = running
            .values()
            .find(|h| h.scan_id == scan_id)
            .ok_or_else(|| ScanServiceError::NotRunning(scan_id.to_string()))?;
        tracing::debug!(scan_id, "Stopping scan");
        handle.stop();
        Ok(())
    }

    pub fn running_scan(&self, target_id: TargetId) -> Option<RunningScanHandle> {
        lock(&self.running)
            .get(&target_id)
            .filter(|h| !h.scan_id.is_empty())
            .cloned()
    }

    async fn spawn(
        &self,
        target: Target,
        options: ScanOptions,
    ) -> Result<
        (
            ScanRecord,
            JoinHandle<Result<ScanRecord, ScanServiceError>>,
        ),
        ScanServiceError,
    > {
        let stop = Arc::new(Notify::new());
        {
            let mut running = lock(&self.running);
            if running.contains_key(&target.id) {
                return Err(ScanServiceError::AlreadyRunning(target.id));
            }
            // Reserved until the record exists.
            running.insert(
                target.id,
                RunningScanHandle {
                    scan_id: String::new(),
                    stop: stop.clone(),
                },
            );
        }
        let record = match self.prepare(&target, &options).await {
            Ok(record) => record,
            Err(error) => {
                lock(&self.running).remove(&target.id);
                return Err(error);
            }
        };
        if let Some(handle) = lock(&self.running).get_mut(&target.id) {
            handle.scan_id = record.id.clone();
        }
        let scan = RunningScan {
            scanner: self.scanner.clone(),
            store: self.store.clone(),
            running: self.running.clone(),
            target,
            options,
            scan_id: record.id.clone(),
            stop,
            timeout: self.scan_timeout,
        };
        Ok((record, tokio::spawn(scan.run())))
    }

    async fn prepare(
        &self,
        target: &Target,
        options: &ScanOptions,
    ) -> Result<ScanRecord, ScanServiceError> {
        let record = self.store.create_scan(target.id).await?;
        if let Err(error) = options.validate() {
            tracing::warn!(scan_id = %record.id, target_id = target.id, %error, "Invalid scan options");
            let details = ScanDetails {
                hostname: target.hostname_or_ip().to_string(),
                depth: options.scan_depth,
                ..Default::default()
            };
            self.store
                .finalize_scan(
                    &record.id,
                    ScanStatus::Failed,
                    build_report(Vec::new(), details),
                    Some(error.to_string()),
                )
                .await?;
            return Err(error.into());
        }
        Ok(record)
    }
}
