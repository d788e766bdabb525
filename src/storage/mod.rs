// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Persistence of targets and scan records.
//!
//! Monitoring and scanning only talk to the traits in this module. The
//! in-memory store serves both; scan records can be kept as JSON files
//! instead.

mod error;
mod file;
mod inmemory;

pub use error::StorageError;
pub use file::FileScanStore;
pub use inmemory::InMemoryStore;

use async_trait::async_trait;

use crate::models::{ScanRecord, ScanReport, ScanStatus, Status, Target, TargetId};

/// Result of one check of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: TargetId,
    pub status: Status,
    pub response_time: Option<u64>,
    pub checked_at: u64,
    /// Only set when the status differs from the stored one.
    pub status_changed_at: Option<u64>,
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn list_enabled_targets(&self) -> Result<Vec<Target>, StorageError>;

    async fn get_target(&self, id: TargetId) -> Result<Option<Target>, StorageError>;

    async fn update_status(&self, update: StatusUpdate) -> Result<(), StorageError>;

    /// Applies the updates of a whole check cycle.
    ///
    /// Failing updates are returned, the remaining ones are still applied.
    async fn commit_cycle(
        &self,
        updates: Vec<StatusUpdate>,
    ) -> Vec<(TargetId, StorageError)> {
        let mut failed = Vec::new();
        for update in updates {
            let id = update.id;
            if let Err(e) = self.update_status(update).await {
                failed.push((id, e));
            }
        }
        failed
    }
}

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Creates a new record in progress for the target.
    async fn create_scan(&self, target_id: TargetId) -> Result<ScanRecord, StorageError>;

    /// Stores the terminal state of a scan. Fails for unknown or already
    /// finalized scans.
    async fn finalize_scan(
        &self,
        id: &str,
        status: ScanStatus,
        report: ScanReport,
        error: Option<String>,
    ) -> Result<ScanRecord, StorageError>;

    async fn get_scan(&self, id: &str) -> Result<Option<ScanRecord>, StorageError>;

    /// Scans of a target, newest first.
    async fn list_scans(&self, target_id: TargetId) -> Result<Vec<ScanRecord>, StorageError>;
}

fn new_scan_record(target_id: TargetId) -> ScanRecord {
    ScanRecord {
        id: uuid::Uuid::new_v4().to_string(),
        target_id,
        status: ScanStatus::InProgress,
        started_at: Some(crate::models::current_time_in_seconds("started_at")),
        ..Default::default()
    }
}

fn finalize_record(
    record: &mut ScanRecord,
    status: ScanStatus,
    report: ScanReport,
    error: Option<String>,
) -> Result<(), StorageError> {
    if record.status.is_done() {
        return Err(StorageError::AlreadyFinalized(record.id.clone()));
    }
    if !status.is_done() {
        return Err(StorageError::UnexpectedData(format!(
            "{status} is not a terminal scan status"
        )));
    }
    record.finalize(
        status,
        report,
        error,
        crate::models::current_time_in_seconds("completed_at"),
    );
    Ok(())
}

fn newest_first(records: &mut [ScanRecord]) {
    records.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
}
