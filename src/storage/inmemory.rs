// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    ScanStore, StatusUpdate, StorageError, TargetStore, finalize_record, new_scan_record,
    newest_first,
};
use crate::models::{ScanId, ScanRecord, ScanReport, ScanStatus, Target, TargetId};

/// Keeps targets and scan records in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    targets: RwLock<BTreeMap<TargetId, Target>>,
    scans: RwLock<HashMap<ScanId, ScanRecord>>,
}

impl InMemoryStore {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: RwLock::new(targets.into_iter().map(|t| (t.id, t)).collect()),
            scans: RwLock::new(HashMap::new()),
        }
    }
}

fn apply(target: &mut Target, update: StatusUpdate) {
    target.status = update.status;
    target.response_time = update.response_time;
    target.last_check = Some(update.checked_at);
    if let Some(changed) = update.status_changed_at {
        target.last_status_change = Some(changed);
    }
}

#[async_trait]
impl TargetStore for InMemoryStore {
    async fn list_enabled_targets(&self) -> Result<Vec<Target>, StorageError> {
        Ok(self
            .targets
            .read()
            .await
            .values()
            .filter(|t| t.enabled)
            .cloned()
            .collect())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<Target>, StorageError> {
        Ok(self.targets.read().await.get(&id).cloned())
    }

    async fn update_status(&self, update: StatusUpdate) -> Result<(), StorageError> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(&update.id)
            .ok_or_else(|| StorageError::NotFound(format!("target {}", update.id)))?;
        apply(target, update);
        Ok(())
    }

    async fn commit_cycle(&self, updates: Vec<StatusUpdate>) -> Vec<(TargetId, StorageError)> {
        let mut targets = self.targets.write().await;
        let mut failed = Vec::new();
        for update in updates {
            match targets.get_mut(&update.id) {
                Some(target) => apply(target, update),
                None => failed.push((
                    update.id,
                    StorageError::NotFound(format!("target {}", update.id)),
                )),
            }
        }
        failed
    }
}

#[async_trait]
impl ScanStore for InMemoryStore {
    async fn create_scan(&self, target_id: TargetId) -> Result<ScanRecord, StorageError> {
        let record = new_scan_record(target_id);
        self.scans
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn finalize_scan(
        &self,
        id: &str,
        status: ScanStatus,
        report: ScanReport,
        error: Option<String>,
    ) -> Result<ScanRecord, StorageError> {
        let mut scans = self.scans.write().await;
        let record = scans
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("scan {id}")))?;
        finalize_record(record, status, report, error)?;
        Ok(record.clone())
    }

    async fn get_scan(&self, id: &str) -> Result<Option<ScanRecord>, StorageError> {
        Ok(self.scans.read().await.get(id).cloned())
    }

    async fn list_scans(&self, target_id: TargetId) -> Result<Vec<ScanRecord>, StorageError> {
        let mut records: Vec<_> = self
            .scans
            .read()
            .await
            .values()
            .filter(|r| r.target_id == target_id)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Protocol, RiskLevel, Status};

    #[tokio::test]
    async fn only_enabled_targets_are_listed() {
        let mut disabled = Target::new(2, "b", "b", vec![Protocol::Icmp]);
        disabled.enabled = false;
        let store = InMemoryStore::new(vec![
            Target::new(1, "a", "a", vec![Protocol::Icmp]),
            disabled,
        ]);
        let enabled = store.list_enabled_targets().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, 1);
        assert!(store.get_target(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn status_change_timestamp_is_kept_without_change() {
        let store = InMemoryStore::new(vec![Target::new(1, "a", "a", vec![Protocol::Icmp])]);
        store
            .update_status(StatusUpdate {
                id: 1,
                status: Status::Online,
                response_time: Some(3),
                checked_at: 100,
                status_changed_at: Some(100),
            })
            .await
            .unwrap();
        store
            .update_status(StatusUpdate {
                id: 1,
                status: Status::Online,
                response_time: Some(5),
                checked_at: 160,
                status_changed_at: None,
            })
            .await
            .unwrap();
        let target = store.get_target(1).await.unwrap().unwrap();
        assert_eq!(target.last_check, Some(160));
        assert_eq!(target.last_status_change, Some(100));
        assert_eq!(target.response_time, Some(5));
    }

    #[tokio::test]
    async fn unknown_target_in_cycle_is_reported() {
        let store = InMemoryStore::new(vec![Target::new(1, "a", "a", vec![Protocol::Icmp])]);
        let update = |id| StatusUpdate {
            id,
            status: Status::Offline,
            response_time: None,
            checked_at: 1,
            status_changed_at: None,
        };
        let failed = store.commit_cycle(vec![update(1), update(9)]).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, 9);
        assert_eq!(
            store.get_target(1).await.unwrap().unwrap().status,
            Status::Offline
        );
    }

    #[tokio::test]
    async fn scans_are_finalized_once() {
        let store = InMemoryStore::default();
        let record = store.create_scan(7).await.unwrap();
        assert_eq!(record.status, ScanStatus::InProgress);

        let report = ScanReport {
            risk_level: RiskLevel::Low,
            ..Default::default()
        };
        let done = store
            .finalize_scan(&record.id, ScanStatus::Completed, report.clone(), None)
            .await
            .unwrap();
        assert_eq!(done.status, ScanStatus::Completed);
        assert!(done.completed_at.is_some());

        let again = store
            .finalize_scan(&record.id, ScanStatus::Failed, report, None)
            .await;
        assert_eq!(again, Err(StorageError::AlreadyFinalized(record.id.clone())));
        assert_eq!(store.list_scans(7).await.unwrap().len(), 1);
        assert!(store.list_scans(8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_progress_is_not_a_final_status() {
        let store = InMemoryStore::default();
        let record = store.create_scan(1).await.unwrap();
        let result = store
            .finalize_scan(&record.id, ScanStatus::InProgress, ScanReport::default(), None)
            .await;
        assert!(matches!(result, Err(StorageError::UnexpectedData(_))));
    }
}
