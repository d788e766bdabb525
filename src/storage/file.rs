// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ScanStore, StorageError, finalize_record, new_scan_record, newest_first};
use crate::models::{ScanRecord, ScanReport, ScanStatus, TargetId};

/// Stores every scan record as `<id>.json` in a directory.
#[derive(Debug)]
pub struct FileScanStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on records.
    write_lock: Mutex<()>,
}

impl FileScanStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path(&self, id: &str) -> Result<PathBuf, StorageError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(StorageError::UnexpectedData(format!("invalid scan id {id}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn write(&self, record: &ScanRecord) -> Result<(), StorageError> {
        let path = self.path(&record.id)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read(path: &Path) -> Result<Option<ScanRecord>, StorageError> {
        match tokio::fs::read(path).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ScanStore for FileScanStore {
    async fn create_scan(&self, target_id: TargetId) -> Result<ScanRecord, StorageError> {
        let record = new_scan_record(target_id);
        let _guard = self.write_lock.lock().await;
        self.write(&record).await?;
        Ok(record)
    }

    async fn finalize_scan(
        &self,
        id: &str,
        status: ScanStatus,
        report: ScanReport,
        error: Option<String>,
    ) -> Result<ScanRecord, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut record = Self::read(&self.path(id)?)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("scan {id}")))?;
        finalize_record(&mut record, status, report, error)?;
        self.write(&record).await?;
        Ok(record)
    }

    async fn get_scan(&self, id: &str) -> Result<Option<ScanRecord>, StorageError> {
        Self::read(&self.path(id)?).await
    }

    async fn list_scans(&self, target_id: TargetId) -> Result<Vec<ScanRecord>, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path).await {
                Ok(Some(record)) if record.target_id == target_id => records.push(record),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "Skipping unreadable scan record")
                }
            }
        }
        newest_first(&mut records);
        Ok(records)
    }
}
