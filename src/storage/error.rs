// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::io;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    /// A scan record can only be finalized once.
    #[error("Scan {0} is already finalized")]
    AlreadyFinalized(String),
    #[error("Unexpected data: {0}")]
    UnexpectedData(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<io::Error> for StorageError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => Self::NotFound(value.to_string()),
            _ => Self::Io(value.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::UnexpectedData(value.to_string())
    }
}
