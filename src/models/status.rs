// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Reachability of a target.
///
/// `Unknown` is only ever stored before the first observation; probes and
/// aggregates always produce `Online` or `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl Status {
    pub fn is_online(&self) -> bool {
        matches!(self, Status::Online)
    }

    pub const ALL: [Status; 3] = [Status::Online, Status::Offline, Status::Unknown];
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Status::Online => "online",
                Status::Offline => "offline",
                Status::Unknown => "unknown",
            }
        )
    }
}
