// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Data types shared between monitoring, scanning and storage.

mod options;
mod probe;
mod scan;
mod status;
mod target;
mod vulnerability;

pub use options::*;
pub use probe::*;
pub use scan::*;
pub use status::*;
pub use target::*;
pub use vulnerability::*;

use std::time::SystemTime;

/// Seconds since the unix epoch, 0 when the system clock is unusable.
pub fn current_time_in_seconds(name: &'static str) -> u64 {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(x) => x.as_secs(),
        Err(e) => {
            tracing::warn!(error=?e, name, "unable to get system time, defaulting to 0");
            0
        }
    }
}
