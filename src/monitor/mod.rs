// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Periodic reachability monitoring.
//!
//! The `Scheduler` sweeps all enabled targets. Each target is checked with
//! every configured protocol, the results are combined by `aggregate` and
//! a changed status is handed to the alert evaluation.

mod aggregate;
mod alert;
mod scheduler;

pub use aggregate::*;
pub use alert::*;
pub use scheduler::*;
