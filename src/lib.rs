// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Reachability monitoring and lightweight security scanning of a fleet of
//! hosts.
//!
//! The monitoring side periodically probes every enabled target over ICMP,
//! HTTP, SSH and TCP, aggregates the results into an online or offline
//! status and alerts on transitions. The scanning side runs a phased
//! security scan against a single target and produces a scored report.

pub mod config;
pub mod http;
pub mod models;
pub mod monitor;
pub mod probe;
pub mod scanner;
pub mod storage;
