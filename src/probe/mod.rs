// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Reachability checks for a single protocol.
//!
//! A probe never fails: transport, name resolution and timeout errors are
//! reported as an offline `ProbeResult` with a describing message.

mod error;
mod http;
mod icmp;
mod ssh;
mod tcp;

pub use error::ProbeError;
pub use http::{check_http, probe_url};
pub use icmp::{ECHO_COUNT, Pinger, parse_average_rtt};
pub use ssh::check_ssh;
pub use tcp::{check_tcp, connect};

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::duration,
    http::{HttpError, HttpFetch, HyperFetcher},
    models::{ProbeResult, Protocol, Target},
};

/// Upper bounds of the individual probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeTimeouts {
    #[serde(with = "duration")]
    pub icmp: Duration,
    #[serde(with = "duration")]
    pub tcp: Duration,
    #[serde(with = "duration")]
    pub http: Duration,
    #[serde(with = "duration")]
    pub ssh: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            icmp: Duration::from_secs(2),
            tcp: Duration::from_secs(5),
            http: Duration::from_secs(5),
            ssh: Duration::from_secs(5),
        }
    }
}

/// Runs the probe of one protocol against a target.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &Target, protocol: Protocol) -> ProbeResult;
}

/// Prober doing real network checks.
pub struct NetworkProber {
    timeouts: ProbeTimeouts,
    pinger: Pinger,
    fetcher: Arc<dyn HttpFetch>,
}

impl NetworkProber {
    pub fn new(timeouts: ProbeTimeouts) -> Result<Self, HttpError> {
        Ok(Self {
            timeouts,
            pinger: Pinger::new(),
            fetcher: Arc::new(HyperFetcher::new(timeouts.http)?),
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetch>) -> Self {
        self.fetcher = fetcher;
        self
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, target: &Target, protocol: Protocol) -> ProbeResult {
        match protocol {
            Protocol::Icmp => {
                self.pinger
                    .ping(target.ip_or_hostname(), self.timeouts.icmp)
                    .await
            }
            Protocol::Http => {
                check_http(self.fetcher.as_ref(), target.hostname_or_ip(), &target.http).await
            }
            Protocol::Ssh => {
                check_ssh(target.hostname_or_ip(), &target.ssh, self.timeouts.ssh).await
            }
            Protocol::Tcp => match target.tcp.port {
                Some(port) => {
                    let timeout = target.tcp.timeout.unwrap_or(self.timeouts.tcp);
                    check_tcp(target.hostname_or_ip(), port, timeout).await
                }
                None => ProbeResult::offline("TCP check error: no port configured"),
            },
        }
    }
}

#[cfg(debug_assertions)]
pub mod fake {
    use super::*;

    type Probe = Box<dyn Fn(&Target, Protocol) -> ProbeResult + Send + Sync + 'static>;

    /// Prober answering with the result of a closure.
    pub struct LambdaProber {
        probe: Probe,
    }

    impl LambdaProber {
        pub fn new<F>(probe: F) -> Self
        where
            F: Fn(&Target, Protocol) -> ProbeResult + Send + Sync + 'static,
        {
            Self {
                probe: Box::new(probe),
            }
        }

        /// Every protocol of every target reports the same result.
        pub fn constant(result: ProbeResult) -> Self {
            Self::new(move |_, _| result.clone())
        }
    }

    #[async_trait]
    impl Prober for LambdaProber {
        async fn probe(&self, target: &Target, protocol: Protocol) -> ProbeResult {
            (self.probe)(target, protocol)
        }
    }
}
