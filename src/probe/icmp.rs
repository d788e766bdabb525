// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    net::IpAddr,
    sync::atomic::{AtomicU16, Ordering},
    time::{Duration, Instant},
};

use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::process::Command;

use crate::models::{ProbeResult, as_millis};

/// Number of echo requests sent per probe.
pub const ECHO_COUNT: u16 = 2;
const PAYLOAD: [u8; 56] = [0; 56];

static IDENTIFIER: AtomicU16 = AtomicU16::new(0);

fn next_identifier() -> PingIdentifier {
    let base = (std::process::id() & 0xFFFF) as u16;
    PingIdentifier(base.wrapping_add(IDENTIFIER.fetch_add(1, Ordering::Relaxed)))
}

/// Sends ICMP echo requests.
///
/// Opening ICMP sockets needs privileges that are not always available.
/// Whether the sockets can be opened is decided once on construction;
/// without them the system `ping` binary is used instead.
pub struct Pinger {
    v4: Option<Client>,
    v6: Option<Client>,
}

impl Default for Pinger {
    fn default() -> Self {
        Self::new()
    }
}

impl Pinger {
    pub fn new() -> Self {
        let v4 = Client::new(&Config::default())
            .inspect_err(|error| tracing::info!(%error, "ICMPv4 socket unavailable, using system ping"))
            .ok();
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build())
            .inspect_err(|error| tracing::info!(%error, "ICMPv6 socket unavailable, using system ping"))
            .ok();
        Self { v4, v6 }
    }

    /// A pinger that always uses the system `ping` binary.
    pub fn system() -> Self {
        Self { v4: None, v6: None }
    }

    pub async fn ping(&self, address: &str, timeout: Duration) -> ProbeResult {
        let ip = match resolve(address, timeout).await {
            Ok(ip) => ip,
            Err(e) => return ProbeResult::offline(format!("ICMP check error: {e}")),
        };
        let client = match ip {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        };
        match client {
            Some(client) => ping_with_socket(client, ip, timeout).await,
            None => ping_with_command(ip, timeout).await,
        }
    }
}

async fn resolve(address: &str, timeout: Duration) -> Result<IpAddr, String> {
    if let Ok(ip) = address.parse() {
        return Ok(ip);
    }
    match tokio::time::timeout(timeout, tokio::net::lookup_host((address, 0))).await {
        Ok(Ok(mut addrs)) => addrs
            .next()
            .map(|a| a.ip())
            .ok_or_else(|| format!("no address found for {address}")),
        Ok(Err(e)) => Err(format!("unable to resolve {address}: {e}")),
        Err(_) => Err(format!("resolving {address} timed out")),
    }
}

fn online(rtt_ms: u64) -> ProbeResult {
    ProbeResult::online(rtt_ms, format!("Server responds to ICMP ping in {rtt_ms}ms"))
}

async fn ping_with_socket(client: &Client, ip: IpAddr, timeout: Duration) -> ProbeResult {
    let mut pinger = client.pinger(ip, next_identifier()).await;
    pinger.timeout(timeout);
    let mut rtts = Vec::with_capacity(ECHO_COUNT as usize);
    let mut last_error = None;
    for sequence in 0..ECHO_COUNT {
        match pinger.ping(PingSequence(sequence), &PAYLOAD).await {
            Ok((_, rtt)) => rtts.push(rtt),
            Err(e) => last_error = Some(e),
        }
    }
    if rtts.is_empty() {
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no reply".to_string());
        return ProbeResult::offline(format!("Server does not respond to ICMP ping: {reason}"));
    }
    let total: Duration = rtts.iter().sum();
    online(as_millis(total / rtts.len() as u32))
}

async fn ping_with_command(ip: IpAddr, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let wait = timeout.as_secs().max(1).to_string();
    let mut command = Command::new("ping");
    command
        .args(["-c", &ECHO_COUNT.to_string(), "-W", &wait, &ip.to_string()])
        .kill_on_drop(true);
    // Each echo may wait up to `timeout`, plus one second for process start.
    let budget = timeout * u32::from(ECHO_COUNT) + Duration::from_secs(1);
    let output = match tokio::time::timeout(budget, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return ProbeResult::offline(format!("ICMP check error: {e}")),
        Err(_) => {
            return ProbeResult::offline(format!(
                "Server does not respond to ICMP ping: no reply within {}ms",
                budget.as_millis()
            ));
        }
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.trim();
        return ProbeResult::offline(if reason.is_empty() {
            "Server does not respond to ICMP ping".to_string()
        } else {
            format!("Server does not respond to ICMP ping: {reason}")
        });
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let rtt = parse_average_rtt(&stdout).unwrap_or_else(|| as_millis(start.elapsed()));
    online(rtt)
}

/// Extracts the average round trip time in whole milliseconds from the
/// summary line of `ping`, e.g. `rtt min/avg/max/mdev = 0.04/0.05/0.06/0.01 ms`.
pub fn parse_average_rtt(output: &str) -> Option<u64> {
    let (_, avg) = lazy_regex::regex_captures!(r"min/avg/max\S*\s*=\s*[\d.]+/([\d.]+)/", output)?;
    avg.parse::<f64>().ok().map(|ms| ms.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_from_linux_ping() {
        let output = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
            64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=11.9 ms\n\
            64 bytes from 10.0.0.1: icmp_seq=2 ttl=64 time=12.3 ms\n\n\
            --- 10.0.0.1 ping statistics ---\n\
            2 packets transmitted, 2 received, 0% packet loss, time 1001ms\n\
            rtt min/avg/max/mdev = 11.912/12.104/12.296/0.192 ms\n";
        assert_eq!(parse_average_rtt(output), Some(12));
    }

    #[test]
    fn average_from_bsd_ping() {
        let output = "round-trip min/avg/max/stddev = 0.041/0.570/1.099/0.529 ms";
        assert_eq!(parse_average_rtt(output), Some(1));
    }

    #[test]
    fn missing_summary() {
        assert_eq!(parse_average_rtt("2 packets transmitted, 0 received"), None);
    }

    #[tokio::test]
    async fn unresolvable_host_is_offline() {
        let result = Pinger::system()
            .ping("does-not-exist.invalid", Duration::from_secs(1))
            .await;
        assert!(!result.is_online());
        assert!(result.message.starts_with("ICMP check error"));
    }
}
