// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use futures::future::join_all;

use crate::{
    models::{AggregateStatus, ProbeResult, Status, Target, TargetError, current_time_in_seconds},
    probe::Prober,
};

/// Separates the messages of the individual probes.
pub const MESSAGE_SEPARATOR: &str = " | ";

/// Combines probe results given in configured protocol order.
///
/// The target is online iff any probe is online. The response time is the
/// fastest of the online probes.
pub fn aggregate(results: &[ProbeResult], checked_at: u64) -> AggregateStatus {
    let online = results.iter().filter(|r| r.is_online());
    let status = if results.iter().any(ProbeResult::is_online) {
        Status::Online
    } else {
        Status::Offline
    };
    AggregateStatus {
        status,
        response_time: online.filter_map(|r| r.response_time).min(),
        message: results
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join(MESSAGE_SEPARATOR),
        checked_at,
    }
}

/// Probes all protocols of a target concurrently and aggregates the results.
///
/// Fails only for targets with an invalid configuration.
pub async fn check_target<P>(prober: &P, target: &Target) -> Result<AggregateStatus, TargetError>
where
    P: Prober + ?Sized,
{
    target.validate()?;
    let results = join_all(
        target
            .protocols
            .iter()
            .map(|protocol| prober.probe(target, *protocol)),
    )
    .await;
    for (protocol, result) in target.protocols.iter().zip(&results) {
        tracing::debug!(
            target_name = %target.name,
            %protocol,
            status = %result.status,
            detail = %result.message,
            "Probe finished"
        );
    }
    Ok(aggregate(&results, current_time_in_seconds("checked_at")))
}
