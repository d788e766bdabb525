// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::time::Instant;

use crate::{
    http::HttpFetch,
    models::{HttpParams, ProbeResult, as_millis},
};

/// Builds `scheme://host:port/path` for the HTTP probe.
pub fn probe_url(host: &str, params: &HttpParams) -> String {
    let scheme = if params.use_https { "https" } else { "http" };
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let path = if params.path.starts_with('/') {
        params.path.clone()
    } else {
        format!("/{}", params.path)
    };
    format!("{scheme}://{host}:{}{path}", params.effective_port())
}

/// GETs the configured URL following redirects. Online iff the final
/// status is below 400.
pub async fn check_http(fetcher: &dyn HttpFetch, host: &str, params: &HttpParams) -> ProbeResult {
    let url = probe_url(host, params);
    let start = Instant::now();
    match fetcher.get(&url, true).await {
        Ok(response) => {
            let elapsed = as_millis(start.elapsed());
            if response.status < 400 {
                ProbeResult::online(
                    elapsed,
                    format!(
                        "HTTP status: {}, response time: {elapsed}ms",
                        response.status
                    ),
                )
            } else {
                ProbeResult::offline_with_time(
                    elapsed,
                    format!("HTTP error status: {}", response.status),
                )
            }
        }
        Err(e) => ProbeResult::offline(format!("HTTP connection error: {e}")),
    }
}
