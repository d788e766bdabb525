// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use russh::{Disconnect, client};
use russh_keys::key;
use tokio::net::TcpStream;

use super::{ProbeError, tcp::connect};
use crate::models::{ProbeResult, SshParams, as_millis};

struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Result of the optional authentication step.
#[derive(Debug, PartialEq, Eq)]
enum Authentication {
    Accepted,
    Rejected,
}

async fn authenticate(
    stream: TcpStream,
    username: &str,
    params: &SshParams,
    timeout: Duration,
) -> Result<Authentication, ProbeError> {
    let config = Arc::new(client::Config {
        inactivity_timeout: Some(timeout),
        ..Default::default()
    });
    let mut session = client::connect_stream(config, stream, AcceptAnyHostKey).await?;
    let accepted = match (&params.key_path, &params.password) {
        (Some(path), passphrase) => {
            let key = russh_keys::load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                ProbeError::Key {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            session
                .authenticate_publickey(username, Arc::new(key))
                .await?
        }
        (None, Some(password)) => session.authenticate_password(username, password).await?,
        (None, None) => true,
    };
    if let Err(error) = session
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
    {
        tracing::trace!(%error, "SSH disconnect failed");
    }
    Ok(if accepted {
        Authentication::Accepted
    } else {
        Authentication::Rejected
    })
}

/// Connects to the SSH port. When a username and a password or key are
/// configured the login is attempted as well.
///
/// A server rejecting the login is reported offline: the check asked for a
/// working login, a reachable port alone does not satisfy it.
pub async fn check_ssh(host: &str, params: &SshParams, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let stream = match connect(host, params.port, timeout).await {
        Ok(stream) => stream,
        Err(e) => return ProbeResult::offline(format!("SSH connection error: {e}")),
    };
    let username = params.username.as_deref().filter(|u| !u.is_empty());
    if let (Some(username), true) = (username, params.has_secret()) {
        let remaining = timeout.saturating_sub(start.elapsed());
        match tokio::time::timeout(remaining, authenticate(stream, username, params, remaining))
            .await
        {
            Ok(Ok(Authentication::Accepted)) => {}
            Ok(Ok(Authentication::Rejected)) => {
                return ProbeResult::offline_with_time(
                    as_millis(start.elapsed()),
                    format!("SSH reachable but authentication rejected for user {username}"),
                );
            }
            Ok(Err(e)) => return ProbeResult::offline(format!("SSH connection error: {e}")),
            Err(_) => {
                return ProbeResult::offline(format!(
                    "SSH connection error: no authentication result within {}ms",
                    timeout.as_millis()
                ));
            }
        }
    }
    let elapsed = as_millis(start.elapsed());
    ProbeResult::online(
        elapsed,
        format!("SSH connection successful, response time: {elapsed}ms"),
    )
}
