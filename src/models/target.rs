// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::Status;

pub type TargetId = u64;

/// Protocols a target can be monitored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Icmp,
    Http,
    Ssh,
    Tcp,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Icmp, Protocol::Http, Protocol::Ssh, Protocol::Tcp];
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Protocol::Icmp => "icmp",
                Protocol::Http => "http",
                Protocol::Ssh => "ssh",
                Protocol::Tcp => "tcp",
            }
        )
    }
}

/// Parameters of the HTTP(S) probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpParams {
    /// Port to connect to; 443 or 80 depending on `use_https` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub path: String,
    pub use_https: bool,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            port: None,
            path: "/".to_string(),
            use_https: false,
        }
    }
}

impl HttpParams {
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.use_https) {
            (Some(port), _) => port,
            (None, true) => 443,
            (None, false) => 80,
        }
    }
}

/// Parameters of the SSH probe.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshParams {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

impl Default for SshParams {
    fn default() -> Self {
        Self {
            port: 22,
            username: None,
            password: None,
            key_path: None,
        }
    }
}

impl std::fmt::Debug for SshParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshParams")
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_path", &self.key_path)
            .finish()
    }
}

impl SshParams {
    /// Returns true when an authentication handshake should be attempted.
    pub fn has_secret(&self) -> bool {
        self.password.is_some() || self.key_path.is_some()
    }
}

/// Parameters of the plain TCP probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Overrides the configured TCP timeout for this target.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::config::duration::optional"
    )]
    pub timeout: Option<Duration>,
}

fn enabled_default() -> bool {
    true
}

/// A monitored endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ip_address: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Protocols in the order their messages appear in the aggregate.
    pub protocols: Vec<Protocol>,
    #[serde(default)]
    pub http: HttpParams,
    #[serde(default)]
    pub ssh: SshParams,
    #[serde(default)]
    pub tcp: TcpParams,
    #[serde(default)]
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_check: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_status_change: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_time: Option<u64>,
}

/// Configuration errors of a target. A target failing validation is not
/// checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("Target {0} has no monitoring protocol configured")]
    NoProtocols(String),
    #[error("Target {0} lists protocol {1} more than once")]
    DuplicateProtocol(String, Protocol),
    #[error("Target {0} has neither a hostname nor an IP address")]
    MissingAddress(String),
    #[error("Target {0} uses TCP monitoring without a port")]
    MissingTcpPort(String),
    #[error("Target {0} has an SSH password or key without a username")]
    MissingSshUsername(String),
    #[error("Target {0} uses invalid port 0 for {1}")]
    InvalidPort(String, Protocol),
}

impl Target {
    /// Creates an enabled target with default protocol parameters.
    pub fn new(id: TargetId, name: &str, hostname: &str, protocols: Vec<Protocol>) -> Self {
        Self {
            id,
            name: name.to_string(),
            hostname: hostname.to_string(),
            ip_address: None,
            enabled: true,
            protocols,
            http: HttpParams::default(),
            ssh: SshParams::default(),
            tcp: TcpParams::default(),
            status: Status::Unknown,
            last_check: None,
            last_status_change: None,
            response_time: None,
        }
    }

    /// Address used for ICMP: the IP address when known, else the hostname.
    pub fn ip_or_hostname(&self) -> &str {
        match &self.ip_address {
            Some(ip) if !ip.is_empty() => ip,
            _ => &self.hostname,
        }
    }

    /// Address used for connection oriented probes: the hostname when known,
    /// else the IP address.
    pub fn hostname_or_ip(&self) -> &str {
        if self.hostname.is_empty() {
            self.ip_address.as_deref().unwrap_or_default()
        } else {
            &self.hostname
        }
    }

    pub fn validate(&self) -> Result<(), TargetError> {
        let name = || self.name.clone();
        if self.protocols.is_empty() {
            return Err(TargetError::NoProtocols(name()));
        }
        if self.hostname.is_empty() && self.ip_address.as_deref().unwrap_or_default().is_empty() {
            return Err(TargetError::MissingAddress(name()));
        }
        for (i, protocol) in self.protocols.iter().enumerate() {
            if self.protocols[..i].contains(protocol) {
                return Err(TargetError::DuplicateProtocol(name(), *protocol));
            }
            match protocol {
                Protocol::Icmp => {}
                Protocol::Http => {
                    if self.http.port == Some(0) {
                        return Err(TargetError::InvalidPort(name(), *protocol));
                    }
                }
                Protocol::Ssh => {
                    if self.ssh.port == 0 {
                        return Err(TargetError::InvalidPort(name(), *protocol));
                    }
                    let has_user = self.ssh.username.as_ref().is_some_and(|u| !u.is_empty());
                    if self.ssh.has_secret() && !has_user {
                        return Err(TargetError::MissingSshUsername(name()));
                    }
                }
                Protocol::Tcp => match self.tcp.port {
                    None => return Err(TargetError::MissingTcpPort(name())),
                    Some(0) => return Err(TargetError::InvalidPort(name(), *protocol)),
                    Some(_) => {}
                },
            }
        }
        Ok(())
    }
}
