// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{collections::HashMap, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{Level, metadata::ParseLevelError};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// A `tracing::Level` that can be read from and written to configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SerLevel(Level);

impl Default for SerLevel {
    fn default() -> Self {
        Self(Level::INFO)
    }
}

impl FromStr for SerLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::from_str(s).map(SerLevel)
    }
}

impl From<Level> for SerLevel {
    fn from(level: Level) -> Self {
        SerLevel(level)
    }
}

impl From<SerLevel> for Level {
    fn from(level: SerLevel) -> Self {
        level.0
    }
}

impl Serialize for SerLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for SerLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `[log]` section.
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub level: SerLevel,
    /// Per module overrides, e.g. `"hostwatch::scanner" = "debug"`.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub additional: HashMap<String, SerLevel>,
}

impl Logging {
    /// Raises the default level by the number of `-v` flags given on the
    /// command line.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        let raised = match (Level::from(self.level), verbosity) {
            (level, 0) => level,
            (Level::ERROR | Level::WARN | Level::INFO, 1) => Level::DEBUG,
            _ => Level::TRACE,
        };
        if raised > Level::from(self.level) {
            self.level = raised.into();
        }
        self
    }

    fn filter(&self) -> filter::Targets {
        self.additional.iter().fold(
            filter::Targets::new().with_default(Level::from(self.level)),
            |filter, (name, level)| filter.with_target(name, Level::from(*level)),
        )
    }

    /// Installs the global subscriber. Logs go to stderr so that command
    /// output on stdout stays machine readable.
    pub fn init(&self) {
        let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let result = tracing_subscriber::registry()
            .with(layer)
            .with(self.filter())
            .try_init();
        if let Err(error) = result {
            tracing::debug!(%error, "Logging already initialized");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_but_never_lowers() {
        let base = Logging::default();
        assert_eq!(
            Level::from(base.clone().with_verbosity(0).level),
            Level::INFO
        );
        assert_eq!(
            Level::from(base.clone().with_verbosity(1).level),
            Level::DEBUG
        );
        assert_eq!(Level::from(base.with_verbosity(3).level), Level::TRACE);
        let trace = Logging {
            level: Level::TRACE.into(),
            ..Default::default()
        };
        assert_eq!(Level::from(trace.with_verbosity(1).level), Level::TRACE);
    }

    #[test]
    fn deserialize_levels() {
        let logging: Logging = toml::from_str(
            r#"
            level = "warn"
            additional = { "hostwatch::scanner" = "trace" }
            "#,
        )
        .unwrap();
        assert_eq!(Level::from(logging.level), Level::WARN);
        assert_eq!(
            logging.additional.get("hostwatch::scanner").copied(),
            Some(SerLevel::from(Level::TRACE))
        );
    }
}
