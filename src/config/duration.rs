// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Serde helpers for durations written as `"500ms"`, `"5s"` or `"2m"`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer, de::Visitor};

const UNITS: [(&str, u64); 6] = [
    ("ns", 1),
    ("us", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "a duration string like \"5s\" or a number of seconds"
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        parse(v).map_err(serde::de::Error::custom)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Duration::from_secs(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(v)
            .map(Duration::from_secs)
            .map_err(|_| serde::de::Error::custom(format!("negative duration {v}")))
    }
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(duration))
}

/// Same as the parent module for `Option<Duration>` fields.
pub mod optional {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(deserialize_with = "super::deserialize")] Duration);
        Option::<Wrapper>::deserialize(deserializer).map(|w| w.map(|Wrapper(d)| d))
    }

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// Parses a duration with one of the units ns, us, ms, s, m, h.
pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid number in duration: {s}"))?;
    let unit = s[digits.len()..].trim();
    match UNITS.iter().find(|(u, _)| *u == unit) {
        Some((_, nanos)) => value
            .checked_mul(*nanos)
            .map(Duration::from_nanos)
            .ok_or_else(|| format!("Duration {s} is too large")),
        None => {
            let supported = UNITS.map(|(u, _)| u).join(", ");
            Err(format!(
                "Unknown duration unit '{unit}', only {supported} are supported"
            ))
        }
    }
}

pub fn format_duration(duration: &Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    UNITS
        .iter()
        .rev()
        .find(|(_, n)| nanos % u128::from(*n) == 0)
        .map(|(unit, n)| format!("{}{unit}", nanos / u128::from(*n)))
        .unwrap_or_else(|| format!("{nanos}ns"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!(parse("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse(" 30 s "), Ok(Duration::from_secs(30)));
    }

    #[test]
    fn parse_errors() {
        assert!(parse("fast").is_err());
        assert!(parse("5 parsecs").is_err());
    }

    #[test]
    fn formats_largest_whole_unit() {
        assert_eq!(format_duration(&Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(&Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(&Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(&Duration::ZERO), "0s");
    }
}
