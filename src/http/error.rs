// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Connect(String),
    #[error("unable to read response body: {0}")]
    Body(String),
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

impl From<http::Error> for HttpError {
    fn from(value: http::Error) -> Self {
        Self::InvalidUrl(value.to_string())
    }
}

impl From<http::uri::InvalidUri> for HttpError {
    fn from(value: http::uri::InvalidUri) -> Self {
        Self::InvalidUrl(value.to_string())
    }
}

impl From<rustls::Error> for HttpError {
    fn from(value: rustls::Error) -> Self {
        Self::Tls(value.to_string())
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        // The top level error only says "client error (Connect)", the
        // interesting part is in the source chain.
        let mut message = value.to_string();
        let mut source = std::error::Error::source(&value);
        while let Some(inner) = source {
            message = format!("{message}: {inner}");
            source = inner.source();
        }
        Self::Connect(message)
    }
}
