// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! HTTP(S) client shared by the HTTP probe and the web scan phases.
//!
//! Certificates are never validated: the probe measures reachability and
//! the scanner inspects certificates itself, neither is a trust decision.

mod error;

pub use error::HttpError;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use http::{HeaderMap, Request, Uri, header};
use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::Bytes;
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls::{
    ClientConfig,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
};

const MAX_REDIRECTS: usize = 10;
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;
const USER_AGENT: &str = concat!("hostwatch/", env!("CARGO_PKG_VERSION"));

/// Accepts every certificate.
#[derive(Debug)]
pub struct NoVerifier;

/// DANGER: returns success for every certificate and signature.
impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client configuration trusting every server, for TLS 1.2 and 1.3.
pub fn insecure_tls_config() -> Result<ClientConfig, rustls::Error> {
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .dangerous()
    .with_custom_certificate_verifier(Arc::new(NoVerifier))
    .with_no_client_auth();
    Ok(config)
}

/// A received HTTP response with its body decoded lossily as UTF-8.
#[derive(Debug, Clone)]
pub struct WebResponse {
    /// URL of the final response after redirects.
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub elapsed: Duration,
}

impl WebResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Issues GET requests.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, follow_redirects: bool) -> Result<WebResponse, HttpError>;
}

/// `HttpFetch` implementation based on hyper with rustls.
pub struct HyperFetcher {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    timeout: Duration,
}

impl HyperFetcher {
    /// Creates a client whose requests, including redirects and reading the
    /// body, are bound by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(timeout));
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(insecure_tls_config()?)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { client, timeout })
    }

    async fn fetch(&self, url: &str, follow_redirects: bool) -> Result<WebResponse, HttpError> {
        let start = Instant::now();
        let mut uri: Uri = url.parse()?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(HttpError::InvalidUrl(url.to_string()));
        }
        for _ in 0..=MAX_REDIRECTS {
            let request = Request::get(uri.clone())
                .header(header::USER_AGENT, USER_AGENT)
                .body(Empty::new())?;
            let response = self.client.request(request).await?;
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|l| l.to_str().ok())
                .map(str::to_owned);
            if follow_redirects && response.status().is_redirection() {
                if let Some(location) = location {
                    uri = resolve_location(&uri, &location)?;
                    tracing::trace!(%uri, "Following redirect");
                    continue;
                }
            }
            let (parts, body) = response.into_parts();
            let body = Limited::new(body, MAX_BODY_SIZE)
                .collect()
                .await
                .map_err(|e| HttpError::Body(e.to_string()))?
                .to_bytes();
            return Ok(WebResponse {
                url: uri.to_string(),
                status: parts.status.as_u16(),
                headers: parts.headers,
                body: String::from_utf8_lossy(&body).into_owned(),
                elapsed: start.elapsed(),
            });
        }
        Err(HttpError::TooManyRedirects(MAX_REDIRECTS))
    }
}

#[async_trait]
impl HttpFetch for HyperFetcher {
    async fn get(&self, url: &str, follow_redirects: bool) -> Result<WebResponse, HttpError> {
        tokio::time::timeout(self.timeout, self.fetch(url, follow_redirects))
            .await
            .map_err(|_| HttpError::Timeout(self.timeout))?
    }
}

/// Removes `.` and `..` segments from an absolute path (RFC 3986, 5.2.4).
fn remove_dot_segments(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let mut output: Vec<&str> = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        match *segment {
            "." => {}
            ".." => {
                output.pop();
            }
            segment => {
                output.push(segment);
                continue;
            }
        }
        // A trailing dot segment still names a directory.
        if last {
            output.push("");
        }
    }
    format!("/{}", output.join("/"))
}

/// Resolves a `Location` header against the URI of the redirecting request
/// (RFC 3986, 5.2.2).
fn resolve_location(base: &Uri, location: &str) -> Result<Uri, HttpError> {
    let location = location.trim();
    let reference = location.split('#').next().unwrap_or_default();
    if lazy_regex::regex_is_match!(r"^[A-Za-z][A-Za-z0-9+.-]*:", reference) {
        return Ok(reference.parse()?);
    }
    let scheme = base.scheme_str().unwrap_or("http");
    if reference.starts_with("//") {
        return Ok(format!("{scheme}:{reference}").parse()?);
    }
    let (path, query) = match reference.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (reference, None),
    };
    let (path, query) = if path.is_empty() {
        (base.path().to_string(), query.or_else(|| base.query()))
    } else if path.starts_with('/') {
        (remove_dot_segments(path), query)
    } else {
        let base_path = base.path();
        let dir = &base_path[..base_path.rfind('/').map(|i| i + 1).unwrap_or(0)];
        let dir = if dir.is_empty() { "/" } else { dir };
        (remove_dot_segments(&format!("{dir}{path}")), query)
    };
    let path_and_query = match query {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    let mut builder = Uri::builder()
        .scheme(scheme)
        .path_and_query(path_and_query);
    if let Some(authority) = base.authority() {
        builder = builder.authority(authority.clone());
    }
    Ok(builder.build()?)
}

#[cfg(debug_assertions)]
pub mod fake {
    use std::collections::HashMap;

    use super::*;

    /// Serves canned responses keyed by URL; unknown URLs fail to connect.
    #[derive(Default)]
    pub struct StaticFetcher {
        responses: HashMap<String, (u16, Vec<(String, String)>, String)>,
    }

    impl StaticFetcher {
        pub fn with(mut self, url: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                (
                    status,
                    headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    body.to_string(),
                ),
            );
            self
        }
    }

    #[async_trait]
    impl HttpFetch for StaticFetcher {
        async fn get(&self, url: &str, _: bool) -> Result<WebResponse, HttpError> {
            let (status, headers, body) = self
                .responses
                .get(url)
                .ok_or_else(|| HttpError::Connect(format!("connection refused: {url}")))?;
            let mut map = HeaderMap::new();
            for (k, v) in headers {
                if let (Ok(name), Ok(value)) = (
                    header::HeaderName::from_bytes(k.as_bytes()),
                    header::HeaderValue::from_str(v),
                ) {
                    map.append(name, value);
                }
            }
            Ok(WebResponse {
                url: url.to_string(),
                status: *status,
                headers: map,
                body: body.clone(),
                elapsed: Duration::from_millis(5),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Answers every connection with the response produced for its request
    /// line.
    async fn serve(respond: fn(&str) -> String) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let line = request.lines().next().unwrap_or_default().to_string();
                let _ = stream.write_all(respond(&line).as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        port
    }

    #[test]
    fn relative_locations() {
        let base: Uri = "http://example.com:8080/a/b?x=1".parse().unwrap();
        assert_eq!(
            resolve_location(&base, "/login").unwrap().to_string(),
            "http://example.com:8080/login"
        );
        assert_eq!(
            resolve_location(&base, "c").unwrap().to_string(),
            "http://example.com:8080/a/c"
        );
        assert_eq!(
            resolve_location(&base, "https://other.org/").unwrap().to_string(),
            "https://other.org/"
        );
        for (location, expected) in [
            ("../x", "http://example.com:8080/x"),
            ("./x", "http://example.com:8080/a/x"),
            ("x?y=1", "http://example.com:8080/a/x?y=1"),
            ("?p=2", "http://example.com:8080/a/b?p=2"),
            ("//cdn.example.org/x", "http://cdn.example.org/x"),
            ("/a/../../login#top", "http://example.com:8080/login"),
            ("..", "http://example.com:8080/"),
        ] {
            assert_eq!(
                resolve_location(&base, location).unwrap().to_string(),
                expected,
                "{location}"
            );
        }
    }

    #[tokio::test]
    async fn follows_relative_redirect() {
        let port = serve(|line| {
            if line.starts_with("GET /app/ ") {
                "HTTP/1.1 302 Found\r\nLocation: login?next=1\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
            } else if line.starts_with("GET /app/login?next=1 ") {
                "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string()
            } else {
                "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
            }
        })
        .await;
        let fetcher = HyperFetcher::new(Duration::from_secs(5)).unwrap();
        let response = fetcher
            .get(&format!("http://127.0.0.1:{port}/app/"), true)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.url.ends_with("/app/login?next=1"));
    }

    #[tokio::test]
    async fn follows_redirects() {
        let port = serve(|line| {
            if line.starts_with("GET /old ") {
                "HTTP/1.1 301 Moved Permanently\r\nLocation: /new\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
            } else {
                "HTTP/1.1 200 OK\r\nServer: test\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello".to_string()
            }
        })
        .await;
        let fetcher = HyperFetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("http://127.0.0.1:{port}/old");

        let response = fetcher.get(&url, true).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "hello");
        assert_eq!(response.header("server"), Some("test"));
        assert!(response.url.ends_with("/new"));

        let response = fetcher.get(&url, false).await.unwrap();
        assert_eq!(response.status, 301);
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let fetcher = HyperFetcher::new(Duration::from_secs(2)).unwrap();
        let result = fetcher.get(&format!("http://127.0.0.1:{port}/"), true).await;
        assert!(matches!(result, Err(HttpError::Connect(_))));
    }

    #[tokio::test]
    async fn rejects_relative_urls() {
        let fetcher = HyperFetcher::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            fetcher.get("/just/a/path", true).await,
            Err(HttpError::InvalidUrl(_))
        ));
    }
}
