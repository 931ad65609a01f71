//! HTTP transport for ranged downloads.
//!
//! The [`Transport`] trait is the seam between the download session and the
//! network: a HEAD to learn the size, and ranged GETs streamed into a sink.
//! [`HttpTransport`] implements it on a blocking reqwest client with optional
//! custom CA roots and Digest authentication.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, RANGE, WWW_AUTHENTICATE};
use reqwest::{Certificate, Method, StatusCode, Url};
use tracing::{debug, warn};

use super::auth::{Credentials, DigestAuth, DigestChallenge};
use super::error::{DownloadError, DownloadResult};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Buffer size for streaming response bodies (64KB).
pub(crate) const BUFFER_SIZE: usize = 64 * 1024;

/// Result of a HEAD request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadInfo {
    /// Value of `Content-Length`, if the server sent one.
    pub content_length: Option<u64>,
}

/// Inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range; `end` must not precede `start`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range end precedes start");
        Self { start, end }
    }

    /// Number of bytes covered; never zero.
    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}", self)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Network access needed by a download session.
pub trait Transport {
    /// Issue a HEAD request for `url`.
    fn head(&mut self, url: &str) -> DownloadResult<HeadInfo>;

    /// Fetch `range` of `url`, writing the body into `sink`.
    ///
    /// Returns the number of bytes written, which is at most `range.byte_count()`.
    fn get_range(
        &mut self,
        url: &str,
        range: ByteRange,
        sink: &mut dyn Write,
    ) -> DownloadResult<u64>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn head(&mut self, url: &str) -> DownloadResult<HeadInfo> {
        (**self).head(url)
    }

    fn get_range(
        &mut self,
        url: &str,
        range: ByteRange,
        sink: &mut dyn Write,
    ) -> DownloadResult<u64> {
        (**self).get_range(url, range, sink)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn head(&mut self, url: &str) -> DownloadResult<HeadInfo> {
        (**self).head(url)
    }

    fn get_range(
        &mut self,
        url: &str,
        range: ByteRange,
        sink: &mut dyn Write,
    ) -> DownloadResult<u64> {
        (**self).get_range(url, range, sink)
    }
}

/// Parse an optional `Content-Length` header value.
pub(crate) fn parse_content_length(url: &str, value: Option<&str>) -> DownloadResult<Option<u64>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| DownloadError::InvalidContentLength {
                    url: url.to_string(),
                    value: v.to_string(),
                })
        })
        .transpose()
}

/// Parse a `Content-Range: bytes <start>-<end>/<total>` value.
///
/// The total may be `*` when the server does not know it.
pub(crate) fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (bounds, total) = rest.split_once('/')?;
    let (start, end) = bounds.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    if end < start || total.is_some_and(|t| end >= t) {
        return None;
    }
    Some((start, end, total))
}

/// Decide whether a GET response may be used for `range`.
///
/// A `206` must carry a `Content-Range` that starts at `range.start` and ends
/// at `range.end`, or earlier only where the resource itself ends. A `200` is
/// accepted only when the full body is exactly the requested range, which
/// happens when the range starts at zero and covers the whole resource.
pub(crate) fn check_range_response(
    url: &str,
    range: ByteRange,
    status: u16,
    content_length: Option<u64>,
    content_range: Option<&str>,
) -> DownloadResult<()> {
    let not_honored = || DownloadError::RangeNotHonored {
        url: url.to_string(),
        range: range.to_string(),
        status,
    };

    match status {
        206 => {
            let (start, end, total) = content_range
                .and_then(parse_content_range)
                .ok_or_else(not_honored)?;
            let ends_at_eof = end < range.end && total == Some(end + 1);
            if start == range.start && (end == range.end || ends_at_eof) {
                Ok(())
            } else {
                debug!(url, requested = %range, content_range, "Server returned a different range");
                Err(not_honored())
            }
        }
        200 if range.start == 0 && content_length == Some(range.byte_count()) => Ok(()),
        200 => Err(not_honored()),
        _ => Err(DownloadError::HttpStatus {
            method: "GET",
            url: url.to_string(),
            status,
        }),
    }
}

/// Stream at most `limit` bytes from `body` into `sink`.
pub(crate) fn copy_body<R: Read>(
    url: &str,
    body: R,
    limit: u64,
    sink: &mut dyn Write,
) -> DownloadResult<u64> {
    let mut body = body.take(limit);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let bytes_read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DownloadError::request(url, format!("read error: {}", e))),
        };

        sink.write_all(&buffer[..bytes_read])
            .map_err(DownloadError::Sink)?;
        copied += bytes_read as u64;
    }

    Ok(copied)
}

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// PEM file with an additional trusted root.
    pub ca_certificate: Option<PathBuf>,
    /// Directory of PEM files with additional trusted roots.
    pub ca_path: Option<PathBuf>,
    /// Credentials for Digest authentication.
    pub credentials: Option<Credentials>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ca_certificate: None,
            ca_path: None,
            credentials: None,
        }
    }
}

impl TransportConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trust the certificate(s) in a PEM file.
    pub fn with_ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate = Some(path.into());
        self
    }

    /// Trust every PEM certificate in a directory.
    pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    /// Authenticate with HTTP Digest.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Blocking reqwest-backed transport.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    auth: Option<DigestAuth>,
}

impl HttpTransport {
    /// Build a transport from `config`.
    ///
    /// # Errors
    ///
    /// Fails if a configured CA file or directory cannot be loaded, or the
    /// client cannot be constructed.
    pub fn new(config: TransportConfig) -> DownloadResult<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(path) = &config.ca_certificate {
            builder = builder.add_root_certificate(load_certificate(path)?);
        }
        if let Some(dir) = &config.ca_path {
            for cert in load_certificate_dir(dir)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
            auth: config.credentials.map(DigestAuth::new),
        })
    }

    /// Configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn send(
        &mut self,
        method: Method,
        url: &str,
        range: Option<ByteRange>,
    ) -> DownloadResult<Response> {
        let uri = request_uri(url)?;
        let response = self.build(method.clone(), url, &uri, range).send();
        let response = response.map_err(|e| self.map_send_error(url, e))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(auth) = self.auth.as_mut() else {
            return Ok(response);
        };

        let challenge = response
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(DigestChallenge::parse)
            .ok_or_else(|| DownloadError::AuthenticationFailed {
                url: url.to_string(),
                reason: "server did not offer a supported Digest challenge".to_string(),
            })?;

        debug!(url, realm = %challenge.realm, "Received Digest challenge, retrying");
        auth.set_challenge(challenge);

        let retry = self
            .build(method, url, &uri, range)
            .send()
            .map_err(|e| self.map_send_error(url, e))?;

        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(DownloadError::AuthenticationFailed {
                url: url.to_string(),
                reason: "credentials rejected".to_string(),
            });
        }
        Ok(retry)
    }

    fn build(
        &mut self,
        method: Method,
        url: &str,
        uri: &str,
        range: Option<ByteRange>,
    ) -> RequestBuilder {
        let authorization = self
            .auth
            .as_mut()
            .and_then(|auth| auth.authorization(method.as_str(), uri));

        let mut request = self.client.request(method, url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            DownloadError::request(url, e)
        }
    }
}

impl Transport for HttpTransport {
    fn head(&mut self, url: &str) -> DownloadResult<HeadInfo> {
        let response = self.send(Method::HEAD, url, None)?;

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                method: "HEAD",
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        // reqwest reports a zero body length for HEAD, so read the header.
        let content_length = parse_content_length(
            url,
            response
                .headers()
                .get(CONTENT_LENGTH)
                .map(|v| v.to_str().unwrap_or("")),
        )?;

        Ok(HeadInfo { content_length })
    }

    fn get_range(
        &mut self,
        url: &str,
        range: ByteRange,
        sink: &mut dyn Write,
    ) -> DownloadResult<u64> {
        let response = self.send(Method::GET, url, Some(range))?;
        let content_length = parse_content_length(
            url,
            response
                .headers()
                .get(CONTENT_LENGTH)
                .map(|v| v.to_str().unwrap_or("")),
        )?;
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok());
        check_range_response(
            url,
            range,
            response.status().as_u16(),
            content_length,
            content_range,
        )?;

        copy_body(url, response, range.byte_count(), sink)
    }
}

/// Path and query of `url`, as sent in the request line.
pub(crate) fn request_uri(url: &str) -> DownloadResult<String> {
    let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidOption {
        option: "url",
        reason: format!("'{}': {}", url, e),
    })?;
    Ok(match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    })
}

fn load_certificate(path: &Path) -> DownloadResult<Certificate> {
    let pem = fs::read(path).map_err(|e| DownloadError::CaCertificate {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Certificate::from_pem(&pem).map_err(|e| DownloadError::CaCertificate {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn load_certificate_dir(dir: &Path) -> DownloadResult<Vec<Certificate>> {
    let entries = fs::read_dir(dir).map_err(|e| DownloadError::CaCertificate {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut certs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(pem) = fs::read(&path) else {
            continue;
        };
        if !pem.windows(11).any(|w| w == b"-----BEGIN ") {
            continue;
        }
        match Certificate::from_pem(&pem) {
            Ok(cert) => certs.push(cert),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable certificate"),
        }
    }

    debug!(dir = %dir.display(), count = certs.len(), "Loaded CA directory");
    Ok(certs)
}
