//! Plain HTTP/1.1 over a socket connected by the caller.
//!
//! A supervising process may hand over an already-connected socket (for
//! example one that has been through a proxy handshake). Requests are sent
//! over it with keep-alive; TLS and authentication are not applied here.

use std::io::{BufRead, BufReader, Read, Write};

use reqwest::Url;
use tracing::debug;

use super::error::{DownloadError, DownloadResult};
use super::transport::{
    check_range_response, copy_body, parse_content_length, request_uri, ByteRange, HeadInfo,
    Transport,
};

/// Longest accepted status or header line.
const MAX_LINE_LEN: usize = 8 * 1024;

/// Most header lines accepted in one response.
const MAX_HEADERS: usize = 100;

/// Status line and the headers the downloader cares about.
#[derive(Debug, Default)]
struct ResponseHead {
    status: u16,
    content_length: Option<String>,
    content_range: Option<String>,
    chunked: bool,
}

/// Transport that speaks HTTP/1.1 directly on a connected stream.
#[derive(Debug)]
pub struct SocketTransport<S: Read + Write> {
    stream: BufReader<S>,
}

impl<S: Read + Write> SocketTransport<S> {
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Release the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    fn send_request(
        &mut self,
        method: &str,
        url: &str,
        range: Option<ByteRange>,
    ) -> DownloadResult<ResponseHead> {
        let request = format_request(method, url, range)?;
        debug!(method, url, range = ?range.map(|r| r.to_string()), "Sending request on connected socket");

        let stream = self.stream.get_mut();
        stream
            .write_all(request.as_bytes())
            .and_then(|_| stream.flush())
            .map_err(DownloadError::Connection)?;

        self.read_head(url)
    }

    fn read_line(&mut self, url: &str) -> DownloadResult<String> {
        let mut line = Vec::new();
        let n = (&mut self.stream)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut line)
            .map_err(DownloadError::Connection)?;
        if n == 0 {
            return Err(DownloadError::request(url, "connection closed by peer"));
        }
        if line.last() != Some(&b'\n') {
            return Err(DownloadError::request(url, "response line too long"));
        }
        let text = String::from_utf8_lossy(&line);
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_head(&mut self, url: &str) -> DownloadResult<ResponseHead> {
        let status_line = self.read_line(url)?;
        let mut head = ResponseHead {
            status: parse_status_line(&status_line)
                .ok_or_else(|| DownloadError::request(url, format!("malformed status line '{}'", status_line)))?,
            ..Default::default()
        };

        for _ in 0..MAX_HEADERS {
            let line = self.read_line(url)?;
            if line.is_empty() {
                return Ok(head);
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                head.content_length = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("content-range") {
                head.content_range = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("transfer-encoding") {
                head.chunked = value.to_ascii_lowercase().contains("chunked");
            }
        }

        Err(DownloadError::request(url, "too many response headers"))
    }

    /// Read and discard a body so the connection can be reused.
    fn drain(&mut self, url: &str, len: u64) -> DownloadResult<()> {
        io_copy_discard(&mut self.stream, len).map_err(DownloadError::Connection)?;
        debug!(url, bytes = len, "Discarded response body");
        Ok(())
    }
}

impl<S: Read + Write> Transport for SocketTransport<S> {
    fn head(&mut self, url: &str) -> DownloadResult<HeadInfo> {
        let head = self.send_request("HEAD", url, None)?;
        if !(200..300).contains(&head.status) {
            return Err(DownloadError::HttpStatus {
                method: "HEAD",
                url: url.to_string(),
                status: head.status,
            });
        }
        let content_length = parse_content_length(url, head.content_length.as_deref())?;
        Ok(HeadInfo { content_length })
    }

    fn get_range(
        &mut self,
        url: &str,
        range: ByteRange,
        sink: &mut dyn Write,
    ) -> DownloadResult<u64> {
        let head = self.send_request("GET", url, Some(range))?;
        if head.chunked {
            return Err(DownloadError::request(
                url,
                "chunked responses are not supported on a connected socket",
            ));
        }
        let content_length = parse_content_length(url, head.content_length.as_deref())?;

        if let Err(e) = check_range_response(
            url,
            range,
            head.status,
            content_length,
            head.content_range.as_deref(),
        ) {
            if let Some(len) = content_length {
                // Keep the connection usable for the caller's next attempt.
                let _ = self.drain(url, len);
            }
            return Err(e);
        }

        let body_len = content_length.unwrap_or(range.byte_count());
        let copied = copy_body(url, &mut self.stream, body_len.min(range.byte_count()), sink)?;
        if body_len > range.byte_count() {
            self.drain(url, body_len - range.byte_count())?;
        }
        Ok(copied)
    }
}

#[cfg(unix)]
impl SocketTransport<std::net::TcpStream> {
    /// Adopt an inherited, already-connected socket descriptor.
    ///
    /// # Safety
    ///
    /// `fd` must be an open, connected stream socket owned by nobody else;
    /// the transport closes it when dropped.
    pub unsafe fn from_raw_fd(fd: std::os::unix::io::RawFd) -> Self {
        use std::os::unix::io::FromRawFd;
        Self::new(std::net::TcpStream::from_raw_fd(fd))
    }
}

fn format_request(method: &str, url: &str, range: Option<ByteRange>) -> DownloadResult<String> {
    let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidOption {
        option: "url",
        reason: format!("'{}': {}", url, e),
    })?;
    let host = parsed.host_str().ok_or_else(|| DownloadError::InvalidOption {
        option: "url",
        reason: format!("'{}' has no host", url),
    })?;
    let host = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut request = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: vhdsync/{}\r\nAccept: */*\r\nConnection: keep-alive\r\n",
        method,
        request_uri(url)?,
        host,
        env!("CARGO_PKG_VERSION"),
    );
    if let Some(range) = range {
        request.push_str(&format!("Range: {}\r\n", range.header_value()));
    }
    request.push_str("\r\n");
    Ok(request)
}

fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/1.") {
        return None;
    }
    parts.next()?.parse().ok()
}

fn io_copy_discard<R: Read>(reader: &mut R, len: u64) -> std::io::Result<u64> {
    std::io::copy(&mut reader.take(len), &mut std::io::sink())
}
