//! Integration tests for resumable downloads against a local HTTP server.
//!
//! Each test starts a small HTTP/1.1 server on a loopback port in a
//! background thread. The server serves one in-memory image, honors
//! `Range` requests, can drop a connection part-way through a body, and can
//! require Digest authentication.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use vhdsync::download::{
    digest_response, Credentials, DigestChallenge, DigestRequest, DownloadError,
    DownloadOutcome, DownloadSession, HttpTransport, ProgressReporter, SessionOptions,
    SessionState, SocketTransport, TransportConfig,
};
use vhdsync::ErrorKind;

// ============================================================================
// Test server
// ============================================================================

const REALM: &str = "images@test";
const NONCE: &str = "7a2f9c0b1d";

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    range: Option<String>,
    authorized: bool,
}

#[derive(Default)]
struct ServerConfig {
    /// GET request (0-based) whose body is cut short before closing.
    truncate_get: Option<usize>,
    /// Answer every GET with the full body and status 200.
    ignore_range: bool,
    /// Answer every ranged GET with a 206 for the same length from offset 0.
    misplace_range: bool,
    /// Omit Content-Length from HEAD responses.
    hide_length: bool,
    /// Require Digest auth with these credentials.
    credentials: Option<Credentials>,
}

struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    fn start(data: Vec<u8>, config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let addr = listener.local_addr().expect("listener addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let shared = Arc::new(ServerState {
            data,
            config,
            requests: Arc::clone(&requests),
            gets: Mutex::new(0),
        });

        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || state.serve(stream));
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn get_ranges(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET" && r.authorized)
            .filter_map(|r| r.range)
            .collect()
    }
}

struct ServerState {
    data: Vec<u8>,
    config: ServerConfig,
    requests: Arc<Mutex<Vec<Recorded>>>,
    gets: Mutex<usize>,
}

impl ServerState {
    fn serve(&self, stream: TcpStream) {
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut writer = stream;

        loop {
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
                return;
            }
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or("").to_string();
            let path = parts.next().unwrap_or("").to_string();

            let mut headers = HashMap::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                }
            }

            let authorized = self.check_auth(&method, &path, headers.get("authorization"));
            let range = headers
                .get("range")
                .and_then(|r| r.strip_prefix("bytes="))
                .map(str::to_string);
            self.requests.lock().unwrap().push(Recorded {
                method: method.clone(),
                range: range.clone(),
                authorized,
            });

            if !authorized {
                let response = format!(
                    "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Digest realm=\"{}\", qop=\"auth\", nonce=\"{}\", opaque=\"0p4qu3\"\r\nContent-Length: 0\r\n\r\n",
                    REALM, NONCE
                );
                if writer.write_all(response.as_bytes()).is_err() {
                    return;
                }
                continue;
            }

            let keep_going = match method.as_str() {
                "HEAD" => self.head(&mut writer),
                "GET" => self.get(&mut writer, range.as_deref()),
                _ => false,
            };
            if !keep_going {
                return;
            }
        }
    }

    fn check_auth(&self, method: &str, uri: &str, header: Option<&String>) -> bool {
        let Some(credentials) = &self.config.credentials else {
            return true;
        };
        let Some(header) = header.and_then(|h| h.strip_prefix("Digest ")) else {
            return false;
        };
        let params: HashMap<&str, &str> = header
            .split(", ")
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k, v.trim_matches('"')))
            .collect();

        let challenge = DigestChallenge::parse(&format!(
            "Digest realm=\"{}\", qop=\"auth\", nonce=\"{}\"",
            REALM, NONCE
        ))
        .expect("challenge");
        let nonce_count = u32::from_str_radix(params.get("nc").copied().unwrap_or("0"), 16).unwrap_or(0);
        let expected = digest_response(
            credentials,
            &challenge,
            &DigestRequest {
                method,
                uri,
                nonce_count,
                cnonce: params.get("cnonce").copied().unwrap_or(""),
            },
        );

        params.get("username") == Some(&credentials.username.as_str())
            && params.get("uri") == Some(&uri)
            && params.get("opaque") == Some(&"0p4qu3")
            && params.get("response") == Some(&expected.as_str())
    }

    fn head(&self, writer: &mut TcpStream) -> bool {
        let response = if self.config.hide_length {
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_string()
        } else {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n\r\n",
                self.data.len()
            )
        };
        writer.write_all(response.as_bytes()).is_ok()
    }

    fn get(&self, writer: &mut TcpStream, range: Option<&str>) -> bool {
        let index = {
            let mut gets = self.gets.lock().unwrap();
            *gets += 1;
            *gets - 1
        };

        let bounds = range.filter(|_| !self.config.ignore_range).and_then(|r| {
            let (start, end) = r.split_once('-')?;
            Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?))
        });

        let bounds = bounds.map(|(start, end)| {
            let end = end.min(self.data.len() - 1);
            if self.config.misplace_range {
                (0, end - start)
            } else {
                (start, end)
            }
        });

        let (status, body, content_range) = match bounds {
            Some((start, end)) => (
                "206 Partial Content",
                &self.data[start..=end],
                Some(format!("bytes {}-{}/{}", start, end, self.data.len())),
            ),
            None => ("200 OK", &self.data[..], None),
        };

        let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\n", status, body.len());
        if let Some(value) = content_range {
            head.push_str(&format!("Content-Range: {}\r\n", value));
        }
        head.push_str("\r\n");
        if writer.write_all(head.as_bytes()).is_err() {
            return false;
        }

        if self.config.truncate_get == Some(index) {
            let _ = writer.write_all(&body[..body.len() / 2]);
            let _ = writer.flush();
            let _ = writer.shutdown(std::net::Shutdown::Both);
            return false;
        }

        writer.write_all(body).is_ok()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}

fn http_transport() -> HttpTransport {
    HttpTransport::new(TransportConfig::new().with_timeout(Duration::from_secs(10)))
        .expect("build transport")
}

fn session(
    server: &TestServer,
    dir: &TempDir,
    chunk_size: u64,
    transport: HttpTransport,
) -> DownloadSession<HttpTransport> {
    let options = SessionOptions::new(server.url("/images/disk.vhd"), dir.path(), "disk.vhd")
        .with_chunk_size(chunk_size);
    DownloadSession::open(options, transport, ProgressReporter::none()).expect("open session")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_download_in_three_ranges() {
    let data = image(25);
    let server = TestServer::start(data.clone(), ServerConfig::default());
    let dir = TempDir::new().unwrap();

    let outcome = session(&server, &dir, 10, http_transport()).run().unwrap();

    assert_eq!(outcome, DownloadOutcome::Downloaded);
    assert_eq!(server.get_ranges(), ["0-9", "10-19", "20-24"]);
    assert_eq!(fs::read(dir.path().join("disk.vhd")).unwrap(), data);
    assert!(!dir.path().join("disk.vhd.part").exists());
}

#[test]
fn test_existing_image_is_not_fetched() {
    let server = TestServer::start(image(25), ServerConfig::default());
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("disk.vhd"), b"already here").unwrap();

    let mut session = session(&server, &dir, 10, http_transport());
    assert_eq!(session.run().unwrap(), DownloadOutcome::AlreadyExists);
    assert_eq!(session.state(), SessionState::AlreadyExists);
    assert!(server.requests().is_empty());
}

#[test]
fn test_interrupted_download_resumes() {
    let data = image(95);
    let server = TestServer::start(
        data.clone(),
        ServerConfig {
            truncate_get: Some(2),
            ..Default::default()
        },
    );
    let dir = TempDir::new().unwrap();

    let err = session(&server, &dir, 10, http_transport()).run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    let partial_len = fs::metadata(dir.path().join("disk.vhd.part")).unwrap().len();
    assert!((20..30).contains(&partial_len), "partial is {} bytes", partial_len);
    assert!(!dir.path().join("disk.vhd").exists());

    let mut resumed = session(&server, &dir, 10, http_transport());
    assert_eq!(resumed.run().unwrap(), DownloadOutcome::Downloaded);
    assert_eq!(resumed.start_offset(), partial_len);
    assert_eq!(fs::read(dir.path().join("disk.vhd")).unwrap(), data);
}

#[test]
fn test_server_ignoring_ranges_is_rejected() {
    let server = TestServer::start(
        image(25),
        ServerConfig {
            ignore_range: true,
            ..Default::default()
        },
    );
    let dir = TempDir::new().unwrap();

    let err = session(&server, &dir, 10, http_transport()).run().unwrap_err();
    assert!(matches!(err, DownloadError::RangeNotHonored { .. }), "{:?}", err);
    assert_eq!(
        fs::metadata(dir.path().join("disk.vhd.part")).unwrap().len(),
        0
    );
}

#[test]
fn test_partial_content_at_wrong_offset_is_rejected() {
    let data = image(25);
    let server = TestServer::start(
        data.clone(),
        ServerConfig {
            misplace_range: true,
            ..Default::default()
        },
    );
    let dir = TempDir::new().unwrap();

    let mut session = session(&server, &dir, 10, http_transport());
    let err = session.run().unwrap_err();
    assert!(matches!(err, DownloadError::RangeNotHonored { status: 206, .. }), "{:?}", err);
    assert_eq!(session.state(), SessionState::Failed);

    // Only the first range lined up; nothing from the misplaced reply landed.
    assert_eq!(server.get_ranges(), ["0-9", "10-19"]);
    assert_eq!(
        fs::read(dir.path().join("disk.vhd.part")).unwrap(),
        &data[..10]
    );
    assert!(!dir.path().join("disk.vhd").exists());
}

#[test]
fn test_whole_file_in_one_200_is_accepted() {
    let data = image(25);
    let server = TestServer::start(
        data.clone(),
        ServerConfig {
            ignore_range: true,
            ..Default::default()
        },
    );
    let dir = TempDir::new().unwrap();

    let outcome = session(&server, &dir, 100, http_transport()).run().unwrap();
    assert_eq!(outcome, DownloadOutcome::Downloaded);
    assert_eq!(fs::read(dir.path().join("disk.vhd")).unwrap(), data);
}

#[test]
fn test_missing_content_length() {
    let server = TestServer::start(
        image(25),
        ServerConfig {
            hide_length: true,
            ..Default::default()
        },
    );
    let dir = TempDir::new().unwrap();

    let err = session(&server, &dir, 10, http_transport()).run().unwrap_err();
    assert!(matches!(err, DownloadError::MissingContentLength { .. }), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[test]
fn test_digest_authentication() {
    let data = image(25);
    let credentials = Credentials::new("operator", "s3cret");
    let server = TestServer::start(
        data.clone(),
        ServerConfig {
            credentials: Some(credentials.clone()),
            ..Default::default()
        },
    );
    let dir = TempDir::new().unwrap();

    let transport = HttpTransport::new(
        TransportConfig::new()
            .with_timeout(Duration::from_secs(10))
            .with_credentials(credentials),
    )
    .unwrap();
    let outcome = session(&server, &dir, 10, transport).run().unwrap();

    assert_eq!(outcome, DownloadOutcome::Downloaded);
    assert_eq!(fs::read(dir.path().join("disk.vhd")).unwrap(), data);

    // Only the first request is challenged; the cached challenge is reused.
    let unauthorized = server.requests().iter().filter(|r| !r.authorized).count();
    assert_eq!(unauthorized, 1);
    assert_eq!(server.get_ranges(), ["0-9", "10-19", "20-24"]);
}

#[test]
fn test_wrong_credentials_fail() {
    let server = TestServer::start(
        image(25),
        ServerConfig {
            credentials: Some(Credentials::new("operator", "s3cret")),
            ..Default::default()
        },
    );
    let dir = TempDir::new().unwrap();

    let transport = HttpTransport::new(
        TransportConfig::new().with_credentials(Credentials::new("operator", "guess")),
    )
    .unwrap();
    let err = session(&server, &dir, 10, transport).run().unwrap_err();
    assert!(matches!(err, DownloadError::AuthenticationFailed { .. }), "{:?}", err);
}

#[test]
fn test_socket_transport_over_connected_stream() {
    let data = image(42);
    let server = TestServer::start(data.clone(), ServerConfig::default());
    let dir = TempDir::new().unwrap();

    let addr = server.base_url.trim_start_matches("http://");
    let stream = TcpStream::connect(addr).unwrap();
    let transport = SocketTransport::new(stream);

    let options = SessionOptions::new(server.url("/disk.vhd"), dir.path(), "disk.vhd")
        .with_chunk_size(16);
    let mut session = DownloadSession::open(options, transport, ProgressReporter::none()).unwrap();
    assert_eq!(session.run().unwrap(), DownloadOutcome::Downloaded);

    assert_eq!(server.get_ranges(), ["0-15", "16-31", "32-41"]);
    assert_eq!(fs::read(dir.path().join("disk.vhd")).unwrap(), data);
}

#[test]
fn test_progress_lines() {
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);
    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let server = TestServer::start(image(25), ServerConfig::default());
    let dir = TempDir::new().unwrap();
    let sink = Shared::default();

    let options = SessionOptions::new(server.url("/disk.vhd"), dir.path(), "disk.vhd")
        .with_chunk_size(10);
    let mut session = DownloadSession::open(
        options,
        http_transport(),
        ProgressReporter::new(Box::new(sink.clone())),
    )
    .unwrap();
    session.run().unwrap();

    let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
    assert_eq!(
        text,
        "Progress : 0\nProgress : 40\nProgress : 80\nProgress : 100\n"
    );
}
