//! HTTP Digest access authentication (RFC 7616).
//!
//! The first request to a server goes out unauthenticated. When it answers
//! `401` with a `WWW-Authenticate: Digest ...` challenge, the challenge is
//! cached in [`DigestAuth`] and every following request carries an
//! `Authorization` header computed from it, with an incrementing nonce count.

use std::fmt;
use std::str::FromStr;

use crate::checksum::HashAlgorithm;

use super::error::DownloadError;

/// Username and password for Digest authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl FromStr for Credentials {
    type Err = DownloadError;

    /// Parse `user:password`. The password may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((user, pass)) if !user.is_empty() => Ok(Self::new(user, pass)),
            _ => Err(DownloadError::InvalidCredentials),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hash function named by a challenge's `algorithm` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    fn token(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }

    fn hash_hex(self, input: &str) -> String {
        let algorithm = match self {
            Self::Md5 => HashAlgorithm::Md5,
            Self::Sha256 => HashAlgorithm::Sha256,
        };
        algorithm.digest(input.as_bytes()).to_hex()
    }
}

/// A parsed `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: DigestAlgorithm,
    /// Server offered `qop=auth`.
    pub qop_auth: bool,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for non-Digest schemes, challenges without a nonce and
    /// algorithms other than MD5 and SHA-256.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut realm = String::new();
        let mut nonce = None;
        let mut opaque = None;
        let mut algorithm = DigestAlgorithm::Md5;
        let mut qop_auth = false;

        for (key, value) in parse_params(rest) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = value,
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "algorithm" => {
                    algorithm = match value.to_ascii_uppercase().as_str() {
                        "MD5" => DigestAlgorithm::Md5,
                        "SHA-256" => DigestAlgorithm::Sha256,
                        _ => return None,
                    }
                }
                "qop" => {
                    qop_auth = value
                        .split(',')
                        .any(|q| q.trim().eq_ignore_ascii_case("auth"))
                }
                _ => {}
            }
        }

        Some(Self {
            realm,
            nonce: nonce?,
            opaque,
            algorithm,
            qop_auth,
        })
    }
}

/// Split `key=value, key="quoted, value"` pairs.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let key: String = chars
            .by_ref()
            .take_while(|&c| c != '=')
            .collect::<String>()
            .trim()
            .to_string();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        params.push((key, value));
    }

    params
}

/// Inputs to a single digest response computation.
#[derive(Debug, Clone, Copy)]
pub struct DigestRequest<'a> {
    pub method: &'a str,
    pub uri: &'a str,
    pub nonce_count: u32,
    pub cnonce: &'a str,
}

/// Compute the `response` parameter for `request` under `challenge`.
pub fn digest_response(
    credentials: &Credentials,
    challenge: &DigestChallenge,
    request: &DigestRequest<'_>,
) -> String {
    let alg = challenge.algorithm;
    let ha1 = alg.hash_hex(&format!(
        "{}:{}:{}",
        credentials.username, challenge.realm, credentials.password
    ));
    let ha2 = alg.hash_hex(&format!("{}:{}", request.method, request.uri));

    if challenge.qop_auth {
        alg.hash_hex(&format!(
            "{}:{}:{:08x}:{}:auth:{}",
            ha1, challenge.nonce, request.nonce_count, request.cnonce, ha2
        ))
    } else {
        alg.hash_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2))
    }
}

/// Digest authentication state for one server.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    credentials: Credentials,
    challenge: Option<DigestChallenge>,
    nonce_count: u32,
}

impl DigestAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            challenge: None,
            nonce_count: 0,
        }
    }

    /// Whether a challenge has been received.
    pub fn has_challenge(&self) -> bool {
        self.challenge.is_some()
    }

    /// Cache a new challenge, resetting the nonce count.
    pub fn set_challenge(&mut self, challenge: DigestChallenge) {
        self.challenge = Some(challenge);
        self.nonce_count = 0;
    }

    /// Build the `Authorization` header for the next request, if a challenge
    /// is cached.
    pub fn authorization(&mut self, method: &str, uri: &str) -> Option<String> {
        let challenge = self.challenge.as_ref()?;
        self.nonce_count = self.nonce_count.wrapping_add(1);
        let cnonce = format!("{:016x}", rand::random::<u64>());
        let request = DigestRequest {
            method,
            uri,
            nonce_count: self.nonce_count,
            cnonce: &cnonce,
        };
        Some(format_authorization(&self.credentials, challenge, &request))
    }
}

fn format_authorization(
    credentials: &Credentials,
    challenge: &DigestChallenge,
    request: &DigestRequest<'_>,
) -> String {
    let response = digest_response(credentials, challenge, request);
    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}, response=\"{}\"",
        quote(&credentials.username),
        quote(&challenge.realm),
        quote(&challenge.nonce),
        quote(request.uri),
        challenge.algorithm.token(),
        response
    );
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{}\"", quote(opaque)));
    }
    if challenge.qop_auth {
        header.push_str(&format!(
            ", qop=auth, nc={:08x}, cnonce=\"{}\"",
            request.nonce_count, request.cnonce
        ));
    }
    header
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
