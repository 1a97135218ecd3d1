//! HTTP message types
//!
//! Start lines, methods, versions, status codes, and the message itself: a
//! header collection plus a body. Request and response lines parse from and
//! serialize to the wire independently of the headers.

use super::{header, HttpError, HttpHeaders, Result};
use std::cell::OnceCell;
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Parse method from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(HttpError::Parse(format!("invalid method: {}", s))),
        }
    }

    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// Parse version from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(HttpError::Parse(format!("invalid version: {}", s))),
        }
    }

    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::Http11
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a status code, validating the range
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status { code })
        } else {
            Err(HttpError::Parse(format!("invalid status code: {}", code)))
        }
    }

    /// Get the numeric code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            410 => "Gone",
            411 => "Length Required",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "Unknown",
        }
    }

    /// Whether this is an informational status (1xx)
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Whether this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Whether this is a client error status (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// Whether this is a server error status (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.code)
    }

    pub const OK: Status = Status { code: 200 };
    pub const BAD_REQUEST: Status = Status { code: 400 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// Request line: method, URI, protocol version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: String,
    pub version: Version,
}

impl RequestLine {
    /// Create a request line
    pub fn new(method: Method, uri: impl Into<String>, version: Version) -> Self {
        RequestLine {
            method,
            uri: uri.into(),
            version,
        }
    }

    /// Parse `METHOD URI VERSION`
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(HttpError::Parse(format!(
                "invalid request line: expected 3 parts, got {}",
                parts.len()
            )));
        }
        Ok(RequestLine {
            method: Method::from_str(parts[0])?,
            uri: parts[1].to_string(),
            version: Version::from_str(parts[2])?,
        })
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.uri, self.version)
    }
}

/// Response line: protocol version, status code, reason phrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub version: Version,
    pub status: Status,
    pub reason: String,
}

impl ResponseLine {
    /// Create a response line with the canonical reason phrase
    pub fn new(version: Version, status: Status) -> Self {
        ResponseLine {
            version,
            status,
            reason: status.reason_phrase().to_string(),
        }
    }

    /// Parse `VERSION STATUS [REASON]`
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.splitn(3, ' ').collect();
        if parts.len() < 2 {
            return Err(HttpError::Parse(format!("invalid response line: {}", line)));
        }
        let version = Version::from_str(parts[0])?;
        let code = parts[1]
            .parse::<u16>()
            .map_err(|_| HttpError::Parse(format!("invalid status code: {}", parts[1])))?;
        let status = Status::new(code)?;
        let reason = if parts.len() == 3 {
            parts[2].to_string()
        } else {
            status.reason_phrase().to_string()
        };
        Ok(ResponseLine {
            version,
            status,
            reason,
        })
    }
}

impl fmt::Display for ResponseLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.version, self.status.code(), self.reason)
    }
}

/// A header collection plus a body
///
/// The content type and the message name (`Message-Id`) are derived from the
/// headers on first access and cached; later header mutation does not refresh
/// the cached value. That staleness is deliberate, kept under test rather
/// than fixed.
#[derive(Debug, Default)]
pub struct HttpMessage {
    headers: HttpHeaders,
    body: Vec<u8>,
    content_type: OnceCell<Option<String>>,
    name: OnceCell<Option<String>>,
}

impl HttpMessage {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// The header collection
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    /// The header collection, mutably
    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    /// The body bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the body
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Append bytes to the body
    pub fn append_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Content type from the headers, cached on first access
    pub fn content_type(&self) -> Option<&str> {
        self.content_type
            .get_or_init(|| self.headers.get(header::CONTENT_TYPE).map(str::to_string))
            .as_deref()
    }

    /// Message name (the `Message-Id` header), cached on first access
    pub fn name(&self) -> Option<&str> {
        self.name
            .get_or_init(|| self.headers.get(header::MESSAGE_ID).map(str::to_string))
            .as_deref()
    }
}
