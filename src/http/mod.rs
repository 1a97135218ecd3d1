//! HTTP/1.x protocol engine
//!
//! The message model (headers, start lines, bodies), the wire codec over a
//! rewindable transport session, and the client/server session state machines.
//! One session owns one accepted or connected socket and serves exactly one
//! request/response cycle; keep-alive only decides whether the socket is left
//! open for the caller afterwards.

pub mod date;
pub mod headers;
pub mod message;
pub mod session;
pub mod wire;

pub use headers::HttpHeaders;
pub use message::{
    HttpMessage, Method, RequestLine, ResponseLine, Status, Version,
};
pub use session::{ClientSession, ServerSession};

use crate::transport::TransportError;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, HttpError>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl HttpError {
    /// Whether the underlying cause is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Transport(e) if e.is_timeout())
    }
}

/// CRLF line ending
pub const CRLF: &str = "\r\n";

/// Maximum number of header lines per message
pub const MAX_HEADER_LINES: usize = 64;

/// Maximum length of one start or header line
pub const MAX_LINE_LENGTH: usize = 8192;

/// Header field names the engine itself reads and writes
pub mod header {
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONNECTION: &str = "Connection";
    pub const MESSAGE_ID: &str = "Message-Id";
    pub const SERVER: &str = "Server";
    pub const DATE: &str = "Date";
    pub const USER_AGENT: &str = "User-Agent";
    pub const ACCEPT: &str = "Accept";
    pub const HOST: &str = "Host";
}
