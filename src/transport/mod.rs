//! Pluggable block-oriented transports
//!
//! A [`Transport`] produces connected or listening byte-stream sessions over
//! plain TCP or TLS. Transport kinds are looked up through an explicit
//! [`TransportRegistry`] keyed by a kind tag, so kinds stay statically known
//! and new ones are added by registration.

pub mod config;
pub mod session;
pub mod tcp;
pub mod tls;

pub use config::TransportConfig;
pub use session::{PollEvents, TransportSession, Wire};
pub use tcp::TcpTransport;
pub use tls::TlsTransport;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Configuration errors, raised at the first connect or listen call
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required property: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Transport operation errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed by peer")]
    Closed,

    #[error("rewind of {requested} bytes exceeds limit of {limit}")]
    RewindTooLarge { requested: usize, limit: usize },
}

impl TransportError {
    /// Whether this error is a timeout, recoverable by the caller
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// A factory for connected or listening sessions
pub trait Transport: Send {
    /// Bind the listening socket, if not already bound
    ///
    /// Idempotent. Fails with a configuration error when the listen port is
    /// absent.
    fn bind(&mut self) -> Result<()>;

    /// Local address of the bound listening socket
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Connect to the configured remote host and port
    fn connect(&mut self) -> Result<TransportSession>;

    /// Wait up to `timeout` for one inbound connection
    ///
    /// Binds lazily if needed. Returns [`TransportError::Timeout`] when no
    /// connection arrives in time, distinguishable from other errors so the
    /// caller can run periodic liveness checks without an extra thread.
    fn listen(&mut self, timeout: Duration) -> Result<TransportSession>;

    /// Close the listening socket
    fn unbind(&mut self);
}

/// Constructor function for one transport kind
pub type TransportFactory = fn(TransportConfig) -> Box<dyn Transport>;

/// Registry mapping kind tags to transport constructors
///
/// `tcp` and `tls` are registered by default; further kinds are added with
/// [`register`](TransportRegistry::register).
pub struct TransportRegistry {
    kinds: HashMap<String, TransportFactory>,
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        TransportRegistry {
            kinds: HashMap::new(),
        }
    }

    /// Create a registry with the built-in kinds
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("tcp", |config| Box::new(TcpTransport::new(config)));
        registry.register("tls", |config| Box::new(TlsTransport::new(config)));
        registry
    }

    /// Register a transport kind
    pub fn register(&mut self, kind: impl Into<String>, factory: TransportFactory) {
        self.kinds.insert(kind.into(), factory);
    }

    /// Create a transport of the given kind
    pub fn create(&self, kind: &str, config: TransportConfig) -> Option<Box<dyn Transport>> {
        self.kinds.get(kind).map(|factory| factory(config))
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}
