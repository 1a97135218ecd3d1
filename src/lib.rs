//! wireline - socket-level HTTP/1.x client/server engine
//!
//! A hand-built HTTP engine over a pluggable block-oriented transport layer:
//! plain TCP and TLS transports with rewindable reads, client and server
//! session state machines, and a listener that dispatches each accepted
//! connection to per-path bounded worker pools.
//!
//! # Example
//!
//! ```no_run
//! use wireline::http::ClientSession;
//! use wireline::transport::{TcpTransport, Transport, TransportConfig};
//!
//! let mut config = TransportConfig::new();
//! config.apply_all([("host", "127.0.0.1"), ("port", "8080")]).unwrap();
//!
//! let mut transport = TcpTransport::new(config);
//! let session = transport.connect().unwrap();
//! let mut client = ClientSession::new(session);
//! client.commit().unwrap();
//! assert_eq!(client.response_line().unwrap().status.code(), 200);
//! ```

pub mod http;
pub mod server;
pub mod transport;

pub use http::{ClientSession, HttpHeaders, HttpMessage, ServerSession};
pub use server::{HttpListener, HttpsListener, RequestProcessor};
pub use transport::{TransportConfig, TransportRegistry};
