//! Listener, dispatcher, and worker pools
//!
//! The accepting side of the engine: a listener per transport, a bounded
//! dispatch pool of connection threads, and per-path processor pools for
//! admission control.

mod dispatch;
pub mod listener;
pub mod pool;
pub mod processor;

pub use listener::{HttpListener, HttpsListener, ListenerTuning};
pub use pool::{PathPools, ProcessorPool, WILDCARD_PATH};
pub use processor::RequestProcessor;
