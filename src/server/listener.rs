//! HTTP listeners
//!
//! A listener binds its transport once, then runs an accept loop on a
//! dedicated thread. Each accepted connection becomes one dispatch task on a
//! bounded pool. The accept timeout doubles as the liveness check interval:
//! the loop observes the running flag between accepts, so `stop()` latency is
//! bounded by that timeout even with no traffic.

use super::dispatch;
use super::pool::{DispatchPool, PathPools};
use super::processor::RequestProcessor;
use crate::transport::{self, TcpTransport, TlsTransport, Transport, TransportConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Listener tunables
#[derive(Debug, Clone)]
pub struct ListenerTuning {
    /// Accept wait per loop iteration; bounds stop() latency
    pub accept_timeout: Duration,
    /// Dispatch pool size: maximum in-flight connections
    pub dispatch_workers: usize,
    /// Graceful shutdown wait for the dispatch pool
    pub shutdown_wait: Duration,
    /// Poll interval for the processor-pool borrow loop
    pub borrow_interval: Duration,
}

impl Default for ListenerTuning {
    fn default() -> Self {
        ListenerTuning {
            accept_timeout: Duration::from_secs(1),
            dispatch_workers: 8,
            shutdown_wait: Duration::from_secs(60),
            borrow_interval: Duration::from_millis(100),
        }
    }
}

/// Accepting side of the engine
///
/// Owns a transport, the per-path processor pools, and the accept thread.
pub struct HttpListener {
    transport: Option<Box<dyn Transport>>,
    pools: Arc<PathPools>,
    running: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<Box<dyn Transport>>>,
    tuning: ListenerTuning,
    local_addr: Option<SocketAddr>,
}

impl HttpListener {
    /// Create a plain TCP listener
    pub fn new(config: TransportConfig) -> Self {
        Self::with_transport(Box::new(TcpTransport::new(config)))
    }

    /// Create a listener over any transport
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        HttpListener {
            transport: Some(transport),
            pools: Arc::new(PathPools::new()),
            running: Arc::new(AtomicBool::new(false)),
            accept_thread: None,
            tuning: ListenerTuning::default(),
            local_addr: None,
        }
    }

    /// Replace the default tunables
    pub fn set_tuning(&mut self, tuning: ListenerTuning) {
        self.tuning = tuning;
    }

    /// Register a request processor under a path
    ///
    /// Registering N processors for one path allows N concurrent requests to
    /// that path. The path `*` is the wildcard pool for unmatched paths.
    pub fn add_processor(&self, path: impl Into<String>, processor: Box<dyn RequestProcessor>) {
        self.pools.register(path, processor);
    }

    /// Bind the listening socket, if not already bound
    pub fn initialise(&mut self) -> transport::Result<()> {
        if let Some(transport) = self.transport.as_mut() {
            transport.bind()?;
            self.local_addr = transport.local_addr();
        }
        Ok(())
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the accept loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind if needed and spawn the accept loop
    pub fn start(&mut self) -> transport::Result<()> {
        if self.accept_thread.is_some() {
            return Ok(());
        }
        self.initialise()?;
        let mut transport = match self.transport.take() {
            Some(transport) => transport,
            None => return Ok(()),
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let pools = Arc::clone(&self.pools);
        let tuning = self.tuning.clone();

        let handle = thread::Builder::new()
            .name("wireline-accept".to_string())
            .spawn(move || {
                let mut dispatch_pool = DispatchPool::new(tuning.dispatch_workers);
                tracing::info!("accept loop started");

                while running.load(Ordering::SeqCst) {
                    match transport.listen(tuning.accept_timeout) {
                        Ok(session) => {
                            let pools = Arc::clone(&pools);
                            let running = Arc::clone(&running);
                            let interval = tuning.borrow_interval;
                            let submitted = dispatch_pool.execute(Box::new(move || {
                                dispatch::handle_connection(session, pools, running, interval)
                            }));
                            if !submitted {
                                tracing::warn!("dispatch pool unavailable, dropping connection");
                            }
                        }
                        Err(e) if e.is_timeout() => continue,
                        Err(e) => {
                            // Transient accept and handshake failures must
                            // not kill the loop
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    }
                }

                tracing::info!("accept loop stopping");
                dispatch_pool.shutdown(tuning.shutdown_wait);
                transport.unbind();
                transport
            })
            .expect("failed to spawn accept thread");

        self.accept_thread = Some(handle);
        Ok(())
    }

    /// Stop the accept loop and wait for it to exit
    ///
    /// Latency is bounded by the accept timeout plus the shutdown wait.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            match handle.join() {
                Ok(transport) => self.transport = Some(transport),
                Err(_) => tracing::error!("accept thread panicked"),
            }
        }
        self.local_addr = None;
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Factory for listeners over TLS
///
/// Same machinery as [`HttpListener`], with a [`TlsTransport`] underneath;
/// the configuration must carry a keystore for the server identity.
pub struct HttpsListener;

impl HttpsListener {
    /// Create a TLS listener
    pub fn new(config: TransportConfig) -> HttpListener {
        HttpListener::with_transport(Box::new(TlsTransport::new(config)))
    }
}
