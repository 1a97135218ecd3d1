//! Per-connection dispatch task
//!
//! One task per accepted connection: read the request, resolve the path's
//! worker pool, borrow a worker (re-checking listener liveness each poll),
//! run it, commit, and return the worker. Every failure path ends in a
//! best-effort generic response; nothing thrown here may escape the dispatch
//! thread.

use super::pool::PathPools;
use crate::http::{wire, HttpHeaders, ResponseLine, ServerSession, Status, Version};
use crate::http::header;
use crate::transport::TransportSession;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handle one accepted connection
pub(crate) fn handle_connection(
    session: TransportSession,
    pools: Arc<PathPools>,
    running: Arc<AtomicBool>,
    borrow_interval: Duration,
) {
    let mut server = match ServerSession::read_from(session) {
        Ok(server) => server,
        Err((transport, e)) => {
            tracing::warn!(error = %e, "failed to read request");
            respond_raw(transport, Status::BAD_REQUEST);
            return;
        }
    };

    let path = server.request_line().uri.clone();
    let pool = match pools.resolve(&path) {
        Some(pool) => pool,
        None => {
            tracing::debug!(path, "no processor registered");
            synthesize(&mut server, Status::NOT_FOUND);
            return;
        }
    };

    // Poll for a worker, bailing out promptly when the listener stops
    let mut worker = loop {
        if !running.load(Ordering::SeqCst) {
            synthesize(&mut server, Status::INTERNAL_SERVER_ERROR);
            return;
        }
        if let Some(worker) = pool.borrow(borrow_interval) {
            break worker;
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.process(&mut server)));
    // The worker goes back even when processing failed
    pool.restore(worker);

    match outcome {
        Ok(Ok(())) => {
            if let Err(e) = server.commit() {
                tracing::warn!(path, error = %e, "commit failed");
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(path, error = %e, "processor failed");
            synthesize(&mut server, Status::INTERNAL_SERVER_ERROR);
        }
        Err(_) => {
            tracing::error!(path, "processor panicked");
            synthesize(&mut server, Status::INTERNAL_SERVER_ERROR);
        }
    }
}

/// Commit a generic response, best-effort
fn synthesize(server: &mut ServerSession, status: Status) {
    server.set_generic_response(status);
    if let Err(e) = server.commit() {
        tracing::warn!(status = status.code(), error = %e, "failed to send generic response");
    }
}

/// Answer on a connection whose request never parsed
fn respond_raw(mut transport: TransportSession, status: Status) {
    let line = ResponseLine::new(Version::Http11, status);
    let mut headers = HttpHeaders::new();
    headers.put(header::CONNECTION, Some("close"));
    headers.put(header::CONTENT_LENGTH, Some("0"));
    if let Err(e) = wire::write_message(&mut transport, &line.to_string(), &headers, b"") {
        tracing::debug!(error = %e, "failed to answer malformed request");
    }
    transport.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::session::testing::{MockWire, WireLog};
    use std::sync::Mutex;

    fn run(input: &[u8], pools: Arc<PathPools>) -> Arc<Mutex<WireLog>> {
        let (wire, log) = MockWire::new(input);
        let session = TransportSession::new(Box::new(wire), Duration::from_secs(1), 1024);
        let running = Arc::new(AtomicBool::new(true));
        handle_connection(session, pools, running, Duration::from_millis(10));
        log
    }

    fn response(log: &Arc<Mutex<WireLog>>) -> String {
        String::from_utf8(log.lock().unwrap().written.clone()).unwrap()
    }

    #[test]
    fn test_unregistered_path_gets_404() {
        let pools = Arc::new(PathPools::new());
        let log = run(b"GET /foo HTTP/1.1\r\nHost: t\r\n\r\n", pools);
        assert!(response(&log).starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn test_malformed_request_gets_400() {
        let pools = Arc::new(PathPools::new());
        let log = run(b"garbage\r\n\r\n", pools);
        assert!(response(&log).starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_registered_path_processed() {
        let pools = Arc::new(PathPools::new());
        pools.register("/hello", Box::new(|s: &mut ServerSession| {
            s.response_mut().set_body(b"hi".to_vec());
            Ok(())
        }));
        let log = run(b"GET /hello HTTP/1.1\r\nHost: t\r\n\r\n", pools.clone());
        let out = response(&log);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("hi"));
        // Worker restored
        assert_eq!(pools.resolve("/hello").unwrap().available_workers(), 1);
    }

    #[test]
    fn test_failing_processor_gets_500_and_worker_restored() {
        let pools = Arc::new(PathPools::new());
        pools.register("/bad", Box::new(|_: &mut ServerSession| {
            Err(crate::http::HttpError::Protocol("boom".to_string()))
        }));
        let log = run(b"GET /bad HTTP/1.1\r\nHost: t\r\n\r\n", pools.clone());
        assert!(response(&log).starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert_eq!(pools.resolve("/bad").unwrap().available_workers(), 1);
    }

    #[test]
    fn test_panicking_processor_gets_500() {
        let pools = Arc::new(PathPools::new());
        pools.register("/panic", Box::new(|_: &mut ServerSession| -> crate::http::Result<()> {
            panic!("worker blew up")
        }));
        let log = run(b"GET /panic HTTP/1.1\r\nHost: t\r\n\r\n", pools.clone());
        assert!(response(&log).starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert_eq!(pools.resolve("/panic").unwrap().available_workers(), 1);
    }

    #[test]
    fn test_stopped_listener_gets_500() {
        let pools = Arc::new(PathPools::new());
        // Registered path but the pool's only worker is never available and
        // the running flag is down, so the borrow loop bails out
        pools.register("/busy", Box::new(|_: &mut ServerSession| Ok(())));
        let borrowed = pools.resolve("/busy").unwrap().borrow(Duration::from_millis(10)).unwrap();

        let (wire, log) = MockWire::new(b"GET /busy HTTP/1.1\r\nHost: t\r\n\r\n");
        let session = TransportSession::new(Box::new(wire), Duration::from_secs(1), 1024);
        let running = Arc::new(AtomicBool::new(false));
        handle_connection(session, pools.clone(), running, Duration::from_millis(10));

        assert!(response(&log).starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        pools.resolve("/busy").unwrap().restore(borrowed);
    }

    #[test]
    fn test_wildcard_fallback() {
        let pools = Arc::new(PathPools::new());
        pools.register("*", Box::new(|s: &mut ServerSession| {
            s.response_mut().set_body(b"wild".to_vec());
            Ok(())
        }));
        let log = run(b"GET /anything HTTP/1.1\r\nHost: t\r\n\r\n", pools);
        assert!(response(&log).ends_with("wild"));
    }
}
