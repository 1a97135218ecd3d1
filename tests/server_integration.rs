//! End-to-end tests for the listener and dispatcher

use std::net::TcpListener as StdTcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use wireline::http::{ClientSession, Method, RequestLine, ServerSession, Version};
use wireline::server::{HttpListener, ListenerTuning};
use wireline::transport::{TcpTransport, Transport, TransportConfig};

fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn listener() -> HttpListener {
    trace_init();
    let mut config = TransportConfig::new();
    config.apply("listenport", "0").unwrap();
    let mut listener = HttpListener::new(config);
    listener.set_tuning(ListenerTuning {
        accept_timeout: Duration::from_millis(100),
        dispatch_workers: 4,
        shutdown_wait: Duration::from_secs(5),
        borrow_interval: Duration::from_millis(20),
    });
    listener
}

fn client(port: u16) -> ClientSession {
    let mut config = TransportConfig::new();
    config
        .apply_all([
            ("host", "127.0.0.1"),
            ("port", &port.to_string()),
            ("timeout", "5000"),
        ])
        .unwrap();
    let session = TcpTransport::new(config).connect().unwrap();
    ClientSession::new(session)
}

fn get(port: u16, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
    let mut client = client(port);
    client.set_request_line(RequestLine::new(Method::Get, path, Version::Http11));
    client.request_mut().set_body(body.to_vec());
    client.commit().unwrap();
    (
        client.response_line().unwrap().status.code(),
        client.response().body().to_vec(),
    )
}

#[test]
fn test_echo_end_to_end() {
    let mut server = listener();
    server.add_processor(
        "/echo",
        Box::new(|session: &mut ServerSession| {
            let body = session.request().body().to_vec();
            session.response_mut().set_body(body);
            Ok(())
        }),
    );
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();

    let (status, body) = get(port, "/echo", b"hello");
    assert_eq!(status, 200);
    assert_eq!(body, b"hello");

    server.stop();
}

#[test]
fn test_unregistered_path_returns_404() {
    let mut server = listener();
    server.add_processor("/known", Box::new(|_: &mut ServerSession| Ok(())));
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();

    let (status, _) = get(port, "/foo", b"");
    assert_eq!(status, 404);

    server.stop();
}

#[test]
fn test_wildcard_fallback() {
    let mut server = listener();
    server.add_processor(
        "*",
        Box::new(|session: &mut ServerSession| {
            session.response_mut().set_body(b"wild".to_vec());
            Ok(())
        }),
    );
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();

    let (status, body) = get(port, "/whatever", b"");
    assert_eq!(status, 200);
    assert_eq!(body, b"wild");

    server.stop();
}

#[test]
fn test_single_worker_serializes_requests() {
    let mut server = listener();
    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&spans);

    server.add_processor(
        "/slow",
        Box::new(move |_: &mut ServerSession| {
            let started = Instant::now();
            thread::sleep(Duration::from_millis(300));
            recorder.lock().unwrap().push((started, Instant::now()));
            Ok(())
        }),
    );
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();

    let a = thread::spawn(move || get(port, "/slow", b""));
    let b = thread::spawn(move || get(port, "/slow", b""));
    assert_eq!(a.join().unwrap().0, 200);
    assert_eq!(b.join().unwrap().0, 200);

    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 2);
    // One worker: the second request must not start before the first ends
    assert!(
        spans[1].0 >= spans[0].1,
        "second request started before the first worker was returned"
    );

    drop(spans);
    server.stop();
}

#[test]
fn test_failing_processor_returns_500_and_pool_recovers() {
    let mut server = listener();
    let calls = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&calls);

    server.add_processor(
        "/flaky",
        Box::new(move |session: &mut ServerSession| {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                return Err(wireline::http::HttpError::Protocol("boom".to_string()));
            }
            session.response_mut().set_body(b"recovered".to_vec());
            Ok(())
        }),
    );
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();

    let (status, _) = get(port, "/flaky", b"");
    assert_eq!(status, 500);

    // Worker went back to the pool; the next request succeeds
    let (status, body) = get(port, "/flaky", b"");
    assert_eq!(status, 200);
    assert_eq!(body, b"recovered");

    server.stop();
}

#[test]
fn test_concurrent_requests_to_distinct_paths() {
    let mut server = listener();
    for path in ["/a", "/b", "/c"] {
        let tag = path.as_bytes().to_vec();
        server.add_processor(
            path,
            Box::new(move |session: &mut ServerSession| {
                session.response_mut().set_body(tag.clone());
                Ok(())
            }),
        );
    }
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();

    let handles: Vec<_> = ["/a", "/b", "/c"]
        .into_iter()
        .map(|path| thread::spawn(move || get(port, path, b"")))
        .collect();
    for (handle, path) in handles.into_iter().zip(["/a", "/b", "/c"]) {
        let (status, body) = handle.join().unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, path.as_bytes());
    }

    server.stop();
}

#[test]
fn test_stop_joins_and_releases_port() {
    let mut server = listener();
    server.add_processor("/x", Box::new(|_: &mut ServerSession| Ok(())));
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    assert!(server.is_running());

    server.stop();
    assert!(!server.is_running());

    // The listening socket is gone
    StdTcpListener::bind(addr).unwrap();
}

#[test]
fn test_malformed_request_answered_with_400() {
    use std::io::{Read, Write};
    use std::net::TcpStream;

    let mut server = listener();
    server.add_processor("/x", Box::new(|_: &mut ServerSession| Ok(())));
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(b"this is not http\r\n\r\n").unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    server.stop();
}
