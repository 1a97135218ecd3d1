//! Client and server HTTP sessions
//!
//! A session owns one connected or accepted transport session and is
//! single-use: construct, mutate the outbound message, commit exactly once,
//! close. The two roles are distinct types, so setting a response on a client
//! (or replacing the inbound request on a server) is unrepresentable rather
//! than a runtime error.
//!
//! After the commit write both roles evaluate keep-alive: the socket is
//! closed when either side's `Connection` header is `close` or either start
//! line is HTTP/1.0. This deliberately closes on an outbound `Connection:
//! close` even when the peer offered keep-alive.

use super::{date, header, wire, HttpError, HttpMessage, Result};
use super::{HttpHeaders, Method, RequestLine, ResponseLine, Status, Version};
use crate::transport::TransportSession;

const AGENT: &str = concat!("wireline/", env!("CARGO_PKG_VERSION"));

/// Client-role session: writes a request, reads the response
#[derive(Debug)]
pub struct ClientSession {
    transport: TransportSession,
    request: HttpMessage,
    request_line: RequestLine,
    response: HttpMessage,
    response_line: Option<ResponseLine>,
    committed: bool,
    keep_alive: bool,
}

impl ClientSession {
    /// Create a client session over a connected transport
    ///
    /// Installs the default request headers; nothing is read or written until
    /// [`commit`](Self::commit).
    pub fn new(transport: TransportSession) -> Self {
        let mut request = HttpMessage::new();
        let headers = request.headers_mut();
        headers.put(header::USER_AGENT, Some(AGENT));
        headers.put(header::ACCEPT, Some("*/*"));
        headers.put(header::CONNECTION, Some("close"));
        headers.put(header::CONTENT_TYPE, Some("application/octet-stream"));

        ClientSession {
            transport,
            request,
            request_line: RequestLine::new(Method::Get, "/", Version::Http11),
            response: HttpMessage::new(),
            response_line: None,
            committed: false,
            keep_alive: false,
        }
    }

    /// The outbound request
    pub fn request(&self) -> &HttpMessage {
        &self.request
    }

    /// The outbound request, mutably
    pub fn request_mut(&mut self) -> &mut HttpMessage {
        &mut self.request
    }

    /// The request line
    pub fn request_line(&self) -> &RequestLine {
        &self.request_line
    }

    /// Replace the request line
    pub fn set_request_line(&mut self, line: RequestLine) {
        self.request_line = line;
    }

    /// The inbound response, populated by `commit`
    pub fn response(&self) -> &HttpMessage {
        &self.response
    }

    /// The response line, present after `commit`
    pub fn response_line(&self) -> Option<&ResponseLine> {
        self.response_line.as_ref()
    }

    /// Write the request and read the response
    ///
    /// Effective exactly once; repeat calls are logged no-ops. Informational
    /// responses other than 101 are drained and skipped; 101 is a protocol
    /// error, as is any 1xx on an HTTP/1.0 exchange.
    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            tracing::debug!("client session already committed");
            return Ok(());
        }
        self.committed = true;

        let length = self.request.body().len().to_string();
        self.request
            .headers_mut()
            .put(header::CONTENT_LENGTH, Some(&length));
        let start = self.request_line.to_string();
        wire::write_message(
            &mut self.transport,
            &start,
            self.request.headers(),
            self.request.body(),
        )?;

        let line = loop {
            let raw = wire::read_line(&mut self.transport)?;
            let line = ResponseLine::parse(&raw)?;
            if !line.status.is_informational() {
                break line;
            }
            if line.status.code() == 101 {
                return Err(HttpError::Protocol(
                    "unexpected switch-protocols response".to_string(),
                ));
            }
            if self.request_line.version == Version::Http10 || line.version == Version::Http10 {
                return Err(HttpError::Protocol(format!(
                    "informational response {} on an HTTP/1.0 exchange",
                    line.status.code()
                )));
            }
            // Drain the informational header block and keep reading
            tracing::debug!(status = line.status.code(), "skipping informational response");
            wire::read_headers(&mut self.transport)?;
        };

        let headers = wire::read_headers(&mut self.transport)?;
        let body = match headers.content_length() {
            Some(length) => wire::read_body(&mut self.transport, length)?,
            None => Vec::new(),
        };
        let mut response = HttpMessage::new();
        *response.headers_mut() = headers;
        response.set_body(body);
        self.response = response;

        let close = wants_close(self.request_line.version, self.request.headers())
            || wants_close(line.version, self.response.headers());
        self.response_line = Some(line);
        self.keep_alive = !close;
        if close {
            self.transport.close();
        }
        Ok(())
    }

    /// Whether the socket was left open after commit
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Close the session
    pub fn close(&mut self) {
        self.transport.close();
    }
}

/// Server-role session: reads the request, writes a response
#[derive(Debug)]
pub struct ServerSession {
    transport: TransportSession,
    request: HttpMessage,
    request_line: RequestLine,
    response: HttpMessage,
    response_line: ResponseLine,
    committed: bool,
    keep_alive: bool,
}

impl ServerSession {
    /// Create a server session over an accepted transport
    ///
    /// Reads the request line, headers, and body immediately, then installs
    /// the default response headers and a 200 response line on the request's
    /// protocol version.
    pub fn new(transport: TransportSession) -> Result<Self> {
        Self::read_from(transport).map_err(|(_, e)| e)
    }

    /// As [`new`](Self::new), but hands the transport back on a read failure
    /// so the caller can still answer on the raw connection.
    pub(crate) fn read_from(
        mut transport: TransportSession,
    ) -> std::result::Result<Self, (TransportSession, HttpError)> {
        let request_line = match wire::read_line(&mut transport)
            .and_then(|raw| RequestLine::parse(&raw))
        {
            Ok(line) => line,
            Err(e) => return Err((transport, e)),
        };
        let headers = match wire::read_headers(&mut transport) {
            Ok(headers) => headers,
            Err(e) => return Err((transport, e)),
        };
        let body = match headers.content_length() {
            Some(length) => match wire::read_body(&mut transport, length) {
                Ok(body) => body,
                Err(e) => return Err((transport, e)),
            },
            None => Vec::new(),
        };

        let mut request = HttpMessage::new();
        *request.headers_mut() = headers;
        request.set_body(body);

        let mut response = HttpMessage::new();
        response_defaults(response.headers_mut());

        Ok(ServerSession {
            response_line: ResponseLine::new(request_line.version, Status::OK),
            transport,
            request,
            request_line,
            response,
            committed: false,
            keep_alive: false,
        })
    }

    /// The inbound request
    pub fn request(&self) -> &HttpMessage {
        &self.request
    }

    /// The request line
    pub fn request_line(&self) -> &RequestLine {
        &self.request_line
    }

    /// The outbound response
    pub fn response(&self) -> &HttpMessage {
        &self.response
    }

    /// The outbound response, mutably
    pub fn response_mut(&mut self) -> &mut HttpMessage {
        &mut self.response
    }

    /// The response line
    pub fn response_line(&self) -> &ResponseLine {
        &self.response_line
    }

    /// Replace the response line
    pub fn set_response_line(&mut self, line: ResponseLine) {
        self.response_line = line;
    }

    /// Set the response status, keeping the canonical reason phrase
    pub fn set_response_status(&mut self, status: Status) {
        self.response_line = ResponseLine::new(self.response_line.version, status);
    }

    /// Reset the response to a bare generic one for the given status
    ///
    /// Default headers, `Connection: close`, empty body. Used for synthesized
    /// responses such as 404 and 500.
    pub fn set_generic_response(&mut self, status: Status) {
        let mut response = HttpMessage::new();
        response_defaults(response.headers_mut());
        self.response = response;
        self.response_line = ResponseLine::new(self.request_line.version, status);
    }

    /// Write the response
    ///
    /// Effective exactly once; repeat calls are logged no-ops.
    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            tracing::debug!("server session already committed");
            return Ok(());
        }
        self.committed = true;

        let length = self.response.body().len().to_string();
        self.response
            .headers_mut()
            .put(header::CONTENT_LENGTH, Some(&length));
        let start = self.response_line.to_string();
        wire::write_message(
            &mut self.transport,
            &start,
            self.response.headers(),
            self.response.body(),
        )?;

        let close = wants_close(self.request_line.version, self.request.headers())
            || wants_close(self.response_line.version, self.response.headers());
        self.keep_alive = !close;
        if close {
            self.transport.close();
        }
        Ok(())
    }

    /// Whether the socket was left open after commit
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Close the session
    pub fn close(&mut self) {
        self.transport.close();
    }
}

/// Default response headers: server identifier, date, close by default
fn response_defaults(headers: &mut HttpHeaders) {
    headers.put(header::SERVER, Some(AGENT));
    headers.put(header::DATE, Some(&date::now()));
    headers.put(header::CONNECTION, Some("close"));
}

/// Close policy for one side of the exchange
fn wants_close(version: Version, headers: &HttpHeaders) -> bool {
    version == Version::Http10
        || headers
            .get(header::CONNECTION)
            .map_or(false, |v| v.eq_ignore_ascii_case("close"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::session::testing::{MockWire, WireLog};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn transport(input: &[u8]) -> (TransportSession, Arc<Mutex<WireLog>>) {
        let (wire, log) = MockWire::new(input);
        (
            TransportSession::new(Box::new(wire), Duration::from_secs(1), 1024),
            log,
        )
    }

    fn written(log: &Arc<Mutex<WireLog>>) -> String {
        String::from_utf8(log.lock().unwrap().written.clone()).unwrap()
    }

    #[test]
    fn test_client_default_headers() {
        let (transport, _) = transport(b"");
        let client = ClientSession::new(transport);

        let headers = client.request().headers();
        assert_eq!(headers.get("User-Agent"), Some(AGENT));
        assert_eq!(headers.get("Accept"), Some("*/*"));
        assert_eq!(headers.get("Connection"), Some("close"));
        assert_eq!(headers.get("Content-Type"), Some("application/octet-stream"));
    }

    #[test]
    fn test_client_commit_round_trip() {
        let (transport, log) =
            transport(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello");
        let mut client = ClientSession::new(transport);
        client.set_request_line(RequestLine::new(Method::Post, "/echo", Version::Http11));
        client.request_mut().set_body(b"ping!".to_vec());

        client.commit().unwrap();

        let out = written(&log);
        assert!(out.starts_with("POST /echo HTTP/1.1\r\n"));
        assert!(out.contains("Content-Length: 5\r\n"));
        assert!(out.ends_with("\r\n\r\nping!"));

        assert_eq!(client.response_line().unwrap().status.code(), 200);
        assert_eq!(client.response().body(), b"hello");
    }

    #[test]
    fn test_client_commit_twice_writes_once() {
        let (transport, log) =
            transport(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        let mut client = ClientSession::new(transport);

        client.commit().unwrap();
        let after_first = log.lock().unwrap().written.len();
        client.commit().unwrap();
        assert_eq!(log.lock().unwrap().written.len(), after_first);
    }

    #[test]
    fn test_client_skips_informational_responses() {
        let (transport, _) = transport(
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        );
        let mut client = ClientSession::new(transport);
        client.commit().unwrap();

        assert_eq!(client.response_line().unwrap().status.code(), 200);
        assert_eq!(client.response().body(), b"ok");
    }

    #[test]
    fn test_client_rejects_switch_protocols() {
        let (transport, _) = transport(b"HTTP/1.1 101 Switching Protocols\r\n\r\n");
        let mut client = ClientSession::new(transport);

        let err = client.commit().unwrap_err();
        assert!(matches!(err, HttpError::Protocol(_)));
    }

    #[test]
    fn test_client_rejects_informational_on_http10() {
        let (transport, _) = transport(b"HTTP/1.0 100 Continue\r\n\r\n");
        let mut client = ClientSession::new(transport);

        let err = client.commit().unwrap_err();
        assert!(matches!(err, HttpError::Protocol(_)));
    }

    #[test]
    fn test_client_request_version_http10_rejects_informational() {
        let (transport, _) = transport(b"HTTP/1.1 100 Continue\r\n\r\n");
        let mut client = ClientSession::new(transport);
        client.set_request_line(RequestLine::new(Method::Get, "/", Version::Http10));

        assert!(client.commit().is_err());
    }

    fn server_request(connection: &str, version: &str) -> Vec<u8> {
        format!(
            "GET /x {}\r\nHost: test\r\nConnection: {}\r\n\r\n",
            version, connection
        )
        .into_bytes()
    }

    #[test]
    fn test_server_reads_request_on_construction() {
        let (transport, _) = transport(
            b"POST /submit HTTP/1.1\r\nContent-Length: 4\r\nContent-Type: text/plain\r\n\r\ndata",
        );
        let server = ServerSession::new(transport).unwrap();

        assert_eq!(server.request_line().method, Method::Post);
        assert_eq!(server.request_line().uri, "/submit");
        assert_eq!(server.request().body(), b"data");
        assert_eq!(server.response_line().status.code(), 200);
        assert_eq!(server.response().headers().get("Connection"), Some("close"));
        assert!(server.response().headers().contains("Server"));
        assert!(server.response().headers().contains("Date"));
    }

    #[test]
    fn test_server_commit_twice_writes_once() {
        let (transport, log) = transport(&server_request("close", "HTTP/1.1"));
        let mut server = ServerSession::new(transport).unwrap();
        server.response_mut().set_body(b"done".to_vec());

        server.commit().unwrap();
        let after_first = log.lock().unwrap().written.len();
        assert!(after_first > 0);

        server.commit().unwrap();
        assert_eq!(log.lock().unwrap().written.len(), after_first);
    }

    #[test]
    fn test_server_commit_frames_content_length() {
        let (transport, log) = transport(&server_request("close", "HTTP/1.1"));
        let mut server = ServerSession::new(transport).unwrap();
        server.response_mut().set_body(b"response payload".to_vec());

        server.commit().unwrap();

        let out = written(&log);
        assert!(out.contains("Content-Length: 16\r\n"));
        assert!(out.ends_with("\r\n\r\nresponse payload"));
    }

    #[test]
    fn test_keep_alive_close_header_closes() {
        let (transport, log) = transport(&server_request("keep-alive", "HTTP/1.1"));
        let mut server = ServerSession::new(transport).unwrap();
        // Default response carries Connection: close
        server.commit().unwrap();
        assert!(!server.keep_alive());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_keep_alive_http11_stays_open() {
        let (transport, log) = transport(&server_request("keep-alive", "HTTP/1.1"));
        let mut server = ServerSession::new(transport).unwrap();
        server
            .response_mut()
            .headers_mut()
            .put(header::CONNECTION, Some("keep-alive"));
        server.commit().unwrap();
        assert!(server.keep_alive());
        assert_eq!(log.lock().unwrap().closes, 0);
    }

    #[test]
    fn test_keep_alive_http10_closes() {
        let (transport, log) = transport(&server_request("keep-alive", "HTTP/1.0"));
        let mut server = ServerSession::new(transport).unwrap();
        server
            .response_mut()
            .headers_mut()
            .put(header::CONNECTION, Some("keep-alive"));
        server.commit().unwrap();
        assert!(!server.keep_alive());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_keep_alive_request_close_closes() {
        // Either side asking for close wins, even if the response offers
        // keep-alive
        let (transport, log) = transport(&server_request("close", "HTTP/1.1"));
        let mut server = ServerSession::new(transport).unwrap();
        server
            .response_mut()
            .headers_mut()
            .put(header::CONNECTION, Some("keep-alive"));
        server.commit().unwrap();
        assert!(!server.keep_alive());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_server_malformed_request_returns_transport() {
        let (transport, _) = transport(b"NOT A REQUEST\r\n\r\n");
        let (returned, err) = ServerSession::read_from(transport).unwrap_err();
        assert!(matches!(err, HttpError::Parse(_)));
        assert!(!returned.is_closed());
    }

    #[test]
    fn test_generic_response() {
        let (transport, log) = transport(&server_request("keep-alive", "HTTP/1.1"));
        let mut server = ServerSession::new(transport).unwrap();
        server.response_mut().set_body(b"junk to discard".to_vec());

        server.set_generic_response(Status::NOT_FOUND);
        server.commit().unwrap();

        let out = written(&log);
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.contains("Content-Length: 0\r\n"));
    }
}
