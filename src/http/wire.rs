//! Wire codec over a transport session
//!
//! Reading is built on `receive()` plus `rewind()`: a read that pulls in more
//! than one line or body needs is rewound so the surplus is re-presented to
//! the next reader. Writing serializes a whole message (start line, headers,
//! body) into one flushed send.

use super::{HttpError, HttpHeaders, Result, CRLF, MAX_HEADER_LINES, MAX_LINE_LENGTH};
use crate::transport::TransportSession;

/// Read one CRLF-terminated line, without the terminator
pub fn read_line(session: &mut TransportSession) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        // Start the scan one byte back in case the CRLF straddles blocks
        let scan_from = buf.len().saturating_sub(1);
        let chunk = session.receive()?;
        buf.extend_from_slice(&chunk);

        if let Some(at) = find_crlf(&buf[scan_from..]) {
            let at = scan_from + at;
            let surplus = buf.len() - (at + 2);
            if surplus > 0 {
                session.rewind(surplus)?;
            }
            buf.truncate(at);
            return String::from_utf8(buf)
                .map_err(|_| HttpError::Parse("line is not valid UTF-8".to_string()));
        }

        if buf.len() > MAX_LINE_LENGTH {
            return Err(HttpError::Parse(format!(
                "line exceeds {} bytes",
                MAX_LINE_LENGTH
            )));
        }
    }
}

/// Read a header block up to and including the blank line
pub fn read_headers(session: &mut TransportSession) -> Result<HttpHeaders> {
    let mut headers = HttpHeaders::new();
    loop {
        let line = read_line(session)?;
        if line.is_empty() {
            return Ok(headers);
        }
        if headers.len() >= MAX_HEADER_LINES {
            return Err(HttpError::Parse(format!(
                "more than {} header lines",
                MAX_HEADER_LINES
            )));
        }
        let (name, value) = HttpHeaders::parse_line(&line)?;
        headers.add(name, value);
    }
}

/// Read exactly `length` body bytes, rewinding any over-read
pub fn read_body(session: &mut TransportSession, length: u64) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(length.min(64 * 1024) as usize);
    while (body.len() as u64) < length {
        let chunk = session.receive()?;
        body.extend_from_slice(&chunk);
    }
    let surplus = body.len() - length as usize;
    if surplus > 0 {
        session.rewind(surplus)?;
        body.truncate(length as usize);
    }
    Ok(body)
}

/// Write a start line, headers, and body as one flushed send
pub fn write_message(
    session: &mut TransportSession,
    start_line: &str,
    headers: &HttpHeaders,
    body: &[u8],
) -> Result<()> {
    let mut buf = Vec::with_capacity(start_line.len() + 2 + body.len() + 128);
    buf.extend_from_slice(start_line.as_bytes());
    buf.extend_from_slice(CRLF.as_bytes());
    buf.extend_from_slice(&headers.to_wire());
    buf.extend_from_slice(body);
    session.send(&buf)?;
    Ok(())
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
