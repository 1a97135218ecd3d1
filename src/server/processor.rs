//! Request processors
//!
//! The boundary to whatever turns requests into responses. A processor
//! receives a live server session, reads what it needs from the request, and
//! fills in the response message and line before returning; the dispatcher
//! never interprets body content.

use crate::http::{self, ServerSession};

/// A stateful worker that turns one HTTP request into a response
///
/// Processors are not shared: each lives in a path pool and serves one
/// request at a time. State kept across calls is therefore safe.
pub trait RequestProcessor: Send {
    /// Handle one request on the given session
    ///
    /// The dispatcher commits the session afterwards; committing here is
    /// allowed and makes the later commit a no-op.
    fn process(&mut self, session: &mut ServerSession) -> http::Result<()>;
}

impl<F> RequestProcessor for F
where
    F: FnMut(&mut ServerSession) -> http::Result<()> + Send,
{
    fn process(&mut self, session: &mut ServerSession) -> http::Result<()> {
        self(session)
    }
}
