//! Plain TCP transport
//!
//! Connect with a timeout on the client side; bind once and accept with a
//! timeout on the server side. Accepted and connected streams are wrapped in
//! a [`TransportSession`] over a [`TcpWire`].

use super::session::{poll_fd, PollEvents, Wire};
use super::{Result, Transport, TransportConfig, TransportError, TransportSession};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TCP transport factory
pub struct TcpTransport {
    config: TransportConfig,
    listener: Option<Socket>,
    local_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// Create a TCP transport from a configuration
    pub fn new(config: TransportConfig) -> Self {
        TcpTransport {
            config,
            listener: None,
            local_addr: None,
        }
    }

    /// The configuration this transport was built from
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Connect and return the raw stream, for layering TLS on top
    pub(crate) fn connect_stream(&self) -> Result<TcpStream> {
        let (host, port) = self.config.require_host_port()?;
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                TransportError::Io(std::io::Error::new(
                    ErrorKind::AddrNotAvailable,
                    format!("no address for {}:{}", host, port),
                ))
            })?;

        let socket = Socket::new(
            Domain::for_address(addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        match socket.connect_timeout(&SockAddr::from(addr), self.config.timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                return Err(TransportError::Timeout(self.config.timeout));
            }
            Err(e) => return Err(TransportError::Io(e)),
        }

        tracing::debug!(host, port, "connected");
        Ok(TcpStream::from(socket))
    }

    /// Accept one raw stream, waiting up to `timeout`
    pub(crate) fn accept_stream(&mut self, timeout: Duration) -> Result<TcpStream> {
        self.bind()?;
        let listener = match self.listener.as_ref() {
            Some(listener) => listener,
            None => unreachable!("bind succeeded without a listener"),
        };

        listener.set_read_timeout(Some(timeout))?;
        match listener.accept() {
            Ok((socket, peer)) => {
                tracing::debug!(peer = ?peer.as_socket(), "connection accepted");
                Ok(TcpStream::from(socket))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Err(TransportError::Timeout(timeout))
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn session(&self, stream: TcpStream) -> TransportSession {
        TransportSession::new(
            Box::new(TcpWire::new(stream)),
            self.config.timeout,
            self.config.block_size,
        )
    }
}

impl Transport for TcpTransport {
    fn bind(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let port = self.config.require_listen_port()?;
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(128)?;

        self.local_addr = socket.local_addr()?.as_socket();
        tracing::info!(address = ?self.local_addr, "listener bound");
        self.listener = Some(socket);
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn connect(&mut self) -> Result<TransportSession> {
        let stream = self.connect_stream()?;
        Ok(self.session(stream))
    }

    fn listen(&mut self, timeout: Duration) -> Result<TransportSession> {
        let stream = self.accept_stream(timeout)?;
        Ok(self.session(stream))
    }

    fn unbind(&mut self) {
        if self.listener.take().is_some() {
            tracing::info!(address = ?self.local_addr, "listener closed");
        }
        self.local_addr = None;
    }
}

/// Plain TCP wire
pub struct TcpWire {
    stream: TcpStream,
}

impl TcpWire {
    /// Wrap an established TCP stream
    pub fn new(stream: TcpStream) -> Self {
        TcpWire { stream }
    }
}

impl Wire for TcpWire {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(TransportError::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(TransportError::from)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush().map_err(TransportError::from)
    }

    fn close(&mut self) -> Result<()> {
        self.stream
            .shutdown(Shutdown::Both)
            .map_err(TransportError::from)
    }
}
