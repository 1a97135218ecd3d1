//! TLS transport
//!
//! Layers OpenSSL over the TCP transport. The SSL context is built lazily on
//! the first connect or listen: the keystore (PEM bundle or PKCS#12 archive)
//! supplies the local identity and, unless "always trust" is configured, the
//! trust anchors for peer validation.
//!
//! The always-trust policy accepts any certificate chain without validation.
//! It is insecure and intended for test environments only; it is never the
//! default and must be selected explicitly by configuration.

use super::session::{poll_fd, PollEvents, Wire};
use super::tcp::TcpTransport;
use super::{Result, Transport, TransportConfig, TransportError, TransportSession};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{
    Ssl, SslContext, SslContextBuilder, SslMethod, SslStream, SslVerifyMode,
};
use openssl::x509::X509;
use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::time::Duration;

/// TLS transport factory
pub struct TlsTransport {
    config: TransportConfig,
    tcp: TcpTransport,
    client_ctx: Option<SslContext>,
    server_ctx: Option<SslContext>,
}

impl TlsTransport {
    /// Create a TLS transport from a configuration
    pub fn new(config: TransportConfig) -> Self {
        TlsTransport {
            tcp: TcpTransport::new(config.clone()),
            config,
            client_ctx: None,
            server_ctx: None,
        }
    }

    fn client_ctx(&mut self) -> Result<SslContext> {
        if let Some(ctx) = &self.client_ctx {
            return Ok(ctx.clone());
        }

        let mut builder = SslContextBuilder::new(SslMethod::tls_client())?;

        let keystore = match self.config.keystore.clone() {
            Some(path) => Some(load_keystore(
                &path,
                self.config.keystore_pass.as_deref(),
                self.config.key_pass.as_deref(),
            )?),
            None => None,
        };

        if self.config.always_trust {
            tracing::warn!("always-trust enabled: peer certificates are not validated");
            builder.set_verify_callback(SslVerifyMode::PEER, |_, _| true);
        } else if let Some(keystore) = &keystore {
            install_trust_anchors(&mut builder, keystore)?;
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_default_verify_paths()?;
            builder.set_verify(SslVerifyMode::PEER);
        }

        // A keystore that carries a private key also serves as the client
        // identity, presented when the server requests a certificate.
        if let Some(keystore) = &keystore {
            if keystore.key.is_some() {
                install_identity(&mut builder, keystore)?;
            }
        }

        let ctx = builder.build();
        self.client_ctx = Some(ctx.clone());
        Ok(ctx)
    }

    fn server_ctx(&mut self) -> Result<SslContext> {
        if let Some(ctx) = &self.server_ctx {
            return Ok(ctx.clone());
        }

        let path = self.config.require_keystore()?.to_path_buf();
        let keystore = load_keystore(
            &path,
            self.config.keystore_pass.as_deref(),
            self.config.key_pass.as_deref(),
        )?;

        let mut builder = SslContextBuilder::new(SslMethod::tls_server())?;
        install_identity(&mut builder, &keystore)?;

        if self.config.require_client_auth {
            let mode = SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT;
            if self.config.always_trust {
                tracing::warn!("always-trust enabled: client certificates are not validated");
                builder.set_verify_callback(mode, |_, _| true);
            } else {
                install_trust_anchors(&mut builder, &keystore)?;
                builder.set_verify(mode);
            }
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }

        let ctx = builder.build();
        self.server_ctx = Some(ctx.clone());
        Ok(ctx)
    }

    fn session(&self, stream: SslStream<TcpStream>) -> TransportSession {
        TransportSession::new(
            Box::new(TlsWire::new(stream)),
            self.config.timeout,
            self.config.block_size,
        )
    }
}

impl Transport for TlsTransport {
    fn bind(&mut self) -> Result<()> {
        self.tcp.bind()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.tcp.local_addr()
    }

    fn connect(&mut self) -> Result<TransportSession> {
        let ctx = self.client_ctx()?;
        let stream = self.tcp.connect_stream()?;
        bound_handshake(stream, self.config.timeout, |stream| {
            let mut ssl = Ssl::new(&ctx)?;
            if let Some(host) = &self.config.host {
                ssl.set_hostname(host)
                    .map_err(TransportError::from)?;
            }
            ssl.connect(stream)
                .map_err(|e| TransportError::Handshake(e.to_string()))
        })
        .map(|stream| self.session(stream))
    }

    fn listen(&mut self, timeout: Duration) -> Result<TransportSession> {
        let ctx = self.server_ctx()?;
        let stream = self.tcp.accept_stream(timeout)?;
        bound_handshake(stream, self.config.timeout, |stream| {
            let ssl = Ssl::new(&ctx)?;
            ssl.accept(stream)
                .map_err(|e| TransportError::Handshake(e.to_string()))
        })
        .map(|stream| self.session(stream))
    }

    fn unbind(&mut self) {
        self.tcp.unbind();
    }
}

/// Run a handshake with socket timeouts applied, clearing them afterwards
fn bound_handshake<F>(
    stream: TcpStream,
    timeout: Duration,
    handshake: F,
) -> Result<SslStream<TcpStream>>
where
    F: FnOnce(TcpStream) -> Result<SslStream<TcpStream>>,
{
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let ssl_stream = handshake(stream)?;
    ssl_stream.get_ref().set_read_timeout(None)?;
    ssl_stream.get_ref().set_write_timeout(None)?;
    Ok(ssl_stream)
}

/// Identity and trust material loaded from a keystore file
struct Keystore {
    cert: Option<X509>,
    key: Option<PKey<Private>>,
    chain: Vec<X509>,
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystore")
            .field("cert", &self.cert.is_some())
            .field("key", &self.key.is_some())
            .field("chain", &self.chain.len())
            .finish()
    }
}

/// Load a PEM bundle or PKCS#12 archive
///
/// PKCS#12 is recognized by the `.p12`/`.pfx` extension and opened with the
/// store password. PEM bundles have no store-level password; the key password
/// decrypts an encrypted private key.
fn load_keystore(
    path: &Path,
    keystore_pass: Option<&str>,
    key_pass: Option<&str>,
) -> Result<Keystore> {
    let bytes = std::fs::read(path)
        .map_err(|e| TransportError::Keystore(format!("{}: {}", path.display(), e)))?;

    let is_pkcs12 = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("p12") | Some("pfx")
    );

    if is_pkcs12 {
        let parsed = Pkcs12::from_der(&bytes)?.parse2(keystore_pass.unwrap_or(""))?;
        let chain = parsed
            .ca
            .map(|stack| stack.into_iter().collect())
            .unwrap_or_default();
        return Ok(Keystore {
            cert: parsed.cert,
            key: parsed.pkey,
            chain,
        });
    }

    let mut certs = X509::stack_from_pem(&bytes)?;
    let cert = if certs.is_empty() {
        None
    } else {
        Some(certs.remove(0))
    };
    let key = match key_pass {
        Some(pass) => PKey::private_key_from_pem_passphrase(&bytes, pass.as_bytes()).ok(),
        None => PKey::private_key_from_pem(&bytes).ok(),
    };

    Ok(Keystore {
        cert,
        key,
        chain: certs,
    })
}

/// Install the keystore's certificate and private key as the local identity
fn install_identity(builder: &mut SslContextBuilder, keystore: &Keystore) -> Result<()> {
    let cert = keystore
        .cert
        .as_ref()
        .ok_or_else(|| TransportError::Keystore("keystore has no certificate".to_string()))?;
    let key = keystore
        .key
        .as_ref()
        .ok_or_else(|| TransportError::Keystore("keystore has no private key".to_string()))?;

    builder.set_certificate(cert)?;
    builder.set_private_key(key)?;
    for extra in &keystore.chain {
        builder.add_extra_chain_cert(extra.clone())?;
    }
    builder.check_private_key()?;
    Ok(())
}

/// Trust the keystore's certificates for peer validation
fn install_trust_anchors(builder: &mut SslContextBuilder, keystore: &Keystore) -> Result<()> {
    let store = builder.cert_store_mut();
    if let Some(cert) = &keystore.cert {
        store.add_cert(cert.clone())?;
    }
    for cert in &keystore.chain {
        store.add_cert(cert.clone())?;
    }
    Ok(())
}

/// TLS wire over an established SSL stream
pub struct TlsWire {
    stream: SslStream<TcpStream>,
}

impl TlsWire {
    /// Wrap a completed SSL stream
    pub fn new(stream: SslStream<TcpStream>) -> Self {
        TlsWire { stream }
    }
}

impl Wire for TlsWire {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        // Buffered TLS records may hold application data the socket no longer
        // shows; short-circuit so poll cannot miss it.
        if events == PollEvents::Read && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }
        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
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
        let _ = self.stream.shutdown();
        self.stream
            .get_ref()
            .shutdown(Shutdown::Both)
            .map_err(TransportError::from)
    }
}
