//! Transport configuration
//!
//! Property-style key/value configuration for transports. Defaults cover the
//! common case; required keys (host/port for clients, listenport for servers)
//! are checked at the first connect or listen call, not at load time.

use super::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Default connect/read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Default block size for `receive()` calls
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Transport configuration
///
/// Built by applying property key/value pairs, then handed to a transport.
/// The transport treats it as immutable from that point on.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Remote host (client side)
    pub host: Option<String>,
    /// Remote port (client side)
    pub port: Option<u16>,
    /// Listening port (server side)
    pub listen_port: Option<u16>,
    /// Connect and read timeout
    pub timeout: Duration,
    /// Maximum bytes returned by one `receive()` call
    pub block_size: usize,
    /// Keystore path (PEM bundle or PKCS#12 archive), TLS only
    pub keystore: Option<PathBuf>,
    /// Store-level password (PKCS#12), TLS only
    pub keystore_pass: Option<String>,
    /// Private-key password (encrypted PEM keys), TLS only
    pub key_pass: Option<String>,
    /// Accept any peer certificate chain without validation.
    ///
    /// Insecure: intended for test environments only, never the default.
    pub always_trust: bool,
    /// Require the client to present a certificate (server-side TLS)
    pub require_client_auth: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            host: None,
            port: None,
            listen_port: None,
            timeout: DEFAULT_TIMEOUT,
            block_size: DEFAULT_BLOCK_SIZE,
            keystore: None,
            keystore_pass: None,
            key_pass: None,
            always_trust: false,
            require_client_auth: true,
        }
    }
}

impl TransportConfig {
    /// Create a configuration with the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one property
    ///
    /// Unknown keys are logged and ignored; shared property sets may carry
    /// keys owned by other components. Unparsable values are an error.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "host" => self.host = Some(value.to_string()),
            "port" => self.port = Some(parse(key, value)?),
            "listenport" => self.listen_port = Some(parse(key, value)?),
            "timeout" => self.timeout = Duration::from_millis(parse(key, value)?),
            "blocksize" => self.block_size = parse(key, value)?,
            "keystore" => self.keystore = Some(PathBuf::from(value)),
            "keystorepass" => self.keystore_pass = Some(value.to_string()),
            "keypass" => self.key_pass = Some(value.to_string()),
            "alwaystrust" => self.always_trust = parse(key, value)?,
            "clientauth" => self.require_client_auth = parse(key, value)?,
            _ => {
                tracing::warn!(key, "ignoring unknown transport property");
            }
        }
        Ok(())
    }

    /// Apply a sequence of properties
    pub fn apply_all<'a, I>(&mut self, properties: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in properties {
            self.apply(key, value)?;
        }
        Ok(())
    }

    /// Host and port, required for client actions
    pub(crate) fn require_host_port(&self) -> Result<(&str, u16), ConfigError> {
        let host = self.host.as_deref().ok_or(ConfigError::Missing("host"))?;
        let port = self.port.ok_or(ConfigError::Missing("port"))?;
        Ok((host, port))
    }

    /// Listen port, required for server actions
    pub(crate) fn require_listen_port(&self) -> Result<u16, ConfigError> {
        self.listen_port.ok_or(ConfigError::Missing("listenport"))
    }

    /// Keystore path, required for TLS server identity
    pub(crate) fn require_keystore(&self) -> Result<&std::path::Path, ConfigError> {
        self.keystore
            .as_deref()
            .ok_or(ConfigError::Missing("keystore"))
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
