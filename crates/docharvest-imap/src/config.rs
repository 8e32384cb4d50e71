//! Connection configuration types.

use std::fmt;
use std::time::Duration;

/// Default timeout for the TCP connect and TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default overall timeout for connect plus authentication.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(35);

/// Default timeout for a single command round-trip.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of UIDs per structural scan request.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 143,
            Self::Implicit => 993,
        }
    }

    /// Returns the security mode for a TLS on/off flag.
    #[must_use]
    pub const fn from_tls(tls: bool) -> Self {
        if tls { Self::Implicit } else { Self::None }
    }
}

/// Login credentials for a mailbox.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Username (usually the email address).
    pub username: String,
    /// Password or app password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a username and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Mail session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Login credentials.
    pub credentials: Credentials,
    /// TCP connect and TLS handshake timeout.
    pub connect_timeout: Duration,
    /// Overall timeout for connect plus authentication.
    pub login_timeout: Duration,
    /// Read/write timeout for a single command.
    pub io_timeout: Duration,
    /// Number of UIDs per structural scan request.
    pub scan_batch_size: usize,
}

impl Config {
    /// Creates a new configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for session configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    credentials: Credentials,
    connect_timeout: Duration,
    login_timeout: Duration,
    io_timeout: Duration,
    scan_batch_size: usize,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            credentials: Credentials::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the overall connect plus login timeout.
    #[must_use]
    pub const fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the structural scan batch size. Zero is clamped to one.
    #[must_use]
    pub fn scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size.max(1);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            credentials: self.credentials,
            connect_timeout: self.connect_timeout,
            login_timeout: self.login_timeout.max(self.connect_timeout),
            io_timeout: self.io_timeout,
            scan_batch_size: self.scan_batch_size,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 143);
        assert_eq!(Security::Implicit.default_port(), 993);
    }

    #[test]
    fn test_security_from_tls_flag() {
        assert_eq!(Security::from_tls(true), Security::Implicit);
        assert_eq!(Security::from_tls(false), Security::None);
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("imap.example.com");
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.login_timeout, DEFAULT_LOGIN_TIMEOUT);
        assert_eq!(config.scan_batch_size, 100);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("imap.example.com")
            .port(1993)
            .credentials("user@example.com", "hunter2")
            .connect_timeout(Duration::from_secs(10))
            .build();

        assert_eq!(config.address(), "imap.example.com:1993");
        assert_eq!(config.credentials.username, "user@example.com");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder_default_port() {
        let config = Config::builder("imap.example.com")
            .security(Security::None)
            .build();

        assert_eq!(config.port, 143);
    }

    #[test]
    fn test_login_timeout_never_shorter_than_connect() {
        let config = Config::builder("imap.example.com")
            .connect_timeout(Duration::from_secs(40))
            .login_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(config.login_timeout, Duration::from_secs(40));
    }

    #[test]
    fn test_scan_batch_size_clamped() {
        let config = Config::builder("imap.example.com").scan_batch_size(0).build();
        assert_eq!(config.scan_batch_size, 1);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("user", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }
}
